/// OctreeSpatialTree — static octree behind the SpatialIndex contract.
///
/// Uses single-node placement: each item is filed in exactly one node, the
/// deepest node whose domain fully contains the item's bound. An item that
/// straddles a child boundary stays in the parent; a SMALL item instead
/// sinks by the octant of its bound center, which assumes the bound is
/// small against the leaf cells.
///
/// The node array is pre-allocated at construction for a fixed depth, so a
/// CellId is a stable index into it for the tree's whole lifetime.

use rustc_hash::FxHashMap;
use glam::Vec3;
use crate::error::{Error, Result};
use super::item::{AABB, ItemId, ItemKey};
use super::spatial_index::{CellId, SpatialIndex};

/// Index of the root node in the flat node array.
const ROOT: usize = 0;

/// Subdivision depth used by `Scene::new`.
pub const DEFAULT_DEPTH: u32 = 4;

/// Deepest tree the pre-allocating constructor accepts.
///
/// Node count grows as 8^depth; depth 7 already pre-allocates ~2.4M nodes.
pub const MAX_DEPTH: u32 = 7;

/// A single node in the octree.
struct OctreeNode {
    /// World-space domain of this node
    domain: AABB,
    /// Index of the first child in the flat array (0 = no children / leaf)
    first_child: usize,
    /// Items filed in this node
    items: Vec<ItemId>,
}

/// Static octree spatial index over a cubic world domain.
///
/// Constructed from an origin and an edge length. Items out of the domain
/// are filed at the root so nothing is ever lost, only coarsely indexed.
pub struct OctreeSpatialTree {
    /// Flat array of all octree nodes (pre-allocated)
    nodes: Vec<OctreeNode>,
    /// Maximum depth of the tree (root = depth 0)
    max_depth: u32,
    /// Reverse lookup: item ID → (node index, filed bound).
    /// Needed for O(1) eviction and for bound queries.
    item_locations: FxHashMap<ItemId, (usize, AABB)>,
    /// Pre-computed subtree sizes indexed by remaining depth.
    /// subtree_sizes[d] = total node count for a subtree of depth d.
    subtree_sizes: Vec<usize>,
}

impl OctreeSpatialTree {
    /// Create an octree over the cube at `origin` with edge length `size`,
    /// subdivided to the default depth.
    pub fn new(origin: Vec3, size: f32) -> Result<OctreeSpatialTree> {
        Self::with_depth(origin, size, DEFAULT_DEPTH)
    }

    /// Create an octree with an explicit subdivision depth.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidExtent` for a non-positive or non-finite
    /// `size`, and `Error::DepthOutOfRange` when `max_depth > MAX_DEPTH`.
    pub fn with_depth(origin: Vec3, size: f32, max_depth: u32) -> Result<OctreeSpatialTree> {
        if !size.is_finite() || size <= 0.0 {
            crate::scene_error!(
                "nebula::OctreeSpatialTree",
                "rejected domain extent {}", size
            );
            return Err(Error::InvalidExtent(size));
        }
        if max_depth > MAX_DEPTH {
            crate::scene_error!(
                "nebula::OctreeSpatialTree",
                "rejected subdivision depth {} (limit {})", max_depth, MAX_DEPTH
            );
            return Err(Error::DepthOutOfRange(max_depth));
        }

        let domain = AABB::from_origin_size(origin, size);
        let total_nodes = Self::total_node_count(max_depth);
        let mut nodes = Vec::with_capacity(total_nodes);

        // Build the tree level by level
        Self::build_recursive(&mut nodes, &domain, 0, max_depth);

        debug_assert_eq!(nodes.len(), total_nodes);

        let subtree_sizes: Vec<usize> = (0..=max_depth).map(Self::total_node_count).collect();

        Ok(OctreeSpatialTree {
            nodes,
            max_depth,
            item_locations: FxHashMap::default(),
            subtree_sizes,
        })
    }

    /// World-space domain covered by the tree.
    pub fn domain(&self) -> &AABB {
        &self.nodes[ROOT].domain
    }

    /// Number of items currently filed.
    pub fn len(&self) -> usize {
        self.item_locations.len()
    }

    /// Whether no items are filed.
    pub fn is_empty(&self) -> bool {
        self.item_locations.is_empty()
    }

    /// Total number of pre-allocated nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of nodes for a given depth: (8^(d+1) - 1) / 7
    fn total_node_count(max_depth: u32) -> usize {
        let mut count = 0usize;
        let mut level_count = 1usize;
        for _ in 0..=max_depth {
            count += level_count;
            level_count *= 8;
        }
        count
    }

    /// Recursively build the static octree node array (depth-first).
    fn build_recursive(
        nodes: &mut Vec<OctreeNode>,
        domain: &AABB,
        depth: u32,
        max_depth: u32,
    ) {
        let node_index = nodes.len();

        if depth >= max_depth {
            // Leaf node: no children
            nodes.push(OctreeNode {
                domain: *domain,
                first_child: 0,
                items: Vec::new(),
            });
            return;
        }

        // Internal node: reserve slot, then build 8 children
        nodes.push(OctreeNode {
            domain: *domain,
            first_child: 0, // will be filled below
            items: Vec::new(),
        });

        let center = domain.center();
        let first_child = nodes.len();
        nodes[node_index].first_child = first_child;

        // 8 children: enumerate all octants
        for octant in 0..8u8 {
            let child_domain = Self::octant_domain(domain, &center, octant);
            Self::build_recursive(nodes, &child_domain, depth + 1, max_depth);
        }
    }

    /// Compute the domain of a specific octant (0–7).
    ///
    /// Octant bit layout: bit0 = X, bit1 = Y, bit2 = Z.
    /// - 0 = low, 1 = high for each axis.
    fn octant_domain(parent: &AABB, center: &Vec3, octant: u8) -> AABB {
        AABB {
            min: Vec3::new(
                if octant & 1 == 0 { parent.min.x } else { center.x },
                if octant & 2 == 0 { parent.min.y } else { center.y },
                if octant & 4 == 0 { parent.min.z } else { center.z },
            ),
            max: Vec3::new(
                if octant & 1 == 0 { center.x } else { parent.max.x },
                if octant & 2 == 0 { center.y } else { parent.max.y },
                if octant & 4 == 0 { center.z } else { parent.max.z },
            ),
        }
    }

    /// Determine which octant a point falls into relative to a center.
    ///
    /// Bit layout: bit0 = X, bit1 = Y, bit2 = Z (0 = low, 1 = high).
    fn point_octant(center: &Vec3, point: &Vec3) -> u8 {
        ((point.x >= center.x) as u8)
            | (((point.y >= center.y) as u8) << 1)
            | (((point.z >= center.z) as u8) << 2)
    }

    /// Compute the offset of octant `i` in the depth-first node layout.
    ///
    /// Uses pre-computed subtree sizes for O(1) lookup.
    fn subtree_offset(&self, octant: u8, remaining_depth: u32) -> usize {
        octant as usize * self.subtree_sizes[remaining_depth as usize]
    }

    /// Find the node that files an item with the given bound.
    ///
    /// Descends to the deepest node fully containing the bound. A bound
    /// straddling a child boundary stops at the parent, unless `small`, in
    /// which case it keeps descending by the octant of its center. Bounds
    /// outside the domain file at the root.
    fn target_node(&self, bound: &AABB, small: bool) -> usize {
        let domain = &self.nodes[ROOT].domain;
        let in_domain = if small {
            domain.contains_point(bound.center())
        } else {
            domain.contains(bound)
        };
        if !in_domain {
            return ROOT;
        }

        let mut node_idx = ROOT;
        let mut depth = 0;

        loop {
            if depth >= self.max_depth {
                return node_idx;
            }

            let first_child = self.nodes[node_idx].first_child;
            if first_child == 0 {
                return node_idx;
            }

            let center = self.nodes[node_idx].domain.center();
            let min_oct = Self::point_octant(&center, &bound.min);
            let max_oct = Self::point_octant(&center, &bound.max);

            let octant = if min_oct == max_oct {
                // Both corners in the same octant — the bound fits entirely
                min_oct
            } else if small {
                // Straddles a boundary but is small — sink by center
                Self::point_octant(&center, &bound.center())
            } else {
                // Straddles a boundary — stays in the current node
                return node_idx;
            };

            node_idx = first_child + self.subtree_offset(octant, self.max_depth - depth - 1);
            depth += 1;
        }
    }

    /// Remove an item from a node's list (order not preserved).
    fn detach(&mut self, node_idx: usize, id: ItemId) {
        let items = &mut self.nodes[node_idx].items;
        if let Some(pos) = items.iter().position(|&filed| filed == id) {
            items.swap_remove(pos);
        }
    }

    /// Recursively query the tree with a world-space bound.
    ///
    /// 3-way classification at each node below the root:
    /// - disjoint from the query → skip entire subtree
    /// - fully contained in the query → collect all items from the subtree
    /// - overlapping → test items individually, recurse into children
    ///
    /// The root is always tested item-by-item, since out-of-domain items
    /// are filed there and its domain does not bound them.
    fn query_recursive(
        &self,
        node_idx: usize,
        bound: &AABB,
        results: &mut Vec<ItemId>,
        depth: u32,
    ) {
        let node = &self.nodes[node_idx];

        if node_idx != ROOT {
            if !bound.intersects(&node.domain) {
                return;
            }
            if bound.contains(&node.domain) {
                // Everything in this subtree matches
                self.collect_all(node_idx, results, depth);
                return;
            }
        }

        // Test items at this node individually
        for &id in &node.items {
            if let Some((_, filed_bound)) = self.item_locations.get(&id) {
                if bound.intersects(filed_bound) {
                    results.push(id);
                }
            }
        }

        // Recurse into children
        if depth < self.max_depth {
            let first_child = node.first_child;
            if first_child != 0 {
                for octant in 0..8u8 {
                    let child_idx = first_child
                        + self.subtree_offset(octant, self.max_depth - depth - 1);
                    self.query_recursive(child_idx, bound, results, depth + 1);
                }
            }
        }
    }

    /// Collect all items from a node and its entire subtree (no bound test).
    ///
    /// Used when a node's domain is fully contained in the query bound.
    fn collect_all(
        &self,
        node_idx: usize,
        results: &mut Vec<ItemId>,
        depth: u32,
    ) {
        let node = &self.nodes[node_idx];
        results.extend_from_slice(&node.items);

        if depth < self.max_depth {
            let first_child = node.first_child;
            if first_child != 0 {
                for octant in 0..8u8 {
                    let child_idx = first_child
                        + self.subtree_offset(octant, self.max_depth - depth - 1);
                    self.collect_all(child_idx, results, depth + 1);
                }
            }
        }
    }
}

// ===== SPATIAL INDEX TRAIT =====

impl SpatialIndex for OctreeSpatialTree {
    fn reset_item(
        &mut self,
        old_cell: CellId,
        _old_key: ItemKey,
        bound: &AABB,
        id: ItemId,
        new_key: ItemKey,
    ) -> CellId {
        let target = self.target_node(bound, new_key.is_small());

        if let Some(&(prev_node, _)) = self.item_locations.get(&id) {
            debug_assert!(
                !old_cell.is_valid() || old_cell.raw() as usize == prev_node,
                "stale cell hint for item {}", id
            );
            if prev_node == target {
                // Same node — just refresh the filed bound
                self.item_locations.insert(id, (target, *bound));
                return CellId::from_raw(target as u32);
            }
            self.detach(prev_node, id);
        }

        self.nodes[target].items.push(id);
        self.item_locations.insert(id, (target, *bound));
        CellId::from_raw(target as u32)
    }

    fn remove_item(&mut self, cell: CellId, _key: ItemKey, id: ItemId) {
        if let Some((node_idx, _)) = self.item_locations.remove(&id) {
            debug_assert!(
                !cell.is_valid() || cell.raw() as usize == node_idx,
                "stale cell hint for item {}", id
            );
            self.detach(node_idx, id);
        }
    }

    fn query_bound(&self, bound: &AABB, results: &mut Vec<ItemId>) {
        if self.nodes.is_empty() {
            return;
        }
        self.query_recursive(ROOT, bound, results, 0);
    }

    fn clear(&mut self) {
        for node in &mut self.nodes {
            node.items.clear();
        }
        self.item_locations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_tree(max_depth: u32) -> OctreeSpatialTree {
        // Cube from -100 to +100 on each axis
        OctreeSpatialTree::with_depth(Vec3::splat(-100.0), 200.0, max_depth).unwrap()
    }

    fn make_aabb(min: Vec3, max: Vec3) -> AABB {
        AABB { min, max }
    }

    fn spatial_key() -> ItemKey {
        ItemKey::SPATIAL
    }

    fn small_key() -> ItemKey {
        ItemKey::SPATIAL | ItemKey::SMALL
    }

    #[test]
    fn test_new_creates_correct_node_count() {
        let tree = world_tree(0);
        assert_eq!(tree.node_count(), 1); // depth 0 = root only

        let tree = world_tree(1);
        assert_eq!(tree.node_count(), 9); // 1 + 8

        let tree = world_tree(2);
        assert_eq!(tree.node_count(), 73); // 1 + 8 + 64
    }

    #[test]
    fn test_invalid_extent_is_rejected() {
        assert_eq!(
            OctreeSpatialTree::new(Vec3::ZERO, 0.0).err(),
            Some(Error::InvalidExtent(0.0))
        );
        assert_eq!(
            OctreeSpatialTree::new(Vec3::ZERO, -5.0).err(),
            Some(Error::InvalidExtent(-5.0))
        );
        assert!(OctreeSpatialTree::new(Vec3::ZERO, f32::NAN).is_err());
        assert!(OctreeSpatialTree::new(Vec3::ZERO, f32::INFINITY).is_err());
    }

    #[test]
    fn test_excessive_depth_is_rejected() {
        assert_eq!(
            OctreeSpatialTree::with_depth(Vec3::ZERO, 100.0, MAX_DEPTH + 1).err(),
            Some(Error::DepthOutOfRange(MAX_DEPTH + 1))
        );
        assert!(OctreeSpatialTree::with_depth(Vec3::ZERO, 100.0, 5).is_ok());
    }

    #[test]
    fn test_insert_files_and_returns_cell() {
        let mut tree = world_tree(3);
        let bound = make_aabb(Vec3::new(10.0, 10.0, 10.0), Vec3::new(12.0, 12.0, 12.0));

        let cell = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, spatial_key());

        assert!(cell.is_valid());
        assert_eq!(tree.len(), 1);
        assert!(tree.nodes[cell.raw() as usize].items.contains(&1));
    }

    #[test]
    fn test_fitting_bound_descends_below_root() {
        let mut tree = world_tree(3);
        // Entirely inside the (+,+,+) octant
        let bound = make_aabb(Vec3::new(10.0, 10.0, 10.0), Vec3::new(20.0, 20.0, 20.0));

        let cell = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, spatial_key());

        assert_ne!(cell.raw() as usize, ROOT);
    }

    #[test]
    fn test_straddling_bound_stays_at_parent() {
        let mut tree = world_tree(3);
        // Crosses the world center on every axis
        let bound = make_aabb(Vec3::splat(-10.0), Vec3::splat(10.0));

        let cell = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, spatial_key());

        assert_eq!(cell.raw() as usize, ROOT);
    }

    #[test]
    fn test_small_bound_sinks_by_center() {
        let mut tree = world_tree(3);
        // Straddles the world center, but barely
        let bound = make_aabb(Vec3::splat(-1.0), Vec3::splat(2.0));

        let plain = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, spatial_key());
        let small = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 2, small_key());

        assert_eq!(plain.raw() as usize, ROOT);
        assert_ne!(small.raw() as usize, ROOT);
    }

    #[test]
    fn test_out_of_domain_bound_files_at_root() {
        let mut tree = world_tree(3);
        let bound = make_aabb(Vec3::splat(-200.0), Vec3::splat(-150.0));

        let cell = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, spatial_key());

        assert_eq!(cell.raw() as usize, ROOT);
        assert!(tree.nodes[ROOT].items.contains(&1));
    }

    #[test]
    fn test_relocation_moves_between_nodes() {
        let mut tree = world_tree(3);
        let key = spatial_key();

        let bound1 = make_aabb(Vec3::new(50.0, 50.0, 50.0), Vec3::new(60.0, 60.0, 60.0));
        let cell1 = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound1, 1, key);

        let bound2 = make_aabb(Vec3::new(-60.0, -60.0, -60.0), Vec3::new(-50.0, -50.0, -50.0));
        let cell2 = tree.reset_item(cell1, key, &bound2, 1, key);

        assert_ne!(cell1, cell2);
        assert_eq!(tree.len(), 1);
        assert!(!tree.nodes[cell1.raw() as usize].items.contains(&1));
        assert!(tree.nodes[cell2.raw() as usize].items.contains(&1));
    }

    #[test]
    fn test_relocation_within_same_node_keeps_cell() {
        let mut tree = world_tree(3);
        let key = spatial_key();

        let bound1 = make_aabb(Vec3::new(50.0, 50.0, 50.0), Vec3::new(60.0, 60.0, 60.0));
        let cell1 = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound1, 1, key);

        // Nudge the bound without leaving the node
        let bound2 = make_aabb(Vec3::new(51.0, 51.0, 51.0), Vec3::new(61.0, 61.0, 61.0));
        let cell2 = tree.reset_item(cell1, key, &bound2, 1, key);

        assert_eq!(cell1, cell2);
        assert_eq!(tree.item_locations[&1].1, bound2);
    }

    #[test]
    fn test_remove_evicts_item() {
        let mut tree = world_tree(3);
        let key = spatial_key();
        let bound = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));

        let cell = tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, key);
        assert_eq!(tree.len(), 1);

        tree.remove_item(cell, key, 1);
        assert!(tree.is_empty());

        let domain = *tree.domain();
        let mut results = Vec::new();
        tree.query_bound(&domain, &mut results);
        assert!(results.is_empty());
    }

    #[test]
    fn test_remove_unknown_item_is_noop() {
        let mut tree = world_tree(3);
        tree.remove_item(CellId::INVALID, spatial_key(), 99);
        tree.remove_item(CellId::from_raw(0), spatial_key(), 99);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_query_returns_intersecting_items_only() {
        let mut tree = world_tree(3);
        let key = spatial_key();

        let near = make_aabb(Vec3::new(10.0, 10.0, 10.0), Vec3::new(12.0, 12.0, 12.0));
        let far = make_aabb(Vec3::new(-90.0, -90.0, -90.0), Vec3::new(-80.0, -80.0, -80.0));
        tree.reset_item(CellId::INVALID, ItemKey::empty(), &near, 1, key);
        tree.reset_item(CellId::INVALID, ItemKey::empty(), &far, 2, key);

        let mut results = Vec::new();
        tree.query_bound(&make_aabb(Vec3::splat(0.0), Vec3::splat(20.0)), &mut results);

        assert!(results.contains(&1));
        assert!(!results.contains(&2));
    }

    #[test]
    fn test_query_has_no_duplicates() {
        let mut tree = world_tree(3);
        let bound = make_aabb(Vec3::splat(-1.0), Vec3::splat(1.0));
        tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, spatial_key());

        let mut results = Vec::new();
        tree.query_bound(&make_aabb(Vec3::splat(-100.0), Vec3::splat(100.0)), &mut results);

        // Single-node placement: each item is in exactly one node
        let count = results.iter().filter(|&&id| id == 1).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_query_finds_out_of_domain_items() {
        let mut tree = world_tree(3);
        let bound = make_aabb(Vec3::splat(-200.0), Vec3::splat(-150.0));
        tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, 1, spatial_key());

        let mut results = Vec::new();
        tree.query_bound(&make_aabb(Vec3::splat(-180.0), Vec3::splat(-160.0)), &mut results);

        assert!(results.contains(&1));
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut tree = world_tree(3);
        for id in 1..=10 {
            let pos = id as f32 * 5.0 - 25.0;
            let bound = make_aabb(
                Vec3::new(pos, pos, pos),
                Vec3::new(pos + 2.0, pos + 2.0, pos + 2.0),
            );
            tree.reset_item(CellId::INVALID, ItemKey::empty(), &bound, id, spatial_key());
        }
        assert_eq!(tree.len(), 10);

        tree.clear();

        assert!(tree.is_empty());
        let mut results = Vec::new();
        tree.query_bound(&make_aabb(Vec3::splat(-100.0), Vec3::splat(100.0)), &mut results);
        assert!(results.is_empty());
    }
}
