/// Scene — the concurrent item store at the heart of the renderer.
///
/// Producers on any thread allocate IDs and enqueue Transactions; the
/// owning render thread applies them in consolidated batches with
/// `process_transaction_queue`. Items live in a dense table indexed
/// directly by ItemId. Spatial items are filed in the spatial tree,
/// everything else in a flat registry, and each apply cycle keeps the two
/// containers consistent with the items' keys.
///
/// Two locks, never nested: the queue mutex (short, producer-contended)
/// and the items RwLock (held exclusively for the whole apply step, shared
/// by readers such as render passes).

use std::sync::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use rustc_hash::FxHashSet;
use glam::Vec3;
use crate::error::Result;
use super::item::{INVALID_ITEM_ID, Item, ItemId, PayloadBox, UpdateFn};
use super::octree_spatial_tree::OctreeSpatialTree;
use super::spatial_index::SpatialIndex;
use super::transaction::{Transaction, TransactionQueue};

/// Extra slots appended on each table growth, so consecutive apply cycles
/// don't reallocate for every small batch of fresh IDs.
const TABLE_GROWTH_SLACK: usize = 100;

/// First ID handed out by the allocator; 0 stays reserved.
const FIRST_ITEM_ID: ItemId = 1;

// ===== GUARDED ITEM STATE =====

/// The unit of state guarded by the items lock: the dense item table, the
/// spatial tree, and the non-spatial registry.
///
/// Invariant after every apply cycle: an item with a spatial key is filed
/// in the tree and holds a valid cell; a live non-spatial item is in the
/// registry with no cell; an inert item is in neither container.
pub struct SceneItems {
    /// Dense item table indexed by ItemId; slot 0 backs the reserved ID
    table: Vec<Item>,
    /// Hierarchical index over spatial items
    spatial_tree: Box<dyn SpatialIndex>,
    /// IDs of live items excluded from spatial indexing
    nonspatial_items: FxHashSet<ItemId>,
}

impl SceneItems {
    fn new(spatial_tree: Box<dyn SpatialIndex>) -> SceneItems {
        SceneItems {
            // slot 0 backs the reserved invalid ID
            table: vec![Item::default()],
            spatial_tree,
            nonspatial_items: FxHashSet::default(),
        }
    }

    /// Get an item slot by ID (None when the table doesn't reach `id`).
    ///
    /// A returned slot may be inert; check `Item::exists`.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.table.get(id as usize)
    }

    /// Iterate all slots past the reserved one, inert slots included.
    pub fn items(&self) -> impl Iterator<Item = (ItemId, &Item)> + '_ {
        self.table
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, item)| (id as ItemId, item))
    }

    /// Current table length (including the reserved slot and slack)
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Number of items currently holding a payload
    pub fn live_item_count(&self) -> usize {
        self.table.iter().filter(|item| item.exists()).count()
    }

    /// The spatial tree, for bound queries by readers
    pub fn spatial_tree(&self) -> &dyn SpatialIndex {
        self.spatial_tree.as_ref()
    }

    /// The registry of live non-spatial item IDs
    pub fn nonspatial_items(&self) -> &FxHashSet<ItemId> {
        &self.nonspatial_items
    }

    // ===== APPLY PHASES =====

    /// Grow the table so every ID below `max_id` has a backing slot.
    ///
    /// Must run before any reset of the cycle; resets may target IDs up to
    /// the allocator's current value.
    fn grow_table(&mut self, max_id: ItemId) {
        if max_id as usize > self.table.len() {
            self.table
                .resize_with(max_id as usize + TABLE_GROWTH_SLACK, Item::default);
        }
    }

    fn reset_items(&mut self, resets: Vec<(ItemId, PayloadBox)>) {
        for (id, payload) in resets {
            // Access the true item
            let item = &mut self.table[id as usize];
            let old_key = item.key();
            let old_cell = item.cell();

            // Reset the item with the new payload; the key is recomputed
            item.reset_payload(payload);
            let new_key = item.key();

            // A reset may only change the spatial classification of a slot
            // that has never held a real key; update_items owns the live
            // transitions.
            debug_assert!(
                old_key.is_spatial() == new_key.is_spatial() || old_key.is_empty(),
                "reset reclassified live item {}", id
            );

            // Update the item's container
            if new_key.is_spatial() {
                if !old_key.is_empty() && !old_key.is_spatial() {
                    // Contract violation in release builds: recover by
                    // routing through the update-style transition
                    self.nonspatial_items.remove(&id);
                }
                let bound = item.bound();
                let new_cell = self.spatial_tree.reset_item(old_cell, old_key, &bound, id, new_key);
                item.set_cell(new_cell);
            } else {
                if old_key.is_spatial() && old_cell.is_valid() {
                    self.spatial_tree.remove_item(old_cell, old_key, id);
                    item.clear_cell();
                }
                self.nonspatial_items.insert(id);
            }
        }
    }

    fn update_items(&mut self, updates: Vec<(ItemId, UpdateFn)>) {
        for (id, functor) in updates {
            if id == INVALID_ITEM_ID {
                continue;
            }

            // Access the true item
            let item = &mut self.table[id as usize];
            let old_key = item.key();
            let old_cell = item.cell();

            // Update the item; key and bound change through the payload
            item.update(functor);
            let new_key = item.key();

            // Update the item's container
            if old_key.is_spatial() == new_key.is_spatial() {
                if new_key.is_spatial() {
                    let bound = item.bound();
                    let new_cell =
                        self.spatial_tree.reset_item(old_cell, old_key, &bound, id, new_key);
                    item.set_cell(new_cell);
                }
            } else if new_key.is_spatial() {
                self.nonspatial_items.remove(&id);

                let bound = item.bound();
                let new_cell =
                    self.spatial_tree.reset_item(old_cell, old_key, &bound, id, new_key);
                item.set_cell(new_cell);
            } else {
                self.spatial_tree.remove_item(old_cell, old_key, id);
                item.clear_cell();

                self.nonspatial_items.insert(id);
            }
        }
    }

    fn remove_items(&mut self, removals: Vec<ItemId>) {
        for id in removals {
            // Access the true item
            let item = &mut self.table[id as usize];
            let old_key = item.key();
            let old_cell = item.cell();

            // Evict from its container; both paths tolerate an item that is
            // already gone, so removing a killed item stays a no-op
            if old_key.is_spatial() {
                self.spatial_tree.remove_item(old_cell, old_key, id);
            } else {
                self.nonspatial_items.remove(&id);
            }

            // Kill it; the slot and the ID are never reclaimed
            item.kill();
        }
    }
}

// ===== SCENE =====

/// The scene store: item table, ID allocator, spatial containers, and
/// transaction queue, owned as one explicit unit by the rendering
/// subsystem.
pub struct Scene {
    /// Item table and containers, shared with readers
    items: RwLock<SceneItems>,
    /// Next ID to hand out; 0 stays reserved
    id_allocator: AtomicU32,
    /// Published count of IDs guaranteed to have backing table slots
    allocated_count: AtomicU32,
    /// Pending transactions from producers
    transaction_queue: TransactionQueue,
}

impl Scene {
    /// Create a scene whose spatial tree covers the cube at `origin` with
    /// edge length `size`.
    ///
    /// # Errors
    ///
    /// Propagates the octree's construction errors (invalid extent).
    pub fn new(origin: Vec3, size: f32) -> Result<Scene> {
        let tree = OctreeSpatialTree::new(origin, size)?;
        Ok(Scene::with_spatial_index(Box::new(tree)))
    }

    /// Create a scene over a caller-supplied spatial index implementation.
    pub fn with_spatial_index(spatial_tree: Box<dyn SpatialIndex>) -> Scene {
        Scene {
            items: RwLock::new(SceneItems::new(spatial_tree)),
            id_allocator: AtomicU32::new(FIRST_ITEM_ID),
            allocated_count: AtomicU32::new(FIRST_ITEM_ID),
            transaction_queue: TransactionQueue::new(),
        }
    }

    /// Hand out the next item ID.
    ///
    /// Lock-free; any thread, any time, including while an apply cycle is
    /// in progress. The returned ID is valid for immediate use in a
    /// Transaction; its table slot materializes on the next apply cycle.
    pub fn allocate_id(&self) -> ItemId {
        // Increment and return the previous value
        self.id_allocator.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether `id` is a valid ID with a published backing slot.
    ///
    /// Checks against the published high-water mark, not the raw allocator:
    /// an ID can be allocated by a producer before the scene has table
    /// capacity for it.
    pub fn is_allocated_id(&self, id: ItemId) -> bool {
        id != INVALID_ITEM_ID && id < self.allocated_count.load(Ordering::Acquire)
    }

    /// Queue a transaction for the next apply cycle. Any thread.
    pub fn enqueue_transaction(&self, transaction: Transaction) {
        self.transaction_queue.enqueue(transaction);
    }

    /// Number of transactions waiting for the next apply cycle
    pub fn pending_transaction_count(&self) -> usize {
        self.transaction_queue.len()
    }

    /// Drain the queue and apply the consolidated batch.
    ///
    /// Must be driven by exactly one owning thread (typically once per
    /// frame) and is not reentrant. Producers keep allocating and
    /// enqueueing while this runs; their work lands in the next cycle.
    pub fn process_transaction_queue(&self) {
        let consolidated = self.transaction_queue.drain_and_merge();

        let mut items = self.items.write().unwrap();

        // Check the last ID the allocator handed out and make sure the
        // table can capture anything coming from the transaction
        let max_id = self.id_allocator.load(Ordering::Acquire);
        items.grow_table(max_id);

        if !consolidated.is_empty() {
            crate::scene_debug!(
                "nebula::Scene",
                "applying {} resets, {} updates, {} removals",
                consolidated.reset_count(),
                consolidated.update_count(),
                consolidated.removal_count()
            );
        }

        let (resets, updates, removals) = consolidated.into_parts();

        // Resets and potential NEW items
        items.reset_items(resets);

        // Publish the high-water mark AFTER the resets went through
        self.allocated_count.store(max_id, Ordering::Release);

        // Updates
        items.update_items(updates);

        // Removals
        items.remove_items(removals);

        // Restate the high-water mark AFTER the removals went through
        self.allocated_count.store(max_id, Ordering::Release);
    }

    /// Shared-mode access to the item state for readers (render passes).
    ///
    /// The apply cycle takes the same lock exclusively, so a held read
    /// guard delays the next `process_transaction_queue` and vice versa.
    pub fn items(&self) -> RwLockReadGuard<'_, SceneItems> {
        self.items.read().unwrap()
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        crate::scene_debug!(
            "nebula::Scene",
            "scene dropped, {} ids allocated",
            self.id_allocator.load(Ordering::Relaxed) - FIRST_ITEM_ID
        );
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
