/// Item types for the scene store.
///
/// An Item is one slot in the Scene's dense table: a classification key,
/// an opaque renderable payload, and the cell where the spatial tree
/// currently files it. Slots are never reclaimed; a removed item stays in
/// the table as an inert husk and its ID is never reused.

use std::any::Any;
use bitflags::bitflags;
use glam::Vec3;
use super::spatial_index::CellId;

// ===== ITEM ID =====

/// Identifier of an Item within a Scene.
///
/// IDs are handed out monotonically by `Scene::allocate_id` and index the
/// item table directly. They are never recycled within a scene's lifetime.
pub type ItemId = u32;

/// Reserved identifier that never names a live item.
pub const INVALID_ITEM_ID: ItemId = 0;

// ===== AABB =====

/// Axis-Aligned Bounding Box in world space
///
/// The bound a payload reports for spatial placement. Items whose key is
/// not spatial ignore it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner (x, y, z)
    pub min: Vec3,
    /// Maximum corner (x, y, z)
    pub max: Vec3,
}

impl AABB {
    /// Degenerate bound at the origin, reported by inert items.
    pub const ZERO: AABB = AABB { min: Vec3::ZERO, max: Vec3::ZERO };

    /// Create an AABB from its two corners.
    pub fn new(min: Vec3, max: Vec3) -> AABB {
        AABB { min, max }
    }

    /// Cubic AABB with `origin` as minimum corner and `size` edge length.
    pub fn from_origin_size(origin: Vec3, size: f32) -> AABB {
        AABB { min: origin, max: origin + Vec3::splat(size) }
    }

    /// Compute the center point of this AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Test if this AABB fully contains another AABB.
    ///
    /// Returns `true` if `other` is entirely within `self`.
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x && self.max.x >= other.max.x
        && self.min.y <= other.min.y && self.max.y >= other.max.y
        && self.min.z <= other.min.z && self.max.z >= other.max.z
    }

    /// Test if this AABB contains a point (boundary inclusive).
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.x <= point.x && self.max.x >= point.x
        && self.min.y <= point.y && self.max.y >= point.y
        && self.min.z <= point.z && self.max.z >= point.z
    }

    /// Test if this AABB intersects (overlaps) another AABB.
    ///
    /// Returns `true` if the two AABBs overlap or touch.
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x
        && self.min.y <= other.max.y && self.max.y >= other.min.y
        && self.min.z <= other.max.z && self.max.z >= other.min.z
    }
}

// ===== ITEM KEY =====

bitflags! {
    /// Classification key of an Item.
    ///
    /// Recomputed from the payload on every reset and update. SPATIAL
    /// decides which container tracks the item; a cleared (empty) key marks
    /// a slot that has never held a payload or has been killed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemKey: u32 {
        /// Tracked by the spatial tree (has a meaningful world bound)
        const SPATIAL = 1 << 0;
        /// Small extent; sinks to the deepest cell by bound center
        const SMALL = 1 << 1;
        /// Drawn by render passes
        const VISIBLE = 1 << 2;
        /// Bound changes frequently; re-filed on every update
        const DYNAMIC = 1 << 3;
        /// Casts shadows
        const SHADOW_CASTER = 1 << 4;
    }
}

impl ItemKey {
    /// Whether the spatial tree tracks items with this key.
    pub fn is_spatial(self) -> bool {
        self.contains(ItemKey::SPATIAL)
    }

    /// Whether the spatial tree should place this item by its bound center.
    pub fn is_small(self) -> bool {
        self.contains(ItemKey::SMALL)
    }
}

// ===== PAYLOAD =====

/// Opaque renderable data carried by an Item.
///
/// The scene never interprets a payload: it derives the classification key
/// and world bound from it, and hands it back to update functors. How a
/// payload renders itself is the concern of the render passes, not of the
/// store.
pub trait ItemPayload: Send + Sync {
    /// Classification key deciding which container tracks the item.
    fn key(&self) -> ItemKey;

    /// World-space bound. Only meaningful when the key is spatial.
    fn bound(&self) -> AABB;

    /// Downcast hook so update functors can reach the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Owned payload handed to the scene through a reset.
pub type PayloadBox = Box<dyn ItemPayload>;

/// Deferred mutation applied to an item's payload during an apply cycle.
///
/// The functor mutates the payload; key and bound changes flow through it.
pub type UpdateFn = Box<dyn FnOnce(&mut dyn ItemPayload) + Send>;

// ===== ITEM =====

/// One slot of the scene's item table.
///
/// A fresh slot is inert (no payload, empty key, no cell) and belongs to no
/// container. It becomes live when a reset supplies a payload, and reverts
/// to inert when killed by a removal.
#[derive(Default)]
pub struct Item {
    /// Classification key derived from the payload
    key: ItemKey,
    /// Opaque renderable data (None while inert)
    payload: Option<PayloadBox>,
    /// Current cell in the spatial tree (INVALID when not spatially indexed)
    cell: CellId,
}

impl Item {
    /// Get the classification key
    pub fn key(&self) -> ItemKey {
        self.key
    }

    /// Get the current spatial cell (INVALID when not spatially indexed)
    pub fn cell(&self) -> CellId {
        self.cell
    }

    /// Whether this slot holds a payload
    pub fn exists(&self) -> bool {
        self.payload.is_some()
    }

    /// World-space bound of the payload (ZERO for inert slots)
    pub fn bound(&self) -> AABB {
        self.payload.as_ref().map(|p| p.bound()).unwrap_or(AABB::ZERO)
    }

    /// Replace the payload and recompute the key from it.
    pub(crate) fn reset_payload(&mut self, payload: PayloadBox) {
        self.key = payload.key();
        self.payload = Some(payload);
    }

    /// Run an update functor against the payload and recompute the key.
    ///
    /// A stale update against an inert slot (killed earlier, or never reset)
    /// is dropped silently; a removed ID must not be resurrected.
    pub(crate) fn update(&mut self, functor: UpdateFn) {
        if let Some(payload) = self.payload.as_mut() {
            functor(payload.as_mut());
            self.key = payload.key();
        }
    }

    /// Store the cell handle returned by the spatial tree.
    pub(crate) fn set_cell(&mut self, cell: CellId) {
        self.cell = cell;
    }

    /// Drop the cell handle after eviction from the spatial tree.
    pub(crate) fn clear_cell(&mut self) {
        self.cell = CellId::INVALID;
    }

    /// Release the payload and revert the slot to inert.
    ///
    /// The slot itself stays in the table; the ID is never reused.
    pub(crate) fn kill(&mut self) {
        self.payload = None;
        self.key = ItemKey::empty();
        self.cell = CellId::INVALID;
    }
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
