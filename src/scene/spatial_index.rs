/// Spatial indexing contract for scene items.
///
/// A SpatialIndex files items by (key, bound) and hands back an opaque
/// CellId per placement. The Scene stores only the handle; the index owns
/// the mapping from spatial location to item ID.
///
/// Ownership: the Scene owns its SpatialIndex and drives it exclusively
/// from the apply cycle, under the items lock.

use super::item::{AABB, ItemId, ItemKey};

// ===== CELL ID =====

/// Opaque handle identifying an item's current cell within a spatial index.
///
/// A handle is only meaningful to the index that minted it. The INVALID
/// sentinel marks an item that is not filed anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(u32);

impl CellId {
    /// Sentinel for "not filed in any cell".
    pub const INVALID: CellId = CellId(u32::MAX);

    /// Wrap a raw cell value minted by a SpatialIndex implementation.
    pub fn from_raw(raw: u32) -> CellId {
        CellId(raw)
    }

    /// The raw cell value, for the index that minted this handle.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Whether this handle names a cell.
    pub fn is_valid(self) -> bool {
        self != CellId::INVALID
    }
}

impl Default for CellId {
    fn default() -> Self {
        CellId::INVALID
    }
}

// ===== SPATIAL INDEX TRAIT =====

/// Cell-management contract consumed by the Scene's apply cycle.
///
/// Implementations must tolerate hints that no longer match their internal
/// state (e.g. an INVALID old cell on a relocation) without panicking.
pub trait SpatialIndex: Send + Sync {
    /// Insert or relocate an item, returning its new cell.
    ///
    /// `old_cell` and `old_key` are eviction hints from the item's previous
    /// placement; an INVALID `old_cell` means a fresh insert.
    fn reset_item(
        &mut self,
        old_cell: CellId,
        old_key: ItemKey,
        bound: &AABB,
        id: ItemId,
        new_key: ItemKey,
    ) -> CellId;

    /// Evict an entry previously filed under `cell`.
    ///
    /// Evicting an item the index no longer tracks is a no-op.
    fn remove_item(&mut self, cell: CellId, key: ItemKey, id: ItemId);

    /// Append every filed item whose bound intersects `bound` to `results`.
    fn query_bound(&self, bound: &AABB, results: &mut Vec<ItemId>);

    /// Drop every entry from the index.
    fn clear(&mut self);
}
