//! Scene store module
//!
//! Provides the concurrent item store: item table and payloads,
//! transactions and their queue, and the spatial indexing contract with
//! its octree implementation.

mod item;
mod octree_spatial_tree;
mod scene;
mod spatial_index;
mod transaction;

pub use item::{
    AABB, INVALID_ITEM_ID, Item, ItemId, ItemKey, ItemPayload, PayloadBox, UpdateFn,
};
pub use octree_spatial_tree::{DEFAULT_DEPTH, MAX_DEPTH, OctreeSpatialTree};
pub use scene::{Scene, SceneItems};
pub use spatial_index::{CellId, SpatialIndex};
pub use transaction::{Transaction, TransactionQueue};
