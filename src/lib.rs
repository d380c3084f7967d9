/*!
# Nebula Render Scene

Concurrent scene store for the Nebula renderer.

Producer threads allocate item IDs and record Transactions; the owning
render thread drains the queue and applies every pending batch in one
ordered, lock-bounded pass per frame. Spatial items are filed in an octree
behind an opaque cell-handle contract; everything else sits in a flat
registry.

## Architecture

- **Scene**: dense ID-indexed item table, atomic ID allocator, published
  high-water mark, transaction queue
- **Transaction / TransactionQueue**: recorded mutations, multi-producer
  single-consumer FIFO
- **SpatialIndex / OctreeSpatialTree**: cell-management contract and its
  static octree implementation
- **ItemPayload**: opaque renderable capability (key and bound derivation)

The store never interprets payloads and issues no draw calls; render
passes read the item table through `Scene::items`.
*/

// Internal modules
mod error;
pub mod log;
pub mod scene;

// Error types
pub use error::{Error, Result};

// Scene store types
pub use scene::{
    AABB, CellId, INVALID_ITEM_ID, Item, ItemId, ItemKey, ItemPayload,
    OctreeSpatialTree, PayloadBox, Scene, SceneItems, SpatialIndex,
    Transaction, TransactionQueue, UpdateFn,
};

// Re-export math library at crate root
pub use glam;
