//! Positions and durable references into the bridged tree.
//!
//! A [`ModelIndex`] is the framework-side address of one cell: row, column,
//! and the cached node it was resolved against. Indices are cheap `Copy`
//! values meant to be used immediately — after a structural mutation a
//! previously obtained index may no longer resolve.
//!
//! A [`PersistentIndex`] is the durable counterpart: the bridge rewrites it
//! in place when rows or columns are inserted, removed, or re-sorted, and
//! nulls it when the position it pointed at is destroyed.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::cache::NodeKey;
use super::provider::ItemHandle;

/// Represents a position within the bridged model.
///
/// Each index contains the row and column within its parent and the arena
/// key of the cached node backing the position. The parent chain lives in
/// the cache; resolve it with
/// [`ModelBridge::parent`](crate::model::ModelBridge::parent).
///
/// # Index Validity
///
/// Indices should be used immediately and not stored long-term: after model
/// modifications a previously obtained index may become invalid (it then
/// resolves to empty data and no children rather than aliasing another
/// position). For a reference that survives mutations, use
/// [`PersistentIndex`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelIndex {
    row: usize,
    column: usize,
    node: Option<NodeKey>,
}

impl Default for ModelIndex {
    fn default() -> Self {
        Self::invalid()
    }
}

impl ModelIndex {
    /// Creates an invalid (null) model index.
    ///
    /// An invalid index is used to represent:
    /// - The root of the model (as a parent reference)
    /// - A non-existent or out-of-bounds item
    /// - A position whose node was destroyed
    #[inline]
    pub const fn invalid() -> Self {
        Self {
            row: 0,
            column: 0,
            node: None,
        }
    }

    pub(crate) fn new(row: usize, column: usize, node: NodeKey) -> Self {
        Self {
            row,
            column,
            node: Some(node),
        }
    }

    /// Returns `true` if this is a valid index.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.node.is_some()
    }

    /// Returns the row of this index within its parent.
    ///
    /// Returns 0 for invalid indices.
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Returns the column of this index within its parent.
    ///
    /// Returns 0 for invalid indices.
    #[inline]
    pub fn column(&self) -> usize {
        self.column
    }

    pub(crate) fn node(&self) -> Option<NodeKey> {
        self.node
    }
}

impl std::fmt::Debug for ModelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            f.debug_struct("ModelIndex")
                .field("row", &self.row)
                .field("column", &self.column)
                .finish()
        } else {
            write!(f, "ModelIndex(invalid)")
        }
    }
}

/// Shared slot behind a [`PersistentIndex`]: the current position plus the
/// external identity captured when the reference was created (identity is
/// what lets a reference follow its item through a sort).
pub(crate) struct PersistentSlot {
    pub(crate) index: ModelIndex,
    pub(crate) handle: Option<ItemHandle>,
}

/// A durable reference to a model position.
///
/// Created via
/// [`ModelBridge::persistent_index`](crate::model::ModelBridge::persistent_index).
/// The view holds it for as long as it needs the position (selection,
/// editing state, scroll anchor); the bridge rewrites the stored
/// coordinates during structural mutations and nulls them when the
/// position is destroyed. A nulled reference is a normal outcome, not an
/// error: [`index`](Self::index) simply returns an invalid [`ModelIndex`].
#[derive(Clone)]
pub struct PersistentIndex {
    slot: Arc<RwLock<PersistentSlot>>,
}

impl PersistentIndex {
    pub(crate) fn new(index: ModelIndex, handle: Option<ItemHandle>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(PersistentSlot { index, handle })),
        }
    }

    /// An unregistered, permanently invalid reference.
    pub fn invalid() -> Self {
        Self::new(ModelIndex::invalid(), None)
    }

    /// The position this reference currently points at.
    pub fn index(&self) -> ModelIndex {
        self.slot.read().index
    }

    /// Returns `true` while the referenced position still exists.
    pub fn is_valid(&self) -> bool {
        self.slot.read().index.is_valid()
    }

    /// The external identity captured for this reference, if any.
    pub fn handle(&self) -> Option<ItemHandle> {
        self.slot.read().handle
    }

    pub(crate) fn downgrade(&self) -> Weak<RwLock<PersistentSlot>> {
        Arc::downgrade(&self.slot)
    }
}

impl std::fmt::Debug for PersistentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.read();
        f.debug_struct("PersistentIndex")
            .field("index", &slot.index)
            .field("handle", &slot.handle)
            .finish()
    }
}
