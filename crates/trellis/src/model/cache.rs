//! Node cache and structural mutation.
//!
//! The cache holds everything the bridge has learned about the external
//! dataset: one [`Node`] per visited tree position, stored in a slotmap
//! arena. Counts, identities, and cell payloads are fetched from the
//! [`DataProvider`] on first access and kept until explicitly invalidated,
//! so the provider — which may be expensive or side-effecting to query — is
//! consulted at most once per cached fact.
//!
//! Structural mutation (insert/remove/change of rows or columns at a
//! parent) only ever renumbers or destroys that parent's direct children
//! along the mutated axis; unrelated subtrees are never touched, keeping
//! every operation O(children of parent).

use std::collections::HashMap;
use std::fmt;

use slotmap::{SlotMap, new_key_type};

use crate::error::{ModelError, Result};
use crate::model::provider::{DataProvider, ItemHandle};
use crate::model::value::CellValue;

new_key_type! {
    /// Arena key for one cached tree position.
    ///
    /// Keys are versioned: after a node is destroyed its key never resolves
    /// again, which is how stale indices and persistent references are
    /// detected.
    pub(crate) struct NodeKey;
}

/// Axis addressed by a structural operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Rows under a parent.
    Row,
    /// Columns under a parent.
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "rows"),
            Axis::Column => write!(f, "columns"),
        }
    }
}

/// Cache state of a lazily fetched field.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) enum Fetch<T> {
    /// Never fetched (or dropped by invalidation).
    #[default]
    Pending,
    /// Fetched; stays valid until explicitly invalidated.
    Ready(T),
}

impl<T> Fetch<T> {
    pub(crate) fn ready(&self) -> Option<&T> {
        match self {
            Fetch::Ready(value) => Some(value),
            Fetch::Pending => None,
        }
    }
}

/// One cached tree position: coordinates, parent link, lazily fetched
/// counts, identity, payload, and the sparse child table.
pub(crate) struct Node {
    pub(crate) parent: Option<NodeKey>,
    pub(crate) row: usize,
    pub(crate) column: usize,
    /// Child row count; `None` until fetched.
    pub(crate) row_count: Option<usize>,
    /// Child column count; `None` until fetched.
    pub(crate) column_count: Option<usize>,
    /// Row-major child table, sized to the cached counts. A slot stays
    /// `None` until the coordinate is first materialized.
    children: Vec<Vec<Option<NodeKey>>>,
    /// External identity. `Ready(None)` means the provider has no identity
    /// for this position (or the fetch failed); the root is preset to
    /// `Ready(None)`, the provider's "no parent" sentinel.
    pub(crate) handle: Fetch<Option<ItemHandle>>,
    /// Cell payload. `Ready(CellValue::None)` is a valid empty cell.
    value: Fetch<CellValue>,
}

impl Node {
    fn new(parent: NodeKey, row: usize, column: usize) -> Self {
        Self {
            parent: Some(parent),
            row,
            column,
            row_count: None,
            column_count: None,
            children: Vec::new(),
            handle: Fetch::Pending,
            value: Fetch::Pending,
        }
    }

    pub(crate) fn child_at(&self, row: usize, column: usize) -> Option<NodeKey> {
        self.children
            .get(row)
            .and_then(|cells| cells.get(column))
            .copied()
            .flatten()
    }

    pub(crate) fn child_keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.children
            .iter()
            .flat_map(|cells| cells.iter().filter_map(|slot| *slot))
    }
}

/// The node arena plus the bridge-scoped `handle -> node` ownership table.
pub(crate) struct TreeCache {
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
    handles: HashMap<ItemHandle, NodeKey>,
}

impl TreeCache {
    pub(crate) fn new() -> Self {
        let mut nodes: SlotMap<NodeKey, Node> = SlotMap::with_key();
        let root = nodes.insert(Node {
            parent: None,
            row: 0,
            column: 0,
            row_count: None,
            column_count: None,
            children: Vec::new(),
            handle: Fetch::Ready(None),
            value: Fetch::Ready(CellValue::None),
        });
        Self {
            nodes,
            root,
            handles: HashMap::new(),
        }
    }

    pub(crate) fn root(&self) -> NodeKey {
        self.root
    }

    pub(crate) fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub(crate) fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub(crate) fn node_for_handle(&self, handle: ItemHandle) -> Option<NodeKey> {
        self.handles.get(&handle).copied()
    }

    pub(crate) fn cached_count(&self, key: NodeKey, axis: Axis) -> Option<usize> {
        self.nodes.get(key).and_then(|node| match axis {
            Axis::Row => node.row_count,
            Axis::Column => node.column_count,
        })
    }

    /// Discard everything and start over with a fresh root.
    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }

    // ---------------------------------------------------------------------
    // Lazy queries
    // ---------------------------------------------------------------------

    /// The external identity of a node, deriving it on first access.
    ///
    /// The root's identity is the provider's "no parent" sentinel by
    /// definition. A non-root node under an identity-less parent cannot be
    /// addressed at the provider, so it gets the sentinel without a call.
    /// A failed derivation caches the sentinel too: the node then has no
    /// valid external identity until invalidated.
    pub(crate) fn handle(
        &mut self,
        key: NodeKey,
        provider: &dyn DataProvider,
    ) -> Option<ItemHandle> {
        let (row, column, parent) = match self.nodes.get(key) {
            Some(node) => {
                if let Fetch::Ready(handle) = node.handle {
                    return handle;
                }
                (node.row, node.column, node.parent)
            }
            None => return None,
        };
        // Only the root lacks a parent, and its handle is preset above.
        let Some(parent) = parent else { return None };

        let parent_handle = self.handle(parent, provider);
        let derived = if parent_handle.is_none() && parent != self.root {
            None
        } else {
            match provider.index(row, column, parent_handle) {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(
                        target: "trellis::model::cache",
                        "provider index({row}, {column}) failed: {err}; treating item as identity-less"
                    );
                    None
                }
            }
        };

        self.nodes[key].handle = Fetch::Ready(derived);
        if let Some(handle) = derived {
            self.handles.insert(handle, key);
        }
        derived
    }

    /// Cached child row count, fetching and sizing the child table on first
    /// access. Provider failures clamp to 0.
    pub(crate) fn row_count(&mut self, key: NodeKey, provider: &dyn DataProvider) -> usize {
        match self.nodes.get(key) {
            Some(node) => {
                if let Some(count) = node.row_count {
                    return count;
                }
            }
            None => return 0,
        }
        let handle = self.handle(key, provider);
        let count = if handle.is_some() || key == self.root {
            match provider.row_count(handle) {
                Ok(count) => count,
                Err(err) => {
                    tracing::warn!(
                        target: "trellis::model::cache",
                        "provider row_count failed: {err}; reporting 0 rows"
                    );
                    0
                }
            }
        } else {
            // No external identity, nothing to enumerate.
            0
        };
        let node = &mut self.nodes[key];
        node.row_count = Some(count);
        let columns = node.column_count.unwrap_or(0);
        node.children.resize_with(count, || vec![None; columns]);
        count
    }

    /// Cached column count (table-wide at the provider, cached per node so
    /// column mutations can renumber locally).
    pub(crate) fn column_count(&mut self, key: NodeKey, provider: &dyn DataProvider) -> usize {
        match self.nodes.get(key) {
            Some(node) => {
                if let Some(count) = node.column_count {
                    return count;
                }
            }
            None => return 0,
        }
        let count = match provider.column_count() {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(
                    target: "trellis::model::cache",
                    "provider column_count failed: {err}; reporting 0 columns"
                );
                0
            }
        };
        let node = &mut self.nodes[key];
        node.column_count = Some(count);
        for cells in &mut node.children {
            cells.resize(count, None);
        }
        count
    }

    /// The child node at `(row, column)`, materializing it on first access.
    /// Out-of-bounds coordinates resolve to `None`.
    pub(crate) fn child(
        &mut self,
        parent: NodeKey,
        row: usize,
        column: usize,
        provider: &dyn DataProvider,
    ) -> Option<NodeKey> {
        let rows = self.row_count(parent, provider);
        let columns = self.column_count(parent, provider);
        if row >= rows || column >= columns {
            return None;
        }
        if let Some(existing) = self.nodes[parent].children[row][column] {
            return Some(existing);
        }
        let key = self.nodes.insert(Node::new(parent, row, column));
        self.nodes[parent].children[row][column] = Some(key);
        Some(key)
    }

    /// Cached cell payload, fetching on first access. An identity-less node
    /// and a failed fetch both yield `CellValue::None`.
    pub(crate) fn value(&mut self, key: NodeKey, provider: &dyn DataProvider) -> CellValue {
        match self.nodes.get(key) {
            Some(node) => {
                if let Fetch::Ready(value) = &node.value {
                    return value.clone();
                }
            }
            None => return CellValue::None,
        }
        let fetched = match self.handle(key, provider) {
            Some(handle) => match provider.data(handle) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(
                        target: "trellis::model::cache",
                        "provider data failed: {err}; caching empty cell"
                    );
                    CellValue::None
                }
            },
            None => CellValue::None,
        };
        self.nodes[key].value = Fetch::Ready(fetched.clone());
        fetched
    }

    // ---------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------

    /// Drop a node's fetched identity and payload, keeping counts and the
    /// subtree. Used when a node's coordinate changes: the cached facts were
    /// keyed to the old coordinate, the subtree moves with it as a unit.
    pub(crate) fn invalidate_partial(&mut self, key: NodeKey) {
        if key == self.root {
            // The root's identity is the sentinel by definition; only its
            // (empty) payload slot is refreshed.
            if let Some(node) = self.nodes.get_mut(key) {
                node.value = Fetch::Ready(CellValue::None);
            }
            return;
        }
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let old = match node.handle {
            Fetch::Ready(Some(handle)) => Some(handle),
            _ => None,
        };
        node.handle = Fetch::Pending;
        node.value = Fetch::Pending;
        if let Some(handle) = old {
            self.handles.remove(&handle);
        }
    }

    /// Drop everything known about a node: identity, payload, counts, and
    /// all descendant nodes. The node itself survives at its coordinate.
    pub(crate) fn invalidate_full(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.get_mut(key) else {
            return;
        };
        let children = std::mem::take(&mut node.children);
        node.row_count = None;
        node.column_count = None;
        for cells in children {
            for slot in cells.into_iter().flatten() {
                self.remove_subtree(slot);
            }
        }
        self.invalidate_partial(key);
    }

    /// Recursively clear fetched identity/payload on a node and all
    /// descendants without discarding the tree shape. Used when content,
    /// not structure, changed globally (post-sort).
    pub(crate) fn reset_data(&mut self, key: NodeKey) {
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get_mut(current) else {
                continue;
            };
            let old = match node.handle {
                Fetch::Ready(Some(handle)) => Some(handle),
                _ => None,
            };
            if current == self.root {
                node.value = Fetch::Ready(CellValue::None);
            } else {
                node.handle = Fetch::Pending;
                node.value = Fetch::Pending;
            }
            stack.extend(node.child_keys());
            if current != self.root {
                if let Some(handle) = old {
                    self.handles.remove(&handle);
                }
            }
        }
    }

    fn remove_subtree(&mut self, key: NodeKey) {
        let Some(node) = self.nodes.remove(key) else {
            return;
        };
        if let Fetch::Ready(Some(handle)) = node.handle {
            self.handles.remove(&handle);
        }
        for cells in node.children {
            for slot in cells.into_iter().flatten() {
                self.remove_subtree(slot);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Structural mutation
    // ---------------------------------------------------------------------

    /// Insert `count` rows/columns at `position` under `parent`.
    ///
    /// Children at or after `position` are renumbered by `+count` and
    /// partially invalidated. A parent whose count was never fetched has
    /// nothing cached to renumber; the call is a no-op on the cache.
    pub(crate) fn insert(
        &mut self,
        parent: NodeKey,
        axis: Axis,
        position: usize,
        count: usize,
    ) -> Result<()> {
        let Some(len) = self.cached_count(parent, axis) else {
            return Ok(());
        };
        if position > len {
            return Err(ModelError::OutOfRange {
                axis,
                position,
                count,
                len,
            });
        }
        let moved = match axis {
            Axis::Row => {
                let node = &mut self.nodes[parent];
                let columns = node.column_count.unwrap_or(0);
                node.row_count = Some(len + count);
                let empty: Vec<Vec<Option<NodeKey>>> =
                    (0..count).map(|_| vec![None; columns]).collect();
                node.children.splice(position..position, empty);
                Self::rows_from(node, position + count)
            }
            Axis::Column => {
                let node = &mut self.nodes[parent];
                node.column_count = Some(len + count);
                for cells in &mut node.children {
                    cells.splice(position..position, (0..count).map(|_| None));
                }
                Self::columns_from(node, position + count)
            }
        };
        self.renumber(axis, moved);
        Ok(())
    }

    /// Remove `count` rows/columns at `position` under `parent`, destroying
    /// the removed subtrees. Children behind the window are renumbered by
    /// `-count` and partially invalidated.
    pub(crate) fn remove(
        &mut self,
        parent: NodeKey,
        axis: Axis,
        position: usize,
        count: usize,
    ) -> Result<()> {
        let Some(len) = self.cached_count(parent, axis) else {
            return Ok(());
        };
        if position.saturating_add(count) > len {
            return Err(ModelError::OutOfRange {
                axis,
                position,
                count,
                len,
            });
        }
        let (removed, moved) = match axis {
            Axis::Row => {
                let node = &mut self.nodes[parent];
                node.row_count = Some(len - count);
                let removed: Vec<NodeKey> = node
                    .children
                    .drain(position..position + count)
                    .flat_map(|cells| cells.into_iter().flatten())
                    .collect();
                (removed, Self::rows_from(node, position))
            }
            Axis::Column => {
                let node = &mut self.nodes[parent];
                node.column_count = Some(len - count);
                let mut removed = Vec::new();
                for cells in &mut node.children {
                    removed.extend(cells.drain(position..position + count).flatten());
                }
                (removed, Self::columns_from(node, position))
            }
        };
        for key in removed {
            self.remove_subtree(key);
        }
        self.renumber(axis, moved);
        Ok(())
    }

    /// Mark `count` children starting at `position` as needing a full
    /// re-fetch. The window is clamped to the cached extent; counts and
    /// shape are unchanged. Returns the clamped `(position, count)` window
    /// (a zero count means nothing was addressed).
    pub(crate) fn change(
        &mut self,
        parent: NodeKey,
        axis: Axis,
        position: usize,
        count: usize,
    ) -> (usize, usize) {
        let Some(len) = self.cached_count(parent, axis) else {
            // Nothing materialized; the requested window stands as the
            // notification range.
            return (position, count);
        };
        let end = (position + count).min(len);
        if position >= end {
            return (position, 0);
        }
        let targets: Vec<NodeKey> = {
            let Some(node) = self.nodes.get(parent) else {
                return (position, 0);
            };
            match axis {
                Axis::Row => node
                    .children
                    .iter()
                    .skip(position)
                    .take(end - position)
                    .flat_map(|cells| cells.iter().filter_map(|slot| *slot))
                    .collect(),
                Axis::Column => node
                    .children
                    .iter()
                    .flat_map(|cells| {
                        cells
                            .iter()
                            .skip(position)
                            .take(end - position)
                            .filter_map(|slot| *slot)
                    })
                    .collect(),
            }
        };
        for key in targets {
            self.invalidate_full(key);
        }
        (position, end - position)
    }

    /// Fully invalidate the single addressed child, if materialized.
    pub(crate) fn change_cell(&mut self, parent: NodeKey, row: usize, column: usize) {
        let target = self.nodes.get(parent).and_then(|n| n.child_at(row, column));
        if let Some(key) = target {
            self.invalidate_full(key);
        }
    }

    fn rows_from(node: &Node, start: usize) -> Vec<(NodeKey, usize)> {
        node.children
            .iter()
            .enumerate()
            .skip(start)
            .flat_map(|(row, cells)| cells.iter().filter_map(move |slot| slot.map(|k| (k, row))))
            .collect()
    }

    fn columns_from(node: &Node, start: usize) -> Vec<(NodeKey, usize)> {
        node.children
            .iter()
            .flat_map(|cells| {
                cells
                    .iter()
                    .enumerate()
                    .skip(start)
                    .filter_map(|(column, slot)| slot.map(|k| (k, column)))
            })
            .collect()
    }

    fn renumber(&mut self, axis: Axis, moved: Vec<(NodeKey, usize)>) {
        for (key, coordinate) in moved {
            if let Some(node) = self.nodes.get_mut(key) {
                match axis {
                    Axis::Row => node.row = coordinate,
                    Axis::Column => node.column = coordinate,
                }
            }
            self.invalidate_partial(key);
        }
    }
}
