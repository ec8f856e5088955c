//! Persistent-reference capture and remapping.
//!
//! The view holds [`PersistentIndex`](super::index::PersistentIndex) values
//! across structural mutations. Before a mutation runs, every registered
//! reference is classified against the mutation window; references inside
//! the affected subtrees are nulled so nothing can observe a stale
//! coordinate mid-mutation, and re-derived afterwards:
//!
//! - shifts (insert/remove) rewrite from the surviving node's new
//!   coordinates; a destroyed node leaves the reference invalid,
//! - bulk changes replay the captured coordinate path, lazily
//!   re-materializing the re-fetched subtree,
//! - sorts replay the captured identity path, landing wherever the item's
//!   external identity now lives.
//!
//! Classification walks ancestor chains over the node arena: a reference is
//! affected exactly when its chain crosses a direct child of the mutated
//! parent inside the window. This is the same set the original computed by
//! walking downward from the mutation epicenter, at O(depth) per reference
//! and without any provider traffic.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::cache::{Axis, NodeKey, TreeCache};
use super::index::{ModelIndex, PersistentSlot};
use super::provider::{DataProvider, ItemHandle};

/// The window of a structural operation: `[start, end)` along `axis` among
/// the direct children of `parent`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MutationWindow {
    pub(crate) parent: NodeKey,
    pub(crate) axis: Axis,
    pub(crate) start: usize,
    /// Exclusive end. Shift operations affect everything at or after
    /// `start`, expressed as `usize::MAX`.
    pub(crate) end: usize,
    /// Restricts the window to one coordinate along the other axis
    /// (single-cell change); `None` spans the whole cross axis.
    pub(crate) cross: Option<usize>,
}

impl MutationWindow {
    pub(crate) fn shift(parent: NodeKey, axis: Axis, start: usize) -> Self {
        Self {
            parent,
            axis,
            start,
            end: usize::MAX,
            cross: None,
        }
    }

    pub(crate) fn span(parent: NodeKey, axis: Axis, start: usize, count: usize) -> Self {
        Self {
            parent,
            axis,
            start,
            end: start.saturating_add(count),
            cross: None,
        }
    }

    pub(crate) fn cell(parent: NodeKey, row: usize, column: usize) -> Self {
        Self {
            parent,
            axis: Axis::Row,
            start: row,
            end: row + 1,
            cross: Some(column),
        }
    }
}

/// One step of a captured coordinate path, root → node.
#[derive(Debug, Clone, Copy)]
struct PathStep {
    row: usize,
    column: usize,
    /// The step's cached external identity at capture time, if fetched.
    handle: Option<ItemHandle>,
}

/// A reference captured (and nulled) ahead of a mutation, with everything
/// needed to re-derive it afterwards.
pub(crate) struct CapturedRef {
    slot: Arc<RwLock<PersistentSlot>>,
    key: NodeKey,
    path: Vec<PathStep>,
}

/// Registry of the persistent references handed out by one bridge.
///
/// Holds weak links only: a reference the view dropped is pruned at the
/// next capture, never remapped.
#[derive(Default)]
pub(crate) struct PersistentRegistry {
    slots: Vec<Weak<RwLock<PersistentSlot>>>,
}

impl PersistentRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, slot: Weak<RwLock<PersistentSlot>>) {
        self.slots.push(slot);
    }

    /// Upgrades live registrations, dropping dead ones.
    fn live(&mut self) -> Vec<Arc<RwLock<PersistentSlot>>> {
        let mut live = Vec::with_capacity(self.slots.len());
        self.slots.retain(|weak| match weak.upgrade() {
            Some(slot) => {
                live.push(slot);
                true
            }
            None => false,
        });
        live
    }

    /// Captures and nulls every reference inside the mutation window.
    pub(crate) fn capture_window(
        &mut self,
        cache: &TreeCache,
        window: MutationWindow,
    ) -> Vec<CapturedRef> {
        let mut captured = Vec::new();
        for slot in self.live() {
            let index = slot.read().index;
            let Some(key) = index.node() else { continue };
            if !in_window(cache, key, window) {
                continue;
            }
            let Some(path) = path_of(cache, key) else {
                continue;
            };
            slot.write().index = ModelIndex::invalid();
            captured.push(CapturedRef { slot, key, path });
        }
        captured
    }

    /// Captures and nulls every live reference (sort, reset).
    pub(crate) fn capture_all(&mut self, cache: &TreeCache) -> Vec<CapturedRef> {
        let mut captured = Vec::new();
        for slot in self.live() {
            let index = slot.read().index;
            let Some(key) = index.node() else { continue };
            let Some(path) = path_of(cache, key) else {
                continue;
            };
            slot.write().index = ModelIndex::invalid();
            captured.push(CapturedRef { slot, key, path });
        }
        captured
    }

    /// Nulls every live reference without capturing (reset: nothing
    /// survives by construction).
    pub(crate) fn invalidate_all(&mut self) {
        for slot in self.live() {
            let mut slot = slot.write();
            slot.index = ModelIndex::invalid();
            slot.handle = None;
        }
    }
}

/// Re-derives references after an insert/remove: surviving nodes carry
/// their post-shift coordinates, destroyed nodes leave the reference
/// invalid.
pub(crate) fn remap_shifted(cache: &TreeCache, captured: Vec<CapturedRef>) {
    for reference in captured {
        if let Some(node) = cache.node(reference.key) {
            reference.slot.write().index = ModelIndex::new(node.row, node.column, reference.key);
        } else {
            tracing::debug!(
                target: "trellis::model::persist",
                "persistent reference lost its node; staying invalid"
            );
        }
    }
}

/// Re-derives references after a bulk change: a surviving node keeps its
/// coordinates, a destroyed descendant is re-reached by replaying its
/// coordinate path through the re-fetched subtree.
pub(crate) fn remap_changed(
    cache: &mut TreeCache,
    provider: &dyn DataProvider,
    captured: Vec<CapturedRef>,
) {
    for reference in captured {
        if let Some(node) = cache.node(reference.key) {
            reference.slot.write().index = ModelIndex::new(node.row, node.column, reference.key);
            continue;
        }
        let mut parent = cache.root();
        let mut resolved = None;
        for step in &reference.path {
            match cache.child(parent, step.row, step.column, provider) {
                Some(key) => {
                    parent = key;
                    resolved = Some(key);
                }
                None => {
                    resolved = None;
                    break;
                }
            }
        }
        let mut slot = reference.slot.write();
        match resolved.and_then(|key| cache.node(key).map(|n| (key, n.row, n.column))) {
            Some((key, row, column)) => {
                slot.index = ModelIndex::new(row, column, key);
            }
            None => {
                slot.index = ModelIndex::invalid();
            }
        }
    }
}

/// Re-derives references after a sort by replaying the captured identity
/// path: at each level, the reference follows the row whose identity
/// matches, wherever the sort moved it. A step without a captured identity
/// cannot be followed and the reference stays invalid.
pub(crate) fn remap_sorted(
    cache: &mut TreeCache,
    provider: &dyn DataProvider,
    captured: Vec<CapturedRef>,
) {
    for reference in captured {
        let mut parent = cache.root();
        let mut resolved: Option<(NodeKey, usize, usize)> = None;
        for step in &reference.path {
            let Some(wanted) = step.handle else {
                resolved = None;
                break;
            };
            let rows = cache.row_count(parent, provider);
            let mut found = None;
            for row in 0..rows {
                let Some(key) = cache.child(parent, row, step.column, provider) else {
                    continue;
                };
                if cache.handle(key, provider) == Some(wanted) {
                    found = Some((key, row, step.column));
                    break;
                }
            }
            match found {
                Some(hit) => {
                    parent = hit.0;
                    resolved = Some(hit);
                }
                None => {
                    resolved = None;
                    break;
                }
            }
        }
        let mut slot = reference.slot.write();
        match resolved {
            Some((key, row, column)) => {
                slot.index = ModelIndex::new(row, column, key);
                slot.handle = reference.path.last().and_then(|step| step.handle);
            }
            None => {
                slot.index = ModelIndex::invalid();
            }
        }
    }
}

/// Whether `key`'s ancestor chain crosses the mutation window.
fn in_window(cache: &TreeCache, key: NodeKey, window: MutationWindow) -> bool {
    // Find the chain's direct child of the mutated parent.
    let mut current = key;
    let top = loop {
        let Some(node) = cache.node(current) else {
            return false;
        };
        match node.parent {
            Some(parent) if parent == window.parent => break current,
            Some(parent) => current = parent,
            None => return false,
        }
    };
    let Some(node) = cache.node(top) else {
        return false;
    };
    let (coordinate, cross) = match window.axis {
        Axis::Row => (node.row, node.column),
        Axis::Column => (node.column, node.row),
    };
    if coordinate < window.start || coordinate >= window.end {
        return false;
    }
    match window.cross {
        Some(expected) => cross == expected,
        None => true,
    }
}

/// The coordinate path root → `key`, with cached identities along the way.
fn path_of(cache: &TreeCache, key: NodeKey) -> Option<Vec<PathStep>> {
    let mut path = Vec::new();
    let mut current = key;
    loop {
        let node = cache.node(current)?;
        let Some(parent) = node.parent else { break };
        path.push(PathStep {
            row: node.row,
            column: node.column,
            handle: node.handle.ready().copied().flatten(),
        });
        current = parent;
    }
    path.reverse();
    Some(path)
}
