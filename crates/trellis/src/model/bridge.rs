//! The model-adapter coordinator.
//!
//! [`ModelBridge`] is the public surface of the crate: it presents a
//! [`DataProvider`]'s tree/table as an [`ItemModel`], fetching counts,
//! identities, and cell payloads on demand through the node cache, and
//! translating the provider's coarse `(position, count)` change reports
//! into cache invalidation, persistent-reference remapping, and view
//! signals.
//!
//! Every structural report runs as one synchronous transaction: capture
//! references, mutate the cache, re-derive the references, notify the
//! view. Signals are emitted only after the state lock is released, so a
//! slot that reenters the bridge is always served from fully-updated
//! state. Coordinates are validated before anything mutates; an invalid
//! report leaves the cache exactly as it was.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{ModelError, ProviderError, Result};

use super::cache::{Axis, NodeKey, TreeCache};
use super::index::{ModelIndex, PersistentIndex};
use super::persist::{self, MutationWindow, PersistentRegistry};
use super::provider::{DataProvider, ItemHandle};
use super::traits::{ItemFlags, ItemModel, ModelSignals, Orientation, SortOrder};
use super::value::CellValue;

/// A change report from the data provider, delivered via
/// [`ModelBridge::notify`].
///
/// `parent` addresses the subtree the change happened in;
/// `ModelIndex::invalid()` means the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceChange {
    /// Everything changed; the bridge discards all cached state.
    Reset,
    /// `count` rows appeared at `position` under `parent`.
    RowsAdded {
        parent: ModelIndex,
        position: usize,
        count: usize,
    },
    /// `count` rows disappeared at `position` under `parent`.
    RowsRemoved {
        parent: ModelIndex,
        position: usize,
        count: usize,
    },
    /// The contents of `count` rows at `position` changed in place.
    RowsChanged {
        parent: ModelIndex,
        position: usize,
        count: usize,
    },
    /// `count` columns appeared at `position` under `parent`.
    ColumnsAdded {
        parent: ModelIndex,
        position: usize,
        count: usize,
    },
    /// `count` columns disappeared at `position` under `parent`.
    ColumnsRemoved {
        parent: ModelIndex,
        position: usize,
        count: usize,
    },
    /// The contents of `count` columns at `position` changed in place.
    ColumnsChanged {
        parent: ModelIndex,
        position: usize,
        count: usize,
    },
    /// A single cell changed in place.
    CellChanged {
        parent: ModelIndex,
        row: usize,
        column: usize,
    },
}

/// Behavior switches for the bridge.
#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions {
    /// Tables conventionally nest children only under the first column; a
    /// valid parent in any other column then reports no children. Disable
    /// for sources that nest under every column.
    pub nest_only_first_column: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            nest_only_first_column: true,
        }
    }
}

impl BridgeOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether children nest only under the first column.
    pub fn with_nest_only_first_column(mut self, value: bool) -> Self {
        self.nest_only_first_column = value;
        self
    }
}

/// Everything behind the bridge's state lock.
struct BridgeState {
    cache: TreeCache,
    registry: PersistentRegistry,
    headers: HashMap<(Orientation, usize), CellValue>,
}

impl BridgeState {
    fn new() -> Self {
        Self {
            cache: TreeCache::new(),
            registry: PersistentRegistry::new(),
            headers: HashMap::new(),
        }
    }
}

/// Presents a [`DataProvider`] as an [`ItemModel`].
///
/// The bridge owns the provider and a cache of everything it has answered.
/// Queries hit the cache first and the provider at most once per fact;
/// [`notify`](Self::notify) is the single ingress the provider uses to
/// report changes.
///
/// # Example
///
/// ```ignore
/// use trellis::model::{ModelBridge, ModelIndex, SourceChange};
///
/// let bridge = ModelBridge::new(my_provider);
/// let root = ModelIndex::invalid();
///
/// let rows = bridge.row_count(&root);
/// let first = bridge.index(0, 0, &root);
/// let label = bridge.data(&first);
///
/// // The provider grew two rows at position 1:
/// bridge.notify(SourceChange::RowsAdded { parent: root, position: 1, count: 2 })?;
/// ```
pub struct ModelBridge<P: DataProvider> {
    provider: P,
    state: RwLock<BridgeState>,
    signals: ModelSignals,
    options: BridgeOptions,
}

impl<P: DataProvider> ModelBridge<P> {
    /// Creates a bridge over `provider` with default options.
    pub fn new(provider: P) -> Self {
        Self::with_options(provider, BridgeOptions::default())
    }

    /// Creates a bridge over `provider` with explicit options.
    pub fn with_options(provider: P, options: BridgeOptions) -> Self {
        Self {
            provider,
            state: RwLock::new(BridgeState::new()),
            signals: ModelSignals::new(),
            options,
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The signals views connect to.
    pub fn signals(&self) -> &ModelSignals {
        &self.signals
    }

    /// The options this bridge was built with.
    pub fn options(&self) -> BridgeOptions {
        self.options
    }

    fn parent_key(state: &BridgeState, parent: &ModelIndex) -> Option<NodeKey> {
        match parent.node() {
            None => Some(state.cache.root()),
            Some(key) => state.cache.contains(key).then_some(key),
        }
    }

    /// The first-column-nesting gate: a valid parent in a non-first column
    /// has no children under the default options.
    fn nests(&self, parent: &ModelIndex) -> bool {
        !(parent.is_valid() && self.options.nest_only_first_column && parent.column() != 0)
    }

    // ---------------------------------------------------------------------
    // Query surface
    // ---------------------------------------------------------------------

    /// Number of rows under `parent`, fetched on first access.
    pub fn row_count(&self, parent: &ModelIndex) -> usize {
        if !self.nests(parent) {
            return 0;
        }
        let mut state = self.state.write();
        let Some(key) = Self::parent_key(&state, parent) else {
            return 0;
        };
        state.cache.row_count(key, &self.provider)
    }

    /// Number of columns under `parent`, fetched on first access.
    pub fn column_count(&self, parent: &ModelIndex) -> usize {
        if !self.nests(parent) {
            return 0;
        }
        let mut state = self.state.write();
        let Some(key) = Self::parent_key(&state, parent) else {
            return 0;
        };
        state.cache.column_count(key, &self.provider)
    }

    /// Whether `parent` has children, preferring the provider's cheap
    /// answer and falling back to `row_count > 0`.
    pub fn has_children(&self, parent: &ModelIndex) -> bool {
        if !self.nests(parent) {
            return false;
        }
        let mut state = self.state.write();
        let Some(key) = Self::parent_key(&state, parent) else {
            return false;
        };
        let handle = state.cache.handle(key, &self.provider);
        if parent.is_valid() && handle.is_none() {
            return false;
        }
        match self.provider.has_children(handle) {
            Ok(Some(answer)) => answer,
            Ok(None) => state.cache.row_count(key, &self.provider) > 0,
            Err(err) => {
                tracing::warn!(
                    target: "trellis::model",
                    "provider has_children failed: {err}; falling back to row_count"
                );
                state.cache.row_count(key, &self.provider) > 0
            }
        }
    }

    /// The index at `(row, column)` under `parent`, materializing the
    /// position on first access. Out of bounds resolves invalid.
    pub fn index(&self, row: usize, column: usize, parent: &ModelIndex) -> ModelIndex {
        if !self.nests(parent) {
            return ModelIndex::invalid();
        }
        let mut state = self.state.write();
        let Some(key) = Self::parent_key(&state, parent) else {
            return ModelIndex::invalid();
        };
        match state.cache.child(key, row, column, &self.provider) {
            Some(child) => ModelIndex::new(row, column, child),
            None => ModelIndex::invalid(),
        }
    }

    /// The parent of `index`; invalid for root-level items and stale
    /// indices. Resolved from the cache, never from the provider.
    pub fn parent(&self, index: &ModelIndex) -> ModelIndex {
        let state = self.state.read();
        let Some(key) = index.node() else {
            return ModelIndex::invalid();
        };
        let Some(node) = state.cache.node(key) else {
            return ModelIndex::invalid();
        };
        let Some(parent) = node.parent else {
            return ModelIndex::invalid();
        };
        if parent == state.cache.root() {
            return ModelIndex::invalid();
        }
        match state.cache.node(parent) {
            Some(parent_node) => ModelIndex::new(parent_node.row, parent_node.column, parent),
            None => ModelIndex::invalid(),
        }
    }

    /// The payload at `index`, fetched on first access. A stale or invalid
    /// index yields `CellValue::None`.
    pub fn data(&self, index: &ModelIndex) -> CellValue {
        let Some(key) = index.node() else {
            return CellValue::None;
        };
        let mut state = self.state.write();
        if !state.cache.contains(key) {
            return CellValue::None;
        }
        state.cache.value(key, &self.provider)
    }

    /// Header payload for one section, cached after the first fetch.
    pub fn header_data(&self, section: usize, orientation: Orientation) -> CellValue {
        let mut state = self.state.write();
        if let Some(cached) = state.headers.get(&(orientation, section)) {
            return cached.clone();
        }
        let fetched = match self.provider.header(section, orientation) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    target: "trellis::model",
                    "provider header({section}) failed: {err}; caching empty header"
                );
                CellValue::None
            }
        };
        state.headers.insert((orientation, section), fetched.clone());
        fetched
    }

    /// Interaction flags at `index`, asked of the provider per item.
    pub fn flags(&self, index: &ModelIndex) -> ItemFlags {
        let Some(key) = index.node() else {
            return ItemFlags::disabled();
        };
        let handle = {
            let mut state = self.state.write();
            if !state.cache.contains(key) {
                return ItemFlags::disabled();
            }
            state.cache.handle(key, &self.provider)
        };
        match handle {
            Some(handle) => match self.provider.flags(handle) {
                Ok(flags) => flags,
                Err(err) => {
                    tracing::warn!(
                        target: "trellis::model",
                        "provider flags failed: {err}; using defaults"
                    );
                    ItemFlags::new()
                }
            },
            None => ItemFlags::new(),
        }
    }

    /// Resolves an external identity to its current position.
    ///
    /// Only identities the bridge has derived (and not since invalidated)
    /// resolve; anything else is invalid.
    pub fn index_for_handle(&self, handle: ItemHandle) -> ModelIndex {
        let state = self.state.read();
        let resolved = state
            .cache
            .node_for_handle(handle)
            .and_then(|key| state.cache.node(key).map(|node| (key, node.row, node.column)));
        match resolved {
            Some((key, row, column)) => ModelIndex::new(row, column, key),
            None => ModelIndex::invalid(),
        }
    }

    /// The external identity at `index`, deriving it on first access.
    pub fn handle_for_index(&self, index: &ModelIndex) -> Option<ItemHandle> {
        let key = index.node()?;
        let mut state = self.state.write();
        if !state.cache.contains(key) {
            return None;
        }
        state.cache.handle(key, &self.provider)
    }

    /// Registers and returns a durable reference to `index`.
    ///
    /// The reference is rewritten across structural mutations and nulled
    /// when its position is destroyed. The item's identity is captured now
    /// so the reference can follow it through a sort.
    pub fn persistent_index(&self, index: &ModelIndex) -> PersistentIndex {
        let Some(key) = index.node() else {
            return PersistentIndex::invalid();
        };
        let mut state = self.state.write();
        if !state.cache.contains(key) {
            return PersistentIndex::invalid();
        }
        let handle = state.cache.handle(key, &self.provider);
        let reference = PersistentIndex::new(*index, handle);
        state.registry.register(reference.downgrade());
        reference
    }

    // ---------------------------------------------------------------------
    // Mutation surface
    // ---------------------------------------------------------------------

    /// Writes a new payload through to the provider.
    ///
    /// On success, exactly that cell's cache is invalidated and
    /// `data_changed` is emitted for it. On failure nothing is cached and
    /// the error is returned; the previously displayed value stays intact.
    pub fn set_data(&self, index: &ModelIndex, value: CellValue) -> Result<()> {
        let Some(key) = index.node() else {
            return Err(ProviderError::new("cannot edit an invalid position").into());
        };
        let (handle, position) = {
            let mut state = self.state.write();
            if !state.cache.contains(key) {
                return Err(ProviderError::new("position no longer exists").into());
            }
            let handle = state.cache.handle(key, &self.provider);
            let position = state.cache.node(key).and_then(|node| {
                node.parent.map(|parent| (parent, node.row, node.column))
            });
            (handle, position)
        };
        let Some(handle) = handle else {
            return Err(ProviderError::new("position has no external identity").into());
        };
        let Some((parent, row, column)) = position else {
            return Err(ProviderError::new("cannot edit the root").into());
        };

        self.provider.set_data(handle, value)?;

        {
            let mut state = self.state.write();
            let BridgeState {
                cache, registry, ..
            } = &mut *state;
            let captured = registry.capture_window(cache, MutationWindow::cell(parent, row, column));
            cache.change_cell(parent, row, column);
            persist::remap_changed(cache, &self.provider, captured);
        }
        self.signals.data_changed.emit((*index, *index));
        Ok(())
    }

    /// Asks the provider to re-order itself by `column`.
    ///
    /// When the provider reports that data actually moved, the whole cached
    /// content is dropped (shape preserved), every persistent reference is
    /// re-derived by identity, and the layout pair plus an
    /// everything-changed range is emitted. Returns `Ok(false)` untouched
    /// when the provider does not sort.
    pub fn sort(&self, column: usize, order: SortOrder) -> Result<bool> {
        let sorted = self.provider.sort(column, order).map_err(ModelError::from)?;
        if !sorted {
            return Ok(false);
        }
        self.signals.layout_about_to_change.emit(());
        {
            let mut state = self.state.write();
            let BridgeState {
                cache,
                registry,
                headers,
            } = &mut *state;
            let captured = registry.capture_all(cache);
            let root = cache.root();
            cache.reset_data(root);
            persist::remap_sorted(cache, &self.provider, captured);
            // Row headers follow the rows; column headers are unaffected.
            headers.retain(|(orientation, _), _| *orientation == Orientation::Horizontal);
        }
        self.signals.layout_changed.emit(());
        self.signals
            .data_changed
            .emit((ModelIndex::invalid(), ModelIndex::invalid()));
        Ok(true)
    }

    /// Single ingress for provider change reports.
    ///
    /// Dispatches to the cache mutation wrapped in the persistent-reference
    /// capture/remap sequence and the matching signal bracket. A zero-count
    /// report is a no-op and emits nothing. Runs synchronously: when this
    /// returns, the cache, the references, and the view have all seen the
    /// change — or, on an invalid report, none of them have.
    pub fn notify(&self, change: SourceChange) -> Result<()> {
        match change {
            SourceChange::Reset => {
                self.apply_reset();
                Ok(())
            }
            SourceChange::RowsAdded {
                parent,
                position,
                count,
            } => self.apply_insert(parent, Axis::Row, position, count),
            SourceChange::RowsRemoved {
                parent,
                position,
                count,
            } => self.apply_remove(parent, Axis::Row, position, count),
            SourceChange::RowsChanged {
                parent,
                position,
                count,
            } => self.apply_change(parent, Axis::Row, position, count),
            SourceChange::ColumnsAdded {
                parent,
                position,
                count,
            } => self.apply_insert(parent, Axis::Column, position, count),
            SourceChange::ColumnsRemoved {
                parent,
                position,
                count,
            } => self.apply_remove(parent, Axis::Column, position, count),
            SourceChange::ColumnsChanged {
                parent,
                position,
                count,
            } => self.apply_change(parent, Axis::Column, position, count),
            SourceChange::CellChanged {
                parent,
                row,
                column,
            } => self.apply_cell_change(parent, row, column),
        }
    }

    fn apply_reset(&self) {
        self.signals.model_about_to_reset.emit(());
        {
            let mut state = self.state.write();
            state.registry.invalidate_all();
            state.cache.clear();
            state.headers.clear();
        }
        self.signals.model_reset.emit(());
    }

    fn apply_insert(
        &self,
        parent: ModelIndex,
        axis: Axis,
        position: usize,
        count: usize,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let parent_key = {
            let state = self.state.read();
            let Some(key) = Self::parent_key(&state, &parent) else {
                return Ok(());
            };
            if let Some(len) = state.cache.cached_count(key, axis) {
                if position > len {
                    return Err(ModelError::OutOfRange {
                        axis,
                        position,
                        count,
                        len,
                    });
                }
            }
            key
        };
        let last = position + count - 1;
        self.signals.layout_about_to_change.emit(());
        match axis {
            Axis::Row => self
                .signals
                .rows_about_to_be_inserted
                .emit((parent, position, last)),
            Axis::Column => self
                .signals
                .columns_about_to_be_inserted
                .emit((parent, position, last)),
        }
        {
            let mut state = self.state.write();
            let BridgeState {
                cache,
                registry,
                headers,
            } = &mut *state;
            let captured =
                registry.capture_window(cache, MutationWindow::shift(parent_key, axis, position));
            cache.insert(parent_key, axis, position, count)?;
            persist::remap_shifted(cache, captured);
            if !parent.is_valid() {
                Self::drop_headers_along(headers, axis);
            }
        }
        match axis {
            Axis::Row => self.signals.rows_inserted.emit((parent, position, last)),
            Axis::Column => self.signals.columns_inserted.emit((parent, position, last)),
        }
        self.signals.layout_changed.emit(());
        if !parent.is_valid() {
            self.emit_header_changed(axis, position, last);
        }
        self.emit_region_changed(&parent, axis, position);
        Ok(())
    }

    fn apply_remove(
        &self,
        parent: ModelIndex,
        axis: Axis,
        position: usize,
        count: usize,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let parent_key = {
            let state = self.state.read();
            let Some(key) = Self::parent_key(&state, &parent) else {
                return Ok(());
            };
            if let Some(len) = state.cache.cached_count(key, axis) {
                if position.saturating_add(count) > len {
                    return Err(ModelError::OutOfRange {
                        axis,
                        position,
                        count,
                        len,
                    });
                }
            }
            key
        };
        let last = position + count - 1;
        self.signals.layout_about_to_change.emit(());
        match axis {
            Axis::Row => self
                .signals
                .rows_about_to_be_removed
                .emit((parent, position, last)),
            Axis::Column => self
                .signals
                .columns_about_to_be_removed
                .emit((parent, position, last)),
        }
        {
            let mut state = self.state.write();
            let BridgeState {
                cache,
                registry,
                headers,
            } = &mut *state;
            let captured =
                registry.capture_window(cache, MutationWindow::shift(parent_key, axis, position));
            cache.remove(parent_key, axis, position, count)?;
            persist::remap_shifted(cache, captured);
            if !parent.is_valid() {
                Self::drop_headers_along(headers, axis);
            }
        }
        match axis {
            Axis::Row => self.signals.rows_removed.emit((parent, position, last)),
            Axis::Column => self.signals.columns_removed.emit((parent, position, last)),
        }
        self.signals.layout_changed.emit(());
        if !parent.is_valid() {
            self.emit_header_changed(axis, position, last);
        }
        self.emit_region_changed(&parent, axis, position);
        Ok(())
    }

    fn apply_change(
        &self,
        parent: ModelIndex,
        axis: Axis,
        position: usize,
        count: usize,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let (parent_key, start, span) = {
            let state = self.state.read();
            let Some(key) = Self::parent_key(&state, &parent) else {
                return Ok(());
            };
            match state.cache.cached_count(key, axis) {
                Some(len) => {
                    let end = position.saturating_add(count).min(len);
                    if position >= end {
                        // The window lies entirely past the cached extent:
                        // clamped to nothing.
                        return Ok(());
                    }
                    (key, position, end - position)
                }
                None => (key, position, count),
            }
        };
        self.signals.layout_about_to_change.emit(());
        {
            let mut state = self.state.write();
            let BridgeState {
                cache, registry, ..
            } = &mut *state;
            let captured =
                registry.capture_window(cache, MutationWindow::span(parent_key, axis, start, span));
            cache.change(parent_key, axis, start, span);
            persist::remap_changed(cache, &self.provider, captured);
        }
        self.signals.layout_changed.emit(());
        self.emit_region_changed(&parent, axis, start);
        Ok(())
    }

    fn apply_cell_change(&self, parent: ModelIndex, row: usize, column: usize) -> Result<()> {
        let parent_key = {
            let state = self.state.read();
            let Some(key) = Self::parent_key(&state, &parent) else {
                return Ok(());
            };
            key
        };
        let cell = {
            let mut state = self.state.write();
            let BridgeState {
                cache, registry, ..
            } = &mut *state;
            let captured =
                registry.capture_window(cache, MutationWindow::cell(parent_key, row, column));
            cache.change_cell(parent_key, row, column);
            persist::remap_changed(cache, &self.provider, captured);
            cache
                .child(parent_key, row, column, &self.provider)
                .map(|key| ModelIndex::new(row, column, key))
        };
        let index = cell.unwrap_or_else(ModelIndex::invalid);
        self.signals.data_changed.emit((index, index));
        Ok(())
    }

    fn drop_headers_along(headers: &mut HashMap<(Orientation, usize), CellValue>, axis: Axis) {
        let stale = match axis {
            Axis::Row => Orientation::Vertical,
            Axis::Column => Orientation::Horizontal,
        };
        headers.retain(|(orientation, _), _| *orientation != stale);
    }

    fn emit_header_changed(&self, axis: Axis, first: usize, last: usize) {
        let orientation = match axis {
            Axis::Row => Orientation::Vertical,
            Axis::Column => Orientation::Horizontal,
        };
        self.signals.header_data_changed.emit((orientation, first, last));
    }

    /// Emits `data_changed` covering at least the mutated region: from the
    /// window start through the end of the parent (shifted tails included).
    /// Falls back to the everything-changed pair when the region cannot be
    /// materialized.
    fn emit_region_changed(&self, parent: &ModelIndex, axis: Axis, start: usize) {
        let region = {
            let mut state = self.state.write();
            let key = Self::parent_key(&state, parent);
            key.and_then(|key| {
                let rows = state.cache.row_count(key, &self.provider);
                let columns = state.cache.column_count(key, &self.provider);
                if rows == 0 || columns == 0 {
                    return None;
                }
                let (first_row, first_column) = match axis {
                    Axis::Row => (start.min(rows - 1), 0),
                    Axis::Column => (0, start.min(columns - 1)),
                };
                let top_left = state.cache.child(key, first_row, first_column, &self.provider)?;
                let bottom_right = state.cache.child(key, rows - 1, columns - 1, &self.provider)?;
                Some((
                    ModelIndex::new(first_row, first_column, top_left),
                    ModelIndex::new(rows - 1, columns - 1, bottom_right),
                ))
            })
        };
        match region {
            Some(range) => self.signals.data_changed.emit(range),
            None => self
                .signals
                .data_changed
                .emit((ModelIndex::invalid(), ModelIndex::invalid())),
        }
    }
}

impl<P: DataProvider> ItemModel for ModelBridge<P> {
    fn row_count(&self, parent: &ModelIndex) -> usize {
        ModelBridge::row_count(self, parent)
    }

    fn column_count(&self, parent: &ModelIndex) -> usize {
        ModelBridge::column_count(self, parent)
    }

    fn data(&self, index: &ModelIndex) -> CellValue {
        ModelBridge::data(self, index)
    }

    fn index(&self, row: usize, column: usize, parent: &ModelIndex) -> ModelIndex {
        ModelBridge::index(self, row, column, parent)
    }

    fn parent(&self, index: &ModelIndex) -> ModelIndex {
        ModelBridge::parent(self, index)
    }

    fn signals(&self) -> &ModelSignals {
        &self.signals
    }

    fn set_data(&self, index: &ModelIndex, value: CellValue) -> bool {
        match ModelBridge::set_data(self, index, value) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(target: "trellis::model", "edit rejected: {err}");
                false
            }
        }
    }

    fn flags(&self, index: &ModelIndex) -> ItemFlags {
        ModelBridge::flags(self, index)
    }

    fn has_children(&self, parent: &ModelIndex) -> bool {
        ModelBridge::has_children(self, parent)
    }

    fn header_data(&self, section: usize, orientation: Orientation) -> CellValue {
        ModelBridge::header_data(self, section, orientation)
    }

    fn sort(&self, column: usize, order: SortOrder) -> bool {
        match ModelBridge::sort(self, column, order) {
            Ok(sorted) => sorted,
            Err(err) => {
                tracing::warn!(target: "trellis::model", "sort failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    /// Columns worth of identity space per item.
    const STRIDE: u64 = 8;

    fn handle_for(id: u64, column: usize) -> ItemHandle {
        ItemHandle::new(id * STRIDE + column as u64)
    }

    fn id_of(handle: ItemHandle) -> u64 {
        handle.raw() / STRIDE
    }

    fn column_of(handle: ItemHandle) -> usize {
        (handle.raw() % STRIDE) as usize
    }

    struct Item {
        id: u64,
        label: String,
        children: Vec<Item>,
    }

    impl Item {
        fn leaf(id: u64, label: &str) -> Self {
            Self {
                id,
                label: label.to_owned(),
                children: Vec::new(),
            }
        }

        fn branch(id: u64, label: &str, children: Vec<Item>) -> Self {
            Self {
                id,
                label: label.to_owned(),
                children,
            }
        }
    }

    fn find(items: &[Item], id: u64) -> Option<&Item> {
        for item in items {
            if item.id == id {
                return Some(item);
            }
            if let Some(hit) = find(&item.children, id) {
                return Some(hit);
            }
        }
        None
    }

    fn find_mut(items: &mut [Item], id: u64) -> Option<&mut Item> {
        for item in items {
            if item.id == id {
                return Some(item);
            }
            if let Some(hit) = find_mut(&mut item.children, id) {
                return Some(hit);
            }
        }
        None
    }

    /// In-memory hierarchical source with stable per-item identities,
    /// per-operation call counters, and failure switches.
    struct TreeProvider {
        items: Mutex<Vec<Item>>,
        columns: usize,
        calls: Mutex<HashMap<&'static str, usize>>,
        fail_row_count: AtomicBool,
        fail_set_data: AtomicBool,
    }

    impl TreeProvider {
        fn new(items: Vec<Item>, columns: usize) -> Self {
            Self {
                items: Mutex::new(items),
                columns,
                calls: Mutex::new(HashMap::new()),
                fail_row_count: AtomicBool::new(false),
                fail_set_data: AtomicBool::new(false),
            }
        }

        fn flat(labels: &[&str]) -> Self {
            let items = labels
                .iter()
                .enumerate()
                .map(|(i, label)| Item::leaf(i as u64 + 1, label))
                .collect();
            Self::new(items, 2)
        }

        fn bump(&self, name: &'static str) {
            *self.calls.lock().entry(name).or_insert(0) += 1;
        }

        fn calls(&self, name: &str) -> usize {
            self.calls.lock().get(name).copied().unwrap_or(0)
        }

        fn insert_root_rows(&self, position: usize, items: Vec<Item>) {
            self.items.lock().splice(position..position, items);
        }

        fn remove_root_rows(&self, position: usize, count: usize) {
            self.items.lock().drain(position..position + count);
        }
    }

    impl DataProvider for TreeProvider {
        fn row_count(
            &self,
            parent: Option<ItemHandle>,
        ) -> std::result::Result<usize, ProviderError> {
            self.bump("row_count");
            if self.fail_row_count.load(AtomicOrdering::SeqCst) {
                return Err(ProviderError::new("row_count unavailable"));
            }
            let items = self.items.lock();
            Ok(match parent {
                None => items.len(),
                Some(handle) => find(&items, id_of(handle))
                    .map(|item| item.children.len())
                    .unwrap_or(0),
            })
        }

        fn column_count(&self) -> std::result::Result<usize, ProviderError> {
            self.bump("column_count");
            Ok(self.columns)
        }

        fn index(
            &self,
            row: usize,
            column: usize,
            parent: Option<ItemHandle>,
        ) -> std::result::Result<Option<ItemHandle>, ProviderError> {
            self.bump("index");
            let items = self.items.lock();
            let child_id = match parent {
                None => items.get(row).map(|item| item.id),
                Some(handle) => find(&items, id_of(handle))
                    .and_then(|item| item.children.get(row))
                    .map(|child| child.id),
            };
            Ok(child_id.map(|id| handle_for(id, column)))
        }

        fn data(&self, item: ItemHandle) -> std::result::Result<CellValue, ProviderError> {
            self.bump("data");
            let items = self.items.lock();
            let Some(node) = find(&items, id_of(item)) else {
                return Ok(CellValue::None);
            };
            Ok(match column_of(item) {
                0 => CellValue::from(node.label.as_str()),
                1 => CellValue::from(node.id as i64),
                _ => CellValue::None,
            })
        }

        fn header(
            &self,
            section: usize,
            orientation: Orientation,
        ) -> std::result::Result<CellValue, ProviderError> {
            self.bump("header");
            Ok(CellValue::from(format!("{orientation:?}-{section}")))
        }

        fn set_data(
            &self,
            item: ItemHandle,
            value: CellValue,
        ) -> std::result::Result<(), ProviderError> {
            self.bump("set_data");
            if self.fail_set_data.load(AtomicOrdering::SeqCst) {
                return Err(ProviderError::new("backend rejected the edit"));
            }
            let mut items = self.items.lock();
            let Some(node) = find_mut(&mut items, id_of(item)) else {
                return Err(ProviderError::new("unknown item"));
            };
            if let Some(text) = value.as_str() {
                node.label = text.to_owned();
            }
            Ok(())
        }

        fn sort(
            &self,
            column: usize,
            order: SortOrder,
        ) -> std::result::Result<bool, ProviderError> {
            self.bump("sort");
            if column != 0 {
                return Ok(false);
            }
            let mut items = self.items.lock();
            items.sort_by(|a, b| a.label.cmp(&b.label));
            if order == SortOrder::Descending {
                items.reverse();
            }
            Ok(true)
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }

    fn record_signals(bridge: &ModelBridge<TreeProvider>) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let signals = bridge.signals();

        let l = log.clone();
        signals
            .layout_about_to_change
            .connect(move |_| l.lock().push("layout_about_to_change".to_owned()));
        let l = log.clone();
        signals
            .layout_changed
            .connect(move |_| l.lock().push("layout_changed".to_owned()));
        let l = log.clone();
        signals
            .rows_about_to_be_inserted
            .connect(move |(_, first, last)| {
                l.lock().push(format!("rows_about_to_be_inserted({first},{last})"))
            });
        let l = log.clone();
        signals.rows_inserted.connect(move |(_, first, last)| {
            l.lock().push(format!("rows_inserted({first},{last})"))
        });
        let l = log.clone();
        signals
            .rows_about_to_be_removed
            .connect(move |(_, first, last)| {
                l.lock().push(format!("rows_about_to_be_removed({first},{last})"))
            });
        let l = log.clone();
        signals.rows_removed.connect(move |(_, first, last)| {
            l.lock().push(format!("rows_removed({first},{last})"))
        });
        let l = log.clone();
        signals
            .data_changed
            .connect(move |_| l.lock().push("data_changed".to_owned()));
        let l = log.clone();
        signals
            .header_data_changed
            .connect(move |_| l.lock().push("header_data_changed".to_owned()));
        let l = log.clone();
        signals
            .model_about_to_reset
            .connect(move |_| l.lock().push("model_about_to_reset".to_owned()));
        let l = log.clone();
        signals
            .model_reset
            .connect(move |_| l.lock().push("model_reset".to_owned()));
        log
    }

    const ROOT: ModelIndex = ModelIndex::invalid();

    #[test]
    fn test_counts_and_idempotent_data_reads() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));

        assert_eq!(bridge.row_count(&ROOT), 3);
        assert_eq!(bridge.column_count(&ROOT), 2);

        let index = bridge.index(1, 0, &ROOT);
        assert_eq!(bridge.data(&index).as_str(), Some("b"));
        assert_eq!(bridge.data(&index).as_str(), Some("b"));
        // Two reads, one provider call.
        assert_eq!(bridge.provider().calls("data"), 1);
    }

    #[test]
    fn test_handle_round_trip() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));

        let index = bridge.index(2, 1, &ROOT);
        let handle = bridge.handle_for_index(&index).unwrap();
        assert_eq!(bridge.index_for_handle(handle), index);

        // An identity the bridge never derived does not resolve.
        assert!(!bridge.index_for_handle(ItemHandle::new(9999)).is_valid());
    }

    #[test]
    fn test_provider_failure_degrades_to_empty() {
        init_tracing();
        let provider = TreeProvider::flat(&["a", "b"]);
        provider.fail_row_count.store(true, AtomicOrdering::SeqCst);
        let bridge = ModelBridge::new(provider);

        assert_eq!(bridge.row_count(&ROOT), 0);
        // The fallback is cached; clearing the failure does not resurrect
        // the rows until the provider reports a change.
        bridge
            .provider()
            .fail_row_count
            .store(false, AtomicOrdering::SeqCst);
        assert_eq!(bridge.row_count(&ROOT), 0);
        assert_eq!(bridge.provider().calls("row_count"), 1);
    }

    #[test]
    fn test_insert_shifts_persistent_reference() {
        // Scenario: three rows, a reference at row 2, two rows inserted at 1.
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));
        assert_eq!(bridge.row_count(&ROOT), 3);

        let fixed = bridge.persistent_index(&bridge.index(0, 0, &ROOT));
        let shifted = bridge.persistent_index(&bridge.index(2, 0, &ROOT));

        bridge
            .provider()
            .insert_root_rows(1, vec![Item::leaf(101, "x"), Item::leaf(102, "y")]);
        bridge
            .notify(SourceChange::RowsAdded {
                parent: ROOT,
                position: 1,
                count: 2,
            })
            .unwrap();

        assert_eq!(bridge.row_count(&ROOT), 5);
        assert_eq!(fixed.index().row(), 0);
        assert_eq!(shifted.index().row(), 4);
        assert_eq!(bridge.data(&shifted.index()).as_str(), Some("c"));
    }

    #[test]
    fn test_remove_destroys_subtree_and_shifts_tail() {
        // Five roots; the one at row 3 has two children. Removing rows
        // [2, 4) destroys that subtree; a reference into a grandchild goes
        // invalid, a reference at row 4 lands on row 2.
        let items = vec![
            Item::leaf(1, "r0"),
            Item::leaf(2, "r1"),
            Item::leaf(3, "r2"),
            Item::branch(
                4,
                "r3",
                vec![Item::leaf(40, "c0"), Item::leaf(41, "c1")],
            ),
            Item::leaf(5, "r4"),
        ];
        let bridge = ModelBridge::new(TreeProvider::new(items, 1));
        assert_eq!(bridge.row_count(&ROOT), 5);

        let branch = bridge.index(3, 0, &ROOT);
        assert_eq!(bridge.row_count(&branch), 2);
        let grandchild = bridge.persistent_index(&bridge.index(0, 0, &branch));
        let tail = bridge.persistent_index(&bridge.index(4, 0, &ROOT));

        bridge.provider().remove_root_rows(2, 2);
        bridge
            .notify(SourceChange::RowsRemoved {
                parent: ROOT,
                position: 2,
                count: 2,
            })
            .unwrap();

        assert_eq!(bridge.row_count(&ROOT), 3);
        assert!(!grandchild.is_valid());
        assert_eq!(tail.index().row(), 2);
        assert_eq!(bridge.data(&tail.index()).as_str(), Some("r4"));
    }

    #[test]
    fn test_insert_then_remove_restores_positions() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));
        assert_eq!(bridge.row_count(&ROOT), 3);

        let head = bridge.persistent_index(&bridge.index(0, 0, &ROOT));
        let tail = bridge.persistent_index(&bridge.index(2, 0, &ROOT));

        bridge
            .provider()
            .insert_root_rows(1, vec![Item::leaf(101, "x"), Item::leaf(102, "y")]);
        bridge
            .notify(SourceChange::RowsAdded {
                parent: ROOT,
                position: 1,
                count: 2,
            })
            .unwrap();
        bridge.provider().remove_root_rows(1, 2);
        bridge
            .notify(SourceChange::RowsRemoved {
                parent: ROOT,
                position: 1,
                count: 2,
            })
            .unwrap();

        assert_eq!(bridge.row_count(&ROOT), 3);
        assert_eq!(head.index().row(), 0);
        assert_eq!(tail.index().row(), 2);
        assert!(head.is_valid() && tail.is_valid());
    }

    #[test]
    fn test_cell_change_invalidates_one_cell() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b"]));

        let hit = bridge.index(1, 0, &ROOT);
        let miss = bridge.index(1, 1, &ROOT);
        bridge.data(&hit);
        bridge.data(&miss);
        let before = bridge.provider().calls("data");

        bridge
            .notify(SourceChange::CellChanged {
                parent: ROOT,
                row: 1,
                column: 0,
            })
            .unwrap();

        // The changed cell re-fetches exactly once; the neighbor stays
        // cached.
        bridge.data(&hit);
        assert_eq!(bridge.provider().calls("data"), before + 1);
        bridge.data(&miss);
        assert_eq!(bridge.provider().calls("data"), before + 1);
    }

    #[test]
    fn test_sort_follows_identity() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["charlie", "alice", "bob"]));
        assert_eq!(bridge.row_count(&ROOT), 3);

        let reference = bridge.persistent_index(&bridge.index(0, 0, &ROOT));
        assert_eq!(bridge.data(&reference.index()).as_str(), Some("charlie"));

        assert!(bridge.sort(0, SortOrder::Ascending).unwrap());

        // "charlie" now sorts last; the reference followed it there.
        assert_eq!(reference.index().row(), 2);
        assert_eq!(bridge.data(&reference.index()).as_str(), Some("charlie"));
        assert_eq!(bridge.data(&bridge.index(0, 0, &ROOT)).as_str(), Some("alice"));
    }

    #[test]
    fn test_set_data_writes_through_and_refetches() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b"]));
        let log = record_signals(&bridge);

        let index = bridge.index(0, 0, &ROOT);
        assert_eq!(bridge.data(&index).as_str(), Some("a"));

        bridge.set_data(&index, CellValue::from("edited")).unwrap();

        assert_eq!(bridge.data(&index).as_str(), Some("edited"));
        assert_eq!(log.lock().as_slice(), ["data_changed"]);
    }

    #[test]
    fn test_set_data_failure_leaves_cache_intact() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b"]));

        let index = bridge.index(0, 0, &ROOT);
        assert_eq!(bridge.data(&index).as_str(), Some("a"));
        let before = bridge.provider().calls("data");

        bridge
            .provider()
            .fail_set_data
            .store(true, AtomicOrdering::SeqCst);
        let err = bridge.set_data(&index, CellValue::from("edited")).unwrap_err();
        assert!(matches!(err, ModelError::Provider(_)));

        // Still served from the cache, still the old value.
        assert_eq!(bridge.data(&index).as_str(), Some("a"));
        assert_eq!(bridge.provider().calls("data"), before);
    }

    #[test]
    fn test_zero_count_report_is_silent() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a"]));
        bridge.row_count(&ROOT);
        let log = record_signals(&bridge);

        bridge
            .notify(SourceChange::RowsAdded {
                parent: ROOT,
                position: 0,
                count: 0,
            })
            .unwrap();
        bridge
            .notify(SourceChange::RowsRemoved {
                parent: ROOT,
                position: 0,
                count: 0,
            })
            .unwrap();

        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_out_of_range_report_rejected_without_mutation() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));
        assert_eq!(bridge.row_count(&ROOT), 3);
        let log = record_signals(&bridge);

        let err = bridge
            .notify(SourceChange::RowsAdded {
                parent: ROOT,
                position: 7,
                count: 1,
            })
            .unwrap_err();
        assert!(matches!(err, ModelError::OutOfRange { .. }));

        assert_eq!(bridge.row_count(&ROOT), 3);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_signal_order_on_insert() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));
        bridge.row_count(&ROOT);
        let log = record_signals(&bridge);

        bridge.provider().insert_root_rows(1, vec![Item::leaf(101, "x")]);
        bridge
            .notify(SourceChange::RowsAdded {
                parent: ROOT,
                position: 1,
                count: 1,
            })
            .unwrap();

        assert_eq!(
            log.lock().as_slice(),
            [
                "layout_about_to_change",
                "rows_about_to_be_inserted(1,1)",
                "rows_inserted(1,1)",
                "layout_changed",
                "header_data_changed",
                "data_changed",
            ]
        );
    }

    #[test]
    fn test_first_column_nesting_gate() {
        let items = vec![Item::branch(1, "root", vec![Item::leaf(10, "kid")])];
        let bridge = ModelBridge::new(TreeProvider::new(items, 2));

        let first = bridge.index(0, 0, &ROOT);
        let second = bridge.index(0, 1, &ROOT);
        assert_eq!(bridge.row_count(&first), 1);
        assert!(bridge.has_children(&first));
        assert_eq!(bridge.row_count(&second), 0);
        assert!(!bridge.has_children(&second));

        let items = vec![Item::branch(1, "root", vec![Item::leaf(10, "kid")])];
        let open = ModelBridge::with_options(
            TreeProvider::new(items, 2),
            BridgeOptions::new().with_nest_only_first_column(false),
        );
        let second = open.index(0, 1, &ROOT);
        assert_eq!(open.row_count(&second), 1);
    }

    #[test]
    fn test_reset_discards_everything() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b"]));
        let reference = bridge.persistent_index(&bridge.index(1, 0, &ROOT));
        let fetches = bridge.provider().calls("row_count");
        let log = record_signals(&bridge);

        bridge.notify(SourceChange::Reset).unwrap();

        assert!(!reference.is_valid());
        assert_eq!(
            log.lock().as_slice(),
            ["model_about_to_reset", "model_reset"]
        );
        // Counts are re-fetched after the reset.
        assert_eq!(bridge.row_count(&ROOT), 2);
        assert_eq!(bridge.provider().calls("row_count"), fetches + 1);
    }

    #[test]
    fn test_header_cache_dropped_on_column_change() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a"]));
        bridge.column_count(&ROOT);

        bridge.header_data(0, Orientation::Horizontal);
        bridge.header_data(0, Orientation::Horizontal);
        assert_eq!(bridge.provider().calls("header"), 1);

        bridge
            .notify(SourceChange::ColumnsAdded {
                parent: ROOT,
                position: 2,
                count: 1,
            })
            .unwrap();

        bridge.header_data(0, Orientation::Horizontal);
        assert_eq!(bridge.provider().calls("header"), 2);
    }

    #[test]
    fn test_rows_changed_replays_descendant_references() {
        let items = vec![Item::branch(
            1,
            "root",
            vec![Item::leaf(10, "kid-a"), Item::leaf(11, "kid-b")],
        )];
        let bridge = ModelBridge::new(TreeProvider::new(items, 1));

        let branch = bridge.index(0, 0, &ROOT);
        let kid = bridge.index(1, 0, &branch);
        let reference = bridge.persistent_index(&kid);
        assert_eq!(bridge.data(&kid).as_str(), Some("kid-b"));

        bridge
            .notify(SourceChange::RowsChanged {
                parent: ROOT,
                position: 0,
                count: 1,
            })
            .unwrap();

        // The branch was fully invalidated and its descendants destroyed,
        // but the coordinate survived and the reference followed it into
        // the re-fetched subtree.
        let remapped = reference.index();
        assert!(remapped.is_valid());
        assert_eq!(remapped.row(), 1);
        assert_ne!(remapped, kid);
        assert_eq!(bridge.data(&remapped).as_str(), Some("kid-b"));
    }

    #[test]
    fn test_changed_window_is_clamped() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));
        bridge.row_count(&ROOT);
        let log = record_signals(&bridge);

        // Spans past the end: clamped, not rejected.
        bridge
            .notify(SourceChange::RowsChanged {
                parent: ROOT,
                position: 1,
                count: 10,
            })
            .unwrap();
        assert!(!log.lock().is_empty());

        log.lock().clear();
        // Entirely past the end: clamps to nothing, emits nothing.
        bridge
            .notify(SourceChange::RowsChanged {
                parent: ROOT,
                position: 9,
                count: 2,
            })
            .unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_stale_index_degrades_safely() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b", "c"]));
        bridge.row_count(&ROOT);

        let stale = bridge.index(2, 0, &ROOT);
        bridge.provider().remove_root_rows(2, 1);
        bridge
            .notify(SourceChange::RowsRemoved {
                parent: ROOT,
                position: 2,
                count: 1,
            })
            .unwrap();

        assert!(bridge.data(&stale).is_none());
        assert!(!bridge.parent(&stale).is_valid());
        assert_eq!(bridge.row_count(&stale), 0);
        assert_eq!(bridge.flags(&stale), ItemFlags::disabled());
    }

    #[test]
    fn test_item_model_trait_surface() {
        let bridge = ModelBridge::new(TreeProvider::flat(&["a", "b"]));
        let model: &dyn ItemModel = &bridge;

        assert_eq!(model.row_count(&ROOT), 2);
        let index = model.index(0, 0, &ROOT);
        assert_eq!(model.display_text(&index).as_deref(), Some("a"));
        assert!(model.set_data(&index, CellValue::from("z")));
        assert_eq!(model.display_text(&index).as_deref(), Some("z"));
        assert!(model.flags(&index).selectable);
        assert!(!model.has_children(&index));
    }
}
