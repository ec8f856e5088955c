//! Core traits for the model bridge.
//!
//! This module defines the view-facing capability set: the [`ItemModel`]
//! trait a view consumes, the [`ModelSignals`] it connects to, and the
//! small value types shared across the model layer.

use trellis_core::Signal;

use super::index::ModelIndex;
use super::value::CellValue;

/// Flags indicating what operations are allowed on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFlags {
    /// Item can be selected.
    pub selectable: bool,
    /// Item can be edited.
    pub editable: bool,
    /// Item has a checkbox.
    pub checkable: bool,
    /// Item is enabled (can interact).
    pub enabled: bool,
    /// Item should never have children (optimizes views).
    pub never_has_children: bool,
}

impl ItemFlags {
    /// Creates flags with all defaults (selectable and enabled only).
    pub fn new() -> Self {
        Self {
            selectable: true,
            enabled: true,
            ..Default::default()
        }
    }

    /// Creates flags for a disabled item.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Creates flags for an editable item.
    pub fn editable() -> Self {
        Self {
            selectable: true,
            editable: true,
            enabled: true,
            ..Default::default()
        }
    }

    /// Sets the selectable flag.
    pub fn with_selectable(mut self, selectable: bool) -> Self {
        self.selectable = selectable;
        self
    }

    /// Sets the editable flag.
    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    /// Sets the checkable flag.
    pub fn with_checkable(mut self, checkable: bool) -> Self {
        self.checkable = checkable;
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the never-has-children flag.
    pub fn with_never_has_children(mut self, value: bool) -> Self {
        self.never_has_children = value;
        self
    }
}

/// Header orientation for `header_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Horizontal header (column headers).
    Horizontal,
    /// Vertical header (row headers).
    Vertical,
}

/// Sort direction for [`ItemModel::sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// The view-facing capability set of a bridged model.
///
/// Views use this interface to query and display data without needing to
/// know where the data actually lives. The bridge implements it on top of
/// its node cache; a plain in-memory model can implement it directly.
///
/// # Implementation Requirements
///
/// At minimum, implement:
/// - [`row_count`](ItemModel::row_count) - Number of rows under a parent
/// - [`column_count`](ItemModel::column_count) - Number of columns
/// - [`data`](ItemModel::data) - Data at an index
/// - [`index`](ItemModel::index) - Create an index for a position
/// - [`parent`](ItemModel::parent) - Get the parent of an index
/// - [`signals`](ItemModel::signals) - Change notifications
///
/// For editable models, also implement [`set_data`](ItemModel::set_data)
/// and [`flags`](ItemModel::flags).
pub trait ItemModel: Send + Sync {
    /// Returns the number of rows under the given parent.
    fn row_count(&self, parent: &ModelIndex) -> usize;

    /// Returns the number of columns for children of the given parent.
    fn column_count(&self, parent: &ModelIndex) -> usize;

    /// Returns the data for the item at `index`.
    ///
    /// `CellValue::None` means an empty (but valid) cell.
    fn data(&self, index: &ModelIndex) -> CellValue;

    /// Creates a model index for the given row and column under `parent`.
    ///
    /// Returns `ModelIndex::invalid()` if the position is out of bounds.
    fn index(&self, row: usize, column: usize, parent: &ModelIndex) -> ModelIndex;

    /// Returns the parent of the given index.
    ///
    /// Returns `ModelIndex::invalid()` for root-level items and invalid
    /// indices.
    fn parent(&self, index: &ModelIndex) -> ModelIndex;

    /// Returns the signals for this model.
    ///
    /// Views connect to these signals to receive notifications about data
    /// changes, insertions, removals, etc.
    fn signals(&self) -> &ModelSignals;

    // -------------------------------------------------------------------------
    // Optional methods with default implementations
    // -------------------------------------------------------------------------

    /// Sets the data for the given index.
    ///
    /// Returns `true` if the data was successfully set. The default
    /// implementation returns `false` (read-only).
    fn set_data(&self, _index: &ModelIndex, _value: CellValue) -> bool {
        false
    }

    /// Returns the flags for the item at the given index.
    ///
    /// The default returns selectable and enabled flags.
    fn flags(&self, _index: &ModelIndex) -> ItemFlags {
        ItemFlags::new()
    }

    /// Returns `true` if the item at `parent` has any children.
    ///
    /// The default implementation checks `row_count(parent) > 0`. Override
    /// when a cheaper answer exists.
    fn has_children(&self, parent: &ModelIndex) -> bool {
        self.row_count(parent) > 0
    }

    /// Returns header data for the given section.
    ///
    /// - For horizontal headers, `section` is the column index
    /// - For vertical headers, `section` is the row index
    ///
    /// The default returns `CellValue::None`.
    fn header_data(&self, _section: usize, _orientation: Orientation) -> CellValue {
        CellValue::None
    }

    /// Sorts the model by the given column.
    ///
    /// Returns `true` if the model re-ordered itself. The default returns
    /// `false` (unsorted models).
    fn sort(&self, _column: usize, _order: SortOrder) -> bool {
        false
    }

    // -------------------------------------------------------------------------
    // Convenience methods
    // -------------------------------------------------------------------------

    /// Returns the display text for an item (convenience for string data).
    fn display_text(&self, index: &ModelIndex) -> Option<String> {
        self.data(index).into_string()
    }

    /// Creates a sibling index at the given row and column.
    fn sibling(&self, index: &ModelIndex, row: usize, column: usize) -> ModelIndex {
        if !index.is_valid() {
            return ModelIndex::invalid();
        }
        self.index(row, column, &self.parent(index))
    }
}

/// Collection of signals emitted by bridged models.
///
/// Views connect to these signals to stay synchronized with the model.
///
/// # Signal Usage
///
/// - **Before modifications**: `rows_about_to_be_*`, `columns_about_to_be_*`
///   or `layout_about_to_change`
/// - **After modifications**: `rows_*`, `columns_*` and `layout_changed`
/// - **Content changes**: `data_changed` — the `(invalid, invalid)` index
///   pair conventionally means "everything"
/// - **Major restructuring**: the `model_reset` pair
pub struct ModelSignals {
    // -------------------------------------------------------------------------
    // Row modification signals
    // -------------------------------------------------------------------------
    /// Emitted just before rows are inserted.
    /// Args: (parent index, first row, last row)
    pub rows_about_to_be_inserted: Signal<(ModelIndex, usize, usize)>,

    /// Emitted after rows have been inserted.
    /// Args: (parent index, first row, last row)
    pub rows_inserted: Signal<(ModelIndex, usize, usize)>,

    /// Emitted just before rows are removed.
    /// Args: (parent index, first row, last row)
    pub rows_about_to_be_removed: Signal<(ModelIndex, usize, usize)>,

    /// Emitted after rows have been removed.
    /// Args: (parent index, first row, last row)
    pub rows_removed: Signal<(ModelIndex, usize, usize)>,

    // -------------------------------------------------------------------------
    // Column modification signals
    // -------------------------------------------------------------------------
    /// Emitted just before columns are inserted.
    pub columns_about_to_be_inserted: Signal<(ModelIndex, usize, usize)>,

    /// Emitted after columns have been inserted.
    pub columns_inserted: Signal<(ModelIndex, usize, usize)>,

    /// Emitted just before columns are removed.
    pub columns_about_to_be_removed: Signal<(ModelIndex, usize, usize)>,

    /// Emitted after columns have been removed.
    pub columns_removed: Signal<(ModelIndex, usize, usize)>,

    // -------------------------------------------------------------------------
    // Data change signals
    // -------------------------------------------------------------------------
    /// Emitted when data in existing items changes.
    /// Args: (top-left index, bottom-right index)
    pub data_changed: Signal<(ModelIndex, ModelIndex)>,

    /// Emitted when header data changes.
    /// Args: (orientation, first section, last section)
    pub header_data_changed: Signal<(Orientation, usize, usize)>,

    // -------------------------------------------------------------------------
    // Layout signals
    // -------------------------------------------------------------------------
    /// Emitted before a structural change (insert, remove, bulk change,
    /// sort).
    pub layout_about_to_change: Signal<()>,

    /// Emitted after a structural change.
    pub layout_changed: Signal<()>,

    // -------------------------------------------------------------------------
    // Reset signals
    // -------------------------------------------------------------------------
    /// Emitted before the model is reset.
    pub model_about_to_reset: Signal<()>,

    /// Emitted after the model has been reset.
    pub model_reset: Signal<()>,
}

impl Default for ModelSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSignals {
    /// Creates a new set of model signals.
    pub fn new() -> Self {
        Self {
            rows_about_to_be_inserted: Signal::new(),
            rows_inserted: Signal::new(),
            rows_about_to_be_removed: Signal::new(),
            rows_removed: Signal::new(),
            columns_about_to_be_inserted: Signal::new(),
            columns_inserted: Signal::new(),
            columns_about_to_be_removed: Signal::new(),
            columns_removed: Signal::new(),
            data_changed: Signal::new(),
            header_data_changed: Signal::new(),
            layout_about_to_change: Signal::new(),
            layout_changed: Signal::new(),
            model_about_to_reset: Signal::new(),
            model_reset: Signal::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Convenience methods for emitting signals
    // -------------------------------------------------------------------------

    /// Emits signals for row insertion.
    ///
    /// Calls the provided function between the about_to_be_inserted and
    /// inserted signals.
    pub fn emit_rows_inserted<F>(&self, parent: ModelIndex, first: usize, last: usize, insert_fn: F)
    where
        F: FnOnce(),
    {
        self.rows_about_to_be_inserted.emit((parent, first, last));
        insert_fn();
        self.rows_inserted.emit((parent, first, last));
    }

    /// Emits signals for row removal.
    ///
    /// Calls the provided function between the about_to_be_removed and
    /// removed signals.
    pub fn emit_rows_removed<F>(&self, parent: ModelIndex, first: usize, last: usize, remove_fn: F)
    where
        F: FnOnce(),
    {
        self.rows_about_to_be_removed.emit((parent, first, last));
        remove_fn();
        self.rows_removed.emit((parent, first, last));
    }

    /// Emits the data_changed signal for a single item.
    pub fn emit_data_changed_single(&self, index: ModelIndex) {
        self.data_changed.emit((index, index));
    }

    /// Emits signals for a model reset.
    ///
    /// Calls the provided function between the about_to_reset and reset
    /// signals.
    pub fn emit_reset<F>(&self, reset_fn: F)
    where
        F: FnOnce(),
    {
        self.model_about_to_reset.emit(());
        reset_fn();
        self.model_reset.emit(());
    }

    /// Emits signals for a layout change.
    ///
    /// Calls the provided function between the about_to_change and changed
    /// signals.
    pub fn emit_layout_changed<F>(&self, change_fn: F)
    where
        F: FnOnce(),
    {
        self.layout_about_to_change.emit(());
        change_fn();
        self.layout_changed.emit(());
    }
}
