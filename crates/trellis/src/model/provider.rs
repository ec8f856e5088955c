//! The data-provider boundary.
//!
//! A [`DataProvider`] is the external source of truth for counts, content,
//! and identity of tree positions. The bridge calls it lazily, caches every
//! answer, and shields the view from its failures: read-path errors degrade
//! to safe defaults, mutation-path errors abort without touching the cache.
//!
//! The trait replaces the original adapter's "call a method by name on a
//! foreign object and catch whatever it throws" with a typed capability
//! boundary. Any concrete source — a foreign-runtime object, an in-memory
//! table, a remote stub — implements these operations; interior mutability
//! is the implementor's concern, which is why every receiver is `&self`.

use crate::error::ProviderError;

use super::traits::{ItemFlags, Orientation, SortOrder};
use super::value::CellValue;

/// Identity of an item as assigned by the data provider.
///
/// Handles are opaque to the bridge: it derives them via
/// [`DataProvider::index`], caches them, and hands them back to the
/// provider on later calls. `Option<ItemHandle>` is used throughout, with
/// `None` as the root / "no identity" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemHandle(u64);

impl ItemHandle {
    /// Wraps a provider-defined raw identity.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The provider-defined raw identity.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// External source of truth for a bridged tree/table.
///
/// Read operations (`row_count`, `column_count`, `index`, `data`, `header`,
/// `has_children`, `flags`) may be called at any time during a query or a
/// remap; an `Err` makes the bridge log once and fall back to the
/// documented safe default. `set_data` and `sort` are mutation paths: an
/// `Err` there is surfaced to the caller and nothing is cached.
///
/// All calls happen on the single logical thread driving the bridge; see
/// the crate-level concurrency notes.
pub trait DataProvider: Send + Sync {
    /// Number of rows under `parent` (`None` = the root). Errors and
    /// negative counts at the source are reported as `Err` and clamp to 0.
    fn row_count(&self, parent: Option<ItemHandle>) -> Result<usize, ProviderError>;

    /// Number of columns, table-wide (not per row).
    fn column_count(&self) -> Result<usize, ProviderError>;

    /// The identity of the item at `(row, column)` under `parent`.
    ///
    /// `Ok(None)` means the position exists but carries no identity.
    fn index(
        &self,
        row: usize,
        column: usize,
        parent: Option<ItemHandle>,
    ) -> Result<Option<ItemHandle>, ProviderError>;

    /// The payload of one cell. `Ok(CellValue::None)` is a valid empty
    /// cell, distinct from `Err`.
    fn data(&self, item: ItemHandle) -> Result<CellValue, ProviderError>;

    /// Header payload for a row (`Vertical`) or column (`Horizontal`)
    /// section.
    fn header(&self, section: usize, orientation: Orientation) -> Result<CellValue, ProviderError>;

    /// Writes a new payload for one cell.
    fn set_data(&self, item: ItemHandle, value: CellValue) -> Result<(), ProviderError>;

    /// Whether the item has children, when the source can answer cheaply.
    ///
    /// `Ok(None)` means "unknown"; the bridge then falls back to
    /// `row_count > 0`. That fallback is the default.
    fn has_children(&self, item: Option<ItemHandle>) -> Result<Option<bool>, ProviderError> {
        let _ = item;
        Ok(None)
    }

    /// Interaction flags for one item. Defaults to selectable + enabled.
    fn flags(&self, item: ItemHandle) -> Result<ItemFlags, ProviderError> {
        let _ = item;
        Ok(ItemFlags::new())
    }

    /// Re-orders the source by `column`. `Ok(true)` means the data moved
    /// and the bridge must re-derive everything it cached; `Ok(false)`
    /// (the default) means sorting is unsupported or was a no-op.
    fn sort(&self, column: usize, order: SortOrder) -> Result<bool, ProviderError> {
        let _ = (column, order);
        Ok(false)
    }
}
