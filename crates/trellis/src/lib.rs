//! Trellis — a lazy model/view bridge for externally owned hierarchical
//! data.
//!
//! Trellis sits between a data source it does not own and a view layer
//! that expects stable `(row, column, parent)` addressing: counts,
//! identities, and cell payloads are fetched on demand and cached;
//! structural change reports are translated into cache invalidation,
//! renumbering, and view signals; durable references survive inserts,
//! removes, and sorts, or are explicitly nulled when their position is
//! destroyed.
//!
//! The crate is organized around:
//!
//! - [`model::DataProvider`] — the trait an external source implements
//! - [`model::ModelBridge`] — the coordinator presenting that source as an
//!   [`model::ItemModel`]
//! - [`model::PersistentIndex`] — durable references rewritten across
//!   mutations
//!
//! Provider failures never reach the view: read-path errors are logged
//! once and degrade to empty cells and zero counts, mutation-path errors
//! abort without touching the cache.
//!
//! Logging goes through the `tracing` crate; install a subscriber (e.g.
//! `tracing_subscriber::fmt::init()`) to see it.

pub mod error;
pub mod model;

pub use error::{ModelError, ProviderError, Result};
pub use trellis_core::{ConnectionGuard, ConnectionId, Signal};
