//! The lazy model/view bridge.
//!
//! This module presents an externally owned, on-demand tree/table dataset
//! to a view layer that requires stable `(row, column, parent)` addressing
//! and durable references across structural mutations. It reconciles three
//! conflicting requirements:
//!
//! - the source of truth for counts and content lives outside the bridge
//!   and may be expensive or side-effecting to query, so every answer is
//!   cached and only re-fetched on explicit invalidation;
//! - the consuming view holds long-lived references (selection, editing,
//!   scroll anchors) that must remain valid, or be explicitly nulled,
//!   across inserts, removes, and re-sorts;
//! - change reports arrive as coarse `(position, count)` deltas and must
//!   be translated into cache invalidation, index renumbering, and change
//!   notifications.
//!
//! # Core Types
//!
//! - [`ModelIndex`]: Identifies a position in the bridged tree
//! - [`PersistentIndex`]: A durable reference the bridge rewrites in place
//! - [`CellValue`]: Type-erased cell/header payload
//! - [`DataProvider`]: The trait an external data source implements
//! - [`ModelBridge`]: The coordinator presenting a provider as a model
//! - [`ItemModel`]: The trait views consume
//! - [`ModelSignals`]: Change notifications
//! - [`SourceChange`]: The provider's change-report ingress
//!
//! # Example
//!
//! ```ignore
//! use trellis::model::{ItemModel, ModelBridge, ModelIndex, SourceChange};
//!
//! let bridge = ModelBridge::new(my_provider);
//! let root = ModelIndex::invalid();
//!
//! // Lazy queries: the provider is consulted once per fact.
//! for row in 0..bridge.row_count(&root) {
//!     let index = bridge.index(row, 0, &root);
//!     println!("{:?}", bridge.data(&index));
//! }
//!
//! // A durable reference survives structural changes.
//! let anchor = bridge.persistent_index(&bridge.index(1, 0, &root));
//! bridge.notify(SourceChange::RowsAdded { parent: root, position: 0, count: 3 })?;
//! assert_eq!(anchor.index().row(), 4);
//! ```
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────┐  lazy fetch   ┌─────────────┐    signals    ┌──────┐
//! │ DataProvider │──────────────>│ ModelBridge │──────────────>│ View │
//! │  (external)  │<──────────────│  TreeCache  │<──────────────│      │
//! └──────────────┘  notify(...)  └─────────────┘   queries     └──────┘
//!                                       │
//!                                       │ capture / remap
//!                                       v
//!                               ┌─────────────────┐
//!                               │ PersistentIndex │
//!                               └─────────────────┘
//! ```
//!
//! Queries resolve through the node cache and hit the provider at most
//! once per fact. Mutation reports run as one synchronous transaction:
//! capture references, mutate the cache, re-derive the references, notify
//! the view.

mod bridge;
mod cache;
mod index;
mod persist;
mod provider;
mod traits;
mod value;

pub use bridge::{BridgeOptions, ModelBridge, SourceChange};
pub use cache::Axis;
pub use index::{ModelIndex, PersistentIndex};
pub use provider::{DataProvider, ItemHandle};
pub use traits::{ItemFlags, ItemModel, ModelSignals, Orientation, SortOrder};
pub use value::CellValue;
