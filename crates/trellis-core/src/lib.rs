//! Core systems for Trellis.
//!
//! This crate provides the foundational components of the Trellis model
//! bridge:
//!
//! - **Signal/Slot System**: Type-safe change notification between the
//!   model layer and its consumers
//! - **Logging**: `tracing` target constants for per-subsystem filtering
//!
//! # Signal/Slot Example
//!
//! ```
//! use trellis_core::Signal;
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! value_changed.disconnect(conn_id);
//! ```

pub mod logging;
mod signal;

pub use signal::{ConnectionGuard, ConnectionId, Signal};

use static_assertions::assert_impl_all;

assert_impl_all!(Signal<()>: Send, Sync);
assert_impl_all!(Signal<(usize, usize)>: Send, Sync);
