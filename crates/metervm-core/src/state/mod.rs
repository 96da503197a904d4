//! Persistent state for metervm targets.
//!
//! This module provides:
//! - The I/O observer contract the interpreter uses to read and write state
//! - Deep-copyable byte-addressed states
//! - A per-target registry with snapshot persistence

mod registry;
mod store;

pub use registry::{SharedState, StateRegistry, StateStore};
pub use store::{IoObserver, IoStatus, State};
