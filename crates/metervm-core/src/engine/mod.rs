//! Execution engine.
//!
//! This module provides:
//! - The stage x code outcome taxonomy and serializable results
//! - Operations as routable data
//! - The per-target engine implementing lifecycle operations and runs

mod executor;
mod operation;
mod result;

pub use executor::ExecutionEngine;
pub use operation::Operation;
pub use result::{ErrorCode, ErrorStage, ExecutionError, ExecutionResult};
