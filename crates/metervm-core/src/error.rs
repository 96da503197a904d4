//! Error types for metervm-core.
//!
//! Engine outcomes (bad names, compilation failures, runtime errors) are not
//! errors in this sense; they are reported as [`ExecutionResult`] values.
//! This enum covers the infrastructure around the engine.
//!
//! [`ExecutionResult`]: crate::engine::ExecutionResult

use std::time::Duration;

use thiserror::Error;

/// Result type for metervm-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in metervm-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Framing or transport error on a message stream.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The producing side of a promise went away without a result.
    #[error("promise broken: {0}")]
    PromiseBroken(String),

    /// A caller-side deadline passed before the promise was fulfilled.
    #[error("timed out after {0:?} waiting for result")]
    Timeout(Duration),

    /// The delivery collaborator refused a message.
    #[error("delivery error: {0}")]
    Delivery(String),
}
