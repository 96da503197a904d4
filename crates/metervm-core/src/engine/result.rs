//! Outcome taxonomy for engine operations.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Where an operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize)]
pub enum ErrorStage {
    Engine,
    Compile,
    Running,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize)]
pub enum ErrorCode {
    Success,
    BadExecutable,
    BadState,
    /// The destination of a state copy already exists.
    BadDestination,
    BadTarget,
    CompilationError,
    RuntimeError,
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorStage::Engine => "ENGINE",
            ErrorStage::Compile => "COMPILE",
            ErrorStage::Running => "RUNNING",
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::BadExecutable => "BAD_EXECUTABLE",
            ErrorCode::BadState => "BAD_STATE",
            ErrorCode::BadDestination => "BAD_DESTINATION",
            ErrorCode::BadTarget => "BAD_TARGET",
            ErrorCode::CompilationError => "COMPILATION_ERROR",
            ErrorCode::RuntimeError => "RUNTIME_ERROR",
        })
    }
}

/// Stage, code and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct ExecutionError {
    pub stage: ErrorStage,
    pub code: ErrorCode,
    pub message: String,
}

impl ExecutionError {
    pub fn new(stage: ErrorStage, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}/{}", self.stage, self.code)
        } else {
            write!(f, "{}/{}: {}", self.stage, self.code, self.message)
        }
    }
}

/// The result of one engine operation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: Value,
    pub error: ExecutionError,
    /// Human-readable summary. For runs, the captured standard output.
    pub summary: String,
}

impl ExecutionResult {
    pub fn new(output: Value, error: ExecutionError, summary: impl Into<String>) -> Self {
        Self {
            output,
            error,
            summary: summary.into(),
        }
    }

    /// A failure with no output, where the summary repeats the message.
    pub fn failure(stage: ErrorStage, code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            output: Value::Unit,
            summary: message.clone(),
            error: ExecutionError::new(stage, code, message),
        }
    }

    /// `ENGINE/SUCCESS` with a summary.
    pub fn engine_success(summary: impl Into<String>) -> Self {
        Self::new(
            Value::Unit,
            ExecutionError::new(ErrorStage::Engine, ErrorCode::Success, ""),
            summary,
        )
    }

    pub fn engine_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::failure(ErrorStage::Engine, code, message)
    }

    pub fn bad_target(target: &str) -> Self {
        Self::engine_error(
            ErrorCode::BadTarget,
            format!("Error: target {} is not known.", target),
        )
    }

    pub fn stage(&self) -> ErrorStage {
        self.error.stage
    }

    pub fn code(&self) -> ErrorCode {
        self.error.code
    }

    pub fn is_success(&self) -> bool {
        self.error.is_success()
    }

    /// Serialize for transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Serialization(format!("Failed to encode result: {}", e)))
    }

    /// Decode bytes produced by [`ExecutionResult::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<ExecutionResult, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(format!("Failed to decode result: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ExecutionError::new(ErrorStage::Engine, ErrorCode::BadDestination, "b exists");
        assert_eq!(err.to_string(), "ENGINE/BAD_DESTINATION: b exists");

        let ok = ExecutionError::new(ErrorStage::Running, ErrorCode::Success, "");
        assert_eq!(ok.to_string(), "RUNNING/SUCCESS");
    }

    #[test]
    fn test_bytes_are_stable() {
        let result = ExecutionResult::new(
            Value::Float64(0.5),
            ExecutionError::new(ErrorStage::Running, ErrorCode::RuntimeError, "division by zero"),
            "partial output\n",
        );

        let bytes = result.to_bytes().unwrap();
        let decoded = ExecutionResult::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, result);
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(ExecutionResult::from_bytes(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_bad_target() {
        let result = ExecutionResult::bad_target("remote://x");
        assert_eq!(result.stage(), ErrorStage::Engine);
        assert_eq!(result.code(), ErrorCode::BadTarget);
        assert!(!result.is_success());
        assert!(result.error.message.contains("remote://x"));
    }
}
