//! Engine operations as data, so they can be routed and shipped.

use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::value::Value;
use crate::vm::SourceFile;

/// One engine operation against a single target.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum Operation {
    CreateExecutable {
        name: String,
        sources: Vec<SourceFile>,
    },
    DeleteExecutable {
        name: String,
    },
    CreateState {
        name: String,
    },
    CopyState {
        source: String,
        destination: String,
    },
    DeleteState {
        name: String,
    },
    Run {
        executable: String,
        state: String,
        entrypoint: String,
        /// Arguments to bind against the entrypoint's declared types.
        params: Option<Vec<Value>>,
    },
}

impl Operation {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateExecutable { .. } => "create_executable",
            Operation::DeleteExecutable { .. } => "delete_executable",
            Operation::CreateState { .. } => "create_state",
            Operation::CopyState { .. } => "copy_state",
            Operation::DeleteState { .. } => "delete_state",
            Operation::Run { .. } => "run",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateExecutable { name, sources } => {
                write!(f, "create_executable {} ({} files)", name, sources.len())
            }
            Operation::DeleteExecutable { name } => write!(f, "delete_executable {}", name),
            Operation::CreateState { name } => write!(f, "create_state {}", name),
            Operation::CopyState {
                source,
                destination,
            } => write!(f, "copy_state {} -> {}", source, destination),
            Operation::DeleteState { name } => write!(f, "delete_state {}", name),
            Operation::Run {
                executable,
                state,
                entrypoint,
                ..
            } => write!(f, "run {}::{} with {}", executable, entrypoint, state),
        }
    }
}
