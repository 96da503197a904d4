//! Compiler and interpreter collaborator interface.
//!
//! The engine never looks inside an executable. A [`Backend`] compiles source
//! files into its own executable type, describes entrypoints for argument
//! binding, and runs an entrypoint against a state through [`RunContext`].

use rkyv::{Archive, Deserialize, Serialize};

use crate::charge::ChargeMeter;
use crate::state::IoObserver;
use crate::value::{Value, ValueType};

/// One named source file handed to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Declared shape of an entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointSignature {
    pub name: String,
    pub parameter_types: Vec<ValueType>,
}

impl EntrypointSignature {
    pub fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }
}

/// Outcome of one interpreter invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Execution {
    pub output: Value,
    /// Error text raised by the program, if any.
    pub runtime_error: Option<String>,
    /// Explicit failure flag, independent of `runtime_error`.
    pub ok: bool,
}

impl Execution {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            runtime_error: None,
            ok: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            output: Value::Unit,
            runtime_error: Some(message.into()),
            ok: false,
        }
    }

    /// Whether the run counts as successful.
    ///
    /// An empty error string does not count as an error.
    pub fn succeeded(&self) -> bool {
        self.ok && self.runtime_error.as_deref().is_none_or(str::is_empty)
    }
}

/// Everything a run may touch besides the executable.
pub struct RunContext<'a> {
    /// The bound state.
    pub io: &'a mut dyn IoObserver,
    /// Captured standard output.
    pub stdout: &'a mut String,
    /// Charge budget for VM-bound calls.
    pub meter: &'a mut ChargeMeter,
}

/// The scripting language behind an engine.
pub trait Backend: Send + Sync + 'static {
    type Executable: Send + Sync + 'static;

    /// Compile `sources`; any diagnostic fails the whole compilation.
    fn compile(&self, sources: &[SourceFile]) -> Result<Self::Executable, Vec<String>>;

    fn find_entrypoint(
        &self,
        executable: &Self::Executable,
        name: &str,
    ) -> Option<EntrypointSignature>;

    /// Run `entrypoint`. `params` are already converted to the declared types
    /// when the caller supplied any; otherwise the slice is empty.
    fn execute(
        &self,
        executable: &Self::Executable,
        entrypoint: &str,
        params: &[Value],
        ctx: &mut RunContext<'_>,
    ) -> Execution;
}
