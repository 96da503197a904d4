//! Execution engine for one target.
//!
//! Owns the executable and state stores of a target and implements the
//! lifecycle operations and the run protocol on top of a [`Backend`].

use std::sync::{Arc, PoisonError};

use crate::charge::ChargeMeter;
use crate::executable::{ExecutableRegistry, ExecutableStore};
use crate::state::{SharedState, State, StateRegistry, StateStore};
use crate::value::{Value, try_convert};
use crate::vm::{Backend, RunContext, SourceFile};

use super::operation::Operation;
use super::result::{ErrorCode, ErrorStage, ExecutionError, ExecutionResult};

/// Engine for one target.
///
/// Map lookups lock only the stores. A run holds its state's mutex for the
/// whole interpretation, and compilation holds no lock at all.
pub struct ExecutionEngine<
    B: Backend,
    X = ExecutableRegistry<<B as Backend>::Executable>,
    S = StateRegistry,
> {
    backend: Arc<B>,
    executables: X,
    states: S,
    charge_limit: Option<u64>,
}

impl<B: Backend> ExecutionEngine<B> {
    /// Create an engine with empty in-memory stores.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_stores(backend, ExecutableRegistry::new(), StateRegistry::new())
    }
}

impl<B, X, S> ExecutionEngine<B, X, S>
where
    B: Backend,
    X: ExecutableStore<B::Executable>,
    S: StateStore,
{
    /// Create an engine over caller-supplied stores.
    pub fn with_stores(backend: Arc<B>, executables: X, states: S) -> Self {
        Self {
            backend,
            executables,
            states,
            charge_limit: None,
        }
    }

    /// Per-run charge budget. `None` admits any bounded charge.
    pub fn with_charge_limit(mut self, limit: Option<u64>) -> Self {
        self.charge_limit = limit;
        self
    }

    pub fn charge_limit(&self) -> Option<u64> {
        self.charge_limit
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn executables(&self) -> &X {
        &self.executables
    }

    pub fn states(&self) -> &S {
        &self.states
    }

    /// Execute one operation.
    pub fn apply(&self, operation: &Operation) -> ExecutionResult {
        match operation {
            Operation::CreateExecutable { name, sources } => self.create_executable(name, sources),
            Operation::DeleteExecutable { name } => self.delete_executable(name),
            Operation::CreateState { name } => self.create_state(name),
            Operation::CopyState {
                source,
                destination,
            } => self.copy_state(source, destination),
            Operation::DeleteState { name } => self.delete_state(name),
            Operation::Run {
                executable,
                state,
                entrypoint,
                params,
            } => self.run(executable, state, entrypoint, params.as_deref()),
        }
    }

    /// Compile `sources` and register the result under `name`.
    pub fn create_executable(&self, name: &str, sources: &[SourceFile]) -> ExecutionResult {
        if self.executables.contains(name) {
            return rejected(
                ErrorCode::BadExecutable,
                format!("Error: executable {} already exists.", name),
            );
        }

        let executable = match self.backend.compile(sources) {
            Ok(executable) => executable,
            Err(diagnostics) => {
                tracing::debug!(
                    "Compilation of {} failed with {} diagnostics",
                    name,
                    diagnostics.len()
                );
                return ExecutionResult::new(
                    Value::Unit,
                    ExecutionError::new(
                        ErrorStage::Compile,
                        ErrorCode::CompilationError,
                        diagnostics.join("\n"),
                    ),
                    format!("Compilation error: Did not create {}", name),
                );
            }
        };

        // Another caller may have registered the name while we compiled.
        if !self.executables.insert(name, executable) {
            return rejected(
                ErrorCode::BadExecutable,
                format!("Error: executable {} already exists.", name),
            );
        }

        tracing::debug!("Created executable {}", name);
        ExecutionResult::engine_success(format!("Created executable {}", name))
    }

    pub fn delete_executable(&self, name: &str) -> ExecutionResult {
        if !self.executables.remove(name) {
            return rejected(
                ErrorCode::BadExecutable,
                format!("Error: executable {} does not exist.", name),
            );
        }

        tracing::debug!("Deleted executable {}", name);
        ExecutionResult::engine_success(format!("Deleted executable {}", name))
    }

    pub fn create_state(&self, name: &str) -> ExecutionResult {
        if !self.states.insert(name, State::new()) {
            return rejected(
                ErrorCode::BadState,
                format!("Error: state {} already exists.", name),
            );
        }

        tracing::debug!("Created state {}", name);
        ExecutionResult::engine_success(format!("Created state {}", name))
    }

    /// Register an independent copy of `source` under `destination`.
    pub fn copy_state(&self, source: &str, destination: &str) -> ExecutionResult {
        let Some(shared) = self.states.get(source) else {
            return rejected(
                ErrorCode::BadState,
                format!("Error: state {} does not exist.", source),
            );
        };
        if self.states.contains(destination) {
            return rejected(
                ErrorCode::BadDestination,
                format!("Error: state {} already exists.", destination),
            );
        }

        let copy = {
            let guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
            // The source may have been deleted while we waited for it.
            if !self.is_registered(source, &shared) {
                return rejected(
                    ErrorCode::BadState,
                    format!("Error: state {} does not exist.", source),
                );
            }
            guard.deep_copy()
        };

        if !self.states.insert(destination, copy) {
            return rejected(
                ErrorCode::BadDestination,
                format!("Error: state {} already exists.", destination),
            );
        }

        tracing::debug!("Copied state {} to {}", source, destination);
        ExecutionResult::engine_success(format!("Copied state {} to {}", source, destination))
    }

    /// Remove `name`, waiting for any in-flight run on it to finish.
    pub fn delete_state(&self, name: &str) -> ExecutionResult {
        let missing = || {
            rejected(
                ErrorCode::BadState,
                format!("Error: state {} does not exist.", name),
            )
        };

        let Some(shared) = self.states.get(name) else {
            return missing();
        };

        let _guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.states.remove(name, &shared) {
            return missing();
        }

        tracing::debug!("Deleted state {}", name);
        ExecutionResult::engine_success(format!("Deleted state {}", name))
    }

    /// Run `entrypoint` of `executable` against `state`.
    ///
    /// Preconditions are checked in order (executable, then state) and the
    /// first failure is reported without touching anything after it. When
    /// `params` is supplied it is bound against the entrypoint's declared
    /// parameter types before the interpreter is invoked.
    ///
    /// State writes made before a runtime error are kept.
    pub fn run(
        &self,
        executable: &str,
        state: &str,
        entrypoint: &str,
        params: Option<&[Value]>,
    ) -> ExecutionResult {
        let Some(exe) = self.executables.get(executable) else {
            return rejected(
                ErrorCode::BadExecutable,
                format!("Error: executable {} does not exist.", executable),
            );
        };

        let Some(shared) = self.states.get(state) else {
            return rejected(
                ErrorCode::BadState,
                format!("Error: state {} does not exist.", state),
            );
        };

        let bound = match params {
            Some(params) => match self.bind_params(&exe, executable, entrypoint, params) {
                Ok(bound) => bound,
                Err(message) => {
                    tracing::warn!("Rejected run of {}: {}", executable, message);
                    return ExecutionResult::failure(
                        ErrorStage::Running,
                        ErrorCode::RuntimeError,
                        message,
                    );
                }
            },
            None => Vec::new(),
        };

        let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);

        // The state may have been deleted while we waited for it.
        if !self.is_registered(state, &shared) {
            return rejected(
                ErrorCode::BadState,
                format!("Error: state {} does not exist.", state),
            );
        }

        tracing::debug!("Running {}::{} with state {}", executable, entrypoint, state);

        let mut stdout = String::new();
        let mut meter = ChargeMeter::new(self.charge_limit);
        let execution = {
            let mut ctx = RunContext {
                io: &mut *guard,
                stdout: &mut stdout,
                meter: &mut meter,
            };
            self.backend.execute(&exe, entrypoint, &bound, &mut ctx)
        };
        drop(guard);

        tracing::debug!(
            "Ran {} with state {} (charge {})",
            executable,
            state,
            meter.total()
        );

        if execution.succeeded() {
            return ExecutionResult::new(
                execution.output,
                ExecutionError::new(ErrorStage::Running, ErrorCode::Success, ""),
                stdout,
            );
        }

        let message = match execution.runtime_error {
            Some(text) if !text.is_empty() => text,
            _ => format!("Error running {} with state {}", executable, state),
        };
        ExecutionResult::new(
            execution.output,
            ExecutionError::new(ErrorStage::Running, ErrorCode::RuntimeError, message),
            stdout,
        )
    }

    /// Whether `name` still refers to `shared`.
    fn is_registered(&self, name: &str, shared: &SharedState) -> bool {
        self.states
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(&current, shared))
    }

    fn bind_params(
        &self,
        exe: &B::Executable,
        executable: &str,
        entrypoint: &str,
        params: &[Value],
    ) -> Result<Vec<Value>, String> {
        let signature = self
            .backend
            .find_entrypoint(exe, entrypoint)
            .ok_or_else(|| {
                format!(
                    "Error: entrypoint {} not found in {}.",
                    entrypoint, executable
                )
            })?;

        if signature.parameter_count() != params.len() {
            return Err(format!(
                "Error: {} expects {} parameters, got {}.",
                entrypoint,
                signature.parameter_count(),
                params.len()
            ));
        }

        params
            .iter()
            .zip(&signature.parameter_types)
            .enumerate()
            .map(|(i, (value, ty))| {
                try_convert(value, *ty)
                    .map_err(|e| format!("Error: parameter {} of {}: {}.", i, entrypoint, e))
            })
            .collect()
    }
}

fn rejected(code: ErrorCode, message: String) -> ExecutionResult {
    tracing::warn!("{}", message);
    ExecutionResult::engine_error(code, message)
}
