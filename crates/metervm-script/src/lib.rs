//! Reference script backend for metervm.
//!
//! A small line-oriented language whose programs read and write state
//! through the engine's I/O observer and price model and tensor bindings
//! through the run's charge meter. See [`parser`] for the syntax.

mod interpreter;
pub mod parser;

use metervm_core::{
    Backend, EntrypointSignature, Execution, RunContext, SourceFile, Value,
};

pub use parser::Program;

/// [`Backend`] running metervm scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptBackend;

impl ScriptBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for ScriptBackend {
    type Executable = Program;

    fn compile(&self, sources: &[SourceFile]) -> Result<Program, Vec<String>> {
        let program = parser::parse(sources)?;
        tracing::debug!(
            "Compiled {} source files into {} entrypoints",
            sources.len(),
            program.entry_names().len()
        );
        Ok(program)
    }

    fn find_entrypoint(&self, program: &Program, name: &str) -> Option<EntrypointSignature> {
        program.entry(name).map(|entry| EntrypointSignature {
            name: entry.name.clone(),
            parameter_types: entry.parameter_types(),
        })
    }

    fn execute(
        &self,
        program: &Program,
        entrypoint: &str,
        params: &[Value],
        ctx: &mut RunContext<'_>,
    ) -> Execution {
        match program.entry(entrypoint) {
            Some(entry) => interpreter::Machine::new(entry, params, ctx).run(),
            None => Execution::failure(format!("entrypoint `{}` not found", entrypoint)),
        }
    }
}
