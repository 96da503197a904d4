//! Check command: compile only.

use std::path::PathBuf;

use metervm_core::Backend;
use metervm_script::ScriptBackend;

use crate::sources;

/// Compile `files` and list their entrypoints, or print the diagnostics.
pub fn execute(files: &[PathBuf]) -> anyhow::Result<()> {
    let sources = sources::load(files)?;

    match ScriptBackend::new().compile(&sources) {
        Ok(program) => {
            for name in program.entry_names() {
                if let Some(entry) = program.entry(name) {
                    let params: Vec<String> = entry
                        .params
                        .iter()
                        .map(|p| format!("{}: {}", p.name, p.ty))
                        .collect();
                    println!("{}({})", name, params.join(", "));
                }
            }
            Ok(())
        }
        Err(diagnostics) => {
            for diagnostic in &diagnostics {
                eprintln!("{}", diagnostic);
            }
            anyhow::bail!("compilation failed with {} diagnostics", diagnostics.len())
        }
    }
}
