//! Run command implementation.
//!
//! Compiles the scripts into a fresh local target, restores states from the
//! state directory, runs one entrypoint and flushes the states back.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use metervm_core::{
    DEFAULT_LOCAL_TARGET, EngineConfig, ExecutionResult, StateStore, TargetRouter, Value,
};
use metervm_script::ScriptBackend;

use crate::sources;

const EXECUTABLE: &str = "cli";

pub struct RunOptions {
    pub entry: String,
    pub state: String,
    pub state_dir: Option<PathBuf>,
    pub params: Vec<String>,
    pub charge_limit: Option<u64>,
    pub config: Option<PathBuf>,
}

/// Run `files` and print the captured output.
pub async fn execute(files: &[PathBuf], options: RunOptions) -> anyhow::Result<()> {
    let mut config = match &options.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if options.charge_limit.is_some() {
        config.charge_limit = options.charge_limit;
    }
    if options.state_dir.is_some() {
        config.state_dir = options.state_dir.clone();
    }

    let target = config
        .targets
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_LOCAL_TARGET.to_string());
    let state_dir = config.state_dir.clone();

    let router = TargetRouter::new(Arc::new(ScriptBackend::new()), config);
    router.create_target(&target);
    let engine = router
        .engine(&target)
        .with_context(|| format!("target {} is not local", target))?;

    if let Some(dir) = &state_dir {
        let restored = engine.states().restore(dir)?;
        tracing::debug!("Restored {} states from {}", restored, dir.display());
    }

    let sources = sources::load(files)?;
    let created = router
        .create_executable(&target, EXECUTABLE, sources)
        .recv()
        .await?;
    if !created.is_success() {
        return Err(failure(&created));
    }

    if !engine.states().contains(&options.state) {
        let created = router.create_state(&target, &options.state).recv().await?;
        if !created.is_success() {
            return Err(failure(&created));
        }
    }

    let params: Vec<Value> = options
        .params
        .iter()
        .map(|p| Value::parse_literal(p))
        .collect();
    let result = router
        .run(&target, EXECUTABLE, &options.state, &options.entry, Some(params))
        .recv()
        .await?;

    print!("{}", result.summary);

    // Runs keep their partial writes, so flush even after a failure.
    if let Some(dir) = &state_dir {
        engine
            .states()
            .flush(dir)
            .with_context(|| format!("failed to flush states to {}", dir.display()))?;
    }

    if !result.is_success() {
        return Err(failure(&result));
    }
    if !result.output.is_unit() {
        println!("=> {}", result.output);
    }
    Ok(())
}

fn failure(result: &ExecutionResult) -> anyhow::Error {
    anyhow::anyhow!("{}", result.error)
}
