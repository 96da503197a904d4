//! metervm CLI - compile, run and price metered scripts.

mod check;
mod estimate;
mod run;
mod sources;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "metervm")]
#[command(about = "Compile, run and price metered scripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile scripts and run one entrypoint against a state
    Run {
        /// Script files (.mvs)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Entrypoint to call
        #[arg(short, long, default_value = "main")]
        entry: String,

        /// State the run reads and writes
        #[arg(short, long, default_value = "default")]
        state: String,

        /// Directory states are restored from and flushed to
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Entrypoint argument, in declaration order (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Charge budget for the run
        #[arg(long)]
        charge_limit: Option<u64>,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compile scripts and report diagnostics without running
    Check {
        /// Script files (.mvs)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the charge the estimators assign to a model
    Estimate {
        #[command(subcommand)]
        model: estimate::Model,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        }
        .into(),
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            files,
            entry,
            state,
            state_dir,
            params,
            charge_limit,
            config,
        } => {
            let options = run::RunOptions {
                entry,
                state,
                state_dir,
                params,
                charge_limit,
                config,
            };
            run::execute(&files, options).await?;
        }

        Commands::Check { files } => check::execute(&files)?,

        Commands::Estimate { model } => estimate::execute(&model),
    }

    Ok(())
}
