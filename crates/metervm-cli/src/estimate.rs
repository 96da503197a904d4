//! Estimate command: price a model without running anything.

use clap::Subcommand;
use metervm_core::{ChargeAmount, ModelEstimator};

#[derive(Subcommand)]
pub enum Model {
    /// A single dense layer, optionally compiled
    Dense {
        /// Input width
        inputs: u64,

        /// Output width
        outputs: u64,

        /// Add a relu activation
        #[arg(long)]
        relu: bool,

        /// Loss to compile with (mse, cel, scel)
        #[arg(long, requires = "optimiser")]
        loss: Option<String>,

        /// Optimiser to compile with (adam, sgd)
        #[arg(long, requires = "loss")]
        optimiser: Option<String>,
    },
}

pub fn execute(model: &Model) {
    match model {
        Model::Dense {
            inputs,
            outputs,
            relu,
            loss,
            optimiser,
        } => {
            let mut estimator = ModelEstimator::new();
            let layer = if *relu {
                estimator.layer_add_dense_activation("dense", *inputs, *outputs, "relu")
            } else {
                estimator.layer_add_dense("dense", *inputs, *outputs)
            };
            println!("dense: {}", layer);

            let mut total = layer;
            if let (Some(loss), Some(optimiser)) = (loss, optimiser) {
                let compile = estimator.compile_sequential(loss, optimiser);
                println!("compile: {}", compile);
                total = total.saturating_add(compile);
            }
            print_total(total);
        }
    }
}

fn print_total(total: ChargeAmount) {
    println!("total: {}", total);
}
