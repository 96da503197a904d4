//! Charge estimation for the sequential model builder bindings.
//!
//! Each method mirrors one model binding and prices it from its declared
//! arguments plus a [`CostAccumulator`] of per-layer costs built up by
//! earlier calls. Costs are polynomials over argument magnitudes with the
//! fixed coefficients below, evaluated in saturating [`Fixed`] arithmetic.
//!
//! A call that returns [`ChargeAmount::MAX`] leaves the accumulator as it
//! was, so a refused call never skews later estimates.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::amount::{ChargeAmount, Fixed};

/// Charge units per unit of estimated compute.
pub const COMPUTE_CHARGE_COST: u64 = 1;

const fn coef(numerator: u32) -> Fixed {
    Fixed::from_ratio_pow2(numerator, 8)
}

// Dense layer construction
pub const ADD_DENSE_INPUT_COEF: Fixed = coef(32);
pub const ADD_DENSE_OUTPUT_COEF: Fixed = coef(64);
pub const ADD_DENSE_QUAD_COEF: Fixed = coef(16);
pub const ADD_DENSE_CONST_COEF: Fixed = coef(1024);

// Per-sample pass costs contributed by a dense layer
pub const FORWARD_DENSE_INPUT_COEF: Fixed = coef(8);
pub const FORWARD_DENSE_OUTPUT_COEF: Fixed = coef(8);
pub const FORWARD_DENSE_QUAD_COEF: Fixed = coef(4);
pub const BACKWARD_DENSE_INPUT_COEF: Fixed = coef(16);
pub const BACKWARD_DENSE_OUTPUT_COEF: Fixed = coef(16);
pub const BACKWARD_DENSE_QUAD_COEF: Fixed = coef(8);

// Activations, losses and metrics, per output node
pub const RELU_FORWARD_IMPACT: Fixed = coef(4);
pub const RELU_BACKWARD_IMPACT: Fixed = coef(8);
pub const MSE_FORWARD_IMPACT: Fixed = coef(12);
pub const MSE_BACKWARD_IMPACT: Fixed = coef(24);
pub const CEL_FORWARD_IMPACT: Fixed = coef(20);
pub const CEL_BACKWARD_IMPACT: Fixed = coef(40);
pub const SCEL_FORWARD_IMPACT: Fixed = coef(28);
pub const SCEL_BACKWARD_IMPACT: Fixed = coef(48);
pub const CATEGORICAL_ACCURACY_FORWARD_IMPACT: Fixed = coef(16);

// Optimisers
pub const ADAM_STEP_IMPACT_COEF: Fixed = coef(12);
pub const ADAM_PADDED_WEIGHTS_SIZE_COEF: Fixed = coef(24);
pub const ADAM_WEIGHTS_SIZE_COEF: Fixed = coef(16);
pub const SGD_STEP_IMPACT_COEF: Fixed = coef(4);
pub const SGD_PADDED_WEIGHTS_SIZE_COEF: Fixed = coef(8);
pub const SGD_WEIGHTS_SIZE_COEF: Fixed = coef(4);
pub const COMPILE_CONST_COEF: Fixed = coef(2048);

// Training and inference
pub const PREDICT_BATCH_LAYER_COEF: Fixed = coef(64);
pub const PREDICT_CONST_COEF: Fixed = coef(4096);
pub const BACKWARD_BATCH_LAYER_COEF: Fixed = coef(128);
pub const BACKWARD_PER_BATCH_COEF: Fixed = coef(512);
pub const FIT_CONST_COEF: Fixed = coef(8192);

// Model (de)serialisation
pub const SERIALISATION_PER_OP_COEF: Fixed = coef(256);
pub const SERIALISATION_PADDED_WEIGHT_SUM_COEF: Fixed = coef(8);
pub const SERIALISATION_WEIGHT_SUM_COEF: Fixed = coef(16);
pub const SERIALISATION_CONST_COEF: Fixed = coef(2560);
pub const DESERIALISATION_PER_CHAR_COEF: Fixed = coef(16);
pub const DESERIALISATION_CONST_COEF: Fixed = coef(2560);

/// Running cost totals for one model pipeline.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct CostAccumulator {
    /// Per-sample forward pass cost.
    pub forward_pass_cost: Fixed,
    /// Per-sample backward pass cost.
    pub backward_pass_cost: Fixed,
    /// Cost of evaluating the configured metrics.
    pub metrics_cost: Fixed,
    /// Per-weight cost of one optimiser step.
    pub optimiser_step_impact: Fixed,
    pub weights_size_sum: u64,
    pub weights_padded_size_sum: u64,
    pub last_layer_size: u64,
    pub ops_count: u64,
    /// Number of samples seen by the last `fit`.
    pub subset_size: u64,
    pub loss_set: bool,
    pub optimiser_set: bool,
}

impl CostAccumulator {
    /// Encode with bincode, for persisting next to a model.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<CostAccumulator> {
        let (acc, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        Ok(acc)
    }
}

/// Storage a tensor of `shape` occupies once its leading dimension is
/// padded to a multiple of 4.
pub fn padded_size_from_shape(shape: &[u64]) -> u64 {
    let Some((&first, rest)) = shape.split_first() else {
        return 0;
    };
    let padded = first.div_ceil(4).saturating_mul(4);
    rest.iter().fold(padded, |acc, &d| acc.saturating_mul(d))
}

/// Builder-style estimator for one model.
#[derive(Debug, Clone, Default)]
pub struct ModelEstimator {
    state: CostAccumulator,
}

fn maximum_charge(reason: &str) -> ChargeAmount {
    tracing::error!("operation charge is maximum: {}", reason);
    ChargeAmount::MAX
}

fn finish(estimate: Fixed) -> ChargeAmount {
    if estimate.is_saturated() {
        return maximum_charge("estimate overflowed");
    }
    estimate.to_charge().saturating_mul(COMPUTE_CHARGE_COST)
}

fn term(coefficient: Fixed, count: u64) -> Fixed {
    coefficient.mul_count(count)
}

impl ModelEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accumulator(state: CostAccumulator) -> Self {
        Self { state }
    }

    pub fn accumulator(&self) -> &CostAccumulator {
        &self.state
    }

    pub fn copy_state_from(&mut self, other: &ModelEstimator) {
        self.state = other.state.clone();
    }

    /// Run `price` against a staged copy of the accumulator and commit it
    /// unless the result is the maximum sentinel.
    fn staged(&mut self, price: impl FnOnce(&mut CostAccumulator) -> ChargeAmount) -> ChargeAmount {
        let mut next = self.state.clone();
        let charge = price(&mut next);
        if !charge.is_max() {
            self.state = next;
        }
        charge
    }

    /// Price adding a dense layer with `inputs` inputs and `hidden_nodes`
    /// outputs.
    ///
    /// Charge: `(ADD_DENSE_INPUT_COEF·in + ADD_DENSE_OUTPUT_COEF·out +
    /// ADD_DENSE_QUAD_COEF·in·out + ADD_DENSE_CONST_COEF) · COMPUTE_CHARGE_COST`.
    pub fn layer_add_dense(&mut self, layer: &str, inputs: u64, hidden_nodes: u64) -> ChargeAmount {
        if layer != "dense" {
            return maximum_charge(&format!("unknown layer type `{}`", layer));
        }
        self.staged(|acc| add_dense(acc, inputs, hidden_nodes))
    }

    /// Dense layer followed by an activation. Only `relu` can be priced.
    pub fn layer_add_dense_activation(
        &mut self,
        layer: &str,
        inputs: u64,
        hidden_nodes: u64,
        activation: &str,
    ) -> ChargeAmount {
        if layer != "dense" {
            return maximum_charge(&format!("unknown layer type `{}`", layer));
        }
        if activation != "relu" {
            return maximum_charge(&format!("unknown activation `{}`", activation));
        }

        self.staged(|acc| {
            let charge = add_dense(acc, inputs, hidden_nodes);
            acc.forward_pass_cost = acc
                .forward_pass_cost
                .saturating_add(term(RELU_FORWARD_IMPACT, hidden_nodes));
            acc.backward_pass_cost = acc
                .backward_pass_cost
                .saturating_add(term(RELU_BACKWARD_IMPACT, hidden_nodes));
            acc.ops_count = acc.ops_count.saturating_add(1);
            charge
        })
    }

    pub fn layer_add_dense_activation_experimental(
        &mut self,
        _layer: &str,
        _inputs: u64,
        _hidden_nodes: u64,
        _activation: &str,
    ) -> ChargeAmount {
        maximum_charge("attempted to estimate experimental layer")
    }

    pub fn layer_add_conv(
        &mut self,
        _layer: &str,
        _output_channels: u64,
        _input_channels: u64,
        _kernel_size: u64,
        _stride_size: u64,
    ) -> ChargeAmount {
        maximum_charge("convolution layers cannot be priced")
    }

    pub fn layer_add_conv_activation(
        &mut self,
        _layer: &str,
        _output_channels: u64,
        _input_channels: u64,
        _kernel_size: u64,
        _stride_size: u64,
        _activation: &str,
    ) -> ChargeAmount {
        maximum_charge("convolution layers cannot be priced")
    }

    /// Price compiling the model with `loss` (`mse`, `cel`, `scel`) and
    /// `optimiser` (`adam`, `sgd`).
    ///
    /// Charge: `(P·padded_weights + W·weights + COMPILE_CONST_COEF) ·
    /// COMPUTE_CHARGE_COST` where `P` and `W` are the optimiser's padded and
    /// plain weight coefficients.
    ///
    /// A loss or optimiser already set by an earlier compile is not
    /// re-priced; compiling a model that has both set is refused.
    pub fn compile_sequential(&mut self, loss: &str, optimiser: &str) -> ChargeAmount {
        self.staged(|acc| compile(acc, loss, optimiser))
    }

    /// As [`ModelEstimator::compile_sequential`], also pricing per-call
    /// metric evaluation.
    pub fn compile_sequential_with_metrics(
        &mut self,
        loss: &str,
        optimiser: &str,
        metrics: &[&str],
    ) -> ChargeAmount {
        self.staged(|acc| {
            for metric in metrics {
                let impact = match *metric {
                    "categorical accuracy" => CATEGORICAL_ACCURACY_FORWARD_IMPACT,
                    "mse" => MSE_FORWARD_IMPACT,
                    "cel" => CEL_FORWARD_IMPACT,
                    "scel" => SCEL_FORWARD_IMPACT,
                    other => return maximum_charge(&format!("unknown metric `{}`", other)),
                };
                acc.metrics_cost = acc
                    .metrics_cost
                    .saturating_add(term(impact, acc.last_layer_size));
            }
            compile(acc, loss, optimiser)
        })
    }

    pub fn compile_simple(&mut self, _optimiser: &str, _in_layers: &[u64]) -> ChargeAmount {
        maximum_charge("simple models cannot be priced")
    }

    /// Price training on data of `data_shape` in batches of `batch_size`.
    /// The last dimension of `data_shape` is the number of samples.
    pub fn fit(
        &mut self,
        data_shape: &[u64],
        _labels_shape: &[u64],
        batch_size: u64,
    ) -> ChargeAmount {
        let Some(&subset_size) = data_shape.last() else {
            return maximum_charge("fit called with empty data shape");
        };
        if batch_size == 0 {
            return maximum_charge("fit called with zero batch size");
        }

        self.staged(|acc| {
            acc.subset_size = subset_size;
            let batches = subset_size / batch_size;
            let samples_ops = subset_size.saturating_mul(acc.ops_count);

            let estimate = forward_estimate(acc, subset_size)
                .saturating_add(acc.backward_pass_cost.mul_count(subset_size))
                .saturating_add(term(BACKWARD_BATCH_LAYER_COEF, samples_ops))
                .saturating_add(term(BACKWARD_PER_BATCH_COEF, batches))
                .saturating_add(
                    acc.optimiser_step_impact
                        .mul_count(batches)
                        .mul_count(acc.weights_size_sum),
                )
                .saturating_add(FIT_CONST_COEF);
            finish(estimate)
        })
    }

    /// Price evaluating on the samples seen by the last `fit`.
    pub fn evaluate(&mut self) -> ChargeAmount {
        let estimate = forward_estimate(&self.state, self.state.subset_size)
            .saturating_add(self.state.metrics_cost);
        finish(estimate)
    }

    /// Price inference on data of `data_shape`.
    pub fn predict(&mut self, data_shape: &[u64]) -> ChargeAmount {
        let Some(&batch_size) = data_shape.last() else {
            return maximum_charge("predict called with empty data shape");
        };
        finish(forward_estimate(&self.state, batch_size))
    }

    pub fn serialize_to_string(&mut self) -> ChargeAmount {
        let acc = &self.state;
        let estimate = term(SERIALISATION_PER_OP_COEF, acc.ops_count)
            .saturating_add(term(
                SERIALISATION_PADDED_WEIGHT_SUM_COEF,
                acc.weights_padded_size_sum,
            ))
            .saturating_add(term(SERIALISATION_WEIGHT_SUM_COEF, acc.weights_size_sum))
            .saturating_add(SERIALISATION_CONST_COEF);
        finish(estimate)
    }

    pub fn deserialize_from_string(&mut self, model_text: &str) -> ChargeAmount {
        let estimate = term(DESERIALISATION_PER_CHAR_COEF, model_text.len() as u64)
            .saturating_add(DESERIALISATION_CONST_COEF);
        finish(estimate)
    }
}

fn add_dense(acc: &mut CostAccumulator, inputs: u64, hidden_nodes: u64) -> ChargeAmount {
    let quad = inputs.saturating_mul(hidden_nodes);

    acc.forward_pass_cost = acc
        .forward_pass_cost
        .saturating_add(term(FORWARD_DENSE_INPUT_COEF, inputs))
        .saturating_add(term(FORWARD_DENSE_OUTPUT_COEF, hidden_nodes))
        .saturating_add(term(FORWARD_DENSE_QUAD_COEF, quad));
    acc.backward_pass_cost = acc
        .backward_pass_cost
        .saturating_add(term(BACKWARD_DENSE_INPUT_COEF, inputs))
        .saturating_add(term(BACKWARD_DENSE_OUTPUT_COEF, hidden_nodes))
        .saturating_add(term(BACKWARD_DENSE_QUAD_COEF, quad));

    acc.weights_size_sum = acc
        .weights_size_sum
        .saturating_add(quad.saturating_add(hidden_nodes));
    let padded = padded_size_from_shape(&[hidden_nodes, inputs])
        .saturating_add(padded_size_from_shape(&[hidden_nodes, 1]));
    acc.weights_padded_size_sum = acc.weights_padded_size_sum.saturating_add(padded);
    acc.last_layer_size = hidden_nodes;
    acc.ops_count = acc.ops_count.saturating_add(3);

    let estimate = term(ADD_DENSE_INPUT_COEF, inputs)
        .saturating_add(term(ADD_DENSE_OUTPUT_COEF, hidden_nodes))
        .saturating_add(term(ADD_DENSE_QUAD_COEF, quad))
        .saturating_add(ADD_DENSE_CONST_COEF);
    finish(estimate)
}

fn compile(acc: &mut CostAccumulator, loss: &str, optimiser: &str) -> ChargeAmount {
    if acc.loss_set && acc.optimiser_set {
        return maximum_charge("model is already compiled");
    }

    if !acc.loss_set {
        let (forward, backward) = match loss {
            "mse" => (MSE_FORWARD_IMPACT, MSE_BACKWARD_IMPACT),
            "cel" => (CEL_FORWARD_IMPACT, CEL_BACKWARD_IMPACT),
            "scel" => (SCEL_FORWARD_IMPACT, SCEL_BACKWARD_IMPACT),
            other => return maximum_charge(&format!("unknown loss `{}`", other)),
        };
        acc.forward_pass_cost = acc
            .forward_pass_cost
            .saturating_add(term(forward, acc.last_layer_size));
        acc.backward_pass_cost = acc
            .backward_pass_cost
            .saturating_add(term(backward, acc.last_layer_size));
        acc.ops_count = acc.ops_count.saturating_add(1);
        acc.loss_set = true;
    }

    let mut construction = Fixed::ZERO;
    if !acc.optimiser_set {
        let (step, padded_coef, weights_coef) = match optimiser {
            "adam" => (
                ADAM_STEP_IMPACT_COEF,
                ADAM_PADDED_WEIGHTS_SIZE_COEF,
                ADAM_WEIGHTS_SIZE_COEF,
            ),
            "sgd" => (
                SGD_STEP_IMPACT_COEF,
                SGD_PADDED_WEIGHTS_SIZE_COEF,
                SGD_WEIGHTS_SIZE_COEF,
            ),
            other => return maximum_charge(&format!("unknown optimiser `{}`", other)),
        };
        acc.optimiser_step_impact = step;
        construction = term(padded_coef, acc.weights_padded_size_sum)
            .saturating_add(term(weights_coef, acc.weights_size_sum));
        acc.optimiser_set = true;
    }

    finish(construction.saturating_add(COMPILE_CONST_COEF))
}

/// Forward pass over `samples` samples plus per-call overhead.
fn forward_estimate(acc: &CostAccumulator, samples: u64) -> Fixed {
    acc.forward_pass_cost
        .mul_count(samples)
        .saturating_add(term(
            PREDICT_BATCH_LAYER_COEF,
            samples.saturating_mul(acc.ops_count),
        ))
        .saturating_add(PREDICT_CONST_COEF)
}
