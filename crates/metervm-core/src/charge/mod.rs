//! A-priori charge estimation.
//!
//! Every VM-bound binding is priced before it runs. Estimators compute an
//! upper bound from the call's declared arguments, and a [`ChargeMeter`]
//! admits or refuses it against the run's budget.

mod amount;
mod meter;
pub mod model;
pub mod tensor;

pub use amount::{ChargeAmount, Fixed};
pub use meter::{ChargeMeter, ChargeRefusal};
pub use model::{CostAccumulator, ModelEstimator};
pub use tensor::TensorEstimator;
