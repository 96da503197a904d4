//! Core engine for metervm, a host for metered, sandboxed script VMs.
//!
//! This crate provides:
//! - Persistent key/value state observed by running programs
//! - Named registries of compiled executables and states
//! - A-priori charge estimation that gates every VM-bound call
//! - The execution engine run protocol and its stage x code outcome taxonomy
//! - Target routing across local and remote hosts
//! - Single-fulfilment promises carrying serialized results
//!
//! The scripting language itself is supplied by a [`Backend`] implementation.

pub mod charge;
pub mod config;
pub mod engine;
pub mod error;
pub mod executable;
pub mod ipc;
pub mod promise;
pub mod state;
pub mod target;
pub mod value;
pub mod vm;

pub use charge::{ChargeAmount, ChargeMeter, ChargeRefusal, Fixed, ModelEstimator, TensorEstimator};
pub use config::{DEFAULT_LOCAL_TARGET, EngineConfig};
pub use engine::{
    ErrorCode, ErrorStage, ExecutionEngine, ExecutionError, ExecutionResult, Operation,
};
pub use error::{Error, Result};
pub use executable::{ExecutableRegistry, ExecutableStore};
pub use ipc::{Delivery, RemoteLink};
pub use promise::{Fulfiller, Promise};
pub use state::{IoObserver, IoStatus, SharedState, State, StateRegistry, StateStore};
pub use target::TargetRouter;
pub use value::{ConversionError, Value, ValueType, try_convert};
pub use vm::{Backend, EntrypointSignature, Execution, RunContext, SourceFile};
