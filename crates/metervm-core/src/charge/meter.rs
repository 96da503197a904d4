//! Per-run charge budget.

use thiserror::Error;

use super::amount::ChargeAmount;

/// Why [`ChargeMeter::admit`] refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChargeRefusal {
    /// The estimator could not bound the cost.
    #[error("charge for {operation} is unbounded")]
    Unbounded { operation: String },

    /// The running total would not stay below the limit.
    #[error(
        "charge {estimate} for {operation} does not stay below limit {limit} \
         ({consumed} already consumed)"
    )]
    LimitExceeded {
        operation: String,
        estimate: u64,
        consumed: u64,
        limit: u64,
    },
}

/// Running total of admitted charges for one run.
#[derive(Debug, Clone, Default)]
pub struct ChargeMeter {
    limit: Option<u64>,
    consumed: u64,
}

impl ChargeMeter {
    /// A meter with an optional total budget. `None` is unbounded, but
    /// [`ChargeAmount::MAX`] is refused either way.
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, consumed: 0 }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Admit `estimate` for `operation` before the operation runs.
    ///
    /// The limit is exclusive: the running total must stay strictly below it.
    pub fn admit(&mut self, operation: &str, estimate: ChargeAmount) -> Result<(), ChargeRefusal> {
        if estimate.is_max() {
            tracing::debug!("Refused unbounded charge for {}", operation);
            return Err(ChargeRefusal::Unbounded {
                operation: operation.to_string(),
            });
        }

        let total = self.consumed.saturating_add(estimate.get());
        if let Some(limit) = self.limit
            && total >= limit
        {
            return Err(ChargeRefusal::LimitExceeded {
                operation: operation.to_string(),
                estimate: estimate.get(),
                consumed: self.consumed,
                limit,
            });
        }

        self.consumed = total;
        Ok(())
    }

    /// Charge admitted so far.
    pub fn total(&self) -> u64 {
        self.consumed
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Budget left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.consumed))
    }
}
