//! Promise correlation for targets reachable only through a delivery
//! collaborator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::engine::{ErrorCode, ExecutionResult, Operation};
use crate::error::{Error, Result};
use crate::promise::{self, Fulfiller, Promise};

use super::protocol::{RemoteRequest, decode_response, encode_request};

/// Callback invoked with every message the delivery receives.
pub type ReceiveCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Message transport to other hosts.
pub trait Delivery: Send + Sync {
    /// Send `payload` to the host owning `target`.
    fn send(&self, target: &str, payload: Vec<u8>) -> Result<()>;

    /// Register the handler for incoming messages.
    fn on_receive(&self, callback: ReceiveCallback);
}

/// Outstanding requests to remote targets, keyed by request id.
pub struct RemoteLink {
    delivery: Arc<dyn Delivery>,
    pending: Mutex<FxHashMap<u64, Fulfiller>>,
    next_id: AtomicU64,
}

impl RemoteLink {
    /// Create a link and register it as the delivery's receiver.
    pub fn new(delivery: Arc<dyn Delivery>) -> Arc<Self> {
        let link = Arc::new(Self {
            delivery: Arc::clone(&delivery),
            pending: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
        });

        let weak = Arc::downgrade(&link);
        delivery.on_receive(Box::new(move |bytes| {
            if let Some(link) = weak.upgrade()
                && let Err(e) = link.handle_response(&bytes)
            {
                tracing::warn!("Dropping malformed response: {}", e);
            }
        }));

        link
    }

    fn pending(&self) -> MutexGuard<'_, FxHashMap<u64, Fulfiller>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of requests still awaiting a response.
    ///
    /// Requests whose promise was dropped are forgotten and not counted.
    pub fn pending_count(&self) -> usize {
        let mut pending = self.pending();
        prune_abandoned(&mut pending);
        pending.len()
    }

    /// Send `operation` to `target`. The promise is fulfilled when the
    /// matching response arrives.
    pub fn dispatch(&self, target: &str, operation: Operation) -> Promise {
        let (fulfiller, promise) = promise::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!("Dispatching {} to {} as request {}", operation, target, id);
        let request = RemoteRequest {
            id,
            target: target.to_string(),
            operation,
        };
        let bytes = match encode_request(&request) {
            Ok(bytes) => bytes,
            Err(e) => {
                settle(fulfiller, &undeliverable(target, &e));
                return promise;
            }
        };

        {
            let mut pending = self.pending();
            prune_abandoned(&mut pending);
            pending.insert(id, fulfiller);
        }

        if let Err(e) = self.delivery.send(target, bytes) {
            tracing::warn!("Delivery to {} failed: {}", target, e);
            // The response may already have raced in; only settle if still pending.
            let fulfiller = self.pending().remove(&id);
            if let Some(fulfiller) = fulfiller {
                settle(fulfiller, &undeliverable(target, &e));
            }
        }

        promise
    }

    /// Fulfil the pending promise a response belongs to.
    pub fn handle_response(&self, bytes: &[u8]) -> Result<()> {
        let response = decode_response(bytes)?;
        let fulfiller = self.pending().remove(&response.id);
        match fulfiller {
            Some(fulfiller) => fulfiller.fulfill_bytes(response.payload),
            None => tracing::warn!("Response for unknown request {}", response.id),
        }
        Ok(())
    }
}

/// Drop fulfillers whose caller gave up. A late response for one of them is
/// then reported as unknown.
fn prune_abandoned(pending: &mut FxHashMap<u64, Fulfiller>) {
    let before = pending.len();
    pending.retain(|_, fulfiller| !fulfiller.is_abandoned());
    let pruned = before - pending.len();
    if pruned > 0 {
        tracing::debug!("Forgot {} abandoned requests", pruned);
    }
}

fn undeliverable(target: &str, error: &Error) -> ExecutionResult {
    ExecutionResult::engine_error(
        ErrorCode::BadTarget,
        format!("Error: could not deliver to target {}: {}", target, error),
    )
}

fn settle(fulfiller: Fulfiller, result: &ExecutionResult) {
    if let Err(e) = fulfiller.fulfill(result) {
        tracing::error!("Failed to fulfil promise: {}", e);
    }
}
