//! Single-fulfilment result channel.
//!
//! A [`Promise`] carries the serialized form of one [`ExecutionResult`].
//! Its [`Fulfiller`] is consumed by fulfilment, so a promise cannot be
//! fulfilled twice. Dropping the fulfiller unfulfilled breaks the promise.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::engine::ExecutionResult;
use crate::error::{Error, Result};

/// Create a connected fulfiller/promise pair.
pub fn channel() -> (Fulfiller, Promise) {
    let (tx, rx) = oneshot::channel();
    (
        Fulfiller { tx },
        Promise {
            rx: Some(rx),
            ready: None,
        },
    )
}

/// Producing half of a promise.
#[derive(Debug)]
pub struct Fulfiller {
    tx: oneshot::Sender<Vec<u8>>,
}

impl Fulfiller {
    /// Serialize `result` and fulfil the promise with it.
    pub fn fulfill(self, result: &ExecutionResult) -> Result<()> {
        let bytes = result.to_bytes()?;
        self.fulfill_bytes(bytes);
        Ok(())
    }

    /// Fulfil with an already serialized result.
    ///
    /// If the promise was dropped the result is discarded.
    pub fn fulfill_bytes(self, bytes: Vec<u8>) {
        if self.tx.send(bytes).is_err() {
            tracing::debug!("Promise dropped before fulfilment, discarding result");
        }
    }

    /// Whether the consuming half is gone.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half: a deferred [`ExecutionResult`].
#[derive(Debug)]
pub struct Promise {
    rx: Option<oneshot::Receiver<Vec<u8>>>,
    ready: Option<Vec<u8>>,
}

impl Promise {
    /// A promise that is already fulfilled with `result`.
    pub fn resolved(result: &ExecutionResult) -> Result<Promise> {
        Ok(Promise {
            rx: None,
            ready: Some(result.to_bytes()?),
        })
    }

    /// Block until fulfilled.
    ///
    /// Must not be called from within an async runtime; use
    /// [`Promise::recv`] there.
    pub fn wait(self) -> Result<ExecutionResult> {
        let bytes = self.wait_bytes()?;
        ExecutionResult::from_bytes(&bytes)
    }

    /// Block until fulfilled and return the serialized result.
    pub fn wait_bytes(self) -> Result<Vec<u8>> {
        if let Some(bytes) = self.ready {
            return Ok(bytes);
        }
        match self.rx {
            Some(rx) => rx.blocking_recv().map_err(|_| broken()),
            None => Err(broken()),
        }
    }

    /// Wait asynchronously.
    pub async fn recv(self) -> Result<ExecutionResult> {
        if let Some(bytes) = self.ready {
            return ExecutionResult::from_bytes(&bytes);
        }
        let rx = self.rx.ok_or_else(broken)?;
        let bytes = rx.await.map_err(|_| broken())?;
        ExecutionResult::from_bytes(&bytes)
    }

    /// Wait asynchronously, giving up after `timeout`.
    ///
    /// Giving up does not cancel the operation; its result is discarded
    /// when it eventually arrives.
    pub async fn recv_timeout(self, timeout: Duration) -> Result<ExecutionResult> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Poll without blocking. `None` while still pending.
    pub fn try_result(&mut self) -> Option<Result<ExecutionResult>> {
        if self.ready.is_none() {
            let rx = self.rx.as_mut()?;
            match rx.try_recv() {
                Ok(bytes) => {
                    self.ready = Some(bytes);
                    self.rx = None;
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.rx = None;
                    return Some(Err(broken()));
                }
            }
        }
        self.ready.as_deref().map(ExecutionResult::from_bytes)
    }

    /// Whether a result is available without blocking.
    pub fn is_ready(&mut self) -> bool {
        matches!(self.try_result(), Some(Ok(_)))
    }
}

fn broken() -> Error {
    Error::PromiseBroken("fulfiller dropped without a result".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorCode;

    #[test]
    fn test_resolved_promise() {
        let result = ExecutionResult::engine_success("done");
        let promise = Promise::resolved(&result).unwrap();
        assert_eq!(promise.wait().unwrap(), result);
    }

    #[test]
    fn test_fulfil_from_another_thread() {
        let (fulfiller, promise) = channel();
        let handle = std::thread::spawn(move || {
            fulfiller
                .fulfill(&ExecutionResult::bad_target("elsewhere"))
                .unwrap();
        });
        let result = promise.wait().unwrap();
        handle.join().unwrap();
        assert_eq!(result.code(), ErrorCode::BadTarget);
    }

    #[test]
    fn test_poll_until_ready() {
        let (fulfiller, mut promise) = channel();
        assert!(promise.try_result().is_none());

        fulfiller
            .fulfill(&ExecutionResult::engine_success("ok"))
            .unwrap();
        assert!(promise.is_ready());
        // Polling again still yields the result.
        let result = promise.try_result().unwrap().unwrap();
        assert_eq!(result.summary, "ok");
    }

    #[test]
    fn test_dropped_fulfiller_breaks_promise() {
        let (fulfiller, mut promise) = channel();
        drop(fulfiller);
        assert!(matches!(
            promise.try_result(),
            Some(Err(Error::PromiseBroken(_)))
        ));

        let (fulfiller, promise) = channel();
        drop(fulfiller);
        assert!(matches!(promise.wait(), Err(Error::PromiseBroken(_))));
    }

    #[test]
    fn test_fulfil_after_promise_dropped() {
        let (fulfiller, promise) = channel();
        drop(promise);
        assert!(fulfiller.is_abandoned());
        fulfiller
            .fulfill(&ExecutionResult::engine_success("late"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_recv_timeout() {
        let (_fulfiller, promise) = channel();
        let err = promise
            .recv_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_recv() {
        let (fulfiller, promise) = channel();
        tokio::spawn(async move {
            fulfiller
                .fulfill(&ExecutionResult::engine_success("async"))
                .unwrap();
        });
        assert_eq!(promise.recv().await.unwrap().summary, "async");
    }
}
