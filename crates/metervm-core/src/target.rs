//! Routing of operations to targets.
//!
//! A router owns one [`ExecutionEngine`] per local target and one
//! [`RemoteLink`] per remote target. Every operation resolves its target
//! first and fails with `ENGINE/BAD_TARGET` before touching any store when
//! the target is unknown.

use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::engine::{ExecutionEngine, ExecutionResult, Operation};
use crate::error::Result;
use crate::ipc::protocol::{RemoteResponse, decode_request, encode_response};
use crate::ipc::RemoteLink;
use crate::promise::{self, Promise};
use crate::value::Value;
use crate::vm::{Backend, SourceFile};

enum Route<B: Backend> {
    Local(Arc<ExecutionEngine<B>>),
    Remote(Arc<RemoteLink>),
}

/// Maps target identities to local engines or remote links.
pub struct TargetRouter<B: Backend> {
    backend: Arc<B>,
    config: EngineConfig,
    local: RwLock<FxHashMap<String, Arc<ExecutionEngine<B>>>>,
    remote: RwLock<FxHashMap<String, Arc<RemoteLink>>>,
}

impl<B: Backend> TargetRouter<B> {
    /// Create a router owning the targets listed in `config`.
    pub fn new(backend: Arc<B>, config: EngineConfig) -> Self {
        let router = Self {
            backend,
            config,
            local: RwLock::new(FxHashMap::default()),
            remote: RwLock::new(FxHashMap::default()),
        };
        for target in router.config.targets.clone() {
            router.create_target(&target);
        }
        router
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a local target. Returns `false` if the identity is taken.
    pub fn create_target(&self, host: &str) -> bool {
        if self.remote_read().contains_key(host) {
            return false;
        }
        let mut local = self.local.write().unwrap_or_else(PoisonError::into_inner);
        if local.contains_key(host) {
            return false;
        }

        let engine = ExecutionEngine::new(Arc::clone(&self.backend))
            .with_charge_limit(self.config.charge_limit);
        local.insert(host.to_string(), Arc::new(engine));
        tracing::info!("Created target {}", host);
        true
    }

    /// Register `host` as reachable through `link`. Returns `false` if the
    /// identity is taken.
    pub fn connect_remote(&self, host: &str, link: Arc<RemoteLink>) -> bool {
        if self.local_read().contains_key(host) {
            return false;
        }
        let mut remote = self.remote.write().unwrap_or_else(PoisonError::into_inner);
        if remote.contains_key(host) {
            return false;
        }
        remote.insert(host.to_string(), link);
        tracing::info!("Connected remote target {}", host);
        true
    }

    pub fn has_target(&self, host: &str) -> bool {
        self.local_read().contains_key(host) || self.remote_read().contains_key(host)
    }

    /// Whether `host` is owned by this process.
    pub fn is_local(&self, host: &str) -> bool {
        self.local_read().contains_key(host)
    }

    /// The engine of a local target.
    pub fn engine(&self, host: &str) -> Option<Arc<ExecutionEngine<B>>> {
        self.local_read().get(host).cloned()
    }

    /// Local target identities, sorted.
    pub fn local_targets(&self) -> Vec<String> {
        let mut names: Vec<_> = self.local_read().keys().cloned().collect();
        names.sort();
        names
    }

    fn local_read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, FxHashMap<String, Arc<ExecutionEngine<B>>>> {
        self.local.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn remote_read(&self) -> std::sync::RwLockReadGuard<'_, FxHashMap<String, Arc<RemoteLink>>> {
        self.remote.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, target: &str) -> Option<Route<B>> {
        if let Some(engine) = self.local_read().get(target) {
            return Some(Route::Local(Arc::clone(engine)));
        }
        self.remote_read()
            .get(target)
            .map(|link| Route::Remote(Arc::clone(link)))
    }

    /// Route `operation` to `target`.
    ///
    /// Local operations run before this returns and the promise is already
    /// fulfilled. Remote operations are fulfilled when the response arrives.
    pub fn submit(&self, target: &str, operation: Operation) -> Promise {
        match self.route(target) {
            Some(Route::Local(engine)) => resolved(&engine.apply(&operation)),
            Some(Route::Remote(link)) => link.dispatch(target, operation),
            None => {
                tracing::warn!("Rejected {} for unknown target {}", operation.kind(), target);
                resolved(&ExecutionResult::bad_target(target))
            }
        }
    }

    pub fn create_executable(&self, target: &str, name: &str, sources: Vec<SourceFile>) -> Promise {
        self.submit(
            target,
            Operation::CreateExecutable {
                name: name.to_string(),
                sources,
            },
        )
    }

    pub fn delete_executable(&self, target: &str, name: &str) -> Promise {
        self.submit(
            target,
            Operation::DeleteExecutable {
                name: name.to_string(),
            },
        )
    }

    pub fn create_state(&self, target: &str, name: &str) -> Promise {
        self.submit(
            target,
            Operation::CreateState {
                name: name.to_string(),
            },
        )
    }

    pub fn copy_state(&self, target: &str, source: &str, destination: &str) -> Promise {
        self.submit(
            target,
            Operation::CopyState {
                source: source.to_string(),
                destination: destination.to_string(),
            },
        )
    }

    pub fn delete_state(&self, target: &str, name: &str) -> Promise {
        self.submit(
            target,
            Operation::DeleteState {
                name: name.to_string(),
            },
        )
    }

    pub fn run(
        &self,
        target: &str,
        executable: &str,
        state: &str,
        entrypoint: &str,
        params: Option<Vec<Value>>,
    ) -> Promise {
        self.submit(
            target,
            Operation::Run {
                executable: executable.to_string(),
                state: state.to_string(),
                entrypoint: entrypoint.to_string(),
                params,
            },
        )
    }

    /// Serve one request from another host.
    ///
    /// Only local targets are executed; requests are never forwarded.
    pub fn handle_request(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let request = decode_request(bytes)?;

        let result = match self.engine(&request.target) {
            Some(engine) => engine.apply(&request.operation),
            None => {
                tracing::warn!(
                    "Rejected request {} for target {} not owned here",
                    request.id,
                    request.target
                );
                ExecutionResult::bad_target(&request.target)
            }
        };

        encode_response(&RemoteResponse {
            id: request.id,
            payload: result.to_bytes()?,
        })
    }
}

/// A promise fulfilled before it is handed out.
///
/// The result is held inline, so waiting never touches the channel. If the
/// result cannot be encoded the promise is broken.
fn resolved(result: &ExecutionResult) -> Promise {
    match Promise::resolved(result) {
        Ok(promise) => promise,
        Err(e) => {
            tracing::error!("Failed to fulfil promise: {}", e);
            let (_, promise) = promise::channel();
            promise
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorCode;
    use crate::vm::{EntrypointSignature, Execution, RunContext};

    struct NullBackend;

    impl Backend for NullBackend {
        type Executable = ();

        fn compile(&self, _sources: &[SourceFile]) -> std::result::Result<(), Vec<String>> {
            Ok(())
        }

        fn find_entrypoint(&self, _executable: &(), _name: &str) -> Option<EntrypointSignature> {
            None
        }

        fn execute(
            &self,
            _executable: &(),
            _entrypoint: &str,
            _params: &[Value],
            _ctx: &mut RunContext<'_>,
        ) -> Execution {
            Execution::success(Value::Unit)
        }
    }

    fn router() -> TargetRouter<NullBackend> {
        TargetRouter::new(Arc::new(NullBackend), EngineConfig::default())
    }

    #[test]
    fn test_default_target() {
        let router = router();
        assert!(router.has_target("local://"));
        assert!(router.is_local("local://"));
        assert_eq!(router.local_targets(), vec!["local://"]);
    }

    #[test]
    fn test_create_target_is_false_on_duplicate() {
        let router = router();
        assert!(router.create_target("worker://1"));
        assert!(!router.create_target("worker://1"));
        assert!(!router.create_target("local://"));
    }

    #[test]
    fn test_unknown_target_rejected_without_side_effects() {
        let router = router();
        let result = router.create_state("nowhere://", "s").wait().unwrap();
        assert_eq!(result.code(), ErrorCode::BadTarget);
        assert!(!router.has_target("nowhere://"));

        let engine = router.engine("local://").unwrap();
        assert!(engine.states().is_empty());
    }

    #[test]
    fn test_targets_are_isolated() {
        let router = router();
        router.create_target("b");
        assert!(router.create_state("local://", "s").wait().unwrap().is_success());
        assert!(router.create_state("b", "s").wait().unwrap().is_success());
        assert_eq!(
            router.create_state("b", "s").wait().unwrap().code(),
            ErrorCode::BadState
        );

        let run = router.run("b", "exe", "s", "main", None).wait().unwrap();
        assert_eq!(run.code(), ErrorCode::BadExecutable);
    }

    #[tokio::test]
    async fn test_local_promise_waits_inside_runtime() {
        let router = router();
        let mut promise = router.create_state("local://", "s");
        assert!(promise.is_ready());
        assert!(promise.wait().unwrap().is_success());

        let clash = router.create_state("local://", "s").wait().unwrap();
        assert_eq!(clash.code(), ErrorCode::BadState);
    }

    #[test]
    fn test_handle_request_runs_locally() {
        let router = router();
        let request = crate::ipc::protocol::encode_request(&crate::ipc::RemoteRequest {
            id: 5,
            target: "local://".to_string(),
            operation: Operation::CreateState {
                name: "s".to_string(),
            },
        })
        .unwrap();

        let response =
            crate::ipc::protocol::decode_response(&router.handle_request(&request).unwrap())
                .unwrap();
        assert_eq!(response.id, 5);
        let result = ExecutionResult::from_bytes(&response.payload).unwrap();
        assert!(result.is_success());

        let foreign = crate::ipc::protocol::encode_request(&crate::ipc::RemoteRequest {
            id: 6,
            target: "peer://x".to_string(),
            operation: Operation::CreateState {
                name: "s".to_string(),
            },
        })
        .unwrap();
        let response =
            crate::ipc::protocol::decode_response(&router.handle_request(&foreign).unwrap())
                .unwrap();
        let result = ExecutionResult::from_bytes(&response.payload).unwrap();
        assert_eq!(result.code(), ErrorCode::BadTarget);
    }
}
