//! Routing operations to a target owned by another router through a
//! framed loopback delivery.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::thread;

use metervm_core::ipc::{ReceiveCallback, read_message, write_message};
use metervm_core::{
    Backend, Delivery, EngineConfig, EntrypointSignature, Error, ErrorCode, ErrorStage,
    Execution, RemoteLink, Result, RunContext, SourceFile, StateStore, TargetRouter, Value,
};

/// Executable is the program text; running it writes the text to stdout.
struct EchoBackend;

impl Backend for EchoBackend {
    type Executable = String;

    fn compile(&self, sources: &[SourceFile]) -> std::result::Result<String, Vec<String>> {
        Ok(sources.iter().map(|s| s.text.as_str()).collect())
    }

    fn find_entrypoint(&self, _executable: &String, name: &str) -> Option<EntrypointSignature> {
        Some(EntrypointSignature {
            name: name.to_string(),
            parameter_types: Vec::new(),
        })
    }

    fn execute(
        &self,
        executable: &String,
        _entrypoint: &str,
        _params: &[Value],
        ctx: &mut RunContext<'_>,
    ) -> Execution {
        ctx.stdout.push_str(executable);
        Execution::success(Value::Unit)
    }
}

/// Frames every request, serves it on `server`, and feeds the framed
/// response back, either inline or from another thread.
struct Loopback {
    server: Arc<TargetRouter<EchoBackend>>,
    callback: Arc<Mutex<Option<ReceiveCallback>>>,
    threaded: bool,
}

impl Loopback {
    fn new(server: Arc<TargetRouter<EchoBackend>>, threaded: bool) -> Arc<Self> {
        Arc::new(Self {
            server,
            callback: Arc::new(Mutex::new(None)),
            threaded,
        })
    }
}

fn serve(
    server: &TargetRouter<EchoBackend>,
    callback: &Mutex<Option<ReceiveCallback>>,
    payload: Vec<u8>,
) {
    let max = server.config().max_message_size;

    let mut wire = Vec::new();
    write_message(&mut wire, &payload).unwrap();
    let request = read_message(&mut Cursor::new(wire), max).unwrap();

    let response = server.handle_request(&request).unwrap();

    let mut wire = Vec::new();
    write_message(&mut wire, &response).unwrap();
    let response = read_message(&mut Cursor::new(wire), max).unwrap();

    let callback = callback.lock().unwrap();
    (callback.as_ref().unwrap())(response);
}

impl Delivery for Loopback {
    fn send(&self, target: &str, payload: Vec<u8>) -> Result<()> {
        if target == "unreachable://" {
            return Err(Error::Delivery("no route".to_string()));
        }
        if self.threaded {
            let server = Arc::clone(&self.server);
            let callback = Arc::clone(&self.callback);
            thread::spawn(move || serve(&server, &callback, payload));
        } else {
            serve(&self.server, &self.callback, payload);
        }
        Ok(())
    }

    fn on_receive(&self, callback: ReceiveCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }
}

fn config(target: &str) -> EngineConfig {
    EngineConfig {
        targets: vec![target.to_string()],
        ..Default::default()
    }
}

type Connected = (
    TargetRouter<EchoBackend>,
    Arc<TargetRouter<EchoBackend>>,
    Arc<RemoteLink>,
);

fn connected(threaded: bool) -> Connected {
    let server = Arc::new(TargetRouter::new(Arc::new(EchoBackend), config("b://")));
    let client = TargetRouter::new(Arc::new(EchoBackend), config("a://"));
    let link = RemoteLink::new(Loopback::new(Arc::clone(&server), threaded));
    assert!(client.connect_remote("b://", Arc::clone(&link)));
    (client, server, link)
}

#[test]
fn test_remote_run_is_executed_by_owner() {
    let (client, server, link) = connected(false);

    let sources = vec![SourceFile::new("main.mvs", "Hello world!!")];
    assert!(client.create_executable("b://", "hello", sources).wait().unwrap().is_success());
    assert!(client.create_state("b://", "s1").wait().unwrap().is_success());

    let result = client.run("b://", "hello", "s1", "main", None).wait().unwrap();
    assert_eq!(result.stage(), ErrorStage::Running);
    assert_eq!(result.code(), ErrorCode::Success);
    assert_eq!(result.summary, "Hello world!!");

    let owner = server.engine("b://").unwrap();
    assert!(owner.states().contains("s1"));
    assert!(client.engine("a://").unwrap().states().is_empty());
    assert_eq!(link.pending_count(), 0);
}

#[test]
fn test_remote_failures_come_back_as_results() {
    let (client, _server, _link) = connected(false);

    let result = client.copy_state("b://", "a", "b").wait().unwrap();
    assert_eq!(result.code(), ErrorCode::BadState);

    let result = client.run("b://", "missing", "s1", "main", None).wait().unwrap();
    assert_eq!(result.code(), ErrorCode::BadExecutable);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_threaded_delivery_fulfils_later() {
    let (client, server, link) = connected(true);

    let promise = client.create_state("b://", "async");
    let result = promise.recv().await.unwrap();
    assert!(result.is_success());
    assert!(server.engine("b://").unwrap().states().contains("async"));
    assert_eq!(link.pending_count(), 0);
}

#[test]
fn test_owner_rejects_foreign_target() {
    let server = Arc::new(TargetRouter::new(Arc::new(EchoBackend), config("b://")));
    let client = TargetRouter::new(Arc::new(EchoBackend), config("a://"));
    let link = RemoteLink::new(Loopback::new(server, false));
    // The client believes c:// lives behind this link, but the owner does not have it.
    client.connect_remote("c://", link);

    let result = client.create_state("c://", "s").wait().unwrap();
    assert_eq!(result.stage(), ErrorStage::Engine);
    assert_eq!(result.code(), ErrorCode::BadTarget);
}

#[test]
fn test_undeliverable_is_bad_target() {
    let server = Arc::new(TargetRouter::new(Arc::new(EchoBackend), config("b://")));
    let client = TargetRouter::new(Arc::new(EchoBackend), config("a://"));
    let link = RemoteLink::new(Loopback::new(server, false));
    client.connect_remote("unreachable://", Arc::clone(&link));

    let result = client.create_state("unreachable://", "s").wait().unwrap();
    assert_eq!(result.code(), ErrorCode::BadTarget);
    assert_eq!(link.pending_count(), 0);
}

#[test]
fn test_remote_identity_cannot_shadow_local() {
    let (client, _server, link) = connected(false);
    assert!(!client.connect_remote("a://", link));
    assert!(!client.create_target("b://"));
}
