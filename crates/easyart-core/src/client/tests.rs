use super::*;
use crate::process::{MockProcessHandle, WorkerStdio};
use crate::protocol::GenerateParams;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

const PIPE_CAPACITY: usize = 64 * 1024;

/// The worker side of a client wired over in-memory pipes
struct Peer {
    requests: Lines<BufReader<DuplexStream>>,
    stdout: DuplexStream,
    stderr: DuplexStream,
}

impl Peer {
    async fn next_request(&mut self) -> Value {
        let line = self
            .requests
            .next_line()
            .await
            .unwrap()
            .expect("client closed stdin");
        serde_json::from_str(&line).unwrap()
    }

    async fn send_line(&mut self, line: &str) {
        self.stdout.write_all(line.as_bytes()).await.unwrap();
        self.stdout.write_all(b"\n").await.unwrap();
    }

    async fn reply(&mut self, request: &Value, result: Value) {
        let line = json!({"id": request["id"], "result": result}).to_string();
        self.send_line(&line).await;
    }

    async fn reply_error(&mut self, request: &Value, error: Value) {
        let line = json!({"id": request["id"], "error": error}).to_string();
        self.send_line(&line).await;
    }
}

struct Harness {
    client: WorkerClient,
    peer: Peer,
    kills: Arc<AtomicUsize>,
}

fn fast_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        shutdown_grace: Duration::from_millis(200),
        join_timeout: Duration::from_millis(200),
        kill_wait: Duration::from_millis(100),
        switch_model: Duration::from_secs(90),
    }
}

fn connect() -> Harness {
    connect_with_stdin_capacity(PIPE_CAPACITY)
}

/// A small stdin capacity makes the client's writes block until the peer reads
fn connect_with_stdin_capacity(stdin_capacity: usize) -> Harness {
    let (client_stdin, peer_stdin) = tokio::io::duplex(stdin_capacity);
    let (peer_stdout, client_stdout) = tokio::io::duplex(PIPE_CAPACITY);
    let (peer_stderr, client_stderr) = tokio::io::duplex(PIPE_CAPACITY);

    let mut stdio = Some(WorkerStdio {
        stdin: Box::new(client_stdin),
        stdout: Box::new(client_stdout),
        stderr: Some(Box::new(client_stderr)),
    });

    let alive = Arc::new(AtomicBool::new(true));
    let kills = Arc::new(AtomicUsize::new(0));

    let mut mock = MockProcessHandle::new();
    mock.expect_take_stdio().returning(move || stdio.take());
    mock.expect_pid().return_const(Some(4242u32));
    {
        let alive = Arc::clone(&alive);
        mock.expect_is_alive()
            .returning(move || alive.load(Ordering::SeqCst));
    }
    {
        let alive = Arc::clone(&alive);
        let kills = Arc::clone(&kills);
        mock.expect_kill().returning(move || {
            let was_alive = alive.swap(false, Ordering::SeqCst);
            if was_alive {
                kills.fetch_add(1, Ordering::SeqCst);
            }
            Ok(was_alive)
        });
    }
    mock.expect_wait().returning(|_| Ok(None));

    let client = WorkerClient::from_process(
        Box::new(mock),
        ClientOptions {
            sinks: Vec::new(),
            timeouts: fast_timeouts(),
            channel_capacity: 16,
        },
    )
    .unwrap();

    Harness {
        client,
        peer: Peer {
            requests: BufReader::new(peer_stdin).lines(),
            stdout: peer_stdout,
            stderr: peer_stderr,
        },
        kills,
    }
}

fn spawn_raw_call(
    client: &WorkerClient,
    method: &'static str,
    params: Value,
    cancel: CancellationToken,
) -> JoinHandle<WorkerResult<Value>> {
    let client = client.clone();
    tokio::spawn(async move { client.call_raw(method, params, &cancel).await })
}

#[tokio::test]
async fn test_call_round_trip() {
    let Harness { client, mut peer, .. } = connect();
    assert_eq!(client.pid(), Some(4242));

    let call = spawn_raw_call(&client, "echo", json!({"x": 1}), CancellationToken::new());

    let request = peer.next_request().await;
    assert_eq!(request["method"], "echo");
    assert_eq!(request["params"], json!({"x": 1}));
    assert_eq!(request["id"].as_str().unwrap().len(), 32);
    assert_eq!(client.pending_count(), 1);

    peer.reply(&request, request["params"].clone()).await;

    assert_eq!(call.await.unwrap().unwrap(), json!({"x": 1}));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let Harness { client, mut peer, .. } = connect();

    let first = spawn_raw_call(&client, "echo", json!({"tag": "a"}), CancellationToken::new());
    let first_request = peer.next_request().await;
    let second = spawn_raw_call(&client, "echo", json!({"tag": "b"}), CancellationToken::new());
    let second_request = peer.next_request().await;
    assert_ne!(first_request["id"], second_request["id"]);

    peer.reply(&second_request, json!("for b")).await;
    peer.reply(&first_request, json!("for a")).await;

    assert_eq!(second.await.unwrap().unwrap(), json!("for b"));
    assert_eq!(first.await.unwrap().unwrap(), json!("for a"));
}

#[tokio::test]
async fn test_noise_on_stdout_is_ignored() {
    let Harness { client, mut peer, .. } = connect();

    let call = spawn_raw_call(&client, "echo", json!(null), CancellationToken::new());
    let request = peer.next_request().await;
    assert_eq!(request["params"], json!({}));

    peer.send_line("Loading weights 42%").await;
    peer.send_line(r#"{"result":"no id"}"#).await;
    peer.send_line(r#"{"id":"not-ours","result":1}"#).await;
    peer.reply(&request, json!("ok")).await;

    assert_eq!(call.await.unwrap().unwrap(), json!("ok"));
    assert!(!client.is_closed());
}

#[tokio::test]
async fn test_generate_returns_image_refs() {
    let Harness { client, mut peer, .. } = connect();

    let call = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .generate(GenerateParams::new("cat"), &CancellationToken::new())
                .await
        })
    };

    let request = peer.next_request().await;
    assert_eq!(request["method"], "images.generate");
    assert_eq!(request["params"]["prompt"], "cat");
    assert_eq!(request["params"]["n"], 1);
    peer.reply(&request, json!(["cat.png", "", null])).await;

    assert_eq!(call.await.unwrap().unwrap(), vec!["cat.png".to_string()]);
}

#[tokio::test]
async fn test_remote_error_reaches_only_its_caller() {
    let Harness { client, mut peer, .. } = connect();

    let failing = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .generate(GenerateParams::new("cat"), &CancellationToken::new())
                .await
        })
    };
    let failing_request = peer.next_request().await;
    let other = spawn_raw_call(&client, "echo", json!({}), CancellationToken::new());
    let other_request = peer.next_request().await;

    peer.reply_error(&failing_request, json!({"code": "E_RUNTIME", "message": "oom"}))
        .await;
    peer.reply(&other_request, json!(1)).await;

    let err = failing.await.unwrap().unwrap_err();
    assert_eq!(err.remote_message(), Some("oom"));
    assert!(matches!(
        err,
        WorkerError::Remote { ref method, code: Some(ref code), .. }
            if method == "images.generate" && code == "E_RUNTIME"
    ));
    assert_eq!(other.await.unwrap().unwrap(), json!(1));
}

#[tokio::test]
async fn test_local_backend_operations_wire_shape() {
    let Harness { client, mut peer, .. } = connect();
    let cancel = CancellationToken::new();

    let switch = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.switch_local_model("sdxl", 120, &cancel).await })
    };
    let request = peer.next_request().await;
    assert_eq!(request["method"], "local_sd.switch_model");
    assert_eq!(request["params"], json!({"model_name": "sdxl", "timeout": 120}));
    peer.reply(&request, json!({"status": "ok"})).await;
    assert_eq!(switch.await.unwrap().unwrap().payload, json!({"status": "ok"}));

    let start = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.start_local_server(None, &cancel).await })
    };
    let request = peer.next_request().await;
    assert_eq!(request["method"], "local_sd.start");
    assert_eq!(request["params"], json!({"model_path": null}));
    peer.reply(&request, Value::Null).await;
    assert_eq!(start.await.unwrap().unwrap(), Ack { payload: Value::Null });
}

#[tokio::test]
async fn test_cancel_then_late_response_is_discarded() {
    let Harness { client, mut peer, .. } = connect();
    let cancel = CancellationToken::new();

    let call = spawn_raw_call(&client, "slow", json!({}), cancel.clone());
    let request = peer.next_request().await;

    cancel.cancel();
    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(client.pending_count(), 0);

    peer.reply(&request, json!("too late")).await;

    let next = spawn_raw_call(&client, "echo", json!({"n": 2}), CancellationToken::new());
    let next_request = peer.next_request().await;
    peer.reply(&next_request, json!(2)).await;
    assert_eq!(next.await.unwrap().unwrap(), json!(2));
}

#[tokio::test]
async fn test_response_in_table_wins_over_cancellation() {
    let Harness { client, mut peer, .. } = connect();
    let cancel = CancellationToken::new();

    let call = spawn_raw_call(&client, "echo", json!({}), cancel.clone());
    let request = peer.next_request().await;

    // The call task does not run again until this task yields, so it sees
    // the fired token and the resolved entry at the same time.
    let id = request["id"].as_str().unwrap();
    assert!(client.inner.pending.resolve(id, Completion::Result(json!("answered"))));
    cancel.cancel();

    assert_eq!(call.await.unwrap().unwrap(), json!("answered"));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_abandoned_call_still_writes_a_whole_line() {
    let Harness { client, mut peer, .. } = connect_with_stdin_capacity(32);
    let blob = "x".repeat(200);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        client.call_raw("first", json!({"blob": blob.clone()}), &CancellationToken::new()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(client.pending_count(), 0);

    let second = spawn_raw_call(&client, "second", json!({}), CancellationToken::new());

    let first_request = peer.next_request().await;
    assert_eq!(first_request["method"], "first");
    assert_eq!(first_request["params"]["blob"], json!(blob));
    let second_request = peer.next_request().await;
    assert_eq!(second_request["method"], "second");

    peer.reply(&first_request, json!("nobody waiting")).await;
    peer.reply(&second_request, json!("ok")).await;
    assert_eq!(second.await.unwrap().unwrap(), json!("ok"));
}

#[tokio::test]
async fn test_cancel_while_write_is_blocked() {
    let Harness { client, mut peer, .. } = connect_with_stdin_capacity(32);
    let cancel = CancellationToken::new();

    let call = spawn_raw_call(
        &client,
        "first",
        json!({"blob": "x".repeat(200)}),
        cancel.clone(),
    );
    while client.pending_count() == 0 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(client.pending_count(), 0);

    let request = peer.next_request().await;
    assert_eq!(request["method"], "first");
}

#[tokio::test]
async fn test_non_object_params_are_rejected_before_sending() {
    let Harness { client, mut peer, .. } = connect();

    let err = client
        .call_raw("echo", json!("a"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::InvalidParams { .. }));
    assert_eq!(client.pending_count(), 0);

    let next = spawn_raw_call(&client, "echo", json!({"n": 1}), CancellationToken::new());
    let request = peer.next_request().await;
    assert_eq!(request["params"], json!({"n": 1}));
    peer.reply(&request, json!(1)).await;
    assert_eq!(next.await.unwrap().unwrap(), json!(1));
}

#[tokio::test]
async fn test_already_cancelled_token_sends_nothing() {
    let Harness { client, .. } = connect();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .call_raw("echo", json!({}), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_call_with_timeout_expires_as_cancelled() {
    let Harness { client, mut peer, .. } = connect();

    let call = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .call_with_timeout(
                    "slow",
                    RequestParams::empty(),
                    Duration::from_millis(50),
                    &CancellationToken::new(),
                )
                .await
        })
    };
    let _request = peer.next_request().await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkerError::Cancelled { ref method } if method == "slow"));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_output_closed_terminates_every_pending_call() {
    let Harness { client, mut peer, .. } = connect();

    let mut calls = Vec::new();
    for i in 0..3 {
        calls.push(spawn_raw_call(&client, "echo", json!({"n": i}), CancellationToken::new()));
        peer.next_request().await;
    }
    assert_eq!(client.pending_count(), 3);

    drop(peer.stdout);

    for call in calls {
        let err = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .expect("pending call never resolved")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, WorkerError::Terminated { .. }));
    }
    assert_eq!(client.pending_count(), 0);
    assert!(client.is_closed());

    let err = client
        .call_raw("echo", json!({}), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Terminated { .. }));
}

#[tokio::test]
async fn test_write_failure_removes_waiter() {
    let Harness { client, peer, .. } = connect();
    drop(peer.requests);

    let err = client
        .call_raw("echo", json!({}), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Terminated { .. } | WorkerError::Io { .. }));
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_shutdown_is_graceful_and_idempotent() {
    let Harness {
        client,
        mut peer,
        kills,
    } = connect();

    let shutdown = {
        let client = client.clone();
        tokio::spawn(async move { client.shutdown().await })
    };

    let request = peer.next_request().await;
    assert_eq!(request["method"], "local_sd.shutdown");
    assert_eq!(request["params"], json!({}));
    peer.reply(&request, Value::Null).await;

    shutdown.await.unwrap();
    client.shutdown().await;

    assert_eq!(kills.load(Ordering::SeqCst), 1);
    assert!(client.is_closed());
    assert!(!client.is_alive().await);

    let err = client
        .call_raw("echo", json!({}), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Terminated { .. }));
}

#[tokio::test]
async fn test_shutdown_terminates_calls_on_unresponsive_worker() {
    let Harness {
        client,
        mut peer,
        kills,
    } = connect();

    let stuck = spawn_raw_call(&client, "slow", json!({}), CancellationToken::new());
    peer.next_request().await;

    // The peer never answers, so the graceful step runs out its grace period.
    client.shutdown().await;

    let err = stuck.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkerError::Terminated { .. }));
    assert_eq!(kills.load(Ordering::SeqCst), 1);
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_shutdown_can_leave_local_backend_running() {
    let Harness {
        client,
        mut peer,
        kills,
    } = connect();

    client.shutdown_with(ShutdownMode::LeaveLocalBackend).await;

    assert_eq!(kills.load(Ordering::SeqCst), 1);
    assert!(client.is_closed());
    // Stdin is released without a single request having been written.
    assert!(peer.requests.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn test_drop_without_shutdown_kills_worker() {
    let Harness { client, kills, .. } = connect();
    drop(client);
    assert_eq!(kills.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stderr_lines_reach_subscribers() {
    let Harness {
        client, mut peer, ..
    } = connect();
    let mut rx = client.subscribe_diagnostics();

    peer.stderr
        .write_all(b"Loading model\r\n\nready\n")
        .await
        .unwrap();

    assert_eq!(rx.recv().await.unwrap().line, "Loading model");
    assert_eq!(rx.recv().await.unwrap().line, "ready");
}

#[tokio::test]
async fn test_stdio_must_be_available() {
    let mut mock = MockProcessHandle::new();
    mock.expect_take_stdio().returning(|| None);

    let err = WorkerClient::from_process(Box::new(mock), ClientOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, WorkerError::Startup { .. }));
}
