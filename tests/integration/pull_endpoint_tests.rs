//! `GET /pull_model` over real HTTP with a scripted launcher.

use std::sync::Arc;
use std::time::Duration;

use pull_bridge::bridge::ProcessLauncher;
use pull_bridge::GlobalConfig;

use super::test_helpers::{owned, spawn_server, test_config, FakeLauncher, Probe, Script, TestServer};

async fn start(script: Script) -> (TestServer, Probe, tempfile::TempDir) {
    let root = tempfile::tempdir().expect("tempdir");
    start_with(test_config(root.path()), script, root).await
}

async fn start_with(
    config: GlobalConfig,
    script: Script,
    root: tempfile::TempDir,
) -> (TestServer, Probe, tempfile::TempDir) {
    let (launcher, probe) = FakeLauncher::new(script);
    let launcher: Arc<dyn ProcessLauncher> = Arc::new(launcher);
    let server = spawn_server(config, launcher).await;
    (server, probe, root)
}

// ── Validation ──────────────────────────────────────────────────────────────

/// Without `model`, the request is refused before anything is launched.
#[tokio::test]
async fn missing_model_is_bad_request() {
    let (server, probe, _root) = start(Script::lines(&["never"])).await;

    let resp = reqwest::get(format!("{}/pull_model", server.base_url))
        .await
        .expect("request");

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.expect("body"), "Missing model parameter");
    assert!(probe.launches().is_empty());
}

/// An empty `model` value is treated as missing.
#[tokio::test]
async fn empty_model_is_bad_request() {
    let (server, probe, _root) = start(Script::lines(&["never"])).await;

    let resp = reqwest::get(format!("{}/pull_model?model=", server.base_url))
        .await
        .expect("request");

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.expect("body"), "Missing model parameter");
    assert!(probe.launches().is_empty());
}

// ── Streaming ───────────────────────────────────────────────────────────────

/// Output lines arrive as ordered SSE frames and the stream then closes.
#[tokio::test]
async fn pull_streams_process_output() {
    let (server, probe, _root) = start(Script::lines(&["L1", "L2", "L3"])).await;

    let resp = reqwest::get(format!("{}/pull_model?model=llama3", server.base_url))
        .await
        .expect("request");

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(reqwest::header::CONTENT_TYPE)
            .expect("content-type"),
        "text/event-stream"
    );
    assert_eq!(
        resp.headers()
            .get(reqwest::header::CACHE_CONTROL)
            .expect("cache-control"),
        "no-cache"
    );
    assert_eq!(
        resp.text().await.expect("body"),
        "data: L1\n\ndata: L2\n\ndata: L3\n\n"
    );
    assert_eq!(probe.launches(), vec!["llama3".to_owned()]);
}

/// Query decoding hands the launcher the literal model identifier.
#[tokio::test]
async fn model_identifier_is_url_decoded() {
    let (server, probe, _root) = start(Script::lines(&["ok"])).await;

    let resp = reqwest::get(format!(
        "{}/pull_model?model=library%2Fllama3%3A8b",
        server.base_url
    ))
    .await
    .expect("request");
    resp.text().await.expect("body");

    assert_eq!(probe.launches(), vec!["library/llama3:8b".to_owned()]);
}

/// A launch failure is reported inside a successful stream.
#[tokio::test]
async fn launch_failure_is_a_single_error_frame() {
    let (server, _probe, _root) = start(Script::FailSpawn("failed to start ollama: missing".into())).await;

    let resp = reqwest::get(format!("{}/pull_model?model=llama3", server.base_url))
        .await
        .expect("request");

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(
        resp.text().await.expect("body"),
        "data: Error: failed to start ollama: missing\n\n"
    );
}

/// Every response, including the stream, carries the CORS header.
#[tokio::test]
async fn responses_allow_any_origin() {
    let (server, _probe, _root) = start(Script::lines(&["L1"])).await;

    let resp = reqwest::get(format!("{}/pull_model?model=llama3", server.base_url))
        .await
        .expect("request");

    assert_eq!(
        resp.headers()
            .get(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .expect("cors header"),
        "*"
    );
}

// ── Lifecycle ───────────────────────────────────────────────────────────────

/// Closing the connection mid-stream terminates the process.
#[tokio::test]
async fn client_disconnect_terminates_process() {
    let (server, probe, _root) = start(Script::Endless(
        owned(&["L1"]),
        Duration::from_millis(20),
    ))
    .await;

    let mut resp = reqwest::get(format!("{}/pull_model?model=llama3", server.base_url))
        .await
        .expect("request");
    let first = resp.chunk().await.expect("chunk").expect("first chunk");
    assert!(first.starts_with(b"data: L1\n\n"));
    drop(resp);

    assert!(
        probe.wait_for_termination(Duration::from_secs(5)).await,
        "process must be terminated after disconnect"
    );
}

/// Two simultaneous pulls each get their own process and stream.
#[tokio::test]
async fn concurrent_pulls_are_independent() {
    let (server, probe, _root) = start(Script::lines(&["L1", "L2"])).await;

    let (first, second) = tokio::join!(
        reqwest::get(format!("{}/pull_model?model=llama3", server.base_url)),
        reqwest::get(format!("{}/pull_model?model=mistral", server.base_url)),
    );
    let first = first.expect("first").text().await.expect("first body");
    let second = second.expect("second").text().await.expect("second body");

    assert_eq!(first, "data: L1\n\ndata: L2\n\n");
    assert_eq!(second, "data: L1\n\ndata: L2\n\n");
    let mut launched = probe.launches();
    launched.sort();
    assert_eq!(launched, vec!["llama3".to_owned(), "mistral".to_owned()]);
}

/// With an admission limit, a pull beyond it is refused with 503.
#[tokio::test]
async fn admission_limit_refuses_extra_pull() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(root.path());
    config.max_concurrent_pulls = 1;
    let (server, probe, _root) =
        start_with(config, Script::LinesThenHang(owned(&["L1"])), root).await;

    let mut held = reqwest::get(format!("{}/pull_model?model=llama3", server.base_url))
        .await
        .expect("first request");
    held.chunk().await.expect("chunk").expect("first chunk");

    let refused = reqwest::get(format!("{}/pull_model?model=mistral", server.base_url))
        .await
        .expect("second request");

    assert_eq!(refused.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(refused.text().await.expect("body"), "Too many concurrent pulls");
    assert_eq!(probe.launches(), vec!["llama3".to_owned()]);
}

/// Once a pull finishes its slot is released for the next one.
#[tokio::test]
async fn admission_slot_is_released_after_pull() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(root.path());
    config.max_concurrent_pulls = 1;
    let (server, probe, _root) = start_with(config, Script::lines(&["L1"]), root).await;

    for model in ["llama3", "mistral"] {
        let body = reqwest::get(format!("{}/pull_model?model={model}", server.base_url))
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert_eq!(body, "data: L1\n\n");
        // The permit drops when the relay task ends, just after the body closes.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(probe.launches().len(), 2);
}

/// Cancelling the server token ends open streams with an error frame.
#[tokio::test]
async fn shutdown_ends_open_streams() {
    let (server, probe, _root) = start(Script::LinesThenHang(owned(&["L1"]))).await;

    let mut resp = reqwest::get(format!("{}/pull_model?model=llama3", server.base_url))
        .await
        .expect("request");
    resp.chunk().await.expect("chunk").expect("first chunk");

    server.ct.cancel();

    let mut rest = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(Some(chunk)) = resp.chunk().await {
            rest.extend_from_slice(&chunk);
        }
    })
    .await;

    assert!(drained.is_ok(), "stream must end after shutdown");
    assert_eq!(rest, b"data: Error: server shutting down\n\n");
    assert_eq!(probe.terminations(), 1);
}
