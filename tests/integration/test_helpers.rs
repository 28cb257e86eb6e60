//! Shared test helpers for relay and HTTP integration tests.
//!
//! Provides a scripted [`FakeLauncher`] whose [`Probe`] records every
//! launch, wait and termination, plus helpers that build a test
//! `GlobalConfig` and run the server on an ephemeral port.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use pull_bridge::bridge::launcher::ExitCode;
use pull_bridge::bridge::{Frame, ProcessHandle, ProcessLauncher, PullProcess, PullRequest};
use pull_bridge::http::{self, AppState};
use pull_bridge::{AppError, GlobalConfig, Result};

/// Behaviour of a fake pull process.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit the lines, then reach EOF and exit with code 0.
    Lines(Vec<String>),
    /// Emit the lines, then fail the read with the given message.
    LinesThenError(Vec<String>, String),
    /// Emit the lines, then go silent without ever exiting.
    LinesThenHang(Vec<String>),
    /// Emit the lines, then one `tick N` line per interval, forever.
    Endless(Vec<String>, Duration),
    /// Refuse to launch with the given message.
    FailSpawn(String),
}

impl Script {
    /// `Script::Lines` from string literals.
    pub fn lines(lines: &[&str]) -> Self {
        Self::Lines(owned(lines))
    }
}

/// Convert string literals to owned lines.
pub fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| (*line).to_owned()).collect()
}

/// Shared record of what the launcher and its handles were asked to do.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    launches: Arc<Mutex<Vec<String>>>,
    waits: Arc<AtomicUsize>,
    terminations: Arc<AtomicUsize>,
    terminated: Arc<Notify>,
}

impl Probe {
    /// Models passed to `launch`, in call order.
    pub fn launches(&self) -> Vec<String> {
        self.launches.lock().unwrap().clone()
    }

    /// Number of `wait` calls across all handles.
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    /// Number of `terminate` calls across all handles.
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Resolve once any handle has been terminated.
    pub async fn wait_for_termination(&self, limit: Duration) -> bool {
        if self.terminations() > 0 {
            return true;
        }
        tokio::time::timeout(limit, self.terminated.notified())
            .await
            .is_ok()
            || self.terminations() > 0
    }
}

/// Launcher that plays a [`Script`] instead of starting a process.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    script: Script,
    probe: Probe,
}

impl FakeLauncher {
    /// Create a launcher and the probe observing it.
    pub fn new(script: Script) -> (Self, Probe) {
        let probe = Probe::default();
        (
            Self {
                script,
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, model: &str) -> Result<PullProcess> {
        self.probe.launches.lock().unwrap().push(model.to_owned());

        let output = match &self.script {
            Script::FailSpawn(message) => return Err(AppError::Spawn(message.clone())),
            Script::Lines(lines) => stream::iter(lines.clone().into_iter().map(Ok)).boxed(),
            Script::LinesThenError(lines, message) => stream::iter(lines.clone().into_iter().map(Ok))
                .chain(stream::once(std::future::ready(Err(AppError::Stream(
                    message.clone(),
                )))))
                .boxed(),
            Script::LinesThenHang(lines) => stream::iter(lines.clone().into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
            Script::Endless(lines, interval) => {
                let interval = *interval;
                stream::iter(lines.clone().into_iter().map(Ok))
                    .chain(stream::unfold(0_u64, move |tick| async move {
                        tokio::time::sleep(interval).await;
                        Some((Ok(format!("tick {tick}")), tick + 1))
                    }))
                    .boxed()
            }
        };

        Ok(PullProcess {
            pid: Some(4242),
            output,
            handle: Box::new(FakeHandle {
                probe: self.probe.clone(),
            }),
        })
    }
}

struct FakeHandle {
    probe: Probe,
}

impl ProcessHandle for FakeHandle {
    fn wait(
        &mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ExitCode>> + Send + '_>> {
        self.probe.waits.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(Some(0)) })
    }

    fn terminate(
        &mut self,
        _grace: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ExitCode>> + Send + '_>> {
        self.probe.terminations.fetch_add(1, Ordering::SeqCst);
        self.probe.terminated.notify_one();
        Box::pin(async { Ok(None) })
    }
}

/// A validated pull request for `model`.
pub fn pull(model: &str) -> PullRequest {
    PullRequest::new(Some(model.to_owned())).expect("valid model")
}

/// Receive frames until the relay drops its sender.
pub async fn drain(frames: &mut mpsc::Receiver<Frame>) -> Vec<Frame> {
    let mut collected = Vec::new();
    while let Some(frame) = frames.recv().await {
        collected.push(frame);
    }
    collected
}

/// Build a `GlobalConfig` serving `web_root` on an ephemeral port with a
/// short kill grace.
pub fn test_config(web_root: &Path) -> GlobalConfig {
    let toml = format!(
        r#"
web_root = '{root}'
http_port = 0
kill_grace_millis = 200
"#,
        root = web_root.display(),
    );
    GlobalConfig::from_toml_str(&toml).expect("valid test config")
}

/// A running server under test.
pub struct TestServer {
    /// `http://127.0.0.1:<port>`.
    pub base_url: String,
    /// Bound socket address.
    pub addr: std::net::SocketAddr,
    /// Cancelling stops the server and every in-flight relay.
    pub ct: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

/// Serve `config` with `launcher` on an ephemeral port.
pub async fn spawn_server(config: GlobalConfig, launcher: Arc<dyn ProcessLauncher>) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");

    let ct = CancellationToken::new();
    let state = Arc::new(AppState::new(Arc::new(config), launcher, ct.clone()));
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = http::serve_on(listener, state, server_ct).await;
    });

    TestServer {
        base_url: format!("http://{addr}"),
        addr,
        ct,
    }
}
