//! Process-to-stream relay task.
//!
//! One relay runs per pull. It owns the launched process for its whole
//! life and pushes [`Frame`]s into a bounded channel whose receiver is the
//! HTTP response body. The loop suspends in exactly two places: waiting
//! for the next output line and waiting for room in the channel.
//!
//! # Exit paths
//!
//! | Trigger                     | Client sees            | Process        |
//! |-----------------------------|------------------------|----------------|
//! | output EOF                  | stream end             | waited, reaped |
//! | launch failure              | one error frame        | never started  |
//! | read failure                | one error frame        | terminated     |
//! | timeout                     | one error frame        | terminated     |
//! | server shutdown             | one error frame        | terminated     |
//! | receiver dropped/send fails | nothing                | terminated     |

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frame::Frame;
use super::launcher::{ExitCode, ProcessHandle, ProcessLauncher};
use super::PullRequest;

/// Per-relay limits and lifecycle hooks.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Maximum lifetime of the pull; `None` lets it run until exit.
    pub timeout: Option<Duration>,
    /// Grace between the polite and the forced stop of the child.
    pub kill_grace: Duration,
    /// Fires on server shutdown.
    pub shutdown: CancellationToken,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            kill_grace: Duration::from_secs(2),
            shutdown: CancellationToken::new(),
        }
    }
}

/// How a relay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Output reached EOF and the process exited.
    Completed {
        /// Exit code reported by the process, if any.
        exit_code: ExitCode,
    },
    /// The process could not be started.
    SpawnFailed,
    /// Reading the process output failed.
    ReadFailed,
    /// The pull exceeded its configured lifetime.
    TimedOut,
    /// The server is shutting down.
    Cancelled,
    /// The client went away before the process finished.
    ClientDisconnected,
}

/// Why the read loop stopped, before cleanup.
enum Stop {
    Eof,
    ReadError(String),
    Deadline,
    Shutdown,
    Disconnected,
}

/// Run one pull from launch to stream end.
///
/// Every frame produced goes through `frames`; the stream is finished when
/// this function returns and drops the sender. The launched process is
/// reaped before returning on every path, and on the error paths it is
/// stopped before the terminal error frame is queued so a slow reader
/// cannot keep it alive.
pub async fn run_relay(
    request: PullRequest,
    launcher: &dyn ProcessLauncher,
    frames: mpsc::Sender<Frame>,
    options: RelayOptions,
) -> RelayOutcome {
    let model = request.model();

    let process = match launcher.launch(model) {
        Ok(process) => process,
        Err(err) => {
            warn!(model, %err, "pull process failed to start");
            // Nothing to clean up; a closed receiver just means no one hears it.
            let _ = frames.send(Frame::error(err.detail())).await;
            return RelayOutcome::SpawnFailed;
        }
    };

    let pid = process.pid.unwrap_or(0);
    let mut output = process.output;
    let mut handle = process.handle;

    let deadline = options.timeout.map(|limit| Instant::now() + limit);
    let expired = deadline_elapsed(deadline);
    tokio::pin!(expired);

    let mut relayed: u64 = 0;
    let stop = loop {
        tokio::select! {
            biased;

            () = options.shutdown.cancelled() => break Stop::Shutdown,

            () = frames.closed() => break Stop::Disconnected,

            () = &mut expired => break Stop::Deadline,

            item = output.next() => match item {
                None => break Stop::Eof,
                Some(Ok(line)) => {
                    if frames.send(Frame::line(&line)).await.is_err() {
                        break Stop::Disconnected;
                    }
                    relayed += 1;
                }
                Some(Err(err)) => {
                    warn!(pid, %err, "reading pull output failed");
                    break Stop::ReadError(err.detail().to_owned());
                }
            },
        }
    };

    // Release the pipes before reaping so a blocked writer sees EPIPE.
    drop(output);

    let outcome = match stop {
        Stop::Eof => {
            // A child may close its pipes and keep running; keep watching
            // the client and the shutdown token while it finishes.
            let waited = tokio::select! {
                result = handle.wait() => Some(result),
                () = frames.closed() => None,
                () = options.shutdown.cancelled() => None,
            };
            match waited {
                Some(Ok(exit_code)) => RelayOutcome::Completed { exit_code },
                Some(Err(err)) => {
                    warn!(pid, %err, "error waiting for pull process");
                    RelayOutcome::Completed { exit_code: None }
                }
                None if options.shutdown.is_cancelled() => {
                    stop_process(handle.as_mut(), pid, options.kill_grace).await;
                    RelayOutcome::Cancelled
                }
                None => {
                    stop_process(handle.as_mut(), pid, options.kill_grace).await;
                    RelayOutcome::ClientDisconnected
                }
            }
        }
        Stop::ReadError(message) => {
            stop_process(handle.as_mut(), pid, options.kill_grace).await;
            let _ = frames.send(Frame::error(message)).await;
            RelayOutcome::ReadFailed
        }
        Stop::Deadline => {
            stop_process(handle.as_mut(), pid, options.kill_grace).await;
            let secs = options.timeout.map_or(0, |limit| limit.as_secs());
            let _ = frames
                .send(Frame::error(format!("pull timed out after {secs}s")))
                .await;
            RelayOutcome::TimedOut
        }
        Stop::Shutdown => {
            stop_process(handle.as_mut(), pid, options.kill_grace).await;
            let _ = frames.send(Frame::error("server shutting down")).await;
            RelayOutcome::Cancelled
        }
        Stop::Disconnected => {
            debug!(pid, "client disconnected, stopping pull process");
            stop_process(handle.as_mut(), pid, options.kill_grace).await;
            RelayOutcome::ClientDisconnected
        }
    };

    info!(pid, relayed, outcome = ?outcome, "pull finished");
    outcome
}

/// Terminate and reap, logging rather than surfacing failures.
async fn stop_process(handle: &mut dyn ProcessHandle, pid: u32, grace: Duration) {
    match handle.terminate(grace).await {
        Ok(code) => debug!(pid, exit_code = ?code, "pull process stopped"),
        Err(err) => warn!(pid, %err, "failed to stop pull process"),
    }
}

/// Resolve at `deadline`, or never when there is none.
async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
