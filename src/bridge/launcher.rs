//! External pull process launcher.
//!
//! [`ProcessLauncher`] is the seam between the relay and the operating
//! system: the relay only sees a merged stream of output lines and a
//! [`ProcessHandle`] it can wait on or terminate. [`CommandLauncher`] is the
//! production implementation backed by `tokio::process`.
//!
//! Every spawned child has:
//! - `stdin` attached to the null device, so interactive commands see EOF.
//! - `stdout` and `stderr` writing to the same pipe, read as one line
//!   stream in the order the child produced it.
//! - `kill_on_drop(true)`, so a handle dropped without an explicit
//!   terminate still takes its process down with it.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use tokio::process::{Child, Command};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use super::codec::OutputCodec;
use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Merged, line-framed output of a pull process.
pub type OutputLines = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Exit code of a finished process; `None` when it was ended by a signal.
pub type ExitCode = Option<i32>;

/// Control surface over one running pull process.
pub trait ProcessHandle: Send {
    /// Wait for the process to exit on its own and reap it.
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<ExitCode>> + Send + '_>>;

    /// Stop the process and reap it.
    ///
    /// Implementations ask politely first where the platform allows it and
    /// force termination once `grace` has elapsed.
    fn terminate(
        &mut self,
        grace: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ExitCode>> + Send + '_>>;
}

/// A launched pull: its output and the handle that owns the process.
pub struct PullProcess {
    /// OS process id, when known.
    pub pid: Option<u32>,
    /// Combined stdout and stderr, one item per line.
    pub output: OutputLines,
    /// Exclusive handle used to reap or stop the process.
    pub handle: Box<dyn ProcessHandle>,
}

impl std::fmt::Debug for PullProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Starts the external process for a pull.
pub trait ProcessLauncher: Send + Sync {
    /// Launch the pull command for `model`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the process cannot be started.
    fn launch(&self, model: &str) -> Result<PullProcess>;
}

/// Launcher running `<program> <args...> <model>` as a real child process.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    /// Create a launcher for an arbitrary program and leading arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Create a launcher from `pull_command` and `pull_command_args`.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config.pull_command.clone(),
            config.pull_command_args.clone(),
        )
    }

    /// Program launched for every pull.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list passed to the program for `model`.
    #[must_use]
    pub fn args_for(&self, model: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(model.to_owned());
        args
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, model: &str) -> Result<PullProcess> {
        // One pipe shared by stdout and stderr, so lines arrive in the
        // order the child wrote them.
        let (reader, writer) = std::io::pipe()
            .map_err(|err| AppError::Spawn(format!("failed to create output pipe: {err}")))?;
        let stderr_writer = writer
            .try_clone()
            .map_err(|err| AppError::Spawn(format!("failed to create output pipe: {err}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_for(model))
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true);

        let spawned = cmd.spawn();
        // `cmd` holds the parent's write ends; EOF only arrives once they close.
        drop(cmd);
        let child = spawned
            .map_err(|err| AppError::Spawn(format!("failed to start {}: {err}", self.program)))?;

        let pid = child.id();
        info!(pid = pid.unwrap_or(0), program = %self.program, "pull process spawned");

        let output = FramedRead::new(output_reader(reader)?, OutputCodec::new()).boxed();

        Ok(PullProcess {
            pid,
            output,
            handle: Box::new(ChildHandle { child }),
        })
    }
}

/// Async reader over the read end of the shared output pipe.
#[cfg(unix)]
fn output_reader(reader: std::io::PipeReader) -> Result<tokio::net::unix::pipe::Receiver> {
    tokio::net::unix::pipe::Receiver::from_owned_fd(std::os::fd::OwnedFd::from(reader))
        .map_err(|err| AppError::Spawn(format!("failed to watch output pipe: {err}")))
}

#[cfg(windows)]
#[allow(clippy::unnecessary_wraps)]
fn output_reader(reader: std::io::PipeReader) -> Result<tokio::fs::File> {
    let handle = std::os::windows::io::OwnedHandle::from(reader);
    Ok(tokio::fs::File::from_std(std::fs::File::from(handle)))
}

/// [`ProcessHandle`] over a `tokio::process::Child`.
#[derive(Debug)]
struct ChildHandle {
    child: Child,
}

impl ChildHandle {
    /// Ask the child to exit with SIGTERM and give it `grace` to do so.
    ///
    /// Returns the exit code if the child exited within the window.
    #[cfg(unix)]
    async fn request_exit(&mut self, grace: Duration) -> Option<ExitCode> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = self.child.id().and_then(|id| i32::try_from(id).ok())?;
        if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            debug!(pid = raw, %err, "SIGTERM delivery failed");
            return None;
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status.code()),
            Ok(Err(err)) => {
                warn!(pid = raw, %err, "error waiting for pull process after SIGTERM");
                None
            }
            Err(_elapsed) => {
                debug!(pid = raw, "pull process ignored SIGTERM, escalating");
                None
            }
        }
    }

    #[cfg(not(unix))]
    async fn request_exit(&mut self, _grace: Duration) -> Option<ExitCode> {
        None
    }
}

impl ProcessHandle for ChildHandle {
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<ExitCode>> + Send + '_>> {
        Box::pin(async move {
            let status = self.child.wait().await?;
            Ok(status.code())
        })
    }

    fn terminate(
        &mut self,
        grace: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ExitCode>> + Send + '_>> {
        Box::pin(async move {
            if let Some(code) = self.request_exit(grace).await {
                return Ok(code);
            }

            // Fails only when the child has already been reaped.
            if let Err(err) = self.child.start_kill() {
                debug!(%err, "kill skipped");
            }
            let status = self.child.wait().await?;
            Ok(status.code())
        })
    }
}
