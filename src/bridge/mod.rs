//! Stream bridge: relays an external process's output as SSE frames.

pub mod codec;
pub mod frame;
pub mod launcher;
pub mod relay;

use crate::{AppError, Result};

pub use frame::Frame;
pub use launcher::{CommandLauncher, ProcessHandle, ProcessLauncher, PullProcess};
pub use relay::{run_relay, RelayOptions, RelayOutcome};

/// Body of the client error returned when `model` is absent or empty.
pub const MISSING_MODEL: &str = "Missing model parameter";

/// A validated pull: the identifier handed to the external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    model: String,
}

impl PullRequest {
    /// Validate the raw `model` query value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when the value is missing or empty.
    pub fn new(model: Option<String>) -> Result<Self> {
        match model {
            Some(model) if !model.is_empty() => Ok(Self { model }),
            _ => Err(AppError::Validation(MISSING_MODEL.into())),
        }
    }

    /// Identifier passed to the external command.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}
