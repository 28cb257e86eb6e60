//! Global configuration parsing and validation.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_http_port() -> u16 {
    11435
}

fn default_web_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_index_document() -> String {
    "index.html".into()
}

fn default_pull_command() -> String {
    "ollama".into()
}

fn default_pull_command_args() -> Vec<String> {
    vec!["run".into()]
}

fn default_kill_grace_millis() -> u64 {
    2000
}

fn default_allowed_origin() -> String {
    "*".into()
}

/// Global configuration parsed from `pull-bridge.toml`.
///
/// Every key is optional; an empty document yields the defaults that
/// reproduce `ollama run <model>` served on `127.0.0.1:11435`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// HTTP port for the asset server and the pull endpoint.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Directory static assets are served from.
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,
    /// Document served for `/`.
    #[serde(default = "default_index_document")]
    pub index_document: String,
    /// External executable launched for every pull.
    #[serde(default = "default_pull_command")]
    pub pull_command: String,
    /// Arguments placed before the model identifier.
    #[serde(default = "default_pull_command_args")]
    pub pull_command_args: Vec<String>,
    /// Maximum simultaneous pulls; 0 means unlimited.
    #[serde(default)]
    pub max_concurrent_pulls: u32,
    /// Maximum lifetime of a single pull; 0 means no timeout.
    #[serde(default)]
    pub pull_timeout_seconds: u64,
    /// Grace period between SIGTERM and SIGKILL when stopping a child.
    #[serde(default = "default_kill_grace_millis")]
    pub kill_grace_millis: u64,
    /// Value of the `access-control-allow-origin` response header.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            web_root: default_web_root(),
            index_document: default_index_document(),
            pull_command: default_pull_command(),
            pull_command_args: default_pull_command_args(),
            max_concurrent_pulls: 0,
            pull_timeout_seconds: 0,
            kill_grace_millis: default_kill_grace_millis(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Socket address the HTTP listener binds to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.http_port)
    }

    /// Pull lifetime limit, if one is configured.
    #[must_use]
    pub fn pull_timeout(&self) -> Option<Duration> {
        (self.pull_timeout_seconds > 0).then(|| Duration::from_secs(self.pull_timeout_seconds))
    }

    /// Admission limit, if one is configured.
    #[must_use]
    pub fn pull_limit(&self) -> Option<usize> {
        usize::try_from(self.max_concurrent_pulls)
            .ok()
            .filter(|limit| *limit > 0)
    }

    /// Grace period granted to a child between SIGTERM and SIGKILL.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_millis)
    }

    /// Replace the web root, re-running path validation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the new root does not exist.
    pub fn set_web_root(&mut self, root: impl Into<PathBuf>) -> Result<()> {
        self.web_root = root.into();
        self.validate()
    }

    /// Validate field constraints and canonicalize the web root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&mut self) -> Result<()> {
        if self.pull_command.trim().is_empty() {
            return Err(AppError::Config("pull_command must not be empty".into()));
        }

        let mut parts = Path::new(&self.index_document).components();
        if !matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None)) {
            return Err(AppError::Config(
                "index_document must be a plain file name".into(),
            ));
        }

        if self.allowed_origin.is_empty() {
            return Err(AppError::Config("allowed_origin must not be empty".into()));
        }

        let canonical_root = self
            .web_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("web_root invalid: {err}")))?;
        if !canonical_root.is_dir() {
            return Err(AppError::Config("web_root must be a directory".into()));
        }
        self.web_root = canonical_root;

        Ok(())
    }
}
