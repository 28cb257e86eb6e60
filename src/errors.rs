//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Inbound request failed validation before any resource was acquired.
    Validation(String),
    /// Admission limit reached; the request was not started.
    Busy(String),
    /// External process could not be launched.
    Spawn(String),
    /// Reading the external process output failed mid-stream.
    Stream(String),
    /// File system path failed validation against the web root.
    PathViolation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Web UI install or uninstall failure.
    Deploy(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// HTTP status used when this error terminates a request before streaming.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PathViolation(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_)
            | Self::Spawn(_)
            | Self::Stream(_)
            | Self::Deploy(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message carried by the error, without the category prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Config(msg)
            | Self::Validation(msg)
            | Self::Busy(msg)
            | Self::Spawn(msg)
            | Self::Stream(msg)
            | Self::PathViolation(msg)
            | Self::NotFound(msg)
            | Self::Deploy(msg)
            | Self::Io(msg) => msg,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Busy(msg) => write!(f, "busy: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Stream(msg) => write!(f, "stream: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Deploy(msg) => write!(f, "deploy: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl IntoResponse for AppError {
    /// Client-facing errors carry their bare message; path and lookup
    /// failures collapse to a plain `Not Found` so the response never
    /// reveals how a path was resolved.
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::Validation(msg) | Self::Busy(msg) => msg,
            Self::PathViolation(_) | Self::NotFound(_) => "Not Found".to_owned(),
            Self::Config(_) | Self::Spawn(_) | Self::Stream(_) | Self::Deploy(_) | Self::Io(_) => {
                "Internal Server Error".to_owned()
            }
        };
        (status, body).into_response()
    }
}
