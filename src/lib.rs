#![forbid(unsafe_code)]

//! Local HTTP bridge that relays an external pull command's output to the
//! browser as Server-Sent Events, next to a static web UI.

pub mod bridge;
pub mod config;
pub mod deploy;
pub mod errors;
pub mod http;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
