//! HTTP surface: static assets and the pull event stream on one port.

pub mod path_safety;
pub mod pull;
pub mod static_files;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bridge::{ProcessLauncher, RelayOptions};
use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Body returned when the admission limit is reached.
pub const TOO_MANY_PULLS: &str = "Too many concurrent pulls";

/// State shared by every request handler.
///
/// Nothing in here is mutated per request: pulls only borrow the launcher
/// and, when a limit is configured, a semaphore permit.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Starts the external process for each pull.
    pub launcher: Arc<dyn ProcessLauncher>,
    /// Admission slots; `None` when pulls are unlimited.
    pub pull_slots: Option<Arc<Semaphore>>,
    /// Cancelled on server shutdown; in-flight relays stop their children.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build state from configuration and a launcher.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        launcher: Arc<dyn ProcessLauncher>,
        shutdown: CancellationToken,
    ) -> Self {
        let pull_slots = config
            .pull_limit()
            .map(|limit| Arc::new(Semaphore::new(limit)));
        Self {
            config,
            launcher,
            pull_slots,
            shutdown,
        }
    }

    /// Reserve a pull slot if a limit is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Busy` when every slot is taken.
    pub fn try_admit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(slots) = &self.pull_slots else {
            return Ok(None);
        };
        Arc::clone(slots)
            .try_acquire_owned()
            .map(Some)
            .map_err(|_| AppError::Busy(TOO_MANY_PULLS.into()))
    }

    /// Relay options derived from configuration.
    #[must_use]
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            timeout: self.config.pull_timeout(),
            kill_grace: self.config.kill_grace(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Handler for `GET /health`: returns 200 OK with a plain-text body.
async fn health() -> &'static str {
    "ok"
}

/// Stamp the configured `access-control-allow-origin` on every response.
async fn allow_origin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&state.config.allowed_origin) {
        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    response
}

/// Build the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/pull_model", get(pull::handle_pull))
        .route("/", get(static_files::serve_index))
        .route("/{*path}", get(static_files::serve_asset))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            allow_origin,
        ))
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener fails to bind or the server
/// fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = state.config.bind_addr();
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails.
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(%local, web_root = %state.config.web_root.display(), "starting HTTP server");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Config(format!("HTTP server error: {err}")))?;

    info!("HTTP server shut down");
    Ok(())
}
