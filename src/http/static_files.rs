//! Static asset route handlers.

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::path_safety::resolve_under_root;
use super::AppState;
use crate::{AppError, Result};

/// Handler for `GET /`: serves the configured index document.
pub async fn serve_index(State(state): State<Arc<AppState>>) -> Response {
    serve_file(&state.config.web_root, &state.config.index_document).await
}

/// Handler for `GET /{*path}`: serves any file under the web root.
pub async fn serve_asset(
    State(state): State<Arc<AppState>>,
    UrlPath(path): UrlPath<String>,
) -> Response {
    serve_file(&state.config.web_root, &path).await
}

async fn serve_file(root: &Path, requested: &str) -> Response {
    match load_asset(root, requested).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type_for(requested))], bytes).into_response(),
        Err(err) => {
            debug!(requested, %err, "asset not served");
            err.into_response()
        }
    }
}

/// Read the bytes of `requested`, resolved under `root`.
///
/// # Errors
///
/// - `AppError::PathViolation` if the path escapes the root.
/// - `AppError::NotFound` if it does not name a regular file.
/// - `AppError::Io` if the file exists but cannot be read.
pub async fn load_asset(root: &Path, requested: &str) -> Result<Vec<u8>> {
    let path = resolve_under_root(root, requested)?;

    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(AppError::NotFound(format!("no asset at {requested}")));
    }

    tokio::fs::read(&path).await.map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound(format!("no asset at {requested}")),
        _ => AppError::Io(format!("failed to read {requested}: {err}")),
    })
}

/// Content type for an asset, chosen by file extension.
#[must_use]
pub fn content_type_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
