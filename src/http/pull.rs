//! `GET /pull_model`: starts a pull and streams its output as SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderName};
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::AppState;
use crate::bridge::{run_relay, Frame, PullRequest};

/// Frames buffered between the relay and the socket before the relay
/// waits on the client.
pub const FRAME_BUFFER: usize = 16;

/// Query string accepted by the pull endpoint.
#[derive(Debug, Deserialize)]
pub struct PullQuery {
    /// Target identifier handed to the pull command.
    model: Option<String>,
}

/// Handler for `GET /pull_model?model=<id>`.
///
/// Validation and admission failures answer before anything is spawned.
/// Otherwise the response is an open `text/event-stream` fed by a relay
/// task that owns the child process.
pub async fn handle_pull(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<PullQuery>, QueryRejection>,
) -> Response {
    let model = query.ok().and_then(|Query(query)| query.model);
    let request = match PullRequest::new(model) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    let permit = match state.try_admit() {
        Ok(permit) => permit,
        Err(err) => return err.into_response(),
    };

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    let span = info_span!("pull", pull_id = %Uuid::new_v4(), model = request.model());
    let launcher = Arc::clone(&state.launcher);
    let options = state.relay_options();

    tokio::spawn(
        async move {
            // Held for the lifetime of the relay, released when it ends.
            let _permit = permit;
            run_relay(request, launcher.as_ref(), tx, options).await;
        }
        .instrument(span),
    );

    event_stream(rx)
}

/// Wrap a frame receiver in a streaming SSE response.
///
/// Dropping the response body drops `frames`, which the relay observes as
/// a client disconnect.
#[must_use]
pub fn event_stream(frames: mpsc::Receiver<Frame>) -> Response {
    let body = stream::unfold(frames, |mut frames| async move {
        frames
            .recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame.encode()), frames))
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
