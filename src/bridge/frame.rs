//! Server-Sent Event framing.

use bytes::Bytes;

/// One discrete event written to the client: `data: <payload>\n\n`.
///
/// The payload never contains a line break; a multi-line payload would be
/// read by the browser as several `data:` fields joined into one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: String,
    error: bool,
}

impl Frame {
    /// Frame carrying one line of process output, whitespace-trimmed.
    #[must_use]
    pub fn line(text: &str) -> Self {
        Self {
            payload: single_line(text.trim()),
            error: false,
        }
    }

    /// Terminal frame reporting a failure to the client.
    #[must_use]
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            payload: single_line(&format!("Error: {message}")),
            error: true,
        }
    }

    /// Text carried by the frame, without SSE framing.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Whether this frame reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error
    }

    /// Wire encoding of the frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.payload))
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
