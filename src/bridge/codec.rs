//! Line codec for external process output.
//!
//! Pull commands redraw progress bars with bare carriage returns, so a
//! "line" ends at `\n`, `\r\n` or a lone `\r`. Bytes are decoded lossily:
//! the output is opaque text and a stray invalid sequence must not end
//! the stream.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use pull_bridge::bridge::codec::OutputCodec;
//!
//! let lines = FramedRead::new(child_stdout, OutputCodec::new());
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Maximum line length accepted by the output codec: 1 MiB.
///
/// A process that writes more than this without a line break yields
/// [`AppError::Stream`] with `"line too long"` instead of growing the
/// buffer without bound.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Decoder splitting process output on `\n`, `\r\n` and `\r`.
#[derive(Debug)]
pub struct OutputCodec {
    max_length: usize,
    /// Bytes of the buffer already scanned without finding a terminator.
    next_index: usize,
    /// The previous line ended in `\r`; swallow one `\n` if it follows.
    skip_lf: bool,
}

impl OutputCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom maximum line length.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            skip_lf: false,
        }
    }

    /// Drop the `\n` half of a `\r\n` pair split across two reads.
    ///
    /// Returns `false` when the buffer is empty and the decision must wait.
    fn consume_pending_lf(&mut self, src: &mut BytesMut) -> bool {
        if !self.skip_lf {
            return true;
        }
        match src.first() {
            None => false,
            Some(b'\n') => {
                src.advance(1);
                self.skip_lf = false;
                true
            }
            Some(_) => {
                self.skip_lf = false;
                true
            }
        }
    }
}

impl Default for OutputCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !self.consume_pending_lf(src) {
            return Ok(None);
        }

        let read_to = src.len().min(self.max_length.saturating_add(1));
        let found = src[self.next_index..read_to]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r');

        match found {
            Some(offset) => {
                let end = self.next_index + offset;
                self.next_index = 0;
                let raw = src.split_to(end + 1);
                self.skip_lf = raw[end] == b'\r';
                Ok(Some(String::from_utf8_lossy(&raw[..end]).into_owned()))
            }
            None if src.len() > self.max_length => Err(AppError::Stream(format!(
                "line too long: exceeded {} bytes",
                self.max_length
            ))),
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let rest = src.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}
