//! Line codec for the runner's stdout stream.
//!
//! Frames raw bytes on `\n` with [`tokio_util::codec::AnyDelimiterCodec`]
//! and a maximum line length, so a runner that prints an unterminated or
//! enormous line cannot exhaust memory. Lines are converted to UTF-8 after
//! framing; a trailing `\r` is stripped.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};
use tracing::warn;

use crate::{IntentError, Result};

/// Maximum line length accepted from the runner: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited decoder for runner stdout.
///
/// Oversized lines are logged and discarded up to their terminator, and
/// lines that are not valid UTF-8 are logged and dropped; in both cases
/// decoding resumes with the next line. I/O failures map to
/// [`IntentError::Process`] because they mean the pipe itself is broken.
#[derive(Debug)]
pub struct RunnerCodec(AnyDelimiterCodec);

impl RunnerCodec {
    /// Create a codec with the [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            MAX_LINE_BYTES,
        ))
    }
}

impl Default for RunnerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RunnerCodec {
    type Item = String;
    type Error = IntentError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode(src) {
                Ok(Some(chunk)) => {
                    if let Some(line) = into_line(chunk) {
                        return Ok(Some(line));
                    }
                }
                Ok(None) => return Ok(None),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => skip_oversized(),
                Err(AnyDelimiterCodecError::Io(e)) => return Err(map_io_error(&e)),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode_eof(src) {
                Ok(Some(chunk)) => {
                    if let Some(line) = into_line(chunk) {
                        return Ok(Some(line));
                    }
                }
                Ok(None) => return Ok(None),
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => skip_oversized(),
                Err(AnyDelimiterCodecError::Io(e)) => return Err(map_io_error(&e)),
            }
        }
    }
}

fn into_line(chunk: Bytes) -> Option<String> {
    let bytes = chunk.strip_suffix(b"\r").unwrap_or(&chunk);
    match std::str::from_utf8(bytes) {
        Ok(line) => Some(line.to_owned()),
        Err(err) => {
            warn!(len = bytes.len(), %err, "runner line is not valid UTF-8; skipping");
            None
        }
    }
}

// The inner codec is now discarding; the next call drops bytes up to the
// following newline.
fn skip_oversized() {
    warn!(limit = MAX_LINE_BYTES, "runner line too long; skipping");
}

fn map_io_error(e: &std::io::Error) -> IntentError {
    IntentError::Process(format!("runner stdout: {e}"))
}
