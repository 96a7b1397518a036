//! Line framing over a chunked response body
//!
//! Chunks arrive with arbitrary boundaries: a line, or a single multi-byte
//! character, may be split across two reads. [`LineSplitter`] keeps the
//! carry-over state between chunks and only ever hands out complete lines.

use std::pin::Pin;

use async_stream::try_stream;
use futures::StreamExt;
use tokio_stream::Stream;

use crate::error::{Error, Result};

/// A stream of complete lines, each without its trailing `\n`
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Incremental UTF-8 decoder and `\n` splitter
#[derive(Debug, Default)]
pub struct LineSplitter {
    /// Bytes of a character that has not been fully received yet
    pending: Vec<u8>,
    /// Decoded text after the last line feed
    carry: String,
}

impl LineSplitter {
    /// Create an empty splitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line it completed.
    ///
    /// The fragment after the last line feed is retained, never returned.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        self.decode_pending();

        let Some(last) = self.carry.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        complete[..last].split('\n').map(str::to_owned).collect()
    }

    /// Number of buffered bytes that have not formed a complete line
    pub fn buffered_len(&self) -> usize {
        self.carry.len() + self.pending.len()
    }

    /// End of input. Whatever is still buffered is dropped; its length is
    /// returned for diagnostics.
    pub fn finish(self) -> usize {
        self.buffered_len()
    }

    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.carry.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                        self.carry.push_str(text);
                    }
                    match e.error_len() {
                        // Invalid sequence: substitute and keep going
                        Some(bad) => {
                            self.carry.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        // Truncated character: wait for the next chunk
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Turn a stream of body chunks into a lazy stream of complete lines.
///
/// A transport error is yielded once and ends the stream. An unterminated
/// fragment left at end of input is discarded.
pub fn lines<S, B, E>(chunks: S) -> LineStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    Box::pin(try_stream! {
        let mut chunks = Box::pin(chunks);
        let mut splitter = LineSplitter::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(Into::into)?;
            for line in splitter.push(chunk.as_ref()) {
                yield line;
            }
        }

        let dropped = splitter.finish();
        if dropped > 0 {
            tracing::debug!("Discarding {} bytes of unterminated trailing fragment", dropped);
        }
    })
}
