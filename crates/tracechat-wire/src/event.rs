//! Stream events and frame decoding

use std::pin::Pin;

use async_stream::try_stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    lines::LineStream,
};

/// Prefix that marks a line as carrying an event
pub const FRAME_PREFIX: &str = "data: ";

/// One decoded unit of the agent's incremental output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of the agent's running trace
    Thinking(String),
    /// A fragment of the final answer
    Content(String),
}

impl StreamEvent {
    /// The text fragment carried by this event
    pub fn text(&self) -> &str {
        match self {
            StreamEvent::Thinking(text) | StreamEvent::Content(text) => text,
        }
    }
}

/// A stream of decoded events
pub type StreamEventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// What to do with a frame that cannot be decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Fail the whole stream: a corrupt frame means the protocol is out of sync
    #[default]
    Abort,
    /// Log and drop the frame, keep reading
    Skip,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
}

/// Decode one line into zero or one event.
///
/// Lines without the `data: ` prefix (blank keep-alives included) are not
/// frames and yield nothing. The agent's `done` marker is recognised and
/// also yields nothing.
pub fn decode_line(line: &str, policy: DecodePolicy) -> Result<Option<StreamEvent>> {
    let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
        return Ok(None);
    };

    match decode_payload(payload) {
        Err(e) if policy == DecodePolicy::Skip && e.is_decode() => {
            tracing::warn!("Skipping undecodable frame: {}", e);
            Ok(None)
        }
        result => result,
    }
}

fn decode_payload(payload: &str) -> Result<Option<StreamEvent>> {
    let frame: RawFrame = serde_json::from_str(payload)?;

    let content = || {
        frame
            .content
            .clone()
            .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("content"))
    };

    match frame.kind.as_str() {
        "thinking" => Ok(Some(StreamEvent::Thinking(content()?))),
        "content" => Ok(Some(StreamEvent::Content(content()?))),
        "done" => Ok(None),
        other => Err(Error::UnknownEventType(other.to_string())),
    }
}

/// Decode a line stream into an event stream.
///
/// Ends when the lines end. Errors (transport, decode under
/// [`DecodePolicy::Abort`], cancellation) are yielded once and end the stream.
pub fn events(
    mut lines: LineStream,
    policy: DecodePolicy,
    cancel: CancellationToken,
) -> StreamEventStream {
    Box::pin(try_stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                next = lines.next() => Ok(next),
            };

            let Some(line) = next? else {
                break;
            };

            if let Some(event) = decode_line(&line?, policy)? {
                yield event;
            }
        }
    })
}
