//! tracechat-wire: chat backend plumbing
//!
//! Splits a chunked response body into lines, decodes `data: ` frames into
//! [`StreamEvent`]s, and talks to the conversation service over HTTP.

pub mod client;
pub mod error;
pub mod event;
pub mod lines;
pub mod types;

pub use client::{ChatClient, ClientConfig};
pub use error::{Error, Result};
pub use event::{DecodePolicy, StreamEvent, StreamEventStream};
pub use lines::{LineSplitter, LineStream};
pub use types::*;
