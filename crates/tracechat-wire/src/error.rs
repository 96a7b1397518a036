//! Error types for tracechat-wire

use thiserror::Error;

/// Result type alias using tracechat-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the chat backend or reading its stream
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed, or the response body broke off mid-stream
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A frame payload was not valid JSON for the expected shape
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame carried a `type` this client does not understand
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Backend answered with a non-success status
    #[error("API error: {status}: {message}")]
    Api { status: u16, message: String },

    /// The caller cancelled the stream
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether this error came from a frame the decoder could not make sense of
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Json(_) | Error::UnknownEventType(_))
    }
}
