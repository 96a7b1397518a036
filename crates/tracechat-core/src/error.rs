//! Error types for tracechat-core

use thiserror::Error;

/// Result type alias using tracechat-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] tracechat_wire::Error),

    /// A send is already outstanding for this conversation
    #[error("A response is still streaming in conversation {0}")]
    Busy(String),

    /// Nothing to send to
    #[error("No active conversation")]
    NoActiveConversation,

    /// Unknown conversation id
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// The message was empty after trimming
    #[error("Message is empty")]
    EmptyMessage,
}

impl Error {
    /// Whether a send was turned away before anything was appended
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Busy(_) | Error::NoActiveConversation | Error::EmptyMessage
        )
    }
}
