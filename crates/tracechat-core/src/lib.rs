//! tracechat-core: conversation state for a streaming chat client
//!
//! Holds the conversation list, applies decoded stream events to the
//! trailing assistant message, and classifies the agent's thinking trace
//! into steps for progressive rendering.

pub mod classifier;
pub mod conversation;
pub mod error;
pub mod reducer;
pub mod service;
pub mod session;

pub use classifier::{StepCache, StepCategory, StepStatus, ThinkingStep, classify};
pub use conversation::{Conversation, DEFAULT_TITLE, Message, MessagePhase, Role};
pub use error::{Error, Result};
pub use service::{ConversationService, HttpConversationService};
pub use session::ChatSession;
