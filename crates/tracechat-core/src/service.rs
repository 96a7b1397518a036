//! Port to the external conversation service

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracechat_wire::{
    ChatClient, ChatRequest, ConversationDetail, ConversationSummary, DecodePolicy, Result,
    SaveExchangeRequest, StreamEventStream,
};

/// Everything the session needs from the backend
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// List conversations, newest first
    async fn list(&self) -> Result<Vec<ConversationSummary>>;

    /// Create a conversation with the given title
    async fn create(&self, title: &str) -> Result<ConversationSummary>;

    /// Fetch a conversation with its messages
    async fn get(&self, id: &str) -> Result<ConversationDetail>;

    /// Delete a conversation
    async fn delete(&self, id: &str) -> Result<()>;

    /// Persist one completed exchange
    async fn save_exchange(&self, id: &str, exchange: &SaveExchangeRequest) -> Result<()>;

    /// Rename a conversation
    async fn update_title(&self, id: &str, title: &str) -> Result<()>;

    /// Start streaming the agent's response to a message
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<StreamEventStream>;
}

/// [`ConversationService`] backed by the HTTP API
pub struct HttpConversationService {
    client: ChatClient,
    policy: DecodePolicy,
}

impl HttpConversationService {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            policy: DecodePolicy::default(),
        }
    }

    /// Set how undecodable frames are handled
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ConversationService for HttpConversationService {
    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        self.client.list_conversations().await
    }

    async fn create(&self, title: &str) -> Result<ConversationSummary> {
        self.client.create_conversation(title).await
    }

    async fn get(&self, id: &str) -> Result<ConversationDetail> {
        self.client.get_conversation(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client.delete_conversation(id).await
    }

    async fn save_exchange(&self, id: &str, exchange: &SaveExchangeRequest) -> Result<()> {
        self.client.save_exchange(id, exchange).await
    }

    async fn update_title(&self, id: &str, title: &str) -> Result<()> {
        self.client.update_title(id, title).await
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<StreamEventStream> {
        self.client.stream_chat(request, self.policy, cancel).await
    }
}
