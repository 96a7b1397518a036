//! HTTP client for the conversation service and the chat stream endpoint

use reqwest::Response;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    event::{DecodePolicy, StreamEventStream, events},
    lines::lines,
    types::{
        ChatRequest, ConversationDetail, ConversationSummary, SaveExchangeRequest, TitleBody,
    },
};

/// Where the backend lives and whose conversations to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: String,
    user_id: String,
}

impl ClientConfig {
    /// Create a config, validating the base URL
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let user_id = user_id.into();

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }
        if user_id.is_empty() || user_id.contains('/') {
            return Err(Error::InvalidConfig(format!("invalid user id '{}'", user_id)));
        }

        Ok(Self { base_url, user_id })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn conversations_url(&self) -> String {
        format!("{}/conversations/{}", self.base_url, self.user_id)
    }

    fn conversation_url(&self, id: &str) -> String {
        format!("{}/{}", self.conversations_url(), id)
    }
}

/// Chat backend client
pub struct ChatClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ChatClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// List the user's conversations, newest first
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let response = self.client.get(self.config.conversations_url()).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Create a conversation
    pub async fn create_conversation(&self, title: &str) -> Result<ConversationSummary> {
        let response = self
            .client
            .post(self.config.conversations_url())
            .json(&TitleBody { title })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Fetch a conversation with its messages
    pub async fn get_conversation(&self, id: &str) -> Result<ConversationDetail> {
        let response = self.client.get(self.config.conversation_url(id)).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Delete a conversation
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.config.conversation_url(id))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Persist one completed user/assistant exchange
    pub async fn save_exchange(&self, id: &str, exchange: &SaveExchangeRequest) -> Result<()> {
        let url = format!("{}/messages", self.config.conversation_url(id));
        let response = self.client.post(url).json(exchange).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Rename a conversation
    pub async fn update_title(&self, id: &str, title: &str) -> Result<()> {
        let url = format!("{}/title", self.config.conversation_url(id));
        let response = self
            .client
            .patch(url)
            .json(&TitleBody { title })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Start a chat stream and return its decoded events
    pub async fn stream_chat(
        &self,
        request: &ChatRequest,
        policy: DecodePolicy,
        cancel: CancellationToken,
    ) -> Result<StreamEventStream> {
        let url = format!("{}/chat/stream", self.config.base_url);
        tracing::debug!("POST {} ({} history entries)", url, request.history.len());

        let send = self.client.post(url).json(request).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = send => response?,
        };
        let response = check(response).await?;

        Ok(events(lines(response.bytes_stream()), policy, cancel))
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(Error::api(status.as_u16(), text))
}
