//! Chat session: the conversation list, the active conversation, and sends.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracechat_wire::{ChatRequest, ConversationSummary, SaveExchangeRequest};

use crate::{
    conversation::{Conversation, DEFAULT_TITLE, Message},
    error::{Error, Result},
    reducer,
    service::ConversationService,
};

#[derive(Default)]
struct SessionState {
    /// Newest first
    conversations: Vec<Conversation>,
    active: Option<String>,
    /// Conversations with an outstanding send
    in_flight: HashSet<String>,
}

impl SessionState {
    fn find(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Run a reducer transition on conversation `id` and store the result.
    /// Returns false if the conversation no longer exists.
    fn transition(&mut self, id: &str, f: impl FnOnce(Conversation) -> Conversation) -> bool {
        match self.find_mut(id) {
            Some(slot) => {
                *slot = f(std::mem::take(slot));
                true
            }
            None => false,
        }
    }
}

/// A cloneable handle to the chat session.
///
/// Every stream transition is bound to the conversation id captured when the
/// send began, so switching or deleting conversations mid-stream never lets
/// events land anywhere else.
#[derive(Clone)]
pub struct ChatSession {
    service: Arc<dyn ConversationService>,
    state: Arc<Mutex<SessionState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl ChatSession {
    /// Create an empty session
    pub fn new(service: Arc<dyn ConversationService>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            service,
            state: Arc::new(Mutex::new(SessionState::default())),
            revision: Arc::new(revision),
        }
    }

    /// Receive a bumped revision number after every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn changed(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Sidebar entries, newest first
    pub fn conversations(&self) -> Vec<ConversationSummary> {
        self.state
            .lock()
            .conversations
            .iter()
            .map(|c| ConversationSummary {
                id: c.id.clone(),
                title: c.title.clone(),
            })
            .collect()
    }

    /// Id of the active conversation
    pub fn active_id(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    /// Snapshot of the active conversation
    pub fn active(&self) -> Option<Conversation> {
        let state = self.state.lock();
        let id = state.active.as_deref()?;
        state.find(id).cloned()
    }

    /// Snapshot of a conversation
    pub fn snapshot(&self, id: &str) -> Option<Conversation> {
        self.state.lock().find(id).cloned()
    }

    /// Whether a send is outstanding for a conversation
    pub fn is_busy(&self, id: &str) -> bool {
        self.state.lock().in_flight.contains(id)
    }

    /// Reload the conversation list. On failure the local list is kept.
    pub async fn refresh(&self) {
        let summaries = match self.service.list().await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::warn!("Failed to list conversations: {}", e);
                return;
            }
        };

        {
            let mut state = self.state.lock();
            let mut previous = std::mem::take(&mut state.conversations);

            // Local-only conversations stay on top
            let mut merged: Vec<Conversation> = previous
                .iter()
                .filter(|c| !c.synced)
                .cloned()
                .collect();

            for summary in summaries {
                match previous.iter().position(|c| c.id == summary.id) {
                    Some(idx) => {
                        let mut existing = previous.swap_remove(idx);
                        if !state.in_flight.contains(&existing.id) {
                            existing.title = summary.title;
                        }
                        merged.push(existing);
                    }
                    None => merged.push(Conversation::new(summary.id, summary.title, true)),
                }
            }

            // Keep anything still streaming even if the backend no longer lists it
            merged.extend(
                previous
                    .into_iter()
                    .filter(|c| c.synced && state.in_flight.contains(&c.id)),
            );

            let active_gone = state
                .active
                .as_ref()
                .is_some_and(|active| !merged.iter().any(|c| &c.id == active));
            if active_gone {
                state.active = None;
            }
            state.conversations = merged;
        }
        self.changed();
    }

    /// Create a conversation and make it active.
    ///
    /// If the backend is unreachable the conversation is created locally and
    /// never synced.
    pub async fn create(&self) -> String {
        let conversation = match self.service.create(DEFAULT_TITLE).await {
            Ok(summary) => Conversation::new(summary.id, summary.title, true),
            Err(e) => {
                tracing::warn!("Failed to create conversation, keeping it local: {}", e);
                Conversation::new(uuid::Uuid::new_v4().to_string(), DEFAULT_TITLE, false)
            }
        };

        let id = conversation.id.clone();
        {
            let mut state = self.state.lock();
            state.conversations.insert(0, conversation);
            state.active = Some(id.clone());
        }
        self.changed();
        id
    }

    /// Make a conversation active and load its messages.
    ///
    /// A failed load leaves the conversation with no messages. A conversation
    /// with an outstanding send keeps its local state.
    pub async fn select(&self, id: &str) -> Result<()> {
        let needs_load = {
            let mut state = self.state.lock();
            let synced = state
                .find(id)
                .map(|c| c.synced)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            state.active = Some(id.to_string());
            synced && !state.in_flight.contains(id)
        };
        self.changed();

        if !needs_load {
            return Ok(());
        }

        let loaded = self.service.get(id).await;

        {
            let mut state = self.state.lock();
            // A send may have started while we were loading
            if state.in_flight.contains(id) {
                return Ok(());
            }
            let Some(conversation) = state.find_mut(id) else {
                return Ok(());
            };
            match loaded {
                Ok(detail) => {
                    conversation.title = detail.title;
                    conversation.messages = detail.messages.into_iter().map(Message::from).collect();
                }
                Err(e) => {
                    tracing::warn!("Failed to load conversation {}: {}", id, e);
                    conversation.messages.clear();
                }
            }
        }
        self.changed();
        Ok(())
    }

    /// Delete a conversation. It is removed locally whatever the backend says.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let synced = self
            .state
            .lock()
            .find(id)
            .map(|c| c.synced)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if synced {
            if let Err(e) = self.service.delete(id).await {
                tracing::warn!("Failed to delete conversation {} remotely: {}", id, e);
            }
        }

        {
            let mut state = self.state.lock();
            state.conversations.retain(|c| c.id != id);
            if state.active.as_deref() == Some(id) {
                state.active = None;
            }
        }
        self.changed();
        Ok(())
    }

    /// Send a message in the active conversation and stream the response.
    ///
    /// Rejected (nothing appended) when the text is blank, no conversation is
    /// active, or a send is already outstanding for it. Once accepted, the
    /// assistant message always settles: stream failures and cancellation
    /// end up as an error description in the message, not as an `Err`.
    pub async fn send(&self, text: &str, cancel: CancellationToken) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let (id, request, pending_title, synced) = {
            let mut state = self.state.lock();
            let id = state.active.clone().ok_or(Error::NoActiveConversation)?;
            if state.in_flight.contains(&id) {
                return Err(Error::Busy(id));
            }
            let conversation = state
                .find_mut(&id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;

            let history = conversation.history();
            let synced = conversation.synced;
            let begun = reducer::begin(std::mem::take(conversation), text);
            *conversation = begun.conversation;

            state.in_flight.insert(id.clone());
            let request = ChatRequest {
                message: text.to_string(),
                history,
            };
            (id, request, begun.pending_title, synced)
        };
        let guard = InFlight {
            session: self,
            id: id.clone(),
        };
        self.changed();

        match self.stream_into(&id, &request, cancel).await {
            Ok(()) => {
                self.update(&id, reducer::finish);
                if synced {
                    self.persist_exchange(&id, text).await;
                }
            }
            Err(e) => {
                tracing::warn!("Stream for conversation {} failed: {}", id, e);
                self.update(&id, |c| reducer::fail(c, &e.to_string()));
            }
        }

        // Skip the rename if the conversation was deleted mid-stream
        let renamable = synced && self.snapshot(&id).is_some();
        if let (Some(title), true) = (pending_title, renamable) {
            if let Err(e) = self.service.update_title(&id, &title).await {
                tracing::warn!("Failed to update title of {}: {}", id, e);
            }
        }

        drop(guard);
        Ok(())
    }

    async fn stream_into(
        &self,
        id: &str,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> tracechat_wire::Result<()> {
        let mut events = self.service.stream_chat(request, cancel).await?;

        while let Some(event) = events.next().await {
            let event = event?;
            if !self.update(id, |c| reducer::apply(c, &event)) {
                tracing::debug!("Conversation {} was removed mid-stream, stopping", id);
                break;
            }
        }
        Ok(())
    }

    async fn persist_exchange(&self, id: &str, user_text: &str) {
        let exchange = self
            .snapshot(id)
            .and_then(|c| c.trailing().cloned())
            .map(|m| SaveExchangeRequest {
                user_message: user_text.to_string(),
                assistant_content: m.content,
                assistant_thinking: (!m.thinking.is_empty()).then_some(m.thinking),
            });

        let Some(exchange) = exchange else {
            return;
        };
        if let Err(e) = self.service.save_exchange(id, &exchange).await {
            tracing::warn!("Failed to save exchange in {}: {}", id, e);
        }
    }

    fn update(&self, id: &str, f: impl FnOnce(Conversation) -> Conversation) -> bool {
        let found = self.state.lock().transition(id, f);
        if found {
            self.changed();
        }
        found
    }
}

/// Releases the admission flag when a send ends, however it ends.
///
/// If the send future is dropped mid-stream the message is settled here.
struct InFlight<'a> {
    session: &'a ChatSession,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.session.state.lock();
            state.transition(&self.id, |c| reducer::fail(c, "Request cancelled"));
            state.in_flight.remove(&self.id);
        }
        self.session.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tracechat_wire::{
        ConversationDetail, DecodePolicy, Error as WireError, Result as WireResult,
        StoredMessage, StreamEventStream,
        event::events,
        lines::lines,
    };

    /// Scripted backend: replays canned response bodies through the real
    /// line/frame decoding, optionally holding each body until released.
    #[derive(Default)]
    struct FakeService {
        bodies: Mutex<Vec<Vec<&'static str>>>,
        gate: Option<Arc<Notify>>,
        fail_crud: bool,
        fail_save: bool,
        fail_stream_midway: bool,
        details: Mutex<Vec<ConversationDetail>>,
        requests: Mutex<Vec<ChatRequest>>,
        saved: Mutex<Vec<(String, SaveExchangeRequest)>>,
        titles: Mutex<Vec<(String, String)>>,
        deleted: Mutex<Vec<String>>,
        next_id: Mutex<u32>,
    }

    impl FakeService {
        fn with_bodies(bodies: Vec<Vec<&'static str>>) -> Self {
            Self {
                bodies: Mutex::new(bodies),
                ..Default::default()
            }
        }

        fn crud_error() -> WireError {
            WireError::api(503, "unavailable")
        }
    }

    #[async_trait]
    impl ConversationService for FakeService {
        async fn list(&self) -> WireResult<Vec<ConversationSummary>> {
            if self.fail_crud {
                return Err(Self::crud_error());
            }
            Ok(self
                .details
                .lock()
                .iter()
                .map(|d| ConversationSummary {
                    id: d.id.clone(),
                    title: d.title.clone(),
                })
                .collect())
        }

        async fn create(&self, title: &str) -> WireResult<ConversationSummary> {
            if self.fail_crud {
                return Err(Self::crud_error());
            }
            let mut next = self.next_id.lock();
            *next += 1;
            Ok(ConversationSummary {
                id: format!("conv-{}", next),
                title: title.to_string(),
            })
        }

        async fn get(&self, id: &str) -> WireResult<ConversationDetail> {
            if self.fail_crud {
                return Err(Self::crud_error());
            }
            self.details
                .lock()
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| WireError::api(404, "not found"))
        }

        async fn delete(&self, id: &str) -> WireResult<()> {
            self.deleted.lock().push(id.to_string());
            if self.fail_crud {
                return Err(Self::crud_error());
            }
            Ok(())
        }

        async fn save_exchange(&self, id: &str, exchange: &SaveExchangeRequest) -> WireResult<()> {
            self.saved.lock().push((id.to_string(), exchange.clone()));
            if self.fail_save {
                return Err(WireError::api(500, "redis down"));
            }
            Ok(())
        }

        async fn update_title(&self, id: &str, title: &str) -> WireResult<()> {
            self.titles.lock().push((id.to_string(), title.to_string()));
            if self.fail_save {
                return Err(WireError::api(500, "redis down"));
            }
            Ok(())
        }

        async fn stream_chat(
            &self,
            request: &ChatRequest,
            cancel: CancellationToken,
        ) -> WireResult<StreamEventStream> {
            self.requests.lock().push(request.clone());
            let body = {
                let mut bodies = self.bodies.lock();
                if bodies.is_empty() {
                    Vec::new()
                } else {
                    bodies.remove(0)
                }
            };
            let gate = self.gate.clone();
            let fail_midway = self.fail_stream_midway;

            let chunks = async_stream::stream! {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                for chunk in body {
                    yield Ok(chunk.as_bytes().to_vec());
                }
                if fail_midway {
                    yield Err(WireError::api(502, "connection reset"));
                }
            };
            Ok(events(lines(chunks), DecodePolicy::Abort, cancel))
        }
    }

    const HELLO_BODY: &[&str] = &[
        "data: {\"type\":\"thinking\",\"content\":\"Routing to: agent\\n\"}\n\n",
        "data: {\"type\":\"content\",\"content\":\"Hi there\"}\n\n",
    ];

    async fn session_with(service: FakeService) -> (ChatSession, Arc<FakeService>, String) {
        let service = Arc::new(service);
        let session = ChatSession::new(service.clone());
        let id = session.create().await;
        (session, service, id)
    }

    async fn wait_until_busy(session: &ChatSession, id: &str) {
        for _ in 0..1000 {
            if session.is_busy(id) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("send never started");
    }

    #[tokio::test]
    async fn test_end_to_end_send() {
        let (session, service, id) =
            session_with(FakeService::with_bodies(vec![HELLO_BODY.to_vec()])).await;

        session.send("hello", CancellationToken::new()).await.unwrap();

        let conv = session.snapshot(&id).unwrap();
        assert_eq!(conv.title, "hello");
        assert_eq!(conv.messages.len(), 2);
        let msg = conv.trailing().unwrap();
        assert_eq!(msg.thinking, "Routing to: agent\n");
        assert_eq!(msg.content, "Hi there");
        assert!(msg.thinking_done);
        assert!(!msg.is_streaming);
        assert!(!session.is_busy(&id));

        let steps = crate::classifier::classify(&msg.thinking, msg.is_streaming);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].category, crate::classifier::StepCategory::Action);
        assert!(!steps[0].is_terminal);

        let saved = service.saved.lock().clone();
        assert_eq!(
            saved,
            vec![(
                id.clone(),
                SaveExchangeRequest {
                    user_message: "hello".into(),
                    assistant_content: "Hi there".into(),
                    assistant_thinking: Some("Routing to: agent\n".into()),
                }
            )]
        );
        assert_eq!(service.titles.lock().clone(), vec![(id, "hello".to_string())]);
    }

    #[tokio::test]
    async fn test_second_send_sends_history_and_keeps_title() {
        let (session, service, id) = session_with(FakeService::with_bodies(vec![
            HELLO_BODY.to_vec(),
            vec!["data: {\"type\":\"content\",\"content\":\"again\"}\n"],
        ]))
        .await;

        session.send("hello", CancellationToken::new()).await.unwrap();
        session.send("  follow up  ", CancellationToken::new()).await.unwrap();

        let requests = service.requests.lock().clone();
        assert_eq!(requests[0].history.len(), 0);
        assert_eq!(requests[1].message, "follow up");
        let history: Vec<(&str, &str)> = requests[1]
            .history
            .iter()
            .map(|h| (h.role.as_str(), h.content.as_str()))
            .collect();
        assert_eq!(history, vec![("user", "hello"), ("assistant", "Hi there")]);

        assert_eq!(service.titles.lock().len(), 1);
        let saved = service.saved.lock().clone();
        assert_eq!(saved[1].1.assistant_thinking, None);
        assert_eq!(session.snapshot(&id).unwrap().title, "hello");
    }

    #[tokio::test]
    async fn test_second_send_rejected_while_streaming() {
        let gate = Arc::new(Notify::new());
        let service = FakeService {
            gate: Some(gate.clone()),
            ..FakeService::with_bodies(vec![HELLO_BODY.to_vec()])
        };
        let (session, _service, id) = session_with(service).await;

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.send("hello", CancellationToken::new()).await }
        });
        wait_until_busy(&session, &id).await;

        let err = session
            .send("again", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Busy(ref busy) if busy == &id));
        assert_eq!(session.snapshot(&id).unwrap().messages.len(), 2);

        gate.notify_one();
        first.await.unwrap().unwrap();
        assert!(!session.is_busy(&id));
        assert_eq!(session.snapshot(&id).unwrap().trailing().unwrap().content, "Hi there");
    }

    #[tokio::test]
    async fn test_switching_conversation_mid_stream() {
        let gate = Arc::new(Notify::new());
        let service = FakeService {
            gate: Some(gate.clone()),
            ..FakeService::with_bodies(vec![HELLO_BODY.to_vec()])
        };
        let (session, _service, first_id) = session_with(service).await;

        let send = tokio::spawn({
            let session = session.clone();
            async move { session.send("hello", CancellationToken::new()).await }
        });
        wait_until_busy(&session, &first_id).await;

        let second_id = session.create().await;
        assert_eq!(session.active_id().as_deref(), Some(second_id.as_str()));

        gate.notify_one();
        send.await.unwrap().unwrap();

        assert!(session.snapshot(&second_id).unwrap().messages.is_empty());
        let first = session.snapshot(&first_id).unwrap();
        assert_eq!(first.trailing().unwrap().content, "Hi there");
    }

    #[tokio::test]
    async fn test_delete_mid_stream_drops_events() {
        let gate = Arc::new(Notify::new());
        let service = FakeService {
            gate: Some(gate.clone()),
            ..FakeService::with_bodies(vec![HELLO_BODY.to_vec()])
        };
        let (session, service, id) = session_with(service).await;

        let send = tokio::spawn({
            let session = session.clone();
            async move { session.send("hello", CancellationToken::new()).await }
        });
        wait_until_busy(&session, &id).await;

        session.delete(&id).await.unwrap();
        gate.notify_one();
        send.await.unwrap().unwrap();

        assert!(session.snapshot(&id).is_none());
        assert!(!session.is_busy(&id));
        assert_eq!(*service.deleted.lock(), vec![id.clone()]);
        assert!(service.titles.lock().is_empty());
        assert!(service.saved.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_settles_with_error() {
        let service = FakeService {
            fail_stream_midway: true,
            ..FakeService::with_bodies(vec![vec![
                "data: {\"type\":\"thinking\",\"content\":\"Executing query\\n\"}\n",
                "data: {\"type\":\"content\",\"content\":\"partial\"}\n",
            ]])
        };
        let (session, service, id) = session_with(service).await;

        session.send("hello", CancellationToken::new()).await.unwrap();

        let msg = session.snapshot(&id).unwrap().trailing().cloned().unwrap();
        assert_eq!(msg.content, "Error: API error: 502: connection reset");
        assert_eq!(msg.thinking, "Executing query\n");
        assert!(msg.is_error);
        assert!(!msg.is_streaming);
        assert!(service.saved.lock().is_empty());
        assert_eq!(service.titles.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_frame_settles_with_error() {
        let (session, _service, id) = session_with(FakeService::with_bodies(vec![vec![
            "data: {\"type\":\"content\",\"content\":\"ok\"}\n",
            "data: {broken\n",
        ]]))
        .await;

        session.send("hello", CancellationToken::new()).await.unwrap();

        let msg = session.snapshot(&id).unwrap().trailing().cloned().unwrap();
        assert!(msg.content.starts_with("Error: Malformed frame"));
        assert!(!msg.is_streaming);
    }

    #[tokio::test]
    async fn test_cancelled_send_settles() {
        let gate = Arc::new(Notify::new());
        let service = FakeService {
            gate: Some(gate.clone()),
            ..FakeService::with_bodies(vec![HELLO_BODY.to_vec()])
        };
        let (session, _service, id) = session_with(service).await;
        let cancel = CancellationToken::new();

        let send = tokio::spawn({
            let session = session.clone();
            let cancel = cancel.clone();
            async move { session.send("hello", cancel).await }
        });
        wait_until_busy(&session, &id).await;
        cancel.cancel();
        send.await.unwrap().unwrap();

        let msg = session.snapshot(&id).unwrap().trailing().cloned().unwrap();
        assert_eq!(msg.content, "Error: Request cancelled");
        assert!(!msg.is_streaming);
        assert!(!session.is_busy(&id));
    }

    #[tokio::test]
    async fn test_dropped_send_future_settles() {
        let gate = Arc::new(Notify::new());
        let service = FakeService {
            gate: Some(gate),
            ..FakeService::with_bodies(vec![HELLO_BODY.to_vec()])
        };
        let (session, _service, id) = session_with(service).await;

        let send = tokio::spawn({
            let session = session.clone();
            async move { session.send("hello", CancellationToken::new()).await }
        });
        wait_until_busy(&session, &id).await;
        send.abort();
        assert!(send.await.unwrap_err().is_cancelled());

        let msg = session.snapshot(&id).unwrap().trailing().cloned().unwrap();
        assert!(!msg.is_streaming);
        assert!(msg.is_error);
        assert!(!session.is_busy(&id));
    }

    #[tokio::test]
    async fn test_rejections_append_nothing() {
        let service = Arc::new(FakeService::default());
        let session = ChatSession::new(service);

        let err = session.send("hi", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::NoActiveConversation));

        let id = session.create().await;
        let err = session.send("   ", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyMessage));
        assert!(err.is_rejection());
        assert!(session.snapshot(&id).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_swallowed() {
        let service = FakeService {
            fail_save: true,
            ..FakeService::with_bodies(vec![HELLO_BODY.to_vec()])
        };
        let (session, service, id) = session_with(service).await;

        session.send("hello", CancellationToken::new()).await.unwrap();

        let msg = session.snapshot(&id).unwrap().trailing().cloned().unwrap();
        assert_eq!(msg.content, "Hi there");
        assert_eq!(service.saved.lock().len(), 1);
        assert_eq!(session.snapshot(&id).unwrap().title, "hello");
    }

    #[tokio::test]
    async fn test_crud_failures_degrade_locally() {
        let service = FakeService {
            fail_crud: true,
            ..FakeService::with_bodies(vec![HELLO_BODY.to_vec()])
        };
        let (session, service, id) = session_with(service).await;

        let conv = session.snapshot(&id).unwrap();
        assert!(!conv.synced);
        assert_eq!(conv.title, DEFAULT_TITLE);
        assert_eq!(session.active_id().as_deref(), Some(id.as_str()));

        // Local-only conversations still chat, but never persist
        session.send("hello", CancellationToken::new()).await.unwrap();
        assert_eq!(session.snapshot(&id).unwrap().trailing().unwrap().content, "Hi there");
        assert!(service.saved.lock().is_empty());
        assert!(service.titles.lock().is_empty());

        session.refresh().await;
        assert_eq!(session.conversations().len(), 1);

        session.delete(&id).await.unwrap();
        assert!(session.conversations().is_empty());
        assert!(session.active_id().is_none());
        assert!(service.deleted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_select_loads_messages_or_clears_on_failure() {
        let service = Arc::new(FakeService {
            details: Mutex::new(vec![ConversationDetail {
                id: "c1".into(),
                title: "Sales".into(),
                messages: vec![
                    StoredMessage {
                        role: "user".into(),
                        content: "q".into(),
                        thinking: None,
                    },
                    StoredMessage {
                        role: "assistant".into(),
                        content: "a".into(),
                        thinking: Some("Routing to: database\n".into()),
                    },
                ],
            }]),
            ..Default::default()
        });
        let session = ChatSession::new(service.clone());

        session.refresh().await;
        assert_eq!(
            session.conversations(),
            vec![ConversationSummary {
                id: "c1".into(),
                title: "Sales".into()
            }]
        );

        session.select("c1").await.unwrap();
        let conv = session.active().unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert!(conv.messages.iter().all(|m| !m.is_streaming));

        service.details.lock().clear();
        session.select("c1").await.unwrap();
        assert!(session.active().unwrap().messages.is_empty());

        assert!(matches!(
            session.select("missing").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_delete_failure_still_removes_locally() {
        let service = Arc::new(FakeService {
            details: Mutex::new(vec![ConversationDetail {
                id: "c1".into(),
                title: "t".into(),
                messages: vec![],
            }]),
            ..Default::default()
        });
        let session = ChatSession::new(service.clone());
        session.refresh().await;
        session.select("c1").await.unwrap();

        // Flip to failing after the list loaded
        let failing = Arc::new(FakeService {
            fail_crud: true,
            ..Default::default()
        });
        let session = ChatSession {
            service: failing.clone(),
            ..session
        };
        session.delete("c1").await.unwrap();

        assert_eq!(failing.deleted.lock().clone(), vec!["c1".to_string()]);
        assert!(session.conversations().is_empty());
        assert!(session.active_id().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_revisions() {
        let (session, _service, _id) =
            session_with(FakeService::with_bodies(vec![HELLO_BODY.to_vec()])).await;
        let mut rx = session.subscribe();
        let before = *rx.borrow_and_update();

        session.send("hello", CancellationToken::new()).await.unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update() > before);
    }
}
