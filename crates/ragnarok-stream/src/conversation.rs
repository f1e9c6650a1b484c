//! Conversation history fed by dispatched chat events.
//!
//! The store is the consumer side of a stream: the controller translates each
//! event into one store call and guarantees that a superseded session can no
//! longer touch the visible conversation.

use tracing::{debug, info, warn};

use crate::client::ChatClient;
use crate::errors::ChatError;
use crate::request::ChatRequest;
use crate::run::{CancelHandle, ChatStream};
use crate::session::StreamSession;
use crate::stream::{ChatEvent, SessionState};

/// Single user-facing message shown in place of a failed answer.
pub const USER_FACING_ERROR: &str =
    "Sorry, I encountered an error. Please make sure the backend services are running and try again.";

/// Receives conversation updates in event order.
pub trait ConversationStore {
    fn append_user_turn(&mut self, text: &str);
    fn append_assistant_delta(&mut self, token: &str);
    fn finalize_assistant_turn(&mut self, sources: &[String]);
    fn mark_error(&mut self, message: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub sources: Vec<String>,
    /// True while assistant text is still arriving.
    pub streaming: bool,
    pub is_error: bool,
    /// Raw failure message, kept for diagnostics only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Turn {
    fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: text.to_string(),
            sources: Vec::new(),
            streaming: false,
            is_error: false,
            error_detail: None,
        }
    }

    fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            sources: Vec::new(),
            streaming: true,
            is_error: false,
            error_detail: None,
        }
    }
}

/// Ordered in-memory conversation.
#[derive(Clone, Debug, Default)]
pub struct InMemoryConversation {
    turns: Vec<Turn>,
}

impl InMemoryConversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    // The assistant turn currently receiving text, opened on first use.
    fn open_assistant_turn(&mut self) -> &mut Turn {
        let needs_turn = !matches!(
            self.turns.last(),
            Some(Turn {
                role: Role::Assistant,
                streaming: true,
                ..
            })
        );
        if needs_turn {
            self.turns.push(Turn::assistant());
        }
        let last = self.turns.len() - 1;
        &mut self.turns[last]
    }
}

impl ConversationStore for InMemoryConversation {
    fn append_user_turn(&mut self, text: &str) {
        self.turns.push(Turn::user(text));
    }

    fn append_assistant_delta(&mut self, token: &str) {
        self.open_assistant_turn().content.push_str(token);
    }

    fn finalize_assistant_turn(&mut self, sources: &[String]) {
        let turn = self.open_assistant_turn();
        turn.sources = sources.to_vec();
        turn.streaming = false;
    }

    fn mark_error(&mut self, message: &str) {
        let turn = self.open_assistant_turn();
        turn.content = USER_FACING_ERROR.to_string();
        turn.sources.clear();
        turn.streaming = false;
        turn.is_error = true;
        turn.error_detail = Some(message.to_string());
    }
}

struct ActiveSession {
    id: uuid::Uuid,
    cancel: CancelHandle,
    sources: Vec<String>,
    finished: bool,
}

/// Drives chat exchanges into a `ConversationStore`.
///
/// Only the most recently started session may update the store: starting a
/// new one cancels the previous one, and events tagged with any other session
/// id are discarded.
pub struct ChatController<S: ConversationStore> {
    client: ChatClient,
    store: S,
    active: Option<ActiveSession>,
}

impl<S: ConversationStore> ChatController<S> {
    pub fn new(client: ChatClient, store: S) -> Self {
        Self {
            client,
            store,
            active: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// Session id whose events are currently accepted.
    pub fn active_session(&self) -> Option<uuid::Uuid> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Cancels any running session, records the user turn and starts a new
    /// stream for `prompt` with the client defaults.
    pub async fn begin(&mut self, prompt: &str) -> Result<ChatStream, ChatError> {
        let request = self.client.request(prompt);
        self.begin_request(request).await
    }

    /// Like `begin` with an explicit request.
    pub async fn begin_request(
        &mut self,
        request: ChatRequest,
    ) -> Result<ChatStream, ChatError> {
        self.cancel_active();
        self.store.append_user_turn(&request.prompt);
        let stream = match self.client.start(request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.store.mark_error(&err.to_string());
                return Err(err);
            }
        };
        self.active = Some(ActiveSession {
            id: stream.session_id(),
            cancel: stream.cancel_handle(),
            sources: Vec::new(),
            finished: false,
        });
        Ok(stream)
    }

    /// Applies one event from `session_id` to the store.
    ///
    /// Returns false when the event was discarded because it belongs to a
    /// stale or already finished session.
    pub fn apply(&mut self, session_id: uuid::Uuid, event: &ChatEvent) -> bool {
        let Some(active) = self.active.as_mut().filter(|a| a.id == session_id) else {
            debug!(%session_id, "discarding event from stale session");
            return false;
        };
        if active.finished {
            return false;
        }
        match event {
            ChatEvent::Start { sources, .. } => active.sources = sources.clone(),
            ChatEvent::Token { text } => self.store.append_assistant_delta(text),
            ChatEvent::Done => {
                active.finished = true;
                self.store.finalize_assistant_turn(&active.sources);
            }
            ChatEvent::Error { message } => {
                active.finished = true;
                warn!(%session_id, %message, "chat answer failed");
                self.store.mark_error(message);
            }
        }
        true
    }

    /// Cancels the running session, keeping whatever text already arrived.
    pub fn cancel_active(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.cancel.cancel();
        if active.finished {
            return false;
        }
        info!(session_id = %active.id, "chat answer cancelled");
        self.store.finalize_assistant_turn(&active.sources);
        true
    }

    /// Runs one full exchange and returns the finalized session.
    pub async fn ask(&mut self, prompt: &str) -> Result<StreamSession, ChatError> {
        let mut stream = self.begin(prompt).await?;
        let session_id = stream.session_id();
        while let Some(event) = stream.next_event().await {
            self.apply(session_id, &event);
        }
        let session = stream.finish().await;
        if self.active_session() != Some(session_id) {
            return Ok(session);
        }
        if session.state == SessionState::Cancelled {
            self.cancel_active();
        } else if let Some(message) = session.last_error.clone() {
            // No-op when the terminal event was already applied.
            self.apply(session_id, &ChatEvent::Error { message });
        }
        Ok(session)
    }
}
