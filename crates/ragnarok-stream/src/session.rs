use crate::stream::{ChatEvent, SessionState};

/// Aggregate state of one streamed answer.
///
/// Mutated only through `apply`, in event order. Once a terminal state is
/// reached the session is frozen.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StreamSession {
    pub session_id: uuid::Uuid,
    /// Answer text, appended token by token.
    pub answer: String,
    /// Source citations from the latest `start` event.
    pub sources: Vec<String>,
    pub context_found: bool,
    pub state: SessionState,
    pub last_error: Option<String>,
}

impl StreamSession {
    /// Creates a session already in `Streaming`.
    pub fn new(session_id: uuid::Uuid) -> Self {
        Self {
            session_id,
            answer: String::new(),
            sources: Vec::new(),
            context_found: false,
            state: SessionState::Streaming,
            last_error: None,
        }
    }

    /// Applies one event. Returns false if the session was already finalized.
    pub fn apply(&mut self, event: &ChatEvent) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        match event {
            ChatEvent::Start {
                sources,
                context_found,
            } => {
                self.sources = sources.clone();
                self.context_found = *context_found;
            }
            ChatEvent::Token { text } => self.answer.push_str(text),
            ChatEvent::Done => self.state = SessionState::Completed,
            ChatEvent::Error { message } => {
                self.state = SessionState::Failed;
                self.last_error = Some(message.clone());
            }
        }
        true
    }

    /// Finalizes as `Cancelled` unless already terminal.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Cancelled;
        true
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str) -> ChatEvent {
        ChatEvent::Token { text: text.into() }
    }

    #[test]
    fn tokens_append_and_start_replaces_sources() {
        let mut session = StreamSession::new(uuid::Uuid::new_v4());
        session.apply(&ChatEvent::Start {
            sources: vec!["a.pdf".into(), "b.pdf".into()],
            context_found: true,
        });
        session.apply(&token("Hello"));
        session.apply(&ChatEvent::Start {
            sources: vec!["c.pdf".into()],
            context_found: false,
        });
        session.apply(&token(", world"));
        assert_eq!(session.answer, "Hello, world");
        assert_eq!(session.sources, vec!["c.pdf".to_string()]);
        assert!(!session.context_found);
        assert_eq!(session.state, SessionState::Streaming);
    }

    #[test]
    fn terminal_session_is_frozen() {
        let mut session = StreamSession::new(uuid::Uuid::new_v4());
        session.apply(&token("partial"));
        assert!(session.apply(&ChatEvent::Error {
            message: "model crashed".into()
        }));
        assert!(!session.apply(&token(" more")));
        assert!(!session.apply(&ChatEvent::Done));
        assert!(!session.mark_cancelled());
        assert_eq!(session.answer, "partial");
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.last_error.as_deref(), Some("model crashed"));
    }

    #[test]
    fn cancellation_keeps_partial_answer_without_error() {
        let mut session = StreamSession::new(uuid::Uuid::new_v4());
        session.apply(&token("half"));
        assert!(session.mark_cancelled());
        assert!(session.is_finished());
        assert_eq!(session.state, SessionState::Cancelled);
        assert_eq!(session.last_error, None);
        assert_eq!(session.answer, "half");
    }
}
