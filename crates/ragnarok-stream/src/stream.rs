/// Semantic events reconstructed from the chat response body.
///
/// Events are delivered in the order their records completed parsing.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Retrieval finished; carries the documents used as context.
    Start {
        sources: Vec<String>,
        context_found: bool,
    },
    /// Incremental answer text. Never empty.
    Token { text: String },
    /// Normal completion.
    Done,
    /// Terminal failure, either reported by the server or synthesized from a
    /// transport problem.
    Error { message: String },
}

impl ChatEvent {
    /// Returns true for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// Lifecycle of one streamed response.
///
/// `Idle -> Streaming -> {Completed, Failed, Cancelled}`; terminal states are
/// sticky.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}
