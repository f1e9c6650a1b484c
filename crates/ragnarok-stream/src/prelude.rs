//! Common imports for typical client usage.
pub use crate::{
    CancelHandle, ChatClient, ChatController, ChatError, ChatEvent, ChatRequest, ChatStream,
    ClientConfig, ConversationStore, EndOfStreamPolicy, InMemoryConversation, SessionState,
    StreamSession, Transport,
};
