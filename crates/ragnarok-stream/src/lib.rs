//! Streaming client for the RAGnarok document-chat API.
//!
//! `POST /api/llm` answers with a chunked body of `data: {json}\n` records.
//! This crate re-frames that body, whatever its fragment boundaries, into an
//! ordered sequence of [`ChatEvent`]s and folds them into a [`StreamSession`].
//!
//! ```no_run
//! use ragnarok_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = ChatClient::from_env()?;
//! let mut stream = client.start(client.request("What do my PDFs say about leases?")).await?;
//!
//! while let Some(event) = stream.next_event().await {
//!     if let ChatEvent::Token { text } = event {
//!         print!("{text}");
//!     }
//! }
//!
//! let session = stream.finish().await;
//! println!("\nsources: {:?}", session.sources);
//! # Ok(())
//! # }
//! ```

/// Chat client entry point and builder.
pub mod client;
/// Client configuration and environment loading.
pub mod config;
/// Conversation store contract, in-memory store and controller.
pub mod conversation;
/// Public error types.
pub mod errors;
/// Fragment-by-fragment ingestion state machine.
pub mod ingestor;
/// Logging initialisation.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Request body for the chat endpoint.
pub mod request;
/// Streaming handle, cancellation handle and the ingest task.
pub mod run;
/// Aggregate state of one streamed answer.
pub mod session;
/// Typed chat events and session lifecycle states.
pub mod stream;
/// Transport contract and the reqwest HTTP transport.
pub mod transport;
/// Wire framing and record decoding.
pub mod wire;

pub use client::{ChatClient, ChatClientBuilder};
pub use config::{ClientConfig, EndOfStreamPolicy};
pub use conversation::{ChatController, ConversationStore, InMemoryConversation, Role, Turn};
pub use errors::{ChatError, TransportError};
pub use ingestor::StreamIngestor;
pub use request::ChatRequest;
pub use run::{CancelHandle, ChatStream};
pub use session::StreamSession;
pub use stream::{ChatEvent, SessionState};
pub use transport::{ByteStream, HttpTransport, Transport};
