use std::sync::Arc;

use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::ChatError;
use crate::request::ChatRequest;
use crate::run::ChatStream;
use crate::transport::{HttpTransport, Transport};

struct ClientInner {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

/// Entry point for starting streamed chat answers.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ClientInner>,
}

impl ChatClient {
    /// Starts a builder for wiring a transport and configuration.
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    /// Creates an HTTP client configured from `RAGNAROK_*` variables.
    pub fn from_env() -> Result<Self, ChatError> {
        let config = ClientConfig::from_env()?;
        Self::http(config)
    }

    /// Creates an HTTP client from explicit configuration.
    pub fn http(config: ClientConfig) -> Result<Self, ChatError> {
        let transport = HttpTransport::new(&config)?;
        Self::builder()
            .transport(Arc::new(transport))
            .config(config)
            .build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Builds a request for `prompt` using the configured defaults.
    pub fn request(&self, prompt: impl Into<String>) -> ChatRequest {
        ChatRequest::with_config(prompt, &self.inner.config)
    }

    /// Opens the transport and starts ingesting the response.
    ///
    /// An open failure is returned directly and no session is created; it is
    /// not retried. Every later problem is reported through the stream.
    pub async fn start(&self, request: ChatRequest) -> Result<ChatStream, ChatError> {
        request.validate()?;
        let body = self.inner.transport.open(&request).await?;
        let stream = ChatStream::from_body(
            body,
            self.inner.config.end_of_stream,
            self.inner.config.stream_buffer_capacity,
        );
        debug!(session_id = %stream.session_id(), use_rag = request.use_rag, "chat request accepted");
        Ok(stream)
    }
}

/// Builder used to assemble a `ChatClient`.
#[derive(Default)]
pub struct ChatClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    config: Option<ClientConfig>,
}

impl ChatClientBuilder {
    /// Sets the transport used to open chat requests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the client configuration. Defaults to `ClientConfig::default()`.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the client, validating configuration.
    pub fn build(self) -> Result<ChatClient, ChatError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| ChatError::Config("a transport must be provided".into()))?;
        Ok(ChatClient {
            inner: Arc::new(ClientInner { transport, config }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::stream::{ChatEvent, SessionState};
    use crate::transport::ByteStream;
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Refuse,
        Body(Vec<&'static str>),
    }

    struct FakeTransport {
        behavior: Behavior,
        opened: AtomicUsize,
        last_request: Mutex<Option<ChatRequest>>,
    }

    impl FakeTransport {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                opened: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("lock") = Some(request.clone());
            match &self.behavior {
                Behavior::Refuse => Err(TransportError::Status {
                    status: 503,
                    body: "ollama unavailable".into(),
                }),
                Behavior::Body(fragments) => {
                    let items: Vec<Result<bytes::Bytes, TransportError>> = fragments
                        .iter()
                        .map(|f| Ok(bytes::Bytes::from_static(f.as_bytes())))
                        .collect();
                    Ok(Box::pin(stream::iter(items)))
                }
            }
        }
    }

    fn client_with(transport: Arc<FakeTransport>) -> ChatClient {
        ChatClient::builder()
            .transport(transport)
            .config(ClientConfig::default().use_rag(false))
            .build()
            .expect("build client")
    }

    #[test]
    fn build_requires_transport() {
        let result = ChatClient::builder().build();
        assert!(matches!(result, Err(ChatError::Config(msg)) if msg.contains("transport")));
    }

    #[tokio::test]
    async fn open_failure_is_returned_from_start() {
        let transport = Arc::new(FakeTransport::new(Behavior::Refuse));
        let client = client_with(transport.clone());
        let err = match client.start(client.request("hello")).await {
            Ok(_) => panic!("open should fail"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            ChatError::Transport(TransportError::Status { status: 503, .. })
        ));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_prompt_never_reaches_transport() {
        let transport = Arc::new(FakeTransport::new(Behavior::Body(vec![])));
        let client = client_with(transport.clone());
        let result = client.start(client.request("  ")).await;
        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_streams_events_with_configured_request() {
        let transport = Arc::new(FakeTransport::new(Behavior::Body(vec![
            "data: {\"type\":\"start\",\"sources_used\":[\"manual.pdf\"],\"context_found\":true}\n",
            "data: {\"type\":\"chunk\",\"content\":\"Read page 4.\"}\n",
            "data: {\"type\":\"done\"}\n",
        ])));
        let client = client_with(transport.clone());
        let mut stream = client.start(client.request("where?")).await.expect("start");

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], ChatEvent::Done);

        let session = stream.finish().await;
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.answer, "Read page 4.");
        assert_eq!(session.sources, vec!["manual.pdf".to_string()]);

        let sent = transport.last_request.lock().expect("lock").clone().expect("request");
        assert_eq!(sent.prompt, "where?");
        assert!(!sent.use_rag);
    }
}
