use std::pin::Pin;

use futures::StreamExt as _;
use tracing::debug;

use crate::config::ClientConfig;
use crate::errors::{ChatError, TransportError};
use crate::request::ChatRequest;

/// Raw body fragments in arrival order.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Opens a chat request whose response body is streamed back incrementally.
///
/// Dropping the returned stream releases the underlying read.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

/// `Transport` backed by reqwest against the document-chat HTTP API.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ChatError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.chat_url(),
        })
    }

    /// Endpoint the transport posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        debug!(url = %self.url, use_rag = request.use_rag, "opening chat stream");
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::open(self.url.clone(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string())));
        Ok(Box::pin(stream))
    }
}
