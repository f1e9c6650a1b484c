use std::time::Duration;

use crate::errors::ChatError;

/// Default API base used by the document-chat backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// How a transport close without a `done`/`error` record is reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfStreamPolicy {
    /// Treat the close as a synthetic `done`.
    #[default]
    ImplicitDone,
    /// Treat the close as a synthetic `error`.
    Error,
}

impl std::str::FromStr for EndOfStreamPolicy {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "done" | "implicit_done" | "implicit-done" => Ok(Self::ImplicitDone),
            "error" => Ok(Self::Error),
            other => Err(ChatError::Config(format!(
                "unknown end-of-stream policy `{other}` (expected `done` or `error`)"
            ))),
        }
    }
}

/// Configuration for the chat client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat API (no trailing slash).
    pub base_url: String,
    /// Connect timeout. Streaming reads are not bounded by it.
    pub timeout: Duration,
    /// Whether answers should be grounded in retrieved document chunks.
    pub use_rag: bool,
    /// Upper bound on retrieved context characters sent to the model.
    pub max_context_length: u32,
    /// Bounded event buffer between the ingest task and the consumer.
    pub stream_buffer_capacity: usize,
    /// Reporting policy for a close without a terminal record.
    pub end_of_stream: EndOfStreamPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            use_rag: true,
            max_context_length: 2000,
            stream_buffer_capacity: 128,
            end_of_stream: EndOfStreamPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Builds a config from `RAGNAROK_*` environment variables.
    ///
    /// - `RAGNAROK_API_BASE_URL` (default `http://localhost:8000`)
    /// - `RAGNAROK_USE_RAG` (`true`/`false`, default `true`)
    /// - `RAGNAROK_MAX_CONTEXT_LENGTH` (default `2000`)
    /// - `RAGNAROK_END_OF_STREAM` (`done`/`error`, default `done`)
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ChatError> {
        let mut config = Self::default();
        if let Some(url) = lookup("RAGNAROK_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config = config.base_url(url);
        }
        if let Some(raw) = lookup("RAGNAROK_USE_RAG") {
            config.use_rag = parse_bool(&raw).ok_or_else(|| {
                ChatError::Config(format!("RAGNAROK_USE_RAG must be a boolean, got `{raw}`"))
            })?;
        }
        if let Some(raw) = lookup("RAGNAROK_MAX_CONTEXT_LENGTH") {
            config.max_context_length = raw.trim().parse().map_err(|_| {
                ChatError::Config(format!(
                    "RAGNAROK_MAX_CONTEXT_LENGTH must be a positive integer, got `{raw}`"
                ))
            })?;
        }
        if let Some(raw) = lookup("RAGNAROK_END_OF_STREAM") {
            config.end_of_stream = raw.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the API base URL. A trailing slash is removed.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the connect timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables document grounding.
    pub fn use_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    /// Overrides the retrieved context budget.
    pub fn max_context_length(mut self, max_context_length: u32) -> Self {
        self.max_context_length = max_context_length;
        self
    }

    /// Overrides the event buffer size.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Overrides the end-of-stream policy.
    pub fn end_of_stream(mut self, policy: EndOfStreamPolicy) -> Self {
        self.end_of_stream = policy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChatError> {
        if self.base_url.trim().is_empty() {
            return Err(ChatError::Config("base_url must not be empty".into()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "base_url must start with http:// or https://, got `{}`",
                self.base_url
            )));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ChatError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn chat_url(&self) -> String {
        format!("{}/api/llm", self.base_url)
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}
