use crate::config::ClientConfig;
use crate::errors::ChatError;

/// Body of `POST /api/llm`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRequest {
    /// The user's question.
    pub prompt: String,
    /// Ground the answer in retrieved document chunks.
    pub use_rag: bool,
    /// Upper bound on retrieved context characters.
    pub max_context_length: u32,
}

impl ChatRequest {
    /// Creates a request with backend defaults (`use_rag = true`, 2000 chars).
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            use_rag: true,
            max_context_length: 2000,
        }
    }

    /// Creates a request using the client-wide defaults.
    pub fn with_config(prompt: impl Into<String>, config: &ClientConfig) -> Self {
        Self {
            prompt: prompt.into(),
            use_rag: config.use_rag,
            max_context_length: config.max_context_length,
        }
    }

    pub fn use_rag(mut self, use_rag: bool) -> Self {
        self.use_rag = use_rag;
        self
    }

    pub fn max_context_length(mut self, max_context_length: u32) -> Self {
        self.max_context_length = max_context_length;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ChatError> {
        if self.prompt.trim().is_empty() {
            return Err(ChatError::Validation("prompt must not be empty".into()));
        }
        if self.max_context_length == 0 {
            return Err(ChatError::Validation(
                "max_context_length must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
