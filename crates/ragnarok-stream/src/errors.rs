/// Errors produced by a `Transport` while opening or reading a response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent (connection refused, DNS, timeout...).
    #[error("failed to open chat stream at {url}: {message}")]
    Open { url: String, message: String },
    /// The server answered with a non-success status before streaming.
    #[error("chat service returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The body stream failed after it was established.
    #[error("chat stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    /// Creates an open-time error.
    pub fn open(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Open {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a mid-stream read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }
}

/// Top-level error type for the public client API.
///
/// Parse-level anomalies never surface here: malformed records are skipped
/// inside the ingestor and only logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid request input.
    #[error("validation error: {0}")]
    Validation(String),
    /// The transport failed to open; no session was created.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
