use clap::Parser;
use ragnarok_stream::{ChatError, ClientConfig, EndOfStreamPolicy};

#[derive(Parser, Debug)]
#[command(name = "ragnarok-chat")]
#[command(version, about = "Chat with your documents from the terminal")]
pub struct Cli {
    /// Chat API base URL (overrides RAGNAROK_API_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Answer without retrieved document context
    #[arg(long)]
    pub no_rag: bool,

    /// Maximum retrieved context characters
    #[arg(long)]
    pub max_context_length: Option<u32>,

    /// How a stream that closes without `done` is reported: `done` or `error`
    #[arg(long)]
    pub end_of_stream: Option<EndOfStreamPolicy>,

    /// Default log filter when RAGNAROK_LOG_LEVEL and RUST_LOG are unset
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Layers command-line flags over the environment configuration.
    pub fn client_config(&self) -> Result<ClientConfig, ChatError> {
        self.apply(ClientConfig::from_env()?)
    }

    fn apply(&self, mut config: ClientConfig) -> Result<ClientConfig, ChatError> {
        if let Some(base_url) = &self.base_url {
            config = config.base_url(base_url.clone());
        }
        if self.no_rag {
            config = config.use_rag(false);
        }
        if let Some(max) = self.max_context_length {
            if max == 0 {
                return Err(ChatError::Config(
                    "--max-context-length must be greater than zero".into(),
                ));
            }
            config = config.max_context_length(max);
        }
        if let Some(policy) = self.end_of_stream {
            config = config.end_of_stream(policy);
        }
        Ok(config)
    }
}

/// One line typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Ask(&'a str),
    Rag(bool),
    Clear,
    Quit,
    Empty,
    Unknown(&'a str),
}

impl<'a> Input<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if !line.starts_with('/') {
            return Self::Ask(line);
        }
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("/quit" | "/exit"), None) => Self::Quit,
            (Some("/clear"), None) => Self::Clear,
            (Some("/rag"), Some("on")) => Self::Rag(true),
            (Some("/rag"), Some("off")) => Self::Rag(false),
            _ => Self::Unknown(line),
        }
    }
}
