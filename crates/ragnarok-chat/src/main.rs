//! Terminal chat over the RAGnarok document-chat API.
//!
//! Answers stream to stdout as they arrive. Ctrl-C stops the current answer
//! and keeps the partial text. At the prompt, Ctrl-C or `/quit` leaves.

mod cli;

use std::io::Write as _;

use clap::Parser as _;
use ragnarok_stream::observability::init_logging;
use ragnarok_stream::{
    ChatClient, ChatController, ChatEvent, InMemoryConversation, SessionState,
    conversation::USER_FACING_ERROR,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{Cli, Input};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = cli.client_config()?;
    let mut use_rag = config.use_rag;
    info!(base_url = %config.base_url, use_rag, "starting chat");
    let client = ChatClient::http(config)?;
    let mut controller = ChatController::new(client, InMemoryConversation::new());

    let mut interrupts = Interrupts::listen();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(use_rag)?;
        let Some(line) = read_input(&mut lines, &mut interrupts).await? else {
            println!();
            break;
        };
        match Input::parse(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Clear => {
                controller.cancel_active();
                controller.store_mut().clear();
                println!("conversation cleared");
            }
            Input::Rag(enabled) => {
                use_rag = enabled;
                println!("document context {}", if enabled { "on" } else { "off" });
            }
            Input::Unknown(command) => {
                println!("unknown command `{command}` (try /rag on|off, /clear, /quit)");
            }
            Input::Ask(text) => {
                answer(&mut controller, text, use_rag, &mut interrupts).await?;
            }
        }
    }
    controller.cancel_active();
    Ok(())
}

/// Ctrl-C presses, captured by one listener for the whole process.
///
/// A press stops the answer in flight, or leaves the prompt when idle.
struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    fn listen() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// Resolves on the next press. Never resolves once the listener is gone.
    async fn next(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

fn prompt(use_rag: bool) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "{}> ", if use_rag { "rag" } else { "chat" })?;
    out.flush()
}

// `None` on end of input or Ctrl-C.
async fn read_input<R>(
    lines: &mut Lines<R>,
    interrupts: &mut Interrupts,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        biased;
        _ = interrupts.next() => Ok(None),
        line = lines.next_line() => line,
    }
}

async fn answer(
    controller: &mut ChatController<InMemoryConversation>,
    text: &str,
    use_rag: bool,
    interrupts: &mut Interrupts,
) -> Result<Option<SessionState>, Box<dyn std::error::Error>> {
    let request = controller.client().request(text).use_rag(use_rag);
    let mut stream = match controller.begin_request(request).await {
        Ok(stream) => stream,
        Err(err) => {
            debug!(error = %err, "chat request failed to start");
            eprintln!("{USER_FACING_ERROR}");
            return Ok(None);
        }
    };
    let session_id = stream.session_id();
    let mut out = std::io::stdout();

    loop {
        tokio::select! {
            biased;
            _ = interrupts.next() => {
                stream.cancel();
                controller.cancel_active();
                writeln!(out, "\n[stopped]")?;
                break;
            }
            event = stream.next_event() => {
                let Some(event) = event else { break };
                controller.apply(session_id, &event);
                match &event {
                    ChatEvent::Start { .. } => {}
                    ChatEvent::Token { text } => {
                        write!(out, "{text}")?;
                        out.flush()?;
                    }
                    ChatEvent::Done => writeln!(out)?,
                    ChatEvent::Error { .. } => {
                        writeln!(out)?;
                        eprintln!("{USER_FACING_ERROR}");
                    }
                }
            }
        }
    }

    let session = stream.finish().await;
    if !session.sources.is_empty() {
        println!("sources: {}", session.sources.join(", "));
    }
    Ok(Some(session.state))
}
