use std::io::Write as _;

use ragnarok_stream::observability::init_logging;
use ragnarok_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatError> {
    init_logging("warn");
    let client = ChatClient::from_env()?;

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Summarize the uploaded documents.".to_string());
    let mut stream = client.start(client.request(prompt)).await?;

    while let Some(event) = stream.next_event().await {
        match event {
            ChatEvent::Start { sources, .. } if !sources.is_empty() => {
                eprintln!("using {} document(s)", sources.len());
            }
            ChatEvent::Start { .. } => {}
            ChatEvent::Token { text } => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            ChatEvent::Done => println!(),
            ChatEvent::Error { message } => eprintln!("chat error: {message}"),
        }
    }

    let session = stream.finish().await;
    if !session.sources.is_empty() {
        println!("sources: {}", session.sources.join(", "));
    }
    Ok(())
}
