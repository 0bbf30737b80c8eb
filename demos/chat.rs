//! Text chat example.
//!
//! Sends one question in research mode (web grounded) and prints the answer
//! and any search sources.
//!
//! Run with: GEMINI_API_KEY=... cargo run --example chat -- "your question"

use lumina_voice::{ChatClient, ChatConfig, ChatMode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let prompt = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let prompt = if prompt.is_empty() {
        "Which debt funds suit a conservative investor this year?".to_string()
    } else {
        prompt
    };

    let client = ChatClient::new(ChatConfig::from_env()?)?;
    match client.send_query(&prompt, &[], ChatMode::Research).await {
        Ok(reply) => {
            println!("{}", reply.text);
            if let Some(grounding) = reply.grounding_metadata {
                println!("\nSources: {grounding}");
            }
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            tracing::error!(error = %e, "chat failed");
        }
    }

    Ok(())
}
