//! Live voice example.
//!
//! Talks to the model through the default microphone and speakers until
//! Ctrl+C or until the session ends.
//!
//! Run with: GEMINI_API_KEY=... cargo run --example live_voice --features device

use lumina_voice::{LiveVoice, SessionStatus, VoiceEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lumina_voice=info")),
        )
        .init();

    let session = LiveVoice::builder()
        .voice("Zephyr")
        .on_event(|event| match event {
            VoiceEvent::StatusChanged { current, .. } => println!("[{current}]"),
            VoiceEvent::SpeakingFinished { window } => println!("model spoke for {window:?}"),
            other => tracing::debug!(?other, "voice event"),
        })
        .build()?;

    if let Err(e) = session.start().await {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    println!("Speak into the microphone. Press Ctrl+C to stop.");

    let mut status = session.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = status.wait_for(|s| s.is_terminal()) => {}
    }

    session.stop().await;

    if session.status() == SessionStatus::Error {
        if let Some(e) = session.last_error() {
            eprintln!("{} ({e})", e.user_message());
        }
    }
    println!("Stats: {:?}", session.stats());

    Ok(())
}
