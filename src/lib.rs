//! # lumina-voice
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Realtime voice sessions against a hosted speech-to-speech model.
//!
//! `lumina-voice` streams microphone audio to a live model endpoint as
//! 16 kHz PCM frames and plays the model's 24 kHz audio back gaplessly,
//! handling barge-in interruptions and exactly-once teardown of every device
//! and connection it acquired.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lumina_voice::{LiveVoice, SessionStatus};
//!
//! // With the `device` feature: default microphone, default speakers and
//! // GEMINI_API_KEY from the environment.
//! let session = LiveVoice::builder()
//!     .voice("Zephyr")
//!     .on_event(|e| tracing::warn!(?e, "voice event"))
//!     .build()?;
//!
//! session.start().await?;
//!
//! let mut status = session.subscribe();
//! while status.changed().await.is_ok() {
//!     println!("{}", *status.borrow());
//! }
//!
//! session.stop().await;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Audio Thread**: CPAL callbacks that never block, only push to or pull
//!   from lock-free ring buffers
//! - **Capture Bridge**: tokio task cutting the ring buffer into fixed
//!   windows and encoding them for the wire
//! - **Forwarder**: single task sending queued frames once the connection is
//!   confirmed, so capture can start before the remote side answers
//! - **Supervisor**: tokio task reacting to inbound audio, interruptions,
//!   failures and the end of each spoken turn
//!
//! A slow network never stalls capture, and the playback timeline is only
//! touched under one lock.
//!
//! The [`chat`] module adds a small text-chat client for the same provider.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
pub mod chat;
mod config;
mod error;
mod event;
pub mod format;
mod frame;
mod pipeline;
pub mod playback;
mod session;
pub mod source;
pub mod transport;

pub use builder::{LiveVoice, LiveVoiceBuilder};
pub use chat::{ChatClient, ChatConfig, ChatMode, ChatResponse};
pub use config::{
    api_key_from_env, ResponseModality, SessionConfig, VoiceConfig, API_KEY_ENV_VARS,
    DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE,
};
pub use error::{ChatError, DecodeError, TransportError, VoiceError};
pub use event::{event_callback, EventCallback, VoiceEvent};
pub use frame::{pcm_mime_type, AudioFrame, EncodedFrame, CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};
pub use playback::{AudioOutput, PlaybackScheduler};
pub use session::{SessionStats, SessionStatus, VoiceSession};
pub use source::FrameSource;
pub use transport::{SessionHandle, Transport};
