//! Builder pattern for `LiveVoice`.

use std::sync::Arc;

use crate::playback::AudioOutput;
use crate::session::{SessionParts, VoiceSession};
use crate::source::FrameSource;
use crate::transport::Transport;
use crate::{event_callback, EventCallback, SessionConfig, VoiceConfig, VoiceError, VoiceEvent};

/// Builder for configuring a voice session.
///
/// Use [`LiveVoice::builder()`] to create a new builder.
///
/// With the `device` feature, anything left unset falls back to the default
/// microphone, the default speakers and a [`GeminiLiveTransport`] keyed from
/// the environment. Without it, a source and an output must be supplied.
///
/// [`GeminiLiveTransport`]: crate::transport::GeminiLiveTransport
///
/// # Example
///
/// ```
/// use lumina_voice::playback::MockOutput;
/// use lumina_voice::source::MockSource;
/// use lumina_voice::transport::MockTransport;
/// use lumina_voice::{LiveVoice, VoiceConfig};
/// use std::time::Duration;
///
/// let session = LiveVoice::builder()
///     .source(MockSource::capture_format())
///     .transport(MockTransport::new())
///     .output(MockOutput::new())
///     .voice("Puck")
///     .with_config(VoiceConfig {
///         connect_timeout: Some(Duration::from_secs(5)),
///         ..Default::default()
///     })
///     .on_event(|event| eprintln!("{event:?}"))
///     .build()
///     .unwrap();
///
/// assert_eq!(session.status(), lumina_voice::SessionStatus::Idle);
/// ```
#[must_use]
pub struct LiveVoiceBuilder {
    source: Option<Box<dyn FrameSource>>,
    transport: Option<Arc<dyn Transport>>,
    output: Option<Arc<dyn AudioOutput>>,
    session_config: SessionConfig,
    config: VoiceConfig,
    event_callback: Option<EventCallback>,
}

impl LiveVoiceBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            source: None,
            transport: None,
            output: None,
            session_config: SessionConfig::default(),
            config: VoiceConfig::default(),
            event_callback: None,
        }
    }

    /// Sets the microphone.
    pub fn source<S: FrameSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Sets the transport to the remote endpoint.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the playback output.
    pub fn output<O: AudioOutput + 'static>(mut self, output: O) -> Self {
        self.output = Some(Arc::new(output));
        self
    }

    /// Replaces all session parameters.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets the model identifier.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.session_config.model = model.into();
        self
    }

    /// Sets the prebuilt voice.
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.session_config.voice = voice.into();
        self
    }

    /// Sets the system instruction.
    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.session_config.system_instruction = instruction.into();
        self
    }

    /// Sets a callback for runtime events.
    ///
    /// Called from a background task; keep it fast and non-blocking.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(VoiceEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Sets the pipeline configuration.
    pub fn with_config(mut self, config: VoiceConfig) -> Self {
        self.config = config;
        self
    }

    fn validate(&self) -> Result<(), VoiceError> {
        self.config.validate()?;
        self.session_config.validate()
    }

    /// Builds an idle session. Call [`VoiceSession::start()`] to begin.
    ///
    /// Nothing is acquired yet, apart from default devices opened to fill
    /// unset parts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for bad configuration or a missing part, and
    /// device or transport errors if a default could not be opened.
    pub fn build(self) -> Result<VoiceSession, VoiceError> {
        self.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(crate::transport::GeminiLiveTransport::from_env()?),
        };
        let mut source = match self.source {
            Some(source) => source,
            None => default_source()?,
        };
        source.set_buffer_duration(self.config.capture_buffer_duration);
        let output = match self.output {
            Some(output) => output,
            None => default_output()?,
        };

        Ok(VoiceSession::new(SessionParts {
            source,
            transport,
            output,
            session_config: self.session_config,
            config: self.config,
            event_callback: self.event_callback,
        }))
    }
}

impl Default for LiveVoiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "device")]
fn default_source() -> Result<Box<dyn FrameSource>, VoiceError> {
    Ok(Box::new(crate::source::MicrophoneSource::open_default()?))
}

#[cfg(not(feature = "device"))]
fn default_source() -> Result<Box<dyn FrameSource>, VoiceError> {
    Err(VoiceError::invalid_config(
        "no frame source configured (enable the `device` feature for the default microphone)",
    ))
}

#[cfg(feature = "device")]
fn default_output() -> Result<Arc<dyn AudioOutput>, VoiceError> {
    Ok(Arc::new(crate::playback::SpeakerOutput::open_default()?))
}

#[cfg(not(feature = "device"))]
fn default_output() -> Result<Arc<dyn AudioOutput>, VoiceError> {
    Err(VoiceError::invalid_config(
        "no audio output configured (enable the `device` feature for the default speakers)",
    ))
}

/// Entry point for creating voice sessions.
pub struct LiveVoice;

impl LiveVoice {
    /// Creates a new builder for configuring a voice session.
    pub fn builder() -> LiveVoiceBuilder {
        LiveVoiceBuilder::new()
    }
}
