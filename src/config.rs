//! Configuration types for voice sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::samples_to_duration;
use crate::{VoiceError, CAPTURE_SAMPLE_RATE};

/// Live model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Prebuilt voice used when none is configured.
pub const DEFAULT_VOICE: &str = "Zephyr";

/// System instruction used when none is configured.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Lumina, a sophisticated financial advisor AI assistant. Keep responses concise, professional, and helpful.";

/// Environment variables checked, in order, for the provider API key.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Reads the provider API key from the environment.
///
/// Empty values are ignored.
pub fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// What the model answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseModality {
    /// Spoken audio (the only modality playback understands).
    #[default]
    Audio,
    /// Text parts.
    Text,
}

/// Session parameters sent to the remote endpoint when the connection opens.
///
/// These are fixed for the life of the session.
///
/// # Example
///
/// ```
/// use lumina_voice::SessionConfig;
///
/// let config = SessionConfig {
///     voice: "Puck".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.model, lumina_voice::DEFAULT_MODEL);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Model identifier without the `models/` prefix.
    pub model: String,
    /// Response modality.
    pub response_modality: ResponseModality,
    /// Prebuilt voice name.
    pub voice: String,
    /// System instruction.
    pub system_instruction: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            response_modality: ResponseModality::Audio,
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl SessionConfig {
    /// Returns the model name in the `models/<id>` form the API expects.
    pub fn qualified_model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    /// Checks that the session can be opened with these parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty model or voice.
    pub fn validate(&self) -> Result<(), VoiceError> {
        if self.model.trim().is_empty() {
            return Err(VoiceError::invalid_config("model must not be empty"));
        }
        if self.voice.trim().is_empty() {
            return Err(VoiceError::invalid_config("voice must not be empty"));
        }
        Ok(())
    }
}

/// Local behaviour of the capture and playback pipeline.
///
/// Use [`VoiceConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use lumina_voice::VoiceConfig;
/// use std::time::Duration;
///
/// let config = VoiceConfig {
///     connect_timeout: Some(Duration::from_secs(5)),
///     ..Default::default()
/// };
/// assert_eq!(config.window_size, 4096);
/// ```
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Samples per outbound window at 16 kHz.
    ///
    /// Default: 4096 (256ms)
    pub window_size: usize,

    /// How long to wait for the remote endpoint to confirm the session.
    ///
    /// `None` waits forever. Default: 15 seconds
    pub connect_timeout: Option<Duration>,

    /// How close playback must get to the end of the schedule before the
    /// model counts as silent.
    ///
    /// Default: 10ms
    pub speaking_epsilon: Duration,

    /// How often the capture bridge polls the microphone ring buffer.
    ///
    /// Default: 20ms
    pub capture_poll_interval: Duration,

    /// How often the controller checks whether playback has caught up.
    ///
    /// Default: 20ms
    pub speaking_check_interval: Duration,

    /// Microphone ring buffer size.
    ///
    /// Absorbs scheduling hiccups in the async runtime. Applied to every
    /// source through [`FrameSource::set_buffer_duration`]. Default: 5 seconds
    ///
    /// [`FrameSource::set_buffer_duration`]: crate::FrameSource::set_buffer_duration
    pub capture_buffer_duration: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            connect_timeout: Some(Duration::from_secs(15)),
            speaking_epsilon: Duration::from_millis(10),
            capture_poll_interval: Duration::from_millis(20),
            speaking_check_interval: Duration::from_millis(20),
            capture_buffer_duration: Duration::from_secs(5),
        }
    }
}

impl VoiceConfig {
    /// Returns the duration of one outbound window.
    pub fn window_duration(&self) -> Duration {
        samples_to_duration(self.window_size, CAPTURE_SAMPLE_RATE)
    }

    /// Checks the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero window or zero intervals.
    pub fn validate(&self) -> Result<(), VoiceError> {
        if self.window_size == 0 {
            return Err(VoiceError::invalid_config("window_size must be non-zero"));
        }
        if self.capture_poll_interval.is_zero() || self.speaking_check_interval.is_zero() {
            return Err(VoiceError::invalid_config("poll intervals must be non-zero"));
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(VoiceError::invalid_config("connect_timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.voice, "Zephyr");
        assert_eq!(config.response_modality, ResponseModality::Audio);
        assert!(config.system_instruction.starts_with("You are Lumina"));
    }

    #[test]
    fn test_qualified_model() {
        let mut config = SessionConfig::default();
        assert_eq!(
            config.qualified_model(),
            format!("models/{DEFAULT_MODEL}")
        );
        config.model = "models/custom".to_string();
        assert_eq!(config.qualified_model(), "models/custom");
    }

    #[test]
    fn test_session_config_rejects_empty_model() {
        let config = SessionConfig {
            model: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VoiceError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_voice_config_defaults() {
        let config = VoiceConfig::default();
        assert_eq!(config.window_size, 4096);
        assert_eq!(config.window_duration(), Duration::from_millis(256));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(15)));
        assert_eq!(config.speaking_epsilon, Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_voice_config_rejects_zero_window() {
        let config = VoiceConfig {
            window_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_modality_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ResponseModality::Audio).unwrap(),
            "\"AUDIO\""
        );
    }
}
