//! Error types for lumina-voice.
//!
//! Errors are split by how the session reacts to them:
//! - **Terminal errors** ([`VoiceError`], [`TransportError`]): the session
//!   tears down and moves to [`SessionStatus::Error`](crate::SessionStatus::Error)
//! - **Dropped frames** ([`DecodeError`]): logged, surfaced as a
//!   [`VoiceEvent`](crate::VoiceEvent), and the session keeps running
//!
//! Nothing is retried automatically. The user restarts the session.

use std::time::Duration;

/// Errors that end a voice session or prevent it from starting.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VoiceError {
    /// The microphone could not be acquired or stopped delivering audio.
    #[error("audio device unavailable: {reason}")]
    DeviceUnavailable {
        /// Why the device is unavailable.
        reason: String,
    },

    /// Permission to capture audio was denied.
    ///
    /// On macOS, check System Settings > Privacy & Security > Microphone.
    #[error("permission denied for audio capture (check OS settings)")]
    PermissionDenied,

    /// The connection to the remote endpoint failed or dropped.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The remote endpoint did not confirm the session in time.
    #[error("connection not confirmed within {timeout:?}")]
    ConnectTimeout {
        /// The timeout that expired.
        timeout: Duration,
    },

    /// The session was configured with invalid parameters.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// `start()` was called on a session that is already running.
    #[error("session already started")]
    AlreadyStarted,

    /// The session has been closed; create a new one to reconnect.
    #[error("session is closed - create a new session to reconnect")]
    SessionClosed,

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

impl VoiceError {
    /// Creates a device unavailable error with the given reason.
    pub fn device_unavailable(reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error with the given reason.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors caused by the capture device.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable { .. } | Self::PermissionDenied | Self::BackendError(_)
        )
    }

    /// A short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DeviceUnavailable { .. } | Self::PermissionDenied | Self::BackendError(_) => {
                "Could not access microphone."
            }
            Self::Transport(_) | Self::ConnectTimeout { .. } => "Connection interrupted",
            Self::InvalidConfig { .. } | Self::AlreadyStarted | Self::SessionClosed => {
                "Voice session unavailable."
            }
        }
    }
}

/// Errors raised by a [`Transport`](crate::Transport) or its link.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connect failed: {reason}")]
    ConnectFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// A frame could not be written to the connection.
    #[error("send failed: {reason}")]
    SendFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The remote endpoint sent something that violates the protocol.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Description of the violation.
        reason: String,
    },

    /// The connection is closed.
    #[error("connection closed")]
    Closed,

    /// Custom error for user-implemented transports.
    #[error("{0}")]
    Custom(String),
}

impl TransportError {
    /// Creates a connect failed error with the given reason.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            reason: reason.into(),
        }
    }

    /// Creates a send failed error with the given reason.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }

    /// Creates a protocol error with the given reason.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates a custom transport error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// A malformed inbound audio frame. Non-fatal: the frame is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid base64.
    #[error("invalid base64 payload: {reason}")]
    InvalidBase64 {
        /// Decoder message.
        reason: String,
    },

    /// The decoded payload cannot hold whole 16-bit samples.
    #[error("odd PCM byte length {len} (expected whole 16-bit samples)")]
    OddByteLength {
        /// Number of decoded bytes.
        len: usize,
    },

    /// The frame declares a format other than the negotiated one.
    #[error("unexpected audio format: {mime_type}")]
    UnexpectedFormat {
        /// The declared MIME type.
        mime_type: String,
    },

    /// The inline media part is missing its payload or has the wrong shape.
    #[error("malformed audio part: {reason}")]
    Malformed {
        /// What is wrong with the part.
        reason: String,
    },
}

/// Errors from the text chat client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// No API key was configured.
    #[error("no API key: set GEMINI_API_KEY or API_KEY")]
    MissingApiKey,
}

impl ChatError {
    /// A short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        "I encountered an issue connecting to the neural network. Please try again."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::Api {
            status: 429,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "API error (429): quota exceeded");
        assert!(ChatError::MissingApiKey.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_voice_error_display() {
        let err = VoiceError::device_unavailable("no input device");
        assert_eq!(err.to_string(), "audio device unavailable: no input device");
    }

    #[test]
    fn test_transport_error_converts() {
        let err: VoiceError = TransportError::connect_failed("refused").into();
        assert!(matches!(err, VoiceError::Transport(_)));
        assert_eq!(err.to_string(), "transport error: connect failed: refused");
    }

    #[test]
    fn test_device_error_classification() {
        assert!(VoiceError::PermissionDenied.is_device_error());
        assert!(!VoiceError::SessionClosed.is_device_error());
        assert!(!VoiceError::from(TransportError::Closed).is_device_error());
    }

    #[test]
    fn test_backend_error_is_device_error() {
        let err = VoiceError::BackendError("stream build failed".to_string());
        assert!(err.is_device_error());
        assert_eq!(err.to_string(), "audio backend error: stream build failed");
        assert_eq!(err.user_message(), "Could not access microphone.");
    }

    #[test]
    fn test_malformed_decode_error_display() {
        let err = DecodeError::Malformed {
            reason: "missing data".to_string(),
        };
        assert_eq!(err.to_string(), "malformed audio part: missing data");
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            VoiceError::PermissionDenied.user_message(),
            "Could not access microphone."
        );
        assert_eq!(
            VoiceError::ConnectTimeout {
                timeout: Duration::from_secs(1)
            }
            .user_message(),
            "Connection interrupted"
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::OddByteLength { len: 3 };
        assert!(err.to_string().contains('3'));
    }
}
