//! Runtime events for monitoring a voice session.
//!
//! Events are notifications, not errors. Terminal failures also change the
//! session status to [`SessionStatus::Error`]; everything else leaves the
//! session running.

use std::sync::Arc;
use std::time::Duration;

use crate::SessionStatus;

/// Runtime events emitted by a voice session.
///
/// # Example
///
/// ```
/// use lumina_voice::VoiceEvent;
///
/// fn handle_event(event: VoiceEvent) {
///     match event {
///         VoiceEvent::StatusChanged { previous, current } => {
///             eprintln!("{previous} -> {current}");
///         }
///         VoiceEvent::FrameDropped { reason } => {
///             eprintln!("dropped inbound audio: {reason}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    /// The session moved to a new status.
    StatusChanged {
        /// Status before the transition.
        previous: SessionStatus,
        /// Status after the transition.
        current: SessionStatus,
    },

    /// An inbound audio frame was malformed and skipped.
    FrameDropped {
        /// Description of the decode failure.
        reason: String,
    },

    /// An inbound frame arrived after its predicted start time.
    ///
    /// It plays immediately, leaving an audible gap of `gap`.
    LatePlayback {
        /// Silence inserted before the frame.
        gap: Duration,
    },

    /// The remote side interrupted the model's turn.
    Interrupted {
        /// Scheduled audio that had not started yet and was abandoned.
        discarded: Duration,
    },

    /// Playback caught up with the schedule; the model stopped speaking.
    SpeakingFinished {
        /// Length of the speaking window that just ended.
        window: Duration,
    },

    /// Releasing a resource during teardown failed.
    ///
    /// The remaining resources are still released.
    ReleaseFailed {
        /// Which resource could not be released.
        resource: &'static str,
        /// Description of the failure.
        error: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`LiveVoiceBuilder::on_event()`].
///
/// [`LiveVoiceBuilder::on_event()`]: crate::LiveVoiceBuilder::on_event
pub type EventCallback = Arc<dyn Fn(VoiceEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use lumina_voice::{event_callback, VoiceEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(VoiceEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_event_debug() {
        let event = VoiceEvent::LatePlayback {
            gap: Duration::from_millis(40),
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("LatePlayback"));
    }

    #[test]
    fn test_voice_event_clone() {
        let event = VoiceEvent::StatusChanged {
            previous: SessionStatus::Listening,
            current: SessionStatus::Speaking,
        };
        if let VoiceEvent::StatusChanged { previous, current } = event.clone() {
            assert_eq!(previous, SessionStatus::Listening);
            assert_eq!(current, SessionStatus::Speaking);
        } else {
            panic!("Expected StatusChanged variant");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(VoiceEvent::FrameDropped {
            reason: "bad".to_string(),
        });
        assert!(called.load(Ordering::SeqCst));
    }
}
