//! Inbound audio playback.
//!
//! The [`PlaybackScheduler`] decides *when* each inbound frame plays; an
//! [`AudioOutput`] owns the clock those decisions are made against and
//! actually plays the samples.
//!
//! - [`MockOutput`]: manually advanced clock that records what was played
//! - `SpeakerOutput` (feature `device`): the default output device via CPAL

mod mock;
mod scheduler;
#[cfg(feature = "device")]
mod speaker;

pub use mock::{MockOutput, PlayedBuffer};
pub use scheduler::{PlaybackScheduler, ScheduledFrame};
#[cfg(feature = "device")]
pub use speaker::SpeakerOutput;

use std::time::Duration;

use crate::{AudioFrame, VoiceError};

/// A clocked audio sink.
///
/// # Implementation Notes
///
/// - Methods take `&self`; use interior mutability
/// - `current_time` must be monotonic and start near zero when the output
///   is created
/// - `play` is called with non-overlapping, non-decreasing start times and
///   must not block
/// - `flush` discards everything queued but not yet heard; the next `play`
///   may start anywhere from `current_time` on, so start times restart
///   after a flush
/// - `close` must be idempotent
pub trait AudioOutput: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Current position of the output clock.
    fn current_time(&self) -> Duration;

    /// Plays `frame` starting at output time `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is gone.
    fn play(&self, start: Duration, frame: &AudioFrame) -> Result<(), VoiceError>;

    /// Drops all queued audio that has not played yet.
    ///
    /// Called when the model is interrupted. The clock keeps running.
    fn flush(&self);

    /// Stops playback and releases the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device could not be released cleanly.
    fn close(&self) -> Result<(), VoiceError>;
}
