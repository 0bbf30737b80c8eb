//! Mock playback output for testing without hardware.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::playback::AudioOutput;
use crate::{AudioFrame, VoiceError};

/// A frame handed to a [`MockOutput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedBuffer {
    /// Requested start time.
    pub start: Duration,
    /// The frame.
    pub frame: AudioFrame,
}

impl PlayedBuffer {
    /// Requested end time.
    pub fn end(&self) -> Duration {
        self.start + self.frame.duration()
    }
}

/// An output whose clock only moves when the test says so.
///
/// Clones share state.
///
/// # Example
///
/// ```
/// use lumina_voice::playback::{AudioOutput, MockOutput};
/// use std::time::Duration;
///
/// let output = MockOutput::new();
/// output.advance(Duration::from_millis(250));
/// assert_eq!(output.current_time(), Duration::from_millis(250));
/// ```
#[derive(Clone, Default)]
pub struct MockOutput {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    clock: Mutex<Duration>,
    played: Mutex<Vec<PlayedBuffer>>,
    flushes: Mutex<Vec<Duration>>,
    closes: AtomicUsize,
    closed: AtomicBool,
    fail_close: AtomicBool,
}

impl MockOutput {
    /// Creates an output with the clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.inner.clock.lock() += by;
    }

    /// Sets the clock. Never moves it backwards.
    pub fn set_time(&self, time: Duration) {
        let mut clock = self.inner.clock.lock();
        *clock = (*clock).max(time);
    }

    /// Makes `close()` report an error.
    pub fn fail_close(&self) {
        self.inner.fail_close.store(true, Ordering::SeqCst);
    }

    /// Frames played so far, in order.
    pub fn played(&self) -> Vec<PlayedBuffer> {
        self.inner.played.lock().clone()
    }

    /// Clock times at which `flush()` was called.
    pub fn flushes(&self) -> Vec<Duration> {
        self.inner.flushes.lock().clone()
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of `close()` calls.
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

impl AudioOutput for MockOutput {
    fn name(&self) -> &str {
        "mock"
    }

    fn current_time(&self) -> Duration {
        *self.inner.clock.lock()
    }

    fn play(&self, start: Duration, frame: &AudioFrame) -> Result<(), VoiceError> {
        if self.is_closed() {
            return Err(VoiceError::SessionClosed);
        }
        self.inner.played.lock().push(PlayedBuffer {
            start,
            frame: frame.clone(),
        });
        Ok(())
    }

    fn flush(&self) {
        let now = self.current_time();
        self.inner.flushes.lock().push(now);
    }

    fn close(&self) -> Result<(), VoiceError> {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.closed.store(true, Ordering::SeqCst);
        if self.inner.fail_close.load(Ordering::SeqCst) {
            return Err(VoiceError::BackendError("output already closed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let output = MockOutput::new();
        output.set_time(Duration::from_millis(100));
        output.set_time(Duration::from_millis(50));
        assert_eq!(output.current_time(), Duration::from_millis(100));
    }

    #[test]
    fn test_records_played_frames() {
        let output = MockOutput::new();
        let frame = AudioFrame::new(vec![0i16; 2400], Duration::ZERO, 24_000);
        output.play(Duration::from_millis(40), &frame).unwrap();

        let played = output.played();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].end(), Duration::from_millis(140));
    }

    #[test]
    fn test_records_flushes_at_clock_time() {
        let output = MockOutput::new();
        assert!(output.flushes().is_empty());
        output.advance(Duration::from_millis(30));
        output.flush();
        output.advance(Duration::from_millis(20));
        output.flush();
        assert_eq!(
            output.flushes(),
            vec![Duration::from_millis(30), Duration::from_millis(50)]
        );
    }

    #[test]
    fn test_play_after_close_fails() {
        let output = MockOutput::new();
        output.close().unwrap();
        let frame = AudioFrame::new(vec![0i16; 10], Duration::ZERO, 24_000);
        assert!(output.play(Duration::ZERO, &frame).is_err());
        assert!(output.is_closed());
    }
}
