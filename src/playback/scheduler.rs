//! Gapless scheduling of inbound audio frames.

use std::time::Duration;

use parking_lot::Mutex;

use crate::format::decode_frame;
use crate::{AudioFrame, DecodeError, EncodedFrame, PLAYBACK_SAMPLE_RATE};

/// Where and when a frame was placed on the playback timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFrame {
    /// The decoded frame; its timestamp equals `start`.
    pub frame: AudioFrame,
    /// Output clock time at which the frame starts.
    pub start: Duration,
    /// Playback duration.
    pub duration: Duration,
    /// Silence before this frame because it arrived after its predicted
    /// start, if it continues a turn already playing.
    pub gap: Option<Duration>,
}

impl ScheduledFrame {
    /// Output clock time at which the frame ends.
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

#[derive(Debug, Default)]
struct Timeline {
    next_start_time: Duration,
    turn_start: Option<Duration>,
}

/// Schedules inbound frames back to back on the output clock.
///
/// Holds the playback cursor (`next_start_time`): the end of the last
/// scheduled frame. Each scheduling decision reads and advances the cursor
/// under one lock, so frames never overlap and never leave gaps while they
/// arrive ahead of their predicted start.
///
/// All methods take the current output clock time `now` explicitly.
///
/// # Example
///
/// ```
/// use lumina_voice::{AudioFrame, PlaybackScheduler};
/// use std::time::Duration;
///
/// let scheduler = PlaybackScheduler::new(Duration::from_millis(10));
/// let frame = AudioFrame::new(vec![0i16; 2400], Duration::ZERO, 24_000);
///
/// let first = scheduler.schedule(frame.clone(), Duration::ZERO);
/// let second = scheduler.schedule(frame, Duration::from_millis(20));
/// assert_eq!(second.start, first.end());
/// ```
#[derive(Debug)]
pub struct PlaybackScheduler {
    timeline: Mutex<Timeline>,
    epsilon: Duration,
}

impl PlaybackScheduler {
    /// Creates a scheduler. `epsilon` is the slack used by
    /// [`is_speaking()`](Self::is_speaking).
    pub fn new(epsilon: Duration) -> Self {
        Self {
            timeline: Mutex::new(Timeline::default()),
            epsilon,
        }
    }

    /// Decodes a 24 kHz wire frame and schedules it.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for malformed frames. The timeline is left
    /// untouched.
    pub fn enqueue(
        &self,
        encoded: &EncodedFrame,
        now: Duration,
    ) -> Result<ScheduledFrame, DecodeError> {
        let frame = decode_frame(encoded, PLAYBACK_SAMPLE_RATE, Duration::ZERO)?;
        Ok(self.schedule(frame, now))
    }

    /// Schedules a decoded frame at `max(now, next_start_time)`.
    pub fn schedule(&self, mut frame: AudioFrame, now: Duration) -> ScheduledFrame {
        let duration = frame.duration();
        let mut timeline = self.timeline.lock();

        let start = now.max(timeline.next_start_time);
        let gap = match timeline.turn_start {
            Some(_) if now > timeline.next_start_time => Some(now - timeline.next_start_time),
            _ => None,
        };

        if !frame.is_empty() {
            timeline.next_start_time = start + duration;
            timeline.turn_start.get_or_insert(start);
        }
        drop(timeline);

        frame.timestamp = start;
        ScheduledFrame {
            frame,
            start,
            duration,
            gap,
        }
    }

    /// Discards audio that has not started yet.
    ///
    /// Resets the cursor to `now` and returns how much scheduled audio was
    /// abandoned. Frames already handed to the output keep playing.
    pub fn on_interrupted(&self, now: Duration) -> Duration {
        let mut timeline = self.timeline.lock();
        let discarded = timeline.next_start_time.saturating_sub(now);
        timeline.next_start_time = now;
        timeline.turn_start = None;
        discarded
    }

    /// Ends the current turn if playback has caught up with the schedule.
    ///
    /// Returns the length of the speaking window that just ended, from the
    /// start of the turn's first frame to the end of its last.
    pub fn finish_turn(&self, now: Duration) -> Option<Duration> {
        let mut timeline = self.timeline.lock();
        if now + self.epsilon < timeline.next_start_time {
            return None;
        }
        let turn_start = timeline.turn_start.take()?;
        Some(timeline.next_start_time.saturating_sub(turn_start))
    }

    /// Returns the cursor to `now` at session end.
    pub fn reset(&self, now: Duration) {
        let mut timeline = self.timeline.lock();
        timeline.next_start_time = now;
        timeline.turn_start = None;
    }

    /// Returns `true` while scheduled audio is still ahead of `now`.
    pub fn is_speaking(&self, now: Duration) -> bool {
        now + self.epsilon < self.timeline.lock().next_start_time
    }

    /// Returns the playback cursor.
    pub fn next_start_time(&self) -> Duration {
        self.timeline.lock().next_start_time
    }

    /// Returns the slack used by [`is_speaking()`](Self::is_speaking).
    pub fn epsilon(&self) -> Duration {
        self.epsilon
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encode_frame;

    fn frame_ms(ms: u64) -> AudioFrame {
        let samples = (u64::from(PLAYBACK_SAMPLE_RATE) * ms / 1000) as usize;
        AudioFrame::new(vec![100i16; samples], Duration::ZERO, PLAYBACK_SAMPLE_RATE)
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_contiguous_scheduling() {
        let scheduler = PlaybackScheduler::default();
        let durations = [100, 40, 7, 250, 13];

        let mut previous: Option<ScheduledFrame> = None;
        for (i, &d) in durations.iter().enumerate() {
            // Frames arrive early, well before their predicted start
            let scheduled = scheduler.schedule(frame_ms(d), ms(i as u64));
            if let Some(prev) = &previous {
                assert_eq!(scheduled.start, prev.start + prev.duration);
            }
            assert!(scheduled.gap.is_none());
            previous = Some(scheduled);
        }
        assert_eq!(scheduler.next_start_time(), ms(410));
    }

    #[test]
    fn test_first_frame_starts_now() {
        let scheduler = PlaybackScheduler::default();
        let scheduled = scheduler.schedule(frame_ms(100), ms(500));
        assert_eq!(scheduled.start, ms(500));
        assert_eq!(scheduled.frame.timestamp, ms(500));
        assert!(scheduled.gap.is_none());
    }

    #[test]
    fn test_late_frame_plays_immediately() {
        let scheduler = PlaybackScheduler::default();
        scheduler.schedule(frame_ms(100), ms(0));

        let late = scheduler.schedule(frame_ms(100), ms(130));
        assert_eq!(late.start, ms(130));
        assert_eq!(late.gap, Some(ms(30)));
        assert_eq!(scheduler.next_start_time(), ms(230));
    }

    #[test]
    fn test_interrupt_then_enqueue_starts_at_or_after_now() {
        let scheduler = PlaybackScheduler::default();
        for _ in 0..5 {
            scheduler.schedule(frame_ms(100), ms(0));
        }
        assert_eq!(scheduler.next_start_time(), ms(500));

        let discarded = scheduler.on_interrupted(ms(120));
        assert_eq!(discarded, ms(380));
        assert_eq!(scheduler.next_start_time(), ms(120));

        let next = scheduler.schedule(frame_ms(100), ms(150));
        assert!(next.start >= ms(150));
        assert!(next.gap.is_none());
    }

    #[test]
    fn test_is_speaking_with_epsilon() {
        let scheduler = PlaybackScheduler::new(ms(10));
        scheduler.schedule(frame_ms(100), ms(0));

        assert!(scheduler.is_speaking(ms(0)));
        assert!(scheduler.is_speaking(ms(89)));
        assert!(!scheduler.is_speaking(ms(90)));
        assert!(!scheduler.is_speaking(ms(200)));
    }

    #[test]
    fn test_finish_turn_reports_window() {
        let scheduler = PlaybackScheduler::default();
        for _ in 0..3 {
            scheduler.schedule(frame_ms(100), ms(5));
        }

        assert_eq!(scheduler.finish_turn(ms(100)), None);
        assert_eq!(scheduler.finish_turn(ms(305)), Some(ms(300)));
        // Already finished
        assert_eq!(scheduler.finish_turn(ms(400)), None);
    }

    #[test]
    fn test_enqueue_decodes() {
        let scheduler = PlaybackScheduler::default();
        let encoded = encode_frame(&frame_ms(100));

        let scheduled = scheduler.enqueue(&encoded, ms(0)).unwrap();
        assert_eq!(scheduled.duration, ms(100));
        assert_eq!(scheduled.frame.sample_rate, PLAYBACK_SAMPLE_RATE);
    }

    #[test]
    fn test_enqueue_bad_frame_leaves_timeline() {
        let scheduler = PlaybackScheduler::default();
        scheduler.schedule(frame_ms(100), ms(0));

        let bad = EncodedFrame::pcm("AAE".to_string(), PLAYBACK_SAMPLE_RATE);
        assert!(scheduler.enqueue(&bad, ms(10)).is_err());
        assert_eq!(scheduler.next_start_time(), ms(100));
    }

    #[test]
    fn test_enqueue_rejects_capture_rate() {
        let scheduler = PlaybackScheduler::default();
        let encoded = EncodedFrame::pcm("AAA=".to_string(), 16_000);
        assert!(matches!(
            scheduler.enqueue(&encoded, ms(0)),
            Err(DecodeError::UnexpectedFormat { .. })
        ));
    }

    #[test]
    fn test_empty_frame_does_not_start_turn() {
        let scheduler = PlaybackScheduler::default();
        let empty = AudioFrame::new(vec![], Duration::ZERO, PLAYBACK_SAMPLE_RATE);
        let scheduled = scheduler.schedule(empty, ms(50));
        assert_eq!(scheduled.duration, Duration::ZERO);
        assert_eq!(scheduler.finish_turn(ms(60)), None);
    }

    #[test]
    fn test_reset() {
        let scheduler = PlaybackScheduler::default();
        scheduler.schedule(frame_ms(100), ms(0));
        scheduler.reset(ms(20));
        assert_eq!(scheduler.next_start_time(), ms(20));
        assert!(!scheduler.is_speaking(ms(20)));
    }
}
