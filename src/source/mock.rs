//! Mock microphone for testing without hardware.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;

use crate::source::{CaptureStream, DeviceFault, FrameSource};
use crate::VoiceError;

/// A mock microphone that replays synthetic audio.
///
/// Samples generated before `start_capture()` are delivered immediately
/// through the ring buffer. The mock can also refuse to start, and its
/// [`fault()`](Self::fault) handle lets a test revoke the device mid-session.
///
/// # Example
///
/// ```
/// use lumina_voice::source::MockSource;
///
/// let mut mock = MockSource::new(16000, 1);
///
/// // 100ms of silence, then 100ms of a 440Hz sine wave
/// mock.generate_silence(100);
/// mock.generate_sine(440.0, 100);
///
/// assert_eq!(mock.samples().len(), 3200);
/// ```
pub struct MockSource {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
    failure: Option<VoiceError>,
    fault: DeviceFault,
    released: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
}

impl MockSource {
    /// Creates a new mock source with the given format.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            samples: Vec::new(),
            failure: None,
            fault: DeviceFault::new(),
            released: Arc::new(AtomicBool::new(false)),
            starts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a mock source in the capture format (16kHz mono).
    pub fn capture_format() -> Self {
        Self::new(crate::CAPTURE_SAMPLE_RATE, 1)
    }

    /// Creates a mock source whose microphone cannot be opened.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut source = Self::capture_format();
        source.failure = Some(VoiceError::device_unavailable(reason));
        source
    }

    /// Creates a mock source where the user denied microphone access.
    pub fn denied() -> Self {
        let mut source = Self::capture_format();
        source.failure = Some(VoiceError::PermissionDenied);
        source
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Generates silence for the given duration in milliseconds.
    pub fn generate_silence(&mut self, duration_ms: u64) {
        let num_samples = self.samples_for_duration(duration_ms);
        self.samples.extend(std::iter::repeat(0.0f32).take(num_samples));
    }

    /// Generates a sine wave at the given frequency for the given duration.
    pub fn generate_sine(&mut self, frequency: f64, duration_ms: u64) {
        let num_frames = self.samples_for_duration(duration_ms) / self.channels.max(1) as usize;
        let sample_rate = f64::from(self.sample_rate);

        for i in 0..num_frames {
            let t = i as f64 / sample_rate;
            let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32;
            for _ in 0..self.channels {
                self.samples.push(value);
            }
        }
    }

    /// Generates `count` samples of a constant level.
    pub fn generate_constant(&mut self, level: f32, count: usize) {
        self.samples.extend(std::iter::repeat(level).take(count));
    }

    /// Adds raw samples directly.
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Returns the accumulated samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the duration of accumulated samples.
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        crate::frame::samples_to_duration(frames, self.sample_rate)
    }

    /// Handle for reporting a device fault after capture starts.
    pub fn fault(&self) -> DeviceFault {
        self.fault.clone()
    }

    /// Flag set once the capture stream has been released.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    /// Counter of `start_capture()` calls.
    pub fn start_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.starts)
    }

    fn samples_for_duration(&self, duration_ms: u64) -> usize {
        let frames = (u64::from(self.sample_rate) * duration_ms / 1000) as usize;
        frames * self.channels as usize
    }
}

impl FrameSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn native_config(&self) -> Result<(u32, u16), VoiceError> {
        Ok((self.sample_rate, self.channels))
    }

    fn start_capture(&mut self) -> Result<(CaptureStream, ringbuf::HeapCons<f32>), VoiceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let samples = std::mem::take(&mut self.samples);
        let capacity = samples.len().max(1024);
        let (mut producer, consumer) = HeapRb::<f32>::new(capacity).split();
        producer.push_slice(&samples);

        let released = Arc::clone(&self.released);
        let stream = CaptureStream::new(self.fault.clone(), move || {
            // Keep the producer alive for the life of the capture
            drop(producer);
            released.store(true, Ordering::SeqCst);
            Ok(())
        });

        Ok((stream, consumer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Consumer, Observer};

    #[test]
    fn test_mock_source_silence() {
        let mut mock = MockSource::new(16000, 1);
        mock.generate_silence(100);
        assert_eq!(mock.samples().len(), 1600);
        assert!(mock.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mock_source_sine() {
        let mut mock = MockSource::new(16000, 1);
        mock.generate_sine(440.0, 100);
        assert_eq!(mock.samples().len(), 1600);
        assert!(mock.samples().iter().any(|&s| s > 0.0));
        assert!(mock.samples().iter().any(|&s| s < 0.0));
    }

    #[test]
    fn test_mock_source_stereo() {
        let mut mock = MockSource::new(48000, 2);
        mock.generate_silence(100);
        assert_eq!(mock.samples().len(), 9600);
        assert_eq!(mock.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_start_capture_delivers_samples() {
        let mut mock = MockSource::capture_format();
        mock.add_samples(&[0.1, 0.2, 0.3]);

        let (mut stream, mut consumer) = mock.start_capture().unwrap();
        assert_eq!(consumer.occupied_len(), 3);
        assert_eq!(consumer.try_pop(), Some(0.1));

        let released = mock.released_flag();
        assert!(!released.load(Ordering::SeqCst));
        stream.release().unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unavailable_source_fails() {
        let mut mock = MockSource::unavailable("no microphone");
        let result = mock.start_capture();
        assert!(matches!(result, Err(VoiceError::DeviceUnavailable { .. })));
        assert_eq!(mock.start_counter().load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fault_is_shared_with_stream() {
        let mut mock = MockSource::capture_format();
        let (stream, _consumer) = mock.start_capture().unwrap();
        mock.fault().report("unplugged");
        assert_eq!(stream.fault().get().as_deref(), Some("unplugged"));
    }
}
