//! Audio frames and their wire form.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sample rate of audio captured from the microphone and sent upstream.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio received from the remote endpoint.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// MIME type prefix for raw 16-bit little-endian PCM.
const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Returns the MIME type for raw PCM at the given rate, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("{PCM_MIME_PREFIX};rate={sample_rate}")
}

/// An immutable buffer of mono signed 16-bit samples at a fixed rate.
///
/// Samples are stored in an `Arc<Vec<i16>>` so a frame can be handed to the
/// playback output and kept in stats or tests without copying.
///
/// # Example
///
/// ```
/// use lumina_voice::AudioFrame;
/// use std::time::Duration;
///
/// let frame = AudioFrame::new(vec![0i16; 2400], Duration::ZERO, 24_000);
/// assert_eq!(frame.duration(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// PCM samples, one per frame (mono).
    pub samples: Arc<Vec<i16>>,

    /// Offset from the start of the session.
    pub timestamp: Duration,

    /// Sample rate in Hz (16 000 outbound, 24 000 inbound).
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Creates a new frame.
    pub fn new(samples: Vec<i16>, timestamp: Duration, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            timestamp,
            sample_rate,
        }
    }

    /// Returns the playback duration of this frame.
    ///
    /// Computed in whole nanoseconds so consecutive frames add up exactly.
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }

    /// Returns the number of samples in this frame.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the samples as floats in [-1.0, 1.0].
    pub fn to_f32(&self) -> Vec<f32> {
        crate::format::i16_slice_to_f32(&self.samples)
    }
}

/// Converts a sample count at `sample_rate` to a duration.
pub(crate) fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = samples as u128 * 1_000_000_000 / u128::from(sample_rate);
    Duration::from_nanos(nanos as u64)
}

/// An audio frame in its transport-safe text form.
///
/// `data` holds base64 of little-endian 16-bit PCM. This is the `Blob`
/// shape the remote endpoint uses for both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedFrame {
    /// MIME type, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

impl EncodedFrame {
    /// Creates an encoded PCM frame at the given rate.
    pub fn pcm(data: String, sample_rate: u32) -> Self {
        Self {
            mime_type: pcm_mime_type(sample_rate),
            data,
        }
    }

    /// Returns `true` if the MIME type names raw PCM audio.
    pub fn is_pcm(&self) -> bool {
        self.mime_type.starts_with(PCM_MIME_PREFIX)
    }

    /// Returns the `rate=` parameter of the MIME type, if present.
    pub fn declared_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_capture_window() {
        let frame = AudioFrame::new(vec![0i16; 4096], Duration::ZERO, CAPTURE_SAMPLE_RATE);
        assert_eq!(frame.duration(), Duration::from_millis(256));
    }

    #[test]
    fn test_duration_is_exact() {
        let frame = AudioFrame::new(vec![0i16; 2400], Duration::ZERO, PLAYBACK_SAMPLE_RATE);
        let three = frame.duration() * 3;
        assert_eq!(three, Duration::from_millis(300));
    }

    #[test]
    fn test_empty_frame() {
        let frame = AudioFrame::new(vec![], Duration::ZERO, PLAYBACK_SAMPLE_RATE);
        assert!(frame.is_empty());
        assert_eq!(frame.duration(), Duration::ZERO);
    }

    #[test]
    fn test_zero_sample_rate() {
        let frame = AudioFrame::new(vec![0i16; 100], Duration::ZERO, 0);
        assert_eq!(frame.duration(), Duration::ZERO);
    }

    #[test]
    fn test_pcm_mime_type() {
        assert_eq!(pcm_mime_type(16_000), "audio/pcm;rate=16000");
    }

    #[test]
    fn test_declared_rate() {
        let frame = EncodedFrame::pcm(String::new(), 24_000);
        assert!(frame.is_pcm());
        assert_eq!(frame.declared_rate(), Some(24_000));

        let bare = EncodedFrame {
            mime_type: "audio/pcm".to_string(),
            data: String::new(),
        };
        assert_eq!(bare.declared_rate(), None);
    }

    #[test]
    fn test_encoded_frame_json_shape() {
        let frame = EncodedFrame::pcm("AAA=".to_string(), 16_000);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(json["data"], "AAA=");
    }
}
