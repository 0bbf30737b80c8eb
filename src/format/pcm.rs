//! PCM framing: float windows to base64 wire frames and back.
//!
//! Wire format is signed 16-bit little-endian PCM, base64 encoded with the
//! standard padded alphabet.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::format::{f32_to_i16, i16_to_f32};
use crate::{AudioFrame, DecodeError, EncodedFrame};

/// Bytes per 16-bit sample.
const BYTES_PER_SAMPLE: usize = 2;

/// Encodes a window of float samples in [-1.0, 1.0] as a wire frame.
///
/// Samples outside the range are clamped, never wrapped.
pub fn encode_window(samples: &[f32], sample_rate: u32) -> EncodedFrame {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    EncodedFrame::pcm(STANDARD.encode(bytes), sample_rate)
}

/// Encodes an integer frame as a wire frame.
pub fn encode_frame(frame: &AudioFrame) -> EncodedFrame {
    EncodedFrame::pcm(STANDARD.encode(pcm_to_bytes(&frame.samples)), frame.sample_rate)
}

/// Serializes samples as little-endian bytes.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decodes a base64 payload into 16-bit samples.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidBase64`] for malformed text and
/// [`DecodeError::OddByteLength`] if the bytes do not form whole samples.
pub fn decode_pcm(data: &str) -> Result<Vec<i16>, DecodeError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DecodeError::InvalidBase64 {
            reason: e.to_string(),
        })?;

    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(DecodeError::OddByteLength { len: bytes.len() });
    }

    Ok(bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decodes a wire frame into an [`AudioFrame`] at `expected_rate`.
///
/// A frame without a `rate=` parameter is assumed to be at `expected_rate`.
///
/// # Errors
///
/// Returns [`DecodeError::UnexpectedFormat`] if the frame is not PCM or
/// declares a different rate, plus any error from [`decode_pcm`].
pub fn decode_frame(
    encoded: &EncodedFrame,
    expected_rate: u32,
    timestamp: Duration,
) -> Result<AudioFrame, DecodeError> {
    let rate_matches = encoded
        .declared_rate()
        .map_or(true, |rate| rate == expected_rate);
    if !encoded.is_pcm() || !rate_matches {
        return Err(DecodeError::UnexpectedFormat {
            mime_type: encoded.mime_type.clone(),
        });
    }

    let samples = decode_pcm(&encoded.data)?;
    Ok(AudioFrame::new(samples, timestamp, expected_rate))
}

/// Decodes a wire frame straight to float samples.
///
/// # Errors
///
/// Same as [`decode_pcm`].
pub fn decode_window(encoded: &EncodedFrame) -> Result<Vec<f32>, DecodeError> {
    Ok(decode_pcm(&encoded.data)?
        .into_iter()
        .map(i16_to_f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CAPTURE_SAMPLE_RATE, PLAYBACK_SAMPLE_RATE};

    #[test]
    fn test_encode_known_bytes() {
        // 1.0 -> 32767 = 0xFF 0x7F, -1.0 -> -32767 = 0x01 0x80
        let frame = encode_window(&[1.0, -1.0], CAPTURE_SAMPLE_RATE);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert_eq!(STANDARD.decode(&frame.data).unwrap(), vec![0xFF, 0x7F, 0x01, 0x80]);
    }

    #[test]
    fn test_window_roundtrip_within_quantization() {
        let window: Vec<f32> = (0..4096)
            .map(|i| ((i as f32) * 0.013).sin() * 0.9)
            .collect();
        let decoded = decode_window(&encode_window(&window, CAPTURE_SAMPLE_RATE)).unwrap();

        assert_eq!(decoded.len(), window.len());
        let bound = 1.0 / 32767.0;
        for (a, b) in window.iter().zip(&decoded) {
            assert!((a - b).abs() <= bound);
        }
    }

    #[test]
    fn test_clamped_samples_do_not_wrap() {
        let decoded = decode_pcm(&encode_window(&[1.5, -1.5, 1.0], 16000).data).unwrap();
        assert_eq!(decoded, vec![32767, -32768, 32767]);
    }

    #[test]
    fn test_encode_frame_matches_samples() {
        let frame = AudioFrame::new(vec![1, -2, 300], Duration::ZERO, PLAYBACK_SAMPLE_RATE);
        let encoded = encode_frame(&frame);
        assert_eq!(encoded.declared_rate(), Some(PLAYBACK_SAMPLE_RATE));
        assert_eq!(decode_pcm(&encoded.data).unwrap(), vec![1, -2, 300]);
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(matches!(
            decode_pcm("not base64!"),
            Err(DecodeError::InvalidBase64 { .. })
        ));
    }

    #[test]
    fn test_decode_odd_length() {
        let data = STANDARD.encode([1u8, 2, 3]);
        assert_eq!(decode_pcm(&data), Err(DecodeError::OddByteLength { len: 3 }));
    }

    #[test]
    fn test_decode_frame_rejects_other_rate() {
        let encoded = EncodedFrame::pcm(STANDARD.encode([0u8, 0]), 16000);
        let result = decode_frame(&encoded, PLAYBACK_SAMPLE_RATE, Duration::ZERO);
        assert!(matches!(result, Err(DecodeError::UnexpectedFormat { .. })));
    }

    #[test]
    fn test_decode_frame_accepts_bare_pcm() {
        let encoded = EncodedFrame {
            mime_type: "audio/pcm".to_string(),
            data: STANDARD.encode([0u8; 4800]),
        };
        let frame = decode_frame(&encoded, PLAYBACK_SAMPLE_RATE, Duration::ZERO).unwrap();
        assert_eq!(frame.len(), 2400);
        assert_eq!(frame.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_empty_payload_is_empty_frame() {
        assert_eq!(decode_pcm("").unwrap(), Vec::<i16>::new());
    }
}
