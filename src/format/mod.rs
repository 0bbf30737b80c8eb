//! Audio format conversion utilities.
//!
//! This module provides utilities for converting between audio formats:
//! - Sample format conversion (f32 ↔ i16)
//! - Channel down-mixing
//! - Sample rate conversion (resampling)
//! - PCM framing to and from the base64 wire form

mod convert;
mod pcm;
mod resample;

pub use convert::{downmix_to_mono, f32_slice_to_i16, f32_to_i16, i16_slice_to_f32, i16_to_f32};
pub use pcm::{decode_frame, decode_pcm, decode_window, encode_frame, encode_window, pcm_to_bytes};
pub use resample::{resample, Resampler};

/// Converts device-format audio to mono at a target rate.
///
/// Keeps resampler state between calls, so one converter must be used per
/// continuous stream.
#[derive(Debug, Clone)]
pub struct FormatConverter {
    channels: u16,
    resampler: Resampler,
}

impl FormatConverter {
    /// Creates a converter from `source_rate`/`source_channels` to mono `target_rate`.
    pub fn new(source_rate: u32, source_channels: u16, target_rate: u32) -> Self {
        Self {
            channels: source_channels,
            resampler: Resampler::new(source_rate, target_rate),
        }
    }

    /// Converts the next slice of interleaved device samples.
    pub fn convert(&mut self, interleaved: &[f32]) -> Vec<f32> {
        if self.channels == 1 {
            return self.resampler.process(interleaved);
        }
        let mono = downmix_to_mono(interleaved, self.channels);
        self.resampler.process(&mono)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_passthrough() {
        let mut converter = FormatConverter::new(16000, 1, 16000);
        assert_eq!(converter.convert(&[0.1, 0.2]), vec![0.1, 0.2]);
    }

    #[test]
    fn test_converter_stereo_48k() {
        let mut converter = FormatConverter::new(48000, 2, 16000);
        // 100ms of stereo at 48kHz
        let out = converter.convert(&vec![0.25f32; 9600]);
        assert_eq!(out.len(), 1600);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }
}
