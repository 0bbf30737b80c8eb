//! Sample format and channel conversion.

/// Scale between float samples and 16-bit integers.
const I16_SCALE: f32 = 32767.0;

/// Converts an f32 sample to i16.
///
/// Input should be in the range [-1.0, 1.0]. The scaled value is rounded
/// and clamped, so out-of-range input saturates instead of wrapping.
///
/// Uses × 32767 (not 32768) for symmetric scaling: 1.0 maps to 32767 and
/// -1.0 to -32767. Only clamped input below -1.0 reaches -32768.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Converts an i16 sample to f32.
///
/// Exact inverse of [`f32_to_i16`] for in-range values. Output is clamped
/// to [-1.0, 1.0], so -32768 maps to -1.0.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    (f32::from(sample) / I16_SCALE).clamp(-1.0, 1.0)
}

/// Converts a slice of f32 samples to i16.
pub fn f32_slice_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Converts a slice of i16 samples to f32.
pub fn i16_slice_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| i16_to_f32(s)).collect()
}

/// Down-mixes interleaved samples to mono by averaging each frame.
///
/// Trailing samples that do not form a whole frame are ignored.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.to_vec(),
        n => {
            let n = n as usize;
            interleaved
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}
