//! Sample rate conversion.
//!
//! Linear interpolation, which is fast and good enough for speech. The
//! [`Resampler`] carries its fractional position and last sample across
//! calls, so audio fed in arbitrary slices comes out without drift or
//! seams at the slice boundaries.

/// Streaming linear-interpolation resampler for mono audio.
#[derive(Debug, Clone)]
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    /// Source samples advanced per output sample.
    step: f64,
    /// Read position, relative to `previous` when it is set.
    position: f64,
    /// Last input sample of the previous call.
    previous: Option<f32>,
}

impl Resampler {
    /// Creates a resampler from `from_rate` to `to_rate` Hz.
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        let step = if to_rate == 0 {
            1.0
        } else {
            f64::from(from_rate) / f64::from(to_rate)
        };
        Self {
            from_rate,
            to_rate,
            step,
            position: 0.0,
            previous: None,
        }
    }

    /// Returns `true` if input passes through unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate || self.from_rate == 0 || self.to_rate == 0
    }

    /// Resamples the next slice of a continuous stream.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        let offset = usize::from(self.previous.is_some());
        let total = input.len() + offset;
        let previous = self.previous;
        let sample_at = |index: usize| -> f32 {
            match previous {
                Some(prev) if index == 0 => prev,
                Some(_) => input[index - 1],
                None => input[index],
            }
        };

        let capacity = (input.len() as f64 / self.step).ceil() as usize + 1;
        let mut output = Vec::with_capacity(capacity);

        loop {
            let index = self.position.floor() as usize;
            if index + 1 >= total {
                break;
            }
            let frac = (self.position - index as f64) as f32;
            let a = sample_at(index);
            let b = sample_at(index + 1);
            output.push(a + (b - a) * frac);
            self.position += self.step;
        }

        // Re-anchor on the last sample so the next call continues seamlessly
        self.position -= (total - 1) as f64;
        self.previous = Some(sample_at(total - 1));

        output
    }

    /// Forgets stream state.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.previous = None;
    }
}

/// Resamples a single self-contained buffer of mono audio.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    Resampler::new(from_rate, to_rate).process(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_downsample_48k_to_16k() {
        let samples: Vec<f32> = (0..4800).map(|i| i as f32 / 4800.0).collect();
        let out = resample(&samples, 48000, 16000);
        assert_eq!(out.len(), 1600);
        // Every third source sample
        assert!((out[1] - samples[3]).abs() < 1e-6);
    }

    #[test]
    fn test_upsample_interpolates() {
        let out = resample(&[0.0, 1.0], 16000, 32000);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let samples: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.01).sin()).collect();
        let one_shot = resample(&samples, 44100, 16000);

        let mut streaming = Resampler::new(44100, 16000);
        let mut pieces = Vec::new();
        for slice in samples.chunks(333) {
            pieces.extend(streaming.process(slice));
        }

        assert_eq!(pieces.len(), one_shot.len());
        for (a, b) in pieces.iter().zip(&one_shot) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reset_forgets_state() {
        let mut resampler = Resampler::new(48000, 16000);
        resampler.process(&[0.5; 10]);
        resampler.reset();
        assert_eq!(resampler.process(&[0.0; 4]), vec![0.0]);
    }

    #[test]
    fn test_empty_input() {
        let mut resampler = Resampler::new(48000, 16000);
        assert!(resampler.process(&[]).is_empty());
    }
}
