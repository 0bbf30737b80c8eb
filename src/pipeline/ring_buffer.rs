//! Ring buffer wrapper for microphone capture.

use ringbuf::traits::{Consumer, Observer};

/// Reads whole interleaved frames out of the capture ring buffer.
///
/// A partial frame (fewer samples than channels) stays in the buffer until
/// the rest of it arrives, so channel alignment is never lost.
pub(crate) struct SampleBuffer {
    consumer: ringbuf::HeapCons<f32>,
    channels: usize,
    samples_read: u64,
}

impl SampleBuffer {
    /// Wraps a ring buffer consumer carrying `channels` interleaved channels.
    pub fn new(consumer: ringbuf::HeapCons<f32>, channels: u16) -> Self {
        Self {
            consumer,
            channels: usize::from(channels.max(1)),
            samples_read: 0,
        }
    }

    /// Takes every complete frame currently buffered.
    pub fn read_available(&mut self) -> Vec<f32> {
        let whole = self.consumer.occupied_len() / self.channels * self.channels;
        if whole == 0 {
            return Vec::new();
        }

        let mut samples = vec![0.0f32; whole];
        let read = self.consumer.pop_slice(&mut samples);
        samples.truncate(read);
        self.samples_read += read as u64;
        samples
    }

    /// Returns the number of samples currently in the buffer.
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Total samples read since creation.
    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }
}

/// Creates a ring buffer pair for capture tests.
#[cfg(test)]
pub(crate) fn create_sample_buffer(
    capacity: usize,
    channels: u16,
) -> (ringbuf::HeapProd<f32>, SampleBuffer) {
    use ringbuf::traits::Split;

    let (producer, consumer) = ringbuf::HeapRb::<f32>::new(capacity).split();
    (producer, SampleBuffer::new(consumer, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Producer;

    #[test]
    fn test_read_available_mono() {
        let (mut producer, mut buffer) = create_sample_buffer(1024, 1);
        producer.push_slice(&[0.1, 0.2, 0.3]);

        assert_eq!(buffer.read_available(), vec![0.1, 0.2, 0.3]);
        assert!(buffer.read_available().is_empty());
        assert_eq!(buffer.samples_read(), 3);
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let (mut producer, mut buffer) = create_sample_buffer(1024, 2);
        producer.push_slice(&[0.1, 0.2, 0.3]);

        assert_eq!(buffer.read_available(), vec![0.1, 0.2]);
        assert_eq!(buffer.available(), 1);

        producer.push_slice(&[0.4]);
        assert_eq!(buffer.read_available(), vec![0.3, 0.4]);
    }

    #[test]
    fn test_empty_buffer() {
        let (_producer, mut buffer) = create_sample_buffer(16, 1);
        assert!(buffer.read_available().is_empty());
        assert_eq!(buffer.available(), 0);
    }
}
