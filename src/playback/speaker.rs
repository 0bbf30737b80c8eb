//! CPAL speaker output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::format::{f32_to_i16, Resampler};
use crate::frame::samples_to_duration;
use crate::playback::AudioOutput;
use crate::{AudioFrame, VoiceError, PLAYBACK_SAMPLE_RATE};

/// Seconds of audio the output ring buffer can hold.
const BUFFER_SECONDS: u32 = 30;

/// The default output device, driven through a ring buffer.
///
/// The clock counts frames the device has actually consumed, so it moves
/// with the hardware rather than the wall clock. Gaps between scheduled
/// frames are filled with silence; underruns play silence and are skipped
/// over on the next write. A flush marks everything pushed so far as
/// discarded and the stream callback skips it.
pub struct SpeakerOutput {
    name: String,
    sample_rate: u32,
    writer: Mutex<Writer>,
    cursor: Arc<RingCursor>,
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Writer {
    producer: ringbuf::HeapProd<f32>,
    channels: u16,
    /// Interleaved samples accepted by the ring so far.
    pushed: u64,
    resampler: Resampler,
}

/// Positions shared between the writer and the stream callback.
#[derive(Debug, Default)]
struct RingCursor {
    /// Device frames played, including underrun silence.
    played: AtomicU64,
    /// Interleaved samples taken out of the ring, played or skipped.
    consumed: AtomicU64,
    /// Samples before this ring position are discarded unheard.
    discard_until: AtomicU64,
}

impl RingCursor {
    /// Device frame at which audio pushed now would start playing.
    fn queue_end(&self, pushed: u64, channels: u16) -> u64 {
        let drained = self
            .consumed
            .load(Ordering::SeqCst)
            .max(self.discard_until.load(Ordering::SeqCst));
        let queued = pushed.saturating_sub(drained) / u64::from(channels.max(1));
        self.played.load(Ordering::SeqCst) + queued
    }

    /// Fills one device buffer from the ring, skipping discarded samples.
    fn fill<T>(
        &self,
        consumer: &mut ringbuf::HeapCons<f32>,
        data: &mut [T],
        channels: u64,
        convert: impl Fn(f32) -> T,
    ) {
        let behind = self
            .discard_until
            .load(Ordering::SeqCst)
            .saturating_sub(self.consumed.load(Ordering::SeqCst));
        if behind > 0 {
            let skipped = consumer.skip(usize::try_from(behind).unwrap_or(usize::MAX));
            self.consumed.fetch_add(skipped as u64, Ordering::SeqCst);
        }

        let mut popped = 0u64;
        for out in data.iter_mut() {
            *out = match consumer.try_pop() {
                Some(sample) => {
                    popped += 1;
                    convert(sample)
                }
                None => convert(0.0),
            };
        }
        self.consumed.fetch_add(popped, Ordering::SeqCst);
        self.played
            .fetch_add(data.len() as u64 / channels.max(1), Ordering::SeqCst);
    }
}

impl SpeakerOutput {
    /// Opens the default output device and starts its stream.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if there is no output device or the
    /// stream cannot be started.
    pub fn open_default() -> Result<Self, VoiceError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| VoiceError::device_unavailable("no default output device"))?;
        Self::open(device)
    }

    fn open(device: Device) -> Result<Self, VoiceError> {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device
            .default_output_config()
            .map_err(|e| VoiceError::device_unavailable(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: CpalStreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        let capacity = (sample_rate * BUFFER_SECONDS) as usize * channels as usize;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let cursor = Arc::new(RingCursor::default());

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), VoiceError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_cursor = Arc::clone(&cursor);

        let worker = thread::Builder::new()
            .name(format!("playback-{name}"))
            .spawn(move || {
                let started = build_stream(&device, &config, sample_format, consumer, thread_cursor)
                    .and_then(|stream| {
                        stream.play().map_err(|e| VoiceError::BackendError(e.to_string()))?;
                        Ok(stream)
                    });
                let stream = match started {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| VoiceError::BackendError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(VoiceError::BackendError(
                    "playback thread exited before starting".to_string(),
                ));
            }
        }

        tracing::info!(device = %name, sample_rate, channels, "speaker output started");

        Ok(Self {
            name,
            sample_rate,
            writer: Mutex::new(Writer {
                producer,
                channels,
                pushed: 0,
                resampler: Resampler::new(PLAYBACK_SAMPLE_RATE, sample_rate),
            }),
            cursor,
            stop_tx: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    fn time_to_frames(&self, time: Duration) -> u64 {
        (time.as_nanos() * u128::from(self.sample_rate) / 1_000_000_000) as u64
    }
}

impl AudioOutput for SpeakerOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_time(&self) -> Duration {
        samples_to_duration(
            self.cursor.played.load(Ordering::SeqCst) as usize,
            self.sample_rate,
        )
    }

    fn play(&self, start: Duration, frame: &AudioFrame) -> Result<(), VoiceError> {
        if self.stop_tx.lock().is_none() {
            return Err(VoiceError::SessionClosed);
        }

        let start_frame = self.time_to_frames(start);
        let mut writer = self.writer.lock();

        let queue_end = self.cursor.queue_end(writer.pushed, writer.channels);
        let silence = start_frame.saturating_sub(queue_end);
        let samples = writer.resampler.process(&frame.to_f32());

        let channels = usize::from(writer.channels);
        let mut accepted = 0u64;
        let mut dropped = 0usize;
        let silence_then_samples = std::iter::repeat(0.0)
            .take(usize::try_from(silence).unwrap_or(usize::MAX))
            .chain(samples.iter().copied());
        for sample in silence_then_samples {
            for _ in 0..channels {
                if writer.producer.try_push(sample).is_ok() {
                    accepted += 1;
                } else {
                    dropped += 1;
                }
            }
        }
        writer.pushed += accepted;

        if dropped > 0 {
            tracing::warn!(dropped, "playback buffer full, samples dropped");
        }
        Ok(())
    }

    fn flush(&self) {
        let mut writer = self.writer.lock();
        let pushed = writer.pushed;
        self.cursor.discard_until.store(pushed, Ordering::SeqCst);
        writer.resampler.reset();
        tracing::debug!(
            discarded = pushed.saturating_sub(self.cursor.consumed.load(Ordering::SeqCst)),
            "playback queue flushed"
        );
    }

    fn close(&self) -> Result<(), VoiceError> {
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        match self.worker.lock().take() {
            Some(worker) => worker
                .join()
                .map_err(|_| VoiceError::BackendError("playback thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "speaker output close failed on drop");
        }
    }
}

fn build_stream(
    device: &Device,
    config: &CpalStreamConfig,
    sample_format: SampleFormat,
    mut consumer: ringbuf::HeapCons<f32>,
    cursor: Arc<RingCursor>,
) -> Result<Stream, VoiceError> {
    let channels = u64::from(config.channels.max(1));
    let on_error = |err: cpal::StreamError| {
        tracing::error!("Audio output error: {}", err);
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                cursor.fill(&mut consumer, data, channels, |sample| sample);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                cursor.fill(&mut consumer, data, channels, f32_to_i16);
            },
            on_error,
            None,
        ),
        format => {
            return Err(VoiceError::device_unavailable(format!(
                "unsupported sample format {format:?}"
            )));
        }
    };

    stream.map_err(|e| VoiceError::BackendError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: usize) -> (ringbuf::HeapProd<f32>, ringbuf::HeapCons<f32>) {
        HeapRb::<f32>::new(capacity).split()
    }

    #[test]
    fn test_fill_plays_queue_then_silence() {
        let cursor = RingCursor::default();
        let (mut producer, mut consumer) = ring(16);
        producer.push_slice(&[0.5, 0.5, 0.25, 0.25]);

        let mut data = [1.0f32; 6];
        cursor.fill(&mut consumer, &mut data[..], 2, |s| s);

        assert_eq!(data, [0.5, 0.5, 0.25, 0.25, 0.0, 0.0]);
        assert_eq!(cursor.played.load(Ordering::SeqCst), 3);
        assert_eq!(cursor.consumed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_fill_skips_flushed_samples() {
        let cursor = RingCursor::default();
        let (mut producer, mut consumer) = ring(16);
        producer.push_slice(&[0.9; 6]);
        // Flush after six samples, then new audio arrives
        cursor.discard_until.store(6, Ordering::SeqCst);
        producer.push_slice(&[0.1, 0.2]);

        let mut data = [0.0f32; 2];
        cursor.fill(&mut consumer, &mut data[..], 1, |s| s);

        assert_eq!(data, [0.1, 0.2]);
        assert_eq!(cursor.consumed.load(Ordering::SeqCst), 8);
        assert_eq!(cursor.played.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_queue_end_ignores_discarded_audio() {
        let cursor = RingCursor::default();
        cursor.played.store(100, Ordering::SeqCst);
        cursor.consumed.store(40, Ordering::SeqCst);

        // 60 stereo samples still queued = 30 frames
        assert_eq!(cursor.queue_end(100, 2), 130);

        // After a flush only audio pushed since counts
        cursor.discard_until.store(100, Ordering::SeqCst);
        assert_eq!(cursor.queue_end(100, 2), 100);
        assert_eq!(cursor.queue_end(120, 2), 110);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_speaker_clock_advances() {
        let output = SpeakerOutput::open_default().unwrap();
        let frame = AudioFrame::new(vec![0i16; 2400], Duration::ZERO, PLAYBACK_SAMPLE_RATE);
        output.play(Duration::ZERO, &frame).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(output.current_time() > Duration::ZERO);
        output.flush();
        output.close().unwrap();
        output.close().unwrap();
    }
}
