//! Capture bridge task - reads from ring buffer, cuts windows, queues frames.
//!
//! The bridge owns the consumer side of the microphone ring buffer:
//! - Reading raw audio from the ring buffer (device format)
//! - Converting to 16 kHz mono
//! - Cutting fixed-size windows and encoding them for the wire
//! - Watching the device fault slot and reporting revocation

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::format::{encode_window, FormatConverter};
use crate::pipeline::SampleBuffer;
use crate::session::{ControlSignal, SessionState};
use crate::source::DeviceFault;
use crate::{EncodedFrame, VoiceError, CAPTURE_SAMPLE_RATE};

/// Configuration for the capture bridge.
#[derive(Debug, Clone)]
pub(crate) struct CaptureConfig {
    /// Native sample rate of the device.
    pub device_sample_rate: u32,
    /// Native channel count of the device.
    pub device_channels: u16,
    /// Samples per outbound window at 16 kHz.
    pub window_size: usize,
    /// How often to poll the ring buffer.
    pub poll_interval: Duration,
    /// When the session started.
    pub session_start: Instant,
}

/// Reads device audio and turns it into encoded outbound windows.
struct CaptureBridge {
    buffer: SampleBuffer,
    converter: FormatConverter,
    pending: Vec<f32>,
    window_size: usize,
    poll_interval: Duration,
    outbound_tx: mpsc::UnboundedSender<EncodedFrame>,
    control_tx: mpsc::UnboundedSender<ControlSignal>,
    fault: DeviceFault,
    state: Arc<SessionState>,
    session_start: Instant,
}

impl CaptureBridge {
    fn new(
        ring_consumer: ringbuf::HeapCons<f32>,
        config: &CaptureConfig,
        fault: DeviceFault,
        outbound_tx: mpsc::UnboundedSender<EncodedFrame>,
        control_tx: mpsc::UnboundedSender<ControlSignal>,
        state: Arc<SessionState>,
    ) -> Self {
        Self {
            buffer: SampleBuffer::new(ring_consumer, config.device_channels),
            converter: FormatConverter::new(
                config.device_sample_rate,
                config.device_channels,
                CAPTURE_SAMPLE_RATE,
            ),
            pending: Vec::with_capacity(config.window_size * 2),
            window_size: config.window_size,
            poll_interval: config.poll_interval,
            outbound_tx,
            control_tx,
            fault,
            state,
            session_start: config.session_start,
        }
    }

    /// Runs until capture stops, the device fails or the queue closes.
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.poll_interval);

        while self.state.capturing.load(Ordering::SeqCst) {
            interval.tick().await;

            if let Some(reason) = self.fault.get() {
                tracing::error!(%reason, "microphone stopped delivering audio");
                let _ = self
                    .control_tx
                    .send(ControlSignal::CaptureFailed(VoiceError::device_unavailable(
                        reason,
                    )));
                return;
            }

            let raw = self.buffer.read_available();
            if !raw.is_empty() {
                let converted = self.converter.convert(&raw);
                self.pending.extend_from_slice(&converted);
            }

            if !self.flush_windows() {
                // Queue closed, session is tearing down
                return;
            }
        }
    }

    /// Encodes and queues every complete window. Returns `false` if the
    /// outbound queue is gone.
    fn flush_windows(&mut self) -> bool {
        while self.pending.len() >= self.window_size {
            let window: Vec<f32> = self.pending.drain(..self.window_size).collect();
            let frame = encode_window(&window, CAPTURE_SAMPLE_RATE);

            if self.outbound_tx.send(frame).is_err() {
                return false;
            }

            let frames = self.state.frames_captured.fetch_add(1, Ordering::SeqCst) + 1;
            if frames % 50 == 0 {
                tracing::debug!(
                    frames,
                    samples_read = self.buffer.samples_read(),
                    buffered = self.buffer.available(),
                    elapsed = ?self.session_start.elapsed(),
                    "capture bridge progress"
                );
            }
        }
        true
    }
}

/// Spawns the capture bridge as a background task.
pub(crate) fn spawn_capture_bridge(
    ring_consumer: ringbuf::HeapCons<f32>,
    config: &CaptureConfig,
    fault: DeviceFault,
    outbound_tx: mpsc::UnboundedSender<EncodedFrame>,
    control_tx: mpsc::UnboundedSender<ControlSignal>,
    state: Arc<SessionState>,
) -> tokio::task::JoinHandle<()> {
    let bridge = CaptureBridge::new(ring_consumer, config, fault, outbound_tx, control_tx, state);
    tokio::spawn(bridge.run())
}
