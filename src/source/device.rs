//! CPAL microphone capture.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;

use crate::source::{CaptureStream, DeviceFault, FrameSource};
use crate::VoiceError;

/// Default ring buffer length.
const DEFAULT_BUFFER_DURATION: Duration = Duration::from_secs(5);

/// Lists the names of all input devices on the default host.
///
/// # Errors
///
/// Returns `BackendError` if the host cannot enumerate devices.
pub fn list_input_devices() -> Result<Vec<String>, VoiceError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| VoiceError::BackendError(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Returns the name of the default input device, if there is one.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}

/// A system microphone opened through CPAL.
///
/// CPAL streams are not `Send`, so each capture runs on its own thread,
/// which owns the stream until the [`CaptureStream`] is released.
/// `start_capture` waits for that thread to report the stream running, so
/// call it from a blocking context rather than an async task.
#[must_use]
pub struct MicrophoneSource {
    device: Device,
    name: String,
    buffer_duration: Duration,
}

impl MicrophoneSource {
    /// Opens the default input device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no default input device is configured.
    pub fn open_default() -> Result<Self, VoiceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::device_unavailable("no default input device"))?;
        Ok(Self::from_device(device))
    }

    /// Opens a specific input device by name.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no device with the given name exists.
    pub fn open_by_name(name: &str) -> Result<Self, VoiceError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::BackendError(e.to_string()))?;

        devices
            .into_iter()
            .find(|d| d.name().is_ok_and(|n| n == name))
            .map(Self::from_device)
            .ok_or_else(|| VoiceError::device_unavailable(format!("no input device named {name}")))
    }

    /// Sets how much audio the ring buffer can hold.
    pub fn with_buffer_duration(mut self, duration: Duration) -> Self {
        self.buffer_duration = duration;
        self
    }

    fn from_device(device: Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        Self {
            device,
            name,
            buffer_duration: DEFAULT_BUFFER_DURATION,
        }
    }
}

impl FrameSource for MicrophoneSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_buffer_duration(&mut self, duration: Duration) {
        self.buffer_duration = duration;
    }

    fn native_config(&self) -> Result<(u32, u16), VoiceError> {
        let config = self
            .device
            .default_input_config()
            .map_err(|e| VoiceError::device_unavailable(e.to_string()))?;
        Ok((config.sample_rate().0, config.channels()))
    }

    fn start_capture(&mut self) -> Result<(CaptureStream, ringbuf::HeapCons<f32>), VoiceError> {
        let supported = self
            .device
            .default_input_config()
            .map_err(|e| VoiceError::device_unavailable(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: CpalStreamConfig = supported.into();

        let capacity = ((self.buffer_duration.as_secs_f64()
            * f64::from(config.sample_rate.0)
            * f64::from(config.channels)) as usize)
            .max(4096);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let fault = DeviceFault::new();
        let device = self.device.clone();
        let thread_fault = fault.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), VoiceError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name(format!("capture-{}", self.name))
            .spawn(move || {
                let stream = match build_stream(&device, &config, sample_format, producer, thread_fault)
                    .and_then(|stream| {
                        stream.play().map_err(|e| VoiceError::BackendError(e.to_string()))?;
                        Ok(stream)
                    }) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Park until released or the handle is dropped
                let _ = stop_rx.recv();
                if let Err(e) = stream.pause() {
                    tracing::debug!(error = %e, "pausing capture stream failed");
                }
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
                    "capture thread exited before starting".to_string(),
                ));
            }
        }

        tracing::info!(device = %self.name, "microphone capture started");

        let stream = CaptureStream::new(fault, move || {
            let _ = stop_tx.send(());
            worker
                .join()
                .map_err(|_| VoiceError::BackendError("capture thread panicked".to_string()))
        });
        Ok((stream, consumer))
    }
}

fn build_stream(
    device: &Device,
    config: &CpalStreamConfig,
    sample_format: SampleFormat,
    mut producer: ringbuf::HeapProd<f32>,
    fault: DeviceFault,
) -> Result<Stream, VoiceError> {
    let on_error = move |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
        fault.report(err.to_string());
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Non-blocking push - drops samples if buffer is full
                let _ = producer.push_slice(data);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let _ = producer.try_push(f32::from(sample) / f32::from(i16::MAX));
                }
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

    stream.map_err(map_build_error)
}

fn map_build_error(err: BuildStreamError) -> VoiceError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            VoiceError::device_unavailable("device is no longer available")
        }
        other => VoiceError::BackendError(other.to_string()),
    }
}
