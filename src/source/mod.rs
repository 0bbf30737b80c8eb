//! Microphone abstraction.
//!
//! A [`FrameSource`] hands the pipeline a lock-free ring buffer of raw
//! interleaved f32 samples at the device's native format, plus a
//! [`CaptureStream`] that keeps capture alive until released. The capture
//! bridge turns that into fixed-size 16 kHz windows, so sources never deal
//! with framing or the wire format.

#[cfg(feature = "device")]
mod device;
mod mock;

#[cfg(feature = "device")]
pub use device::{default_input_device_name, list_input_devices, MicrophoneSource};
pub use mock::MockSource;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::VoiceError;

/// A microphone or other producer of raw capture samples.
///
/// # Example
///
/// ```
/// use lumina_voice::source::{CaptureStream, FrameSource};
/// use lumina_voice::VoiceError;
/// use ringbuf::traits::Split;
/// use ringbuf::HeapRb;
///
/// struct Silence;
///
/// impl FrameSource for Silence {
///     fn name(&self) -> &str {
///         "silence"
///     }
///
///     fn native_config(&self) -> Result<(u32, u16), VoiceError> {
///         Ok((16000, 1))
///     }
///
///     fn start_capture(
///         &mut self,
///     ) -> Result<(CaptureStream, ringbuf::HeapCons<f32>), VoiceError> {
///         let (_producer, consumer) = HeapRb::<f32>::new(16000).split();
///         Ok((CaptureStream::detached(), consumer))
///     }
/// }
/// ```
pub trait FrameSource: Send {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Returns the native capture format `(sample_rate, channels)`.
    ///
    /// # Errors
    ///
    /// Returns a device error if the format cannot be queried.
    fn native_config(&self) -> Result<(u32, u16), VoiceError>;

    /// Sets how much audio the capture ring buffer can hold.
    ///
    /// The session applies its configured buffer length before capture
    /// starts. Sources without a sizeable buffer ignore it.
    fn set_buffer_duration(&mut self, _duration: Duration) {}

    /// Starts capture.
    ///
    /// Samples are interleaved f32 in [-1.0, 1.0]. Capture runs until the
    /// returned stream is released or dropped. May block while the device
    /// starts; sessions call it on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` or `PermissionDenied` if the microphone
    /// cannot be acquired.
    fn start_capture(&mut self) -> Result<(CaptureStream, ringbuf::HeapCons<f32>), VoiceError>;
}

/// Shared slot where a running device reports that it stopped working.
///
/// The audio backend writes to it from its own thread; the capture bridge
/// polls it and ends the session with `DeviceUnavailable`.
#[derive(Debug, Clone, Default)]
pub struct DeviceFault(Arc<Mutex<Option<String>>>);

impl DeviceFault {
    /// Creates an empty fault slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fault. The first report wins.
    pub fn report(&self, reason: impl Into<String>) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
    }

    /// Returns the reported fault, if any.
    pub fn get(&self) -> Option<String> {
        self.0.lock().clone()
    }

    /// Returns `true` if a fault has been reported.
    pub fn is_faulted(&self) -> bool {
        self.0.lock().is_some()
    }
}

type ReleaseFn = Box<dyn FnOnce() -> Result<(), VoiceError> + Send>;

/// A running capture.
///
/// Capture continues while this is held. Call [`release()`](Self::release)
/// to stop it and observe failures; dropping it releases silently.
#[must_use]
pub struct CaptureStream {
    release: Option<ReleaseFn>,
    fault: DeviceFault,
}

impl CaptureStream {
    /// Creates a stream that runs `release` exactly once when stopped.
    pub fn new<F>(fault: DeviceFault, release: F) -> Self
    where
        F: FnOnce() -> Result<(), VoiceError> + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
            fault,
        }
    }

    /// Creates a stream with nothing to release.
    pub fn detached() -> Self {
        Self {
            release: None,
            fault: DeviceFault::new(),
        }
    }

    /// Returns the fault slot the device reports into.
    pub fn fault(&self) -> DeviceFault {
        self.fault.clone()
    }

    /// Returns `true` once the stream has been released.
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Stops capture. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if stopping fails; the stream still
    /// counts as released.
    pub fn release(&mut self) -> Result<(), VoiceError> {
        match self.release.take() {
            Some(release) => release(),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "capture stream release failed on drop");
        }
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream")
            .field("released", &self.is_released())
            .field("fault", &self.fault.get())
            .finish()
    }
}
