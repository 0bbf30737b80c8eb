//! Outbound audio pipeline.
//!
//! ```text
//! CPAL Thread → Ring Buffer → Capture Bridge → Outbound Queue → Forwarder → Transport
//! ```
//!
//! - **Ring Buffer**: Lock-free SPSC queue; the device callback never blocks
//! - **Capture Bridge**: Converts to 16 kHz mono, cuts fixed windows, encodes
//! - **Outbound Queue**: Unbounded FIFO that holds frames while the
//!   connection is still pending
//! - **Forwarder**: Waits for the session handle to open, then sends frames
//!   in queue order

mod capture;
mod outbound;
mod ring_buffer;

pub(crate) use capture::{spawn_capture_bridge, CaptureConfig};
pub(crate) use outbound::spawn_forwarder;
pub(crate) use ring_buffer::SampleBuffer;
