//! Transport trait and implementations for the remote voice endpoint.
//!
//! A [`Transport`] opens a live session and returns a [`TransportLink`] for
//! sending audio. Everything the remote side sends back arrives as
//! [`TransportEvent`]s on a channel supplied at open time. The crate
//! provides two transports:
//!
//! - [`GeminiLiveTransport`]: the provider's bidirectional WebSocket API
//! - [`MockTransport`]: scripted in-memory transport for tests and demos
//!
//! No transport retries. Failures are reported once and the session
//! controller decides what happens next.

mod gemini;
mod handle;
pub mod message;
mod mock;

pub use gemini::{GeminiLiveTransport, LIVE_ENDPOINT};
pub use handle::{HandleState, SessionHandle};
pub use message::{ServerContent, ServerMessage};
pub use mock::MockTransport;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{EncodedFrame, SessionConfig, TransportError};

/// Something the remote endpoint did.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The remote endpoint accepted the session.
    Open,
    /// A message arrived.
    Message(ServerMessage),
    /// The remote side closed the connection.
    Closed {
        /// Close reason, if the remote side gave one.
        reason: Option<String>,
    },
    /// The connection failed.
    Error(TransportError),
}

/// An open connection to the remote endpoint.
///
/// # Implementation Notes
///
/// - `send` is awaited by a single forwarder task, so frames arrive in order
/// - `close` must be idempotent and must not fail because the remote side
///   already hung up
#[async_trait]
pub trait TransportLink: Send + Sync {
    /// Sends one audio frame.
    async fn send(&self, frame: &EncodedFrame) -> Result<(), TransportError>;

    /// Closes the connection. Safe to call more than once.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A way of reaching the remote voice endpoint.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use lumina_voice::transport::{Transport, TransportEvent, TransportLink};
/// use lumina_voice::{EncodedFrame, SessionConfig, TransportError};
/// use tokio::sync::mpsc;
///
/// struct Discard;
///
/// #[async_trait]
/// impl TransportLink for Discard {
///     async fn send(&self, _frame: &EncodedFrame) -> Result<(), TransportError> {
///         Ok(())
///     }
///
///     async fn close(&self) -> Result<(), TransportError> {
///         Ok(())
///     }
/// }
///
/// struct Loopback;
///
/// #[async_trait]
/// impl Transport for Loopback {
///     fn name(&self) -> &str {
///         "loopback"
///     }
///
///     async fn open(
///         &self,
///         _config: &SessionConfig,
///         events: mpsc::UnboundedSender<TransportEvent>,
///     ) -> Result<Box<dyn TransportLink>, TransportError> {
///         let _ = events.send(TransportEvent::Open);
///         Ok(Box::new(Discard))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Opens a session.
    ///
    /// Resolves once the remote endpoint has accepted `config`. Inbound
    /// traffic is delivered on `events` until the link is closed.
    async fn open(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportLink>, TransportError>;
}
