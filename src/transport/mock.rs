//! Scripted in-memory transport for tests and demos.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::transport::{ServerMessage, Transport, TransportEvent, TransportLink};
use crate::{EncodedFrame, SessionConfig, TransportError};

#[derive(Debug, Clone)]
enum OpenBehavior {
    Immediate,
    Fail(TransportError),
    Never,
    Gated,
}

/// A transport that never touches the network.
///
/// Clones share state, so a test keeps one clone to script the remote side
/// while the session owns another.
///
/// # Example
///
/// ```
/// use lumina_voice::transport::MockTransport;
///
/// let transport = MockTransport::new();
/// assert_eq!(transport.open_count(), 0);
/// assert!(transport.sent_frames().is_empty());
/// ```
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

struct Inner {
    behavior: OpenBehavior,
    gate: Notify,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    sent: Mutex<Vec<EncodedFrame>>,
    configs: Mutex<Vec<SessionConfig>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MockTransport {
    /// Creates a transport whose `open()` succeeds immediately.
    pub fn new() -> Self {
        Self::with_behavior(OpenBehavior::Immediate)
    }

    /// Creates a transport whose `open()` fails with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self::with_behavior(OpenBehavior::Fail(error))
    }

    /// Creates a transport whose `open()` never resolves.
    pub fn never_opens() -> Self {
        Self::with_behavior(OpenBehavior::Never)
    }

    /// Creates a transport whose `open()` waits for [`accept()`](Self::accept).
    pub fn gated() -> Self {
        Self::with_behavior(OpenBehavior::Gated)
    }

    fn with_behavior(behavior: OpenBehavior) -> Self {
        Self {
            inner: Arc::new(Inner {
                behavior,
                gate: Notify::new(),
                events: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                configs: Mutex::new(Vec::new()),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                fail_sends: AtomicBool::new(false),
            }),
        }
    }

    /// Lets a gated `open()` resolve.
    pub fn accept(&self) {
        self.inner.gate.notify_one();
    }

    /// Makes every later `send()` fail.
    pub fn fail_sends(&self) {
        self.inner.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Number of `open()` calls.
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Number of link `close()` calls that closed the link.
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Frames received by the link, in order.
    pub fn sent_frames(&self) -> Vec<EncodedFrame> {
        self.inner.sent.lock().clone()
    }

    /// Session configurations passed to `open()`.
    pub fn opened_configs(&self) -> Vec<SessionConfig> {
        self.inner.configs.lock().clone()
    }

    /// Delivers a server message. Returns `false` if no session is listening.
    pub fn push_message(&self, message: ServerMessage) -> bool {
        self.push(TransportEvent::Message(message))
    }

    /// Delivers model audio frames as one server message.
    pub fn push_audio(&self, frames: impl IntoIterator<Item = EncodedFrame>) -> bool {
        self.push_message(ServerMessage::audio(frames))
    }

    /// Delivers an interruption signal.
    pub fn push_interrupted(&self) -> bool {
        self.push_message(ServerMessage::interrupted())
    }

    /// Delivers a connection error.
    pub fn push_error(&self, error: TransportError) -> bool {
        self.push(TransportEvent::Error(error))
    }

    /// Closes the connection from the remote side.
    pub fn push_close(&self, reason: Option<&str>) -> bool {
        self.push(TransportEvent::Closed {
            reason: reason.map(str::to_string),
        })
    }

    fn push(&self, event: TransportEvent) -> bool {
        self.inner
            .events
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportLink>, TransportError> {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.configs.lock().push(config.clone());
        *self.inner.events.lock() = Some(events.clone());

        match &self.inner.behavior {
            OpenBehavior::Immediate => {}
            OpenBehavior::Fail(error) => return Err(error.clone()),
            OpenBehavior::Never => std::future::pending::<()>().await,
            OpenBehavior::Gated => self.inner.gate.notified().await,
        }

        let _ = events.send(TransportEvent::Open);
        Ok(Box::new(MockLink {
            inner: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockLink {
    inner: Arc<Inner>,
    closed: AtomicBool,
}

#[async_trait]
impl TransportLink for MockLink {
    async fn send(&self, frame: &EncodedFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::send_failed("mock send failure"));
        }
        self.inner.sent.lock().push(frame.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.events.lock().take();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_frames() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = transport.open(&SessionConfig::default(), tx).await.unwrap();

        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));

        let frame = EncodedFrame::pcm("AAA=".to_string(), 16_000);
        link.send(&frame).await.unwrap();
        assert_eq!(transport.sent_frames(), vec![frame]);
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing_open() {
        let transport = MockTransport::failing(TransportError::connect_failed("refused"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = transport.open(&SessionConfig::default(), tx).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_mock_gated_open() {
        let transport = MockTransport::gated();
        let (tx, _rx) = mpsc::unbounded_channel();
        let opener = {
            let transport = transport.clone();
            tokio::spawn(async move {
                transport
                    .open(&SessionConfig::default(), tx)
                    .await
                    .is_ok()
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!opener.is_finished());
        transport.accept();
        assert!(opener.await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_push_after_close_is_dropped() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = transport.open(&SessionConfig::default(), tx).await.unwrap();

        assert!(transport.push_interrupted());
        link.close().await.unwrap();
        link.close().await.unwrap();
        assert!(!transport.push_interrupted());
        assert_eq!(transport.close_count(), 1);

        assert!(matches!(rx.recv().await, Some(TransportEvent::Open)));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Message(m)) if m.is_interrupted()));
    }

    #[tokio::test]
    async fn test_mock_send_after_close_fails() {
        let transport = MockTransport::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let link = transport.open(&SessionConfig::default(), tx).await.unwrap();
        link.close().await.unwrap();

        let frame = EncodedFrame::pcm(String::new(), 16_000);
        assert!(matches!(link.send(&frame).await, Err(TransportError::Closed)));
    }
}
