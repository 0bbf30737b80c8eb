//! WebSocket transport for the Gemini Live API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::api_key_from_env;
use crate::transport::message::ClientMessage;
use crate::transport::{ServerMessage, Transport, TransportEvent, TransportLink};
use crate::{EncodedFrame, SessionConfig, TransportError};

/// Bidirectional streaming endpoint of the live API.
pub const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport speaking the Gemini Live WebSocket protocol.
///
/// `open()` connects, sends the `setup` message and resolves when the
/// server answers `setupComplete`. Audio goes out as `realtimeInput`
/// media chunks; server messages arrive as [`TransportEvent::Message`].
///
/// # Example
///
/// ```no_run
/// use lumina_voice::transport::GeminiLiveTransport;
///
/// let transport = GeminiLiveTransport::from_env()?;
/// # Ok::<(), lumina_voice::TransportError>(())
/// ```
pub struct GeminiLiveTransport {
    api_key: String,
    endpoint: String,
}

impl GeminiLiveTransport {
    /// Creates a transport authenticating with `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: LIVE_ENDPOINT.to_string(),
        }
    }

    /// Creates a transport with the key from `GEMINI_API_KEY` or `API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn from_env() -> Result<Self, TransportError> {
        api_key_from_env()
            .map(Self::new)
            .ok_or_else(|| TransportError::custom("no API key: set GEMINI_API_KEY or API_KEY"))
    }

    /// Overrides the endpoint, e.g. for a proxy.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Returns the endpoint without credentials.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key)
    }
}

impl std::fmt::Debug for GeminiLiveTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for GeminiLiveTransport {
    fn name(&self) -> &str {
        "gemini-live"
    }

    async fn open(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportLink>, TransportError> {
        tracing::info!(endpoint = %self.endpoint, model = %config.model, "connecting to live endpoint");

        let (ws, _response) = connect_async(self.url())
            .await
            .map_err(|e| TransportError::connect_failed(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let setup = ClientMessage::setup(config).to_json()?;
        sink.send(Message::Text(setup))
            .await
            .map_err(|e| TransportError::connect_failed(e.to_string()))?;

        wait_for_setup(&mut stream, &events).await?;
        tracing::info!(model = %config.model, "live session accepted");
        let _ = events.send(TransportEvent::Open);

        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(stream, events, Arc::clone(&closed)));

        Ok(Box::new(GeminiLink {
            sink: tokio::sync::Mutex::new(sink),
            closed,
            reader,
        }))
    }
}

/// What an inbound WebSocket frame means to the session.
#[derive(Debug)]
enum Inbound {
    Message(ServerMessage),
    Closed(Option<String>),
}

fn classify(msg: Message) -> Result<Option<Inbound>, TransportError> {
    match msg {
        Message::Text(text) => ServerMessage::parse(&text).map(|m| Some(Inbound::Message(m))),
        // The server sends JSON in binary frames too
        Message::Binary(bytes) => {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| TransportError::protocol(format!("binary frame is not UTF-8: {e}")))?;
            ServerMessage::parse(text).map(|m| Some(Inbound::Message(m)))
        }
        Message::Close(frame) => Ok(Some(Inbound::Closed(
            frame
                .map(|f| f.reason.to_string())
                .filter(|reason| !reason.is_empty()),
        ))),
        _ => Ok(None),
    }
}

async fn wait_for_setup(
    stream: &mut SplitStream<WsStream>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<(), TransportError> {
    while let Some(result) = stream.next().await {
        let msg = result.map_err(|e| TransportError::connect_failed(e.to_string()))?;
        match classify(msg)? {
            Some(Inbound::Message(m)) if m.is_setup_complete() => return Ok(()),
            Some(Inbound::Message(m)) => {
                let _ = events.send(TransportEvent::Message(m));
            }
            Some(Inbound::Closed(reason)) => {
                return Err(TransportError::connect_failed(format!(
                    "closed during setup: {}",
                    reason.as_deref().unwrap_or("no reason given")
                )));
            }
            None => {}
        }
    }
    Err(TransportError::connect_failed("connection ended during setup"))
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
) {
    while let Some(result) = stream.next().await {
        let inbound = result
            .map_err(|e| TransportError::protocol(e.to_string()))
            .and_then(classify);

        match inbound {
            Ok(Some(Inbound::Message(m))) => {
                if events.send(TransportEvent::Message(m)).is_err() {
                    return;
                }
            }
            Ok(Some(Inbound::Closed(reason))) => {
                if !closed.load(Ordering::SeqCst) {
                    tracing::info!(?reason, "live endpoint closed the connection");
                    let _ = events.send(TransportEvent::Closed { reason });
                }
                return;
            }
            Ok(None) => {}
            Err(e) => {
                if !closed.load(Ordering::SeqCst) {
                    tracing::error!(error = %e, "live connection failed");
                    let _ = events.send(TransportEvent::Error(e));
                }
                return;
            }
        }
    }

    if !closed.load(Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Closed { reason: None });
    }
}

struct GeminiLink {
    sink: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl TransportLink for GeminiLink {
    async fn send(&self, frame: &EncodedFrame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let text = ClientMessage::audio(frame).to_json()?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::send_failed(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.sink.lock().await.close().await;
        self.reader.abort();
        match result {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::custom(format!("close failed: {e}"))),
        }
    }
}

impl Drop for GeminiLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn test_url_carries_key() {
        let transport = GeminiLiveTransport::new("secret");
        assert_eq!(transport.url(), format!("{LIVE_ENDPOINT}?key=secret"));
        assert!(!format!("{transport:?}").contains("secret"));
    }

    #[test]
    fn test_classify_text_and_binary() {
        let text = Message::Text(r#"{"setupComplete":{}}"#.to_string());
        assert!(matches!(
            classify(text).unwrap(),
            Some(Inbound::Message(m)) if m.is_setup_complete()
        ));

        let binary = Message::Binary(br#"{"serverContent":{"interrupted":true}}"#.to_vec());
        assert!(matches!(
            classify(binary).unwrap(),
            Some(Inbound::Message(m)) if m.is_interrupted()
        ));
    }

    #[test]
    fn test_classify_close_reason() {
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: "quota exceeded".into(),
        };
        assert!(matches!(
            classify(Message::Close(Some(frame))).unwrap(),
            Some(Inbound::Closed(Some(reason))) if reason == "quota exceeded"
        ));
        assert!(matches!(
            classify(Message::Close(None)).unwrap(),
            Some(Inbound::Closed(None))
        ));
    }

    #[test]
    fn test_classify_ignores_ping() {
        assert!(classify(Message::Ping(vec![1])).unwrap().is_none());
    }

    #[test]
    fn test_classify_rejects_garbage() {
        let err = classify(Message::Binary(vec![0xFF, 0xFE])).unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
    }

    #[tokio::test]
    #[ignore = "requires network access and GEMINI_API_KEY"]
    async fn test_live_open_and_close() {
        let transport = GeminiLiveTransport::from_env().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let link = transport.open(&SessionConfig::default(), tx).await.unwrap();
        link.close().await.unwrap();
        link.close().await.unwrap();
    }
}
