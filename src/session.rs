//! Voice session state machine.
//!
//! A [`VoiceSession`] wires the capture pipeline, transport and playback
//! together and supervises them:
//!
//! ```text
//! Idle → Connecting → Listening ⇄ Speaking → Closed | Error
//! ```
//!
//! `Closed` and `Error` are terminal. A new conversation needs a new
//! session.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::event::EventCallback;
use crate::pipeline::{spawn_capture_bridge, spawn_forwarder, CaptureConfig};
use crate::playback::{AudioOutput, PlaybackScheduler};
use crate::source::{CaptureStream, FrameSource};
use crate::transport::{
    ServerMessage, SessionHandle, Transport, TransportEvent, TransportLink,
};
use crate::{
    EncodedFrame, SessionConfig, TransportError, VoiceConfig, VoiceError, VoiceEvent,
};

/// Observable state of a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionStatus {
    /// Created, not started.
    #[default]
    Idle,
    /// Microphone acquired, waiting for the remote endpoint.
    Connecting,
    /// Connected; the model is silent.
    Listening,
    /// Connected; model audio is playing.
    Speaking,
    /// Ended by `stop()` or by the remote side. Terminal.
    Closed,
    /// Ended by a failure. Terminal; see [`VoiceSession::last_error()`].
    Error,
}

impl SessionStatus {
    /// Lowercase name, as shown to the user.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }

    /// Returns `true` for `Closed` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }

    /// Returns `true` while connected (`Listening` or `Speaking`).
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Listening | Self::Speaking)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics about a voice session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Outbound windows captured and queued.
    pub frames_captured: u64,
    /// Outbound frames handed to the transport.
    pub frames_sent: u64,
    /// Inbound frames scheduled for playback.
    pub frames_played: u64,
    /// Inbound frames dropped as malformed or unplayable.
    pub frames_dropped: u64,
    /// Inbound frames that arrived after their predicted start.
    pub late_frames: u64,
    /// Interruptions received.
    pub interruptions: u64,
    /// Length of the most recent completed speaking window.
    pub last_speaking_window: Option<Duration>,
}

/// Internal counters shared between the session and background tasks.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub capturing: AtomicBool,
    pub frames_captured: AtomicU64,
    pub frames_sent: AtomicU64,
    pub frames_played: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub late_frames: AtomicU64,
    pub interruptions: AtomicU64,
    pub last_speaking_window: Mutex<Option<Duration>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            capturing: AtomicBool::new(false),
            frames_captured: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_played: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            late_frames: AtomicU64::new(0),
            interruptions: AtomicU64::new(0),
            last_speaking_window: Mutex::new(None),
        }
    }
}

/// Signals from background tasks to the supervisor.
#[derive(Debug)]
pub(crate) enum ControlSignal {
    /// The handle is open.
    Opened,
    /// `open()` failed or timed out.
    OpenFailed(VoiceError),
    /// The microphone stopped working.
    CaptureFailed(VoiceError),
    /// The transport rejected an outbound frame.
    SendFailed(TransportError),
}

/// Why the supervisor stopped.
enum Outcome {
    RemoteClosed(Option<String>),
    Failed(VoiceError),
}

/// Everything a session needs, assembled by the builder.
pub(crate) struct SessionParts {
    pub source: Box<dyn FrameSource>,
    pub transport: Arc<dyn Transport>,
    pub output: Arc<dyn AudioOutput>,
    pub session_config: SessionConfig,
    pub config: VoiceConfig,
    pub event_callback: Option<EventCallback>,
}

struct Shared {
    session_config: SessionConfig,
    config: VoiceConfig,
    source: Mutex<Option<Box<dyn FrameSource>>>,
    transport: Arc<dyn Transport>,
    output: Arc<dyn AudioOutput>,
    scheduler: PlaybackScheduler,
    handle: SessionHandle,
    state: Arc<SessionState>,
    status: watch::Sender<SessionStatus>,
    event_callback: Option<EventCallback>,
    last_error: Mutex<Option<VoiceError>>,
    capture_stream: Mutex<Option<CaptureStream>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    torn_down: AtomicBool,
    released: watch::Sender<bool>,
    lifecycle: tokio::sync::Mutex<()>,
}

/// Handle to a realtime voice session.
///
/// Created by [`LiveVoiceBuilder::build()`](crate::LiveVoiceBuilder::build).
///
/// # Lifecycle
///
/// 1. [`start()`](Self::start) acquires the microphone and dispatches the
///    connection; audio captured while connecting is queued, not dropped
/// 2. The session moves between `Listening` and `Speaking` as model audio
///    plays
/// 3. [`stop()`](Self::stop), a remote close or a failure tears everything
///    down exactly once
/// 4. Dropping the session also tears it down (but prefer explicit `stop()`)
///
/// # Example
///
/// ```no_run
/// use lumina_voice::LiveVoice;
/// use lumina_voice::playback::MockOutput;
/// use lumina_voice::source::MockSource;
/// use lumina_voice::transport::MockTransport;
///
/// # async fn run() -> Result<(), lumina_voice::VoiceError> {
/// let session = LiveVoice::builder()
///     .source(MockSource::capture_format())
///     .transport(MockTransport::new())
///     .output(MockOutput::new())
///     .build()?;
///
/// session.start().await?;
/// println!("status: {}", session.status());
/// session.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct VoiceSession {
    shared: Arc<Shared>,
}

impl VoiceSession {
    pub(crate) fn new(parts: SessionParts) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        let (released, _) = watch::channel(false);
        let scheduler = PlaybackScheduler::new(parts.config.speaking_epsilon);

        Self {
            shared: Arc::new(Shared {
                session_config: parts.session_config,
                config: parts.config,
                source: Mutex::new(Some(parts.source)),
                transport: parts.transport,
                output: parts.output,
                scheduler,
                handle: SessionHandle::new(),
                state: Arc::new(SessionState::new()),
                status,
                event_callback: parts.event_callback,
                last_error: Mutex::new(None),
                capture_stream: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                released,
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Starts the session.
    ///
    /// Acquires the microphone, starts capture and dispatches the connection.
    /// Returns once capture is running; the connection opens in the
    /// background (watch [`subscribe()`](Self::subscribe) for `Listening`).
    ///
    /// Must be called from within a tokio runtime. Acquiring the device runs
    /// on the blocking pool, so the runtime keeps serving other tasks while
    /// the backend starts.
    ///
    /// # Errors
    ///
    /// - `DeviceUnavailable` / `PermissionDenied` if the microphone cannot
    ///   be acquired; the session ends in `Error` and no connection is made
    /// - `AlreadyStarted` on a second call
    /// - `SessionClosed` if the session has already ended
    pub async fn start(&self) -> Result<(), VoiceError> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock().await;

        if shared.torn_down.load(Ordering::SeqCst) {
            return Err(VoiceError::SessionClosed);
        }
        if shared.started.swap(true, Ordering::SeqCst) {
            return Err(VoiceError::AlreadyStarted);
        }

        let Some(mut source) = shared.source.lock().take() else {
            return Err(VoiceError::SessionClosed);
        };
        shared.transition(&[SessionStatus::Idle], SessionStatus::Connecting);
        tracing::info!(
            source = source.name(),
            transport = shared.transport.name(),
            output = shared.output.name(),
            model = %shared.session_config.model,
            "starting voice session"
        );

        // Opening a device blocks until the backend is ready
        let acquired = tokio::task::spawn_blocking(move || {
            source
                .native_config()
                .and_then(|native| source.start_capture().map(|capture| (native, capture)))
        })
        .await
        .unwrap_or_else(|e| Err(VoiceError::BackendError(format!("capture start failed: {e}"))));
        let ((device_sample_rate, device_channels), (stream, consumer)) = match acquired {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::error!(error = %e, "failed to acquire microphone");
                shared.teardown(SessionStatus::Error, Some(e.clone())).await;
                return Err(e);
            }
        };

        let fault = stream.fault();
        *shared.capture_stream.lock() = Some(stream);
        shared.state.capturing.store(true, Ordering::SeqCst);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<EncodedFrame>();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let capture_config = CaptureConfig {
            device_sample_rate,
            device_channels,
            window_size: shared.config.window_size,
            poll_interval: shared.config.capture_poll_interval,
            session_start: Instant::now(),
        };

        let bridge = spawn_capture_bridge(
            consumer,
            &capture_config,
            fault,
            outbound_tx,
            control_tx.clone(),
            Arc::clone(&shared.state),
        );
        let forwarder = spawn_forwarder(
            shared.handle.clone(),
            outbound_rx,
            control_tx.clone(),
            Arc::clone(&shared.state),
        );
        let opener = tokio::spawn(open_connection(
            Arc::clone(&shared.transport),
            shared.session_config.clone(),
            shared.config.connect_timeout,
            shared.handle.clone(),
            events_tx,
            control_tx,
        ));
        let supervisor = tokio::spawn(supervise(Arc::clone(shared), control_rx, events_rx));

        shared
            .tasks
            .lock()
            .extend([bridge, forwarder, opener, supervisor]);

        tracing::debug!(
            device_sample_rate,
            device_channels,
            window_size = shared.config.window_size,
            "capture running"
        );
        Ok(())
    }

    /// Stops the session and releases every resource.
    ///
    /// Never fails. Safe to call more than once, before `start()`, or
    /// after the session already ended; returns once teardown is complete.
    pub async fn stop(&self) {
        let _lifecycle = self.shared.lifecycle.lock().await;
        self.shared.teardown(SessionStatus::Closed, None).await;
    }

    /// Returns the current status.
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }

    /// Returns `true` until the session reaches a terminal status.
    pub fn is_active(&self) -> bool {
        !self.status().is_terminal()
    }

    /// Returns current session statistics.
    pub fn stats(&self) -> SessionStats {
        let state = &self.shared.state;
        SessionStats {
            frames_captured: state.frames_captured.load(Ordering::SeqCst),
            frames_sent: state.frames_sent.load(Ordering::SeqCst),
            frames_played: state.frames_played.load(Ordering::SeqCst),
            frames_dropped: state.frames_dropped.load(Ordering::SeqCst),
            late_frames: state.late_frames.load(Ordering::SeqCst),
            interruptions: state.interruptions.load(Ordering::SeqCst),
            last_speaking_window: *state.last_speaking_window.lock(),
        }
    }

    /// Returns the error that ended the session, if any.
    pub fn last_error(&self) -> Option<VoiceError> {
        self.shared.last_error.lock().clone()
    }

    /// Returns the playback cursor on the output clock.
    pub fn next_start_time(&self) -> Duration {
        self.shared.scheduler.next_start_time()
    }

    /// Returns the session parameters sent when connecting.
    pub fn session_config(&self) -> &SessionConfig {
        &self.shared.session_config
    }
}

impl fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceSession")
            .field("status", &self.status())
            .field("handle", &self.shared.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if self.shared.torn_down.load(Ordering::SeqCst) {
            return;
        }
        // Dropped without stop() - tear down in the background if we can
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let shared = Arc::clone(&self.shared);
            runtime.spawn(async move {
                shared.teardown(SessionStatus::Closed, None).await;
            });
        } else {
            self.shared.teardown_sync();
        }
    }
}

impl Shared {
    fn emit(&self, event: VoiceEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    /// Moves to `to` if the current status is one of `from`.
    fn transition(&self, from: &[SessionStatus], to: SessionStatus) -> bool {
        let mut previous = to;
        let changed = self.status.send_if_modified(|status| {
            if from.contains(status) && *status != to {
                previous = *status;
                *status = to;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(%previous, current = %to, "session status changed");
            self.emit(VoiceEvent::StatusChanged {
                previous,
                current: to,
            });
        }
        changed
    }

    /// Moves to a terminal status from any non-terminal one.
    fn finish(&self, to: SessionStatus) {
        self.transition(
            &[
                SessionStatus::Idle,
                SessionStatus::Connecting,
                SessionStatus::Listening,
                SessionStatus::Speaking,
            ],
            to,
        );
    }

    fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    fn handle_message(&self, message: &ServerMessage) {
        for chunk in message.audio_chunks() {
            match chunk {
                Ok(chunk) => self.play_chunk(&chunk),
                Err(e) => self.drop_frame("dropping malformed audio frame", &e),
            }
        }
        if message.is_interrupted() {
            self.interrupt();
        }
        if message.is_turn_complete() {
            tracing::debug!("model turn complete");
        }
    }

    fn play_chunk(&self, chunk: &EncodedFrame) {
        let now = self.output.current_time();
        let scheduled = match self.scheduler.enqueue(chunk, now) {
            Ok(scheduled) => scheduled,
            Err(e) => {
                self.drop_frame("dropping malformed audio frame", &e);
                return;
            }
        };

        if scheduled.frame.is_empty() {
            return;
        }
        if let Some(gap) = scheduled.gap {
            self.state.late_frames.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(?gap, "audio frame arrived late, playing immediately");
            self.emit(VoiceEvent::LatePlayback { gap });
        }

        if let Err(e) = self.output.play(scheduled.start, &scheduled.frame) {
            self.drop_frame("output rejected audio frame", &e);
            return;
        }

        self.state.frames_played.fetch_add(1, Ordering::SeqCst);
        self.transition(&[SessionStatus::Listening], SessionStatus::Speaking);
    }

    fn drop_frame(&self, message: &'static str, error: &dyn fmt::Display) {
        self.state.frames_dropped.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(error = %error, output = self.output.name(), "{message}");
        self.emit(VoiceEvent::FrameDropped {
            reason: error.to_string(),
        });
    }

    fn interrupt(&self) {
        let now = self.output.current_time();
        let discarded = self.scheduler.on_interrupted(now);
        self.output.flush();
        self.state.interruptions.fetch_add(1, Ordering::SeqCst);
        tracing::info!(?discarded, "model turn interrupted");
        self.emit(VoiceEvent::Interrupted { discarded });
        self.transition(&[SessionStatus::Speaking], SessionStatus::Listening);
    }

    fn check_speaking(&self) {
        if self.status() != SessionStatus::Speaking {
            return;
        }
        let now = self.output.current_time();
        if let Some(window) = self.scheduler.finish_turn(now) {
            *self.state.last_speaking_window.lock() = Some(window);
            tracing::debug!(?window, "playback caught up");
            self.emit(VoiceEvent::SpeakingFinished { window });
            self.transition(&[SessionStatus::Speaking], SessionStatus::Listening);
        }
    }

    fn report_release_failure(&self, resource: &'static str, error: &dyn fmt::Display) {
        tracing::warn!(resource, error = %error, "failed to release resource");
        self.emit(VoiceEvent::ReleaseFailed {
            resource,
            error: error.to_string(),
        });
    }

    /// Releases everything exactly once.
    ///
    /// Later callers wait until the first teardown has finished.
    async fn teardown(&self, final_status: SessionStatus, error: Option<VoiceError>) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            let mut released = self.released.subscribe();
            let _ = released.wait_for(|done| *done).await;
            return;
        }

        if let Some(e) = error {
            *self.last_error.lock() = Some(e);
        }
        self.state.capturing.store(false, Ordering::SeqCst);

        let stream = self.capture_stream.lock().take();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.release() {
                self.report_release_failure("microphone", &e);
            }
        }
        self.source.lock().take();

        if let Err(e) = self.handle.close().await {
            self.report_release_failure("transport", &e);
        }

        let now = self.output.current_time();
        if let Err(e) = self.output.close() {
            self.report_release_failure("output", &e);
        }
        self.scheduler.reset(now);

        self.finish(final_status);
        tracing::info!(status = %self.status(), stats = ?self.state, "voice session ended");
        self.released.send_replace(true);

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Best-effort teardown without a runtime.
    fn teardown_sync(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.capturing.store(false, Ordering::SeqCst);
        let stream = self.capture_stream.lock().take();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.release() {
                self.report_release_failure("microphone", &e);
            }
        }
        if let Err(e) = self.output.close() {
            self.report_release_failure("output", &e);
        }
        self.finish(SessionStatus::Closed);
        self.released.send_replace(true);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Opens the connection and attaches it to the handle.
async fn open_connection(
    transport: Arc<dyn Transport>,
    session_config: SessionConfig,
    connect_timeout: Option<Duration>,
    handle: SessionHandle,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    control_tx: mpsc::UnboundedSender<ControlSignal>,
) {
    let open = transport.open(&session_config, events_tx);
    let result = match connect_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, open).await {
            Ok(result) => result.map_err(VoiceError::from),
            Err(_) => Err(VoiceError::ConnectTimeout { timeout }),
        },
        None => open.await.map_err(VoiceError::from),
    };

    match result {
        Ok(link) => {
            let link: Arc<dyn TransportLink> = Arc::from(link);
            if handle.mark_open(Arc::clone(&link)) {
                let _ = control_tx.send(ControlSignal::Opened);
            } else if let Err(e) = link.close().await {
                // Session ended while connecting
                tracing::debug!(error = %e, "closing late connection failed");
            }
        }
        Err(e) => {
            let _ = control_tx.send(ControlSignal::OpenFailed(e));
        }
    }
}

/// Event loop over control signals, transport events and the speaking check.
async fn supervise(
    shared: Arc<Shared>,
    mut control_rx: mpsc::UnboundedReceiver<ControlSignal>,
    mut events_rx: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut speaking_check = tokio::time::interval(shared.config.speaking_check_interval);
    speaking_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut events_open = true;

    let outcome = loop {
        tokio::select! {
            Some(signal) = control_rx.recv() => match signal {
                ControlSignal::Opened => {
                    if shared.transition(&[SessionStatus::Connecting], SessionStatus::Listening) {
                        tracing::info!("voice session connected");
                    }
                }
                ControlSignal::OpenFailed(e) | ControlSignal::CaptureFailed(e) => {
                    break Outcome::Failed(e);
                }
                ControlSignal::SendFailed(e) => break Outcome::Failed(VoiceError::Transport(e)),
            },
            event = events_rx.recv(), if events_open => match event {
                Some(TransportEvent::Open) => tracing::debug!("transport reported open"),
                Some(TransportEvent::Message(message)) => shared.handle_message(&message),
                Some(TransportEvent::Closed { reason }) => break Outcome::RemoteClosed(reason),
                Some(TransportEvent::Error(e)) => break Outcome::Failed(VoiceError::Transport(e)),
                None => events_open = false,
            },
            _ = speaking_check.tick() => shared.check_speaking(),
        }
    };

    match outcome {
        Outcome::RemoteClosed(reason) => {
            tracing::info!(?reason, "remote endpoint closed the session");
            shared.teardown(SessionStatus::Closed, None).await;
        }
        Outcome::Failed(e) => {
            tracing::error!(error = %e, "voice session failed");
            shared.teardown(SessionStatus::Error, Some(e)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_new() {
        let state = SessionState::new();
        assert!(!state.capturing.load(Ordering::SeqCst));
        assert_eq!(state.frames_captured.load(Ordering::SeqCst), 0);
        assert!(state.last_speaking_window.lock().is_none());
    }

    #[test]
    fn test_session_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.frames_dropped, 0);
        assert_eq!(stats.last_speaking_window, None);
    }

    #[test]
    fn test_status_display_and_terminal() {
        assert_eq!(SessionStatus::Listening.to_string(), "listening");
        assert!(SessionStatus::Closed.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::Speaking.is_terminal());
        assert!(SessionStatus::Speaking.is_connected());
        assert!(!SessionStatus::Connecting.is_connected());
        assert_eq!(SessionStatus::default(), SessionStatus::Idle);
    }
}
