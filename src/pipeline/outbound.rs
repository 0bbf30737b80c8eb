//! Outbound forwarder task - drains the frame queue into the transport.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::session::{ControlSignal, SessionState};
use crate::transport::SessionHandle;
use crate::EncodedFrame;

/// Sends queued frames once the handle opens.
///
/// Frames captured while the connection is pending wait in the queue and go
/// out first, in capture order. A single task does all sending, so order is
/// never lost. Stops on the first send failure.
async fn forward(
    handle: SessionHandle,
    mut outbound_rx: mpsc::UnboundedReceiver<EncodedFrame>,
    control_tx: mpsc::UnboundedSender<ControlSignal>,
    state: Arc<SessionState>,
) {
    let Some(link) = handle.wait_open().await else {
        tracing::debug!("handle closed before opening, dropping queued frames");
        return;
    };

    tracing::debug!(queued = outbound_rx.len(), "connection open, forwarding audio");

    while let Some(frame) = outbound_rx.recv().await {
        if handle.is_closed() {
            return;
        }
        if let Err(e) = link.send(&frame).await {
            if !handle.is_closed() {
                tracing::error!(error = %e, "failed to send audio frame");
                let _ = control_tx.send(ControlSignal::SendFailed(e));
            }
            return;
        }
        state.frames_sent.fetch_add(1, Ordering::SeqCst);
    }
}

/// Spawns the forwarder as a background task.
pub(crate) fn spawn_forwarder(
    handle: SessionHandle,
    outbound_rx: mpsc::UnboundedReceiver<EncodedFrame>,
    control_tx: mpsc::UnboundedSender<ControlSignal>,
    state: Arc<SessionState>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(forward(handle, outbound_rx, control_tx, state))
}
