//! Keep-alive pings for the event stream.
//!
//! Runs as a task alongside an open connection. Sends `{"action":"ping"}`
//! every interval. With pong checking enabled, a ping that is still
//! unanswered when the next one is due marks the connection as a zombie.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::protocol::OutboundAction;

/// Tracks whether the last ping was answered.
#[derive(Debug)]
pub struct HeartbeatState {
    /// Whether a pong arrived for the last ping we sent.
    pub last_ack_received: bool,
}

impl HeartbeatState {
    /// Create a new heartbeat state, starting with the ack received
    /// (no ping sent yet).
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_ack_received: true,
        }
    }

    /// Record that a pong was received.
    pub fn ack_received(&mut self) {
        self.last_ack_received = true;
        trace!("Pong received");
    }
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared heartbeat state.
pub type SharedHeartbeat = Arc<Mutex<HeartbeatState>>;

/// Runs the ping loop until the connection goes away.
///
/// The first ping goes out one full `interval` after the connection opens.
/// `zombie_tx` fires when the writer is gone, or when `require_pong` is set
/// and the previous ping went unanswered. The caller aborts this task when
/// the connection closes.
pub async fn run_heartbeat(
    interval: Duration,
    require_pong: bool,
    state: SharedHeartbeat,
    outbound: mpsc::UnboundedSender<String>,
    zombie_tx: oneshot::Sender<()>,
) {
    debug!(interval_ms = interval.as_millis(), require_pong, "Heartbeat task started");

    let frame = match OutboundAction::Ping.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to encode ping frame, heartbeat disabled");
            return;
        },
    };

    loop {
        tokio::time::sleep(interval).await;

        if send_ping_if_healthy(&frame, require_pong, &state, &outbound).is_err() {
            warn!("Heartbeat failed, treating connection as lost");
            let _ = zombie_tx.send(());
            return;
        }
    }
}

/// Check the ack status and send a ping if healthy.
///
/// Returns `Err(())` if the previous ping is unanswered and pongs are
/// required, or if the writer has exited.
fn send_ping_if_healthy(
    frame: &str,
    require_pong: bool,
    state: &SharedHeartbeat,
    outbound: &mpsc::UnboundedSender<String>,
) -> Result<(), ()> {
    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
    if require_pong && !guard.last_ack_received {
        return Err(());
    }
    guard.last_ack_received = false;
    drop(guard);

    trace!("Sending ping");
    outbound.send(frame.to_owned()).map_err(|_| ())
}
