//! Event-stream connection supervisor.
//!
//! Owns the connection lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                    ^              |
//!                    |        close / error
//!                    |              v
//!                    +------ Reconnecting ---(attempts exhausted)--> Closed
//! ```
//!
//! A run task drives one connection at a time. Every state change it makes
//! is checked against a generation counter under the core lock, so a task
//! left over from an earlier `connect` or `disconnect` can never change
//! state, schedule a retry, or deliver callbacks.
//!
//! Consumer callbacks are always invoked with the core lock released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use talkbox_config::Config;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, ReconnectPolicy};
use crate::dispatcher::{EventDispatcher, FrameKind};
use crate::error::{ClientError, ClientResult};
use crate::heartbeat::{self, HeartbeatState, SharedHeartbeat};
use crate::model::MessageDraft;
use crate::protocol::{self, OutboundAction, close_code};
use crate::session::SessionStore;
use crate::transport::{Connector, TransportConnection, TransportEvent, TransportLink};

/// Shown when the very first connection attempt of a session fails.
pub const HANDSHAKE_FAILURE_HINT: &str = "check that the server is reachable";

/// Observable connection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Disconnected,
    /// Opening a connection.
    Connecting,
    /// Connection open; events flowing.
    Connected,
    /// Waiting before the next attempt.
    Reconnecting,
    /// Final: disconnected by the caller, unauthorized, or out of attempts.
    Closed,
}

impl ConnectionState {
    /// Whether frames can be sent.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Whether the supervisor has stopped for good (until the next `connect`).
    #[must_use]
    pub fn is_final(self) -> bool {
        self == Self::Closed
    }
}

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// HTTP(S) base URL the stream URL is derived from.
    pub server_url: String,
    /// Stream path appended to the base URL.
    pub stream_path: String,
    /// Reconnect limit.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Treat a ping still unanswered at the next tick as a dead connection.
    pub require_pong: bool,
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        Self {
            server_url: config.server.url.clone(),
            stream_path: config.server.stream_path.clone(),
            max_attempts: config.reconnect.max_attempts,
            backoff: Backoff::from(&config.reconnect),
            heartbeat_interval: config.heartbeat.interval(),
            require_pong: config.heartbeat.require_pong,
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// How one connection ended.
#[derive(Debug)]
enum LinkOutcome {
    /// Closed by either side, or the handshake failed (code 1006).
    Closed { code: u16, reason: String },
    /// Socket failure or dead heartbeat.
    Failed(String),
    /// Token rejected during the handshake.
    Unauthorized,
    /// A newer `connect`/`disconnect` took over.
    Superseded,
}

/// Callbacks to deliver once the core lock is released.
#[derive(Default)]
struct Notices {
    connected: Option<bool>,
    errors: Vec<String>,
    logout: bool,
}

struct Core {
    /// Stream URL for the current session; `None` after disconnect.
    url: Option<String>,
    policy: ReconnectPolicy,
    transport: TransportConnection,
    heartbeat: Option<(JoinHandle<()>, SharedHeartbeat)>,
    generation: u64,
    ever_connected: bool,
    handshake_reported: bool,
    task: Option<JoinHandle<()>>,
}

impl Core {
    /// Stop the heartbeat and close the transport. Returns whether a
    /// connection was open.
    fn stop_link(&mut self) -> bool {
        self.stop_link_for_flush().is_some()
    }

    /// Stop the heartbeat and close the transport, keeping the writer's
    /// flush signal.
    fn stop_link_for_flush(&mut self) -> Option<oneshot::Receiver<()>> {
        if let Some((handle, _)) = self.heartbeat.take() {
            handle.abort();
        }
        self.transport.close_for_flush()
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Inner {
    settings: SupervisorSettings,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<EventDispatcher>,
    session: Option<Arc<dyn SessionStore>>,
    state_tx: watch::Sender<ConnectionState>,
    core: Mutex<Core>,
}

/// Keeps one event-stream connection alive.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`ConnectionSupervisor`].
#[derive(Clone)]
pub struct WeakSupervisor(Weak<Inner>);

impl WeakSupervisor {
    /// Upgrade if the supervisor is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ConnectionSupervisor> {
        self.0.upgrade().map(|inner| ConnectionSupervisor { inner })
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionSupervisor {
    /// Create a supervisor in the `Disconnected` state.
    #[must_use]
    pub fn new(
        settings: SupervisorSettings,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        let policy = ReconnectPolicy::new(settings.max_attempts, settings.backoff);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                settings,
                connector,
                dispatcher,
                session: None,
                state_tx,
                core: Mutex::new(Core {
                    url: None,
                    policy,
                    transport: TransportConnection::detached(),
                    heartbeat: None,
                    generation: 0,
                    ever_connected: false,
                    handshake_reported: false,
                    task: None,
                }),
            }),
        }
    }

    /// Tell `session` to log out when the server rejects the token.
    ///
    /// Must be called before the supervisor is cloned or connected.
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn SessionStore>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.session = Some(session);
        } else {
            warn!("Supervisor already shared, session not attached");
        }
        self
    }

    /// Non-owning handle, for collaborators that must not keep the
    /// supervisor alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakSupervisor {
        WeakSupervisor(Arc::downgrade(&self.inner))
    }

    /// Start a session with `token`, replacing any current one.
    ///
    /// Resets the attempt counter and opens a connection in the background.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the stream URL cannot be
    /// derived from the configured server URL.
    pub fn connect(&self, token: &str) -> ClientResult<()> {
        let settings = &self.inner.settings;
        let url = protocol::stream_url(&settings.server_url, &settings.stream_path, token)?;

        let was_connected = {
            let mut core = self.inner.lock();
            core.abort_task();
            let was_connected = core.stop_link();
            core.generation = core.generation.wrapping_add(1);
            core.url = Some(url);
            core.policy.reset();
            core.ever_connected = false;
            core.handshake_reported = false;
            self.inner.set_state(ConnectionState::Connecting);
            core.task = Some(tokio::spawn(run(Arc::clone(&self.inner), core.generation)));
            was_connected
        };

        info!(server = %settings.server_url, "Connecting to event stream");
        if was_connected {
            self.inner.dispatcher.notify_connected(false);
        }
        Ok(())
    }

    /// Close the connection and cancel any pending retry. Final until the
    /// next [`connect`](Self::connect).
    pub fn disconnect(&self) {
        let _ = self.shut_down();
    }

    /// Like [`disconnect`](Self::disconnect), but waits until every frame
    /// queued before the call has been written and the connection closed.
    ///
    /// Returns immediately when no connection was open.
    pub async fn disconnect_flushed(&self) {
        let Some(flushed) = self.shut_down() else {
            return;
        };
        if flushed.await.is_err() {
            debug!("Writer ended before flushing");
        }
    }

    fn shut_down(&self) -> Option<oneshot::Receiver<()>> {
        let flushed = {
            let mut core = self.inner.lock();
            core.generation = core.generation.wrapping_add(1);
            core.policy.exhaust();
            core.url = None;
            core.abort_task();
            let flushed = core.stop_link_for_flush();
            self.inner.set_state(ConnectionState::Closed);
            flushed
        };

        info!("Event stream disconnected");
        if flushed.is_some() {
            self.inner.dispatcher.notify_connected(false);
        }
        flushed
    }

    /// Send one raw frame. Dropped silently when not connected.
    pub fn send(&self, frame: String) {
        self.inner.lock().transport.send(frame);
    }

    /// Send a chat message over the stream. Dropped silently when not
    /// connected.
    pub fn send_message(&self, conversation_id: &str, draft: &MessageDraft) {
        match OutboundAction::send_message(conversation_id, draft).to_frame() {
            Ok(frame) => self.send(frame),
            Err(e) => warn!(error = %e, conversation_id, "Failed to encode message frame"),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Whether the stream is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to state changes. Every receiver sees the latest state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Retries scheduled since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.inner.lock().policy.attempts()
    }

    /// The dispatcher events are routed through.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = ?*state, to = ?next, "Connection state changed");
            *state = next;
            true
        });
    }

    fn flush(&self, notices: Notices) {
        if let Some(connected) = notices.connected {
            self.dispatcher.notify_connected(connected);
        }
        for message in &notices.errors {
            self.dispatcher.notify_connection_error(message);
        }
        if notices.logout {
            if let Some(session) = &self.session {
                session.logout();
            }
        }
    }

    /// URL for the next attempt, or `None` if this task is stale.
    fn attempt_url(&self, generation: u64) -> Option<String> {
        let core = self.lock();
        if core.generation != generation {
            return None;
        }
        let url = core.url.clone()?;
        self.set_state(ConnectionState::Connecting);
        debug!(attempt = core.policy.attempts(), "Opening event stream");
        Some(url)
    }

    /// Handle the handshake completing. Returns the heartbeat's zombie
    /// signal, or `None` if this task is stale.
    fn on_opened(
        &self,
        generation: u64,
        outbound: mpsc::UnboundedSender<String>,
        flushed: oneshot::Receiver<()>,
    ) -> Option<oneshot::Receiver<()>> {
        let mut core = self.lock();
        if core.generation != generation {
            return None;
        }

        core.policy.reset();
        core.ever_connected = true;
        core.transport.attach(outbound.clone(), flushed);

        let state: SharedHeartbeat = Arc::new(Mutex::new(HeartbeatState::new()));
        let (zombie_tx, zombie_rx) = oneshot::channel();
        let handle = tokio::spawn(heartbeat::run_heartbeat(
            self.settings.heartbeat_interval,
            self.settings.require_pong,
            Arc::clone(&state),
            outbound,
            zombie_tx,
        ));
        core.heartbeat = Some((handle, state));
        self.set_state(ConnectionState::Connected);
        drop(core);

        info!("Event stream connected");
        self.dispatcher.notify_connected(true);
        Some(zombie_rx)
    }

    fn on_frame(&self, frame: &[u8]) {
        if self.dispatcher.handle_frame(frame) != Some(FrameKind::Pong) {
            return;
        }
        let core = self.lock();
        if let Some((_, state)) = &core.heartbeat {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .ack_received();
        }
    }

    /// Pump one connection's events until it ends.
    async fn drive(&self, link: TransportLink, generation: u64) -> LinkOutcome {
        let TransportLink {
            outbound,
            mut events,
            flushed,
        } = link;
        let mut writer = Some((outbound, flushed));
        let mut zombie_rx: Option<oneshot::Receiver<()>> = None;

        loop {
            let event = tokio::select! {
                biased;
                () = zombie_signal(&mut zombie_rx) => {
                    return LinkOutcome::Failed("heartbeat failed".to_owned());
                }
                event = events.recv() => event,
            };

            match event {
                Some(TransportEvent::Opened) => {
                    let Some((tx, flushed)) = writer.take() else {
                        continue;
                    };
                    match self.on_opened(generation, tx, flushed) {
                        Some(rx) => zombie_rx = Some(rx),
                        None => return LinkOutcome::Superseded,
                    }
                },
                Some(TransportEvent::FrameReceived(frame)) => self.on_frame(&frame),
                Some(TransportEvent::Closed { code, reason }) => {
                    return LinkOutcome::Closed { code, reason };
                },
                Some(TransportEvent::TransportError { detail }) => {
                    return LinkOutcome::Failed(detail);
                },
                None => {
                    return LinkOutcome::Closed {
                        code: close_code::ABNORMAL,
                        reason: "transport ended".to_owned(),
                    };
                },
            }
        }
    }

    /// Decide what follows a lost connection. Returns the delay before the
    /// next attempt, or `None` to stop.
    fn after_link(&self, generation: u64, outcome: LinkOutcome) -> Option<Duration> {
        let mut notices = Notices::default();
        let delay = {
            let mut core = self.lock();
            if core.generation != generation {
                return None;
            }
            if core.stop_link() {
                notices.connected = Some(false);
            }
            self.plan_retry(&mut core, outcome, &mut notices)
        };
        self.flush(notices);
        delay
    }

    fn plan_retry(
        &self,
        core: &mut Core,
        outcome: LinkOutcome,
        notices: &mut Notices,
    ) -> Option<Duration> {
        let (code, detail) = match outcome {
            LinkOutcome::Superseded => return None,
            LinkOutcome::Unauthorized => (
                Some(close_code::UNAUTHORIZED),
                "handshake rejected".to_owned(),
            ),
            LinkOutcome::Closed { code, reason } => (Some(code), reason),
            LinkOutcome::Failed(detail) => (None, detail),
        };

        if code.is_some_and(protocol::is_auth_close_code) {
            warn!(detail = %detail, "Server rejected the session token, not reconnecting");
            core.policy.exhaust();
            core.url = None;
            self.set_state(ConnectionState::Closed);
            notices.errors.push(ClientError::Unauthorized.to_string());
            notices.logout = true;
            return None;
        }

        if code == Some(close_code::ABNORMAL)
            && core.policy.attempts() == 0
            && !core.ever_connected
            && !core.handshake_reported
        {
            core.handshake_reported = true;
            notices
                .errors
                .push(ClientError::Handshake(HANDSHAKE_FAILURE_HINT.to_owned()).to_string());
        }

        if let Some(delay) = core.policy.next_retry() {
            info!(
                code,
                detail = %detail,
                attempt = core.policy.attempts(),
                max_attempts = core.policy.max_attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Event stream lost, reconnecting"
            );
            self.set_state(ConnectionState::Reconnecting);
            return Some(delay);
        }

        warn!(
            code,
            detail = %detail,
            max_attempts = core.policy.max_attempts(),
            "Event stream lost, reconnect attempts exhausted"
        );
        core.url = None;
        self.set_state(ConnectionState::Closed);
        notices
            .errors
            .push(ClientError::RetryExhausted(core.policy.max_attempts()).to_string());
        None
    }
}

/// Resolves when the heartbeat reports a dead connection; pends forever
/// otherwise.
async fn zombie_signal(slot: &mut Option<oneshot::Receiver<()>>) {
    if let Some(rx) = slot.as_mut() {
        if rx.await.is_ok() {
            return;
        }
        // Heartbeat task ended without a verdict.
        *slot = None;
    }
    std::future::pending::<()>().await;
}

/// The run task: one iteration per connection attempt.
async fn run(inner: Arc<Inner>, generation: u64) {
    loop {
        let Some(url) = inner.attempt_url(generation) else {
            return;
        };

        let outcome = match inner.connector.open(&url).await {
            Ok(link) => inner.drive(link, generation).await,
            Err(ClientError::Unauthorized) => LinkOutcome::Unauthorized,
            Err(e) => LinkOutcome::Closed {
                code: close_code::ABNORMAL,
                reason: e.to_string(),
            },
        };

        let Some(delay) = inner.after_link(generation, outcome) else {
            return;
        };
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pops one scripted result per `open`; refuses once the script runs out.
    #[derive(Default)]
    struct ScriptedConnector {
        script: Mutex<VecDeque<ClientResult<TransportLink>>>,
        opens: AtomicUsize,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn open(&self, _url: &str) -> ClientResult<TransportLink> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClientError::Transport("connection refused".into())))
        }
    }

    /// A link that is already open. Returns the server's halves.
    fn open_link() -> (
        TransportLink,
        mpsc::UnboundedSender<TransportEvent>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (link, events_tx, frames, _flushed_tx) = open_link_with_writer();
        (link, events_tx, frames)
    }

    /// Like [`open_link`], also returning the writer's flush sender.
    fn open_link_with_writer() -> (
        TransportLink,
        mpsc::UnboundedSender<TransportEvent>,
        mpsc::UnboundedReceiver<String>,
        oneshot::Sender<()>,
    ) {
        let (outbound, frames) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (flushed_tx, flushed) = oneshot::channel();
        events_tx.send(TransportEvent::Opened).unwrap();
        let link = TransportLink {
            outbound,
            events,
            flushed,
        };
        (link, events_tx, frames, flushed_tx)
    }

    fn supervisor(connector: Arc<ScriptedConnector>) -> ConnectionSupervisor {
        let settings = SupervisorSettings {
            server_url: "http://talkbox.test".into(),
            ..SupervisorSettings::default()
        };
        ConnectionSupervisor::new(settings, connector, Arc::new(EventDispatcher::new()))
    }

    #[test]
    fn state_helpers() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Reconnecting.is_connected());
        assert!(ConnectionState::Closed.is_final());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn settings_from_default_config() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.backoff, Backoff::Fixed(Duration::from_secs(3)));
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert!(!settings.require_pong);
        assert_eq!(settings.stream_path, "/ws");
    }

    #[test]
    fn connect_rejects_bad_server_url() {
        let connector = Arc::new(ScriptedConnector::default());
        let settings = SupervisorSettings {
            server_url: "not a url".into(),
            ..SupervisorSettings::default()
        };
        let sup = ConnectionSupervisor::new(settings, connector, Arc::new(EventDispatcher::new()));
        assert!(matches!(sup.connect("t"), Err(ClientError::InvalidUrl(_))));
        assert_eq!(sup.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let connector = Arc::new(ScriptedConnector::default());
        let sup = supervisor(Arc::clone(&connector));
        let mut states = sup.subscribe();

        sup.connect("t").unwrap();
        states
            .wait_for(|s| *s == ConnectionState::Closed)
            .await
            .unwrap();

        // Initial attempt plus five retries.
        assert_eq!(connector.opens.load(Ordering::SeqCst), 6);
        assert_eq!(sup.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn send_reaches_open_connection() {
        let connector = Arc::new(ScriptedConnector::default());
        let (link, _events, mut frames) = open_link();
        connector.script.lock().unwrap().push_back(Ok(link));
        let sup = supervisor(Arc::clone(&connector));
        let mut states = sup.subscribe();

        sup.send("dropped".into());
        sup.connect("t").unwrap();
        states
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        sup.send_message("c1", &MessageDraft::text("hi"));
        let frame = frames.recv().await.unwrap();
        assert!(frame.contains(r#""action":"send_message""#));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_final_and_closes_transport() {
        let connector = Arc::new(ScriptedConnector::default());
        let (link, _events, mut frames) = open_link();
        connector.script.lock().unwrap().push_back(Ok(link));
        let sup = supervisor(Arc::clone(&connector));
        let mut states = sup.subscribe();

        sup.connect("t").unwrap();
        states
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        sup.disconnect();
        assert_eq!(sup.state(), ConnectionState::Closed);
        // Writer side sees end of stream once every sender is gone.
        assert_eq!(frames.recv().await, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
        assert_eq!(sup.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_flushed_waits_for_the_writer() {
        let connector = Arc::new(ScriptedConnector::default());
        let (link, _events, mut frames, flushed_tx) = open_link_with_writer();
        connector.script.lock().unwrap().push_back(Ok(link));
        let sup = supervisor(Arc::clone(&connector));
        let mut states = sup.subscribe();

        sup.connect("t").unwrap();
        states
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        sup.send_message("c1", &MessageDraft::text("last words"));
        let closing = tokio::spawn({
            let sup = sup.clone();
            async move { sup.disconnect_flushed().await }
        });

        let frame = frames.recv().await.unwrap();
        assert!(frame.contains("last words"));
        assert_eq!(frames.recv().await, None);
        tokio::task::yield_now().await;
        assert!(!closing.is_finished());

        flushed_tx.send(()).unwrap();
        closing.await.unwrap();
        assert_eq!(sup.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_flushed_without_connection_returns() {
        let sup = supervisor(Arc::new(ScriptedConnector::default()));
        sup.disconnect_flushed().await;
        assert_eq!(sup.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn zombie_signal_ignores_dropped_sender() {
        let (tx, rx) = oneshot::channel::<()>();
        drop(tx);
        let mut slot = Some(rx);
        let result =
            tokio::time::timeout(Duration::from_secs(1), zombie_signal(&mut slot)).await;
        assert!(result.is_err());
        assert!(slot.is_none());
    }
}
