//! Test harness helpers.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{Notify, watch};
use tracing_subscriber::EnvFilter;

use talkbox_client::{
    ChatClient, ConnectionState, MentionData, Message, SessionStore, SupervisorSettings,
};

use crate::fixtures::test_settings;
use crate::mocks::{MockConnector, MockHistory, RecordingSession};

/// How long (in paused virtual time) a wait helper gives up after.
pub const WAIT_LIMIT: Duration = Duration::from_secs(600);

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Write `content` to `name` inside `dir` and return the path.
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn test_file_in_dir(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write file");
    path
}

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging at debug level for the Talkbox crates.
pub fn setup_test_logging_default() {
    setup_test_logging("talkbox_client=debug,talkbox_test=debug");
}

/// Run `future` and panic if it has not finished within [`WAIT_LIMIT`].
///
/// # Panics
///
/// Panics with `what` on timeout.
pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    match tokio::time::timeout(WAIT_LIMIT, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// Wait until the state channel reports `target`.
///
/// # Panics
///
/// Panics if the state is not reached within [`WAIT_LIMIT`] or the
/// supervisor is dropped.
pub async fn wait_for_state(states: &mut watch::Receiver<ConnectionState>, target: ConnectionState) {
    within(&format!("state {target:?}"), states.wait_for(|s| *s == target))
        .await
        .expect("supervisor dropped");
}

/// Assert that `expected` (within 100 ms) of paused time has passed since
/// `since`.
///
/// # Panics
///
/// Panics if the elapsed time is outside that window.
#[track_caller]
pub fn assert_elapsed(since: tokio::time::Instant, expected: Duration) {
    let elapsed = since.elapsed();
    let slack = Duration::from_millis(100);
    assert!(
        elapsed >= expected && elapsed <= expected.saturating_add(slack),
        "expected {expected:?} to have elapsed, got {elapsed:?}"
    );
}

#[derive(Default)]
struct Recorded {
    messages: Vec<Message>,
    mentions: Vec<MentionData>,
    errors: Vec<String>,
    connected: Vec<bool>,
}

/// Records every callback a [`ChatClient`] delivers.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    recorded: Arc<Mutex<Recorded>>,
    changed: Arc<Notify>,
}

impl std::fmt::Debug for CallbackRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRecorder")
            .field("messages", &self.messages().len())
            .field("errors", &self.errors())
            .field("connected", &self.connected_changes())
            .finish()
    }
}

impl CallbackRecorder {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register this recorder as every handler of `client`.
    pub fn attach(&self, client: &ChatClient) {
        let this = self.clone();
        client.on_message(move |m| this.record(|r| r.messages.push(m)));
        let this = self.clone();
        client.on_mentioned(move |m| this.record(|r| r.mentions.push(m)));
        let this = self.clone();
        client.on_connection_error(move |e| this.record(|r| r.errors.push(e)));
        let this = self.clone();
        client.on_connected_changed(move |c| this.record(|r| r.connected.push(c)));
    }

    fn record(&self, f: impl FnOnce(&mut Recorded)) {
        if let Ok(mut recorded) = self.recorded.lock() {
            f(&mut recorded);
        }
        self.changed.notify_waiters();
    }

    fn read<T>(&self, f: impl FnOnce(&Recorded) -> T) -> T {
        match self.recorded.lock() {
            Ok(recorded) => f(&recorded),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Messages delivered to `on_message`.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.read(|r| r.messages.clone())
    }

    /// Mentions delivered to `on_mentioned`.
    #[must_use]
    pub fn mentions(&self) -> Vec<MentionData> {
        self.read(|r| r.mentions.clone())
    }

    /// Messages delivered to `on_connection_error`.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.read(|r| r.errors.clone())
    }

    /// Values delivered to `on_connected_changed`.
    #[must_use]
    pub fn connected_changes(&self) -> Vec<bool> {
        self.read(|r| r.connected.clone())
    }

    /// Wait until `predicate` holds for the recorded callbacks.
    ///
    /// # Panics
    ///
    /// Panics if it does not hold within [`WAIT_LIMIT`].
    pub async fn wait_until(&self, what: &str, predicate: impl Fn(&Self) -> bool) {
        within(what, async {
            loop {
                let changed = self.changed.notified();
                tokio::pin!(changed);
                changed.as_mut().enable();
                if predicate(self) {
                    return;
                }
                changed.await;
            }
        })
        .await;
    }

    /// Wait until at least `count` messages have been delivered.
    pub async fn wait_for_messages(&self, count: usize) {
        self.wait_until(&format!("{count} messages"), |r| r.messages().len() >= count)
            .await;
    }

    /// Wait until at least `count` connection errors have been delivered.
    pub async fn wait_for_errors(&self, count: usize) {
        self.wait_until(&format!("{count} errors"), |r| r.errors().len() >= count)
            .await;
    }
}

/// A [`ChatClient`] wired to mocks, with every callback recorded.
pub struct ClientHarness {
    /// The client under test.
    pub client: ChatClient,
    /// Scripted stream connector.
    pub connector: Arc<MockConnector>,
    /// In-memory history API.
    pub history: Arc<MockHistory>,
    /// Session holding the token `"test-token"`.
    pub session: Arc<RecordingSession>,
    /// Callback recorder attached to the client.
    pub recorder: CallbackRecorder,
}

impl std::fmt::Debug for ClientHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHarness")
            .field("client", &self.client)
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

impl ClientHarness {
    /// Token held by the harness session.
    pub const TOKEN: &'static str = "test-token";

    /// A client whose handshakes all succeed.
    #[must_use]
    pub fn accepting() -> Self {
        Self::build(MockConnector::accepting(), MockHistory::new(), test_settings())
    }

    /// A client using `connector` and an empty history.
    #[must_use]
    pub fn with_connector(connector: MockConnector) -> Self {
        Self::build(connector, MockHistory::new(), test_settings())
    }

    /// A client with explicit mocks and settings.
    #[must_use]
    pub fn build(
        connector: MockConnector,
        history: MockHistory,
        settings: SupervisorSettings,
    ) -> Self {
        let connector = Arc::new(connector);
        let history = Arc::new(history);
        let session = Arc::new(RecordingSession::new(Self::TOKEN));
        let client = ChatClient::with_parts(
            settings,
            talkbox_client::cache::DEFAULT_PAGE_SIZE,
            Arc::clone(&session) as Arc<dyn SessionStore>,
            Arc::clone(&connector) as _,
            Arc::clone(&history) as _,
        );
        let recorder = CallbackRecorder::new();
        recorder.attach(&client);
        Self {
            client,
            connector,
            history,
            session,
            recorder,
        }
    }

    /// Subscribe to the client's state changes.
    #[must_use]
    pub fn states(&self) -> watch::Receiver<ConnectionState> {
        self.client.subscribe_state()
    }
}
