//! Mock collaborators for testing.
//!
//! - [`MockConnector`] scripts handshake outcomes and hands each accepted
//!   connection to the test as a [`MockServer`].
//! - [`MockHistory`] serves pages from an in-memory message list and can hold
//!   a request open until the test releases it.
//! - [`RecordingSession`] and [`RecordingOrdering`] record what the client
//!   tells them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};

use talkbox_client::{
    ClientError, ClientResult, Connector, ConversationOrdering, HistoryApi, Message, MessageDraft,
    SessionStore, TransportEvent, TransportLink,
};

use crate::fixtures::{minutes_after_epoch, new_message_event, pong_event, test_sender};

// ---------------------------------------------------------------------------
// MockConnector
// ---------------------------------------------------------------------------

/// Scripted result of one [`Connector::open`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    /// Handshake succeeds and a [`MockServer`] is published.
    Accept,
    /// Handshake fails as if the server were unreachable.
    Refuse,
    /// Handshake rejected with HTTP 401.
    Unauthorized,
    /// Link is created but closes with the given code before opening.
    CloseBeforeOpen(u16),
}

/// A [`Connector`] whose handshakes follow a script.
///
/// Outcomes are consumed in order; once the script is empty every attempt
/// uses the fallback outcome.
pub struct MockConnector {
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    urls: Mutex<Vec<String>>,
    servers_tx: mpsc::UnboundedSender<MockServer>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockServer>>,
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("fallback", &self.fallback)
            .field("opens", &self.open_count())
            .finish_non_exhaustive()
    }
}

impl MockConnector {
    /// A connector that refuses every attempt unless scripted otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::with_fallback(MockOutcome::Refuse)
    }

    /// A connector that accepts every attempt unless scripted otherwise.
    #[must_use]
    pub fn accepting() -> Self {
        Self::with_fallback(MockOutcome::Accept)
    }

    /// A connector that uses `fallback` once the script runs out.
    #[must_use]
    pub fn with_fallback(fallback: MockOutcome) -> Self {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            urls: Mutex::new(Vec::new()),
            servers_tx,
            servers_rx: tokio::sync::Mutex::new(servers_rx),
        }
    }

    /// Queue outcomes for the next attempts.
    #[must_use]
    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(outcomes);
        }
        self
    }

    /// Queue one more outcome.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    /// Number of `open` calls so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.urls.lock().map(|urls| urls.len()).unwrap_or(0)
    }

    /// URLs passed to `open`, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
    }

    /// Wait for the next accepted connection.
    ///
    /// Returns `None` only if the connector has been dropped.
    pub async fn next_server(&self) -> Option<MockServer> {
        self.servers_rx.lock().await.recv().await
    }

    fn next_outcome(&self) -> MockOutcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(self.fallback)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &str) -> ClientResult<TransportLink> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_owned());
        }

        let outcome = self.next_outcome();
        match outcome {
            MockOutcome::Refuse => Err(ClientError::Transport("connection refused".to_owned())),
            MockOutcome::Unauthorized => Err(ClientError::Unauthorized),
            MockOutcome::CloseBeforeOpen(code) => {
                let (outbound, _frames) = mpsc::unbounded_channel();
                let (events_tx, events) = mpsc::unbounded_channel();
                let (_flushed_tx, flushed) = oneshot::channel();
                let _ = events_tx.send(TransportEvent::Closed {
                    code,
                    reason: String::new(),
                });
                Ok(TransportLink {
                    outbound,
                    events,
                    flushed,
                })
            },
            MockOutcome::Accept => {
                let (outbound, frames) = mpsc::unbounded_channel();
                let (events_tx, events) = mpsc::unbounded_channel();
                let (flushed_tx, flushed) = oneshot::channel();
                let _ = events_tx.send(TransportEvent::Opened);
                let _ = self.servers_tx.send(MockServer {
                    frames,
                    events: events_tx,
                    flushed: Some(flushed_tx),
                });
                Ok(TransportLink {
                    outbound,
                    events,
                    flushed,
                })
            },
        }
    }
}

// ---------------------------------------------------------------------------
// MockServer
// ---------------------------------------------------------------------------

/// Server side of one accepted mock connection.
///
/// Dropping it ends the client's event stream like a socket that vanished
/// without a close frame. The client's writer counts as flushed once the
/// server has read past the last frame.
#[derive(Debug)]
pub struct MockServer {
    frames: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
    flushed: Option<oneshot::Sender<()>>,
}

impl MockServer {
    /// Deliver a raw text frame.
    pub fn push_frame(&self, frame: impl Into<String>) {
        let frame: String = frame.into();
        let _ = self
            .events
            .send(TransportEvent::FrameReceived(frame.into_bytes()));
    }

    /// Deliver a JSON frame.
    pub fn push_json(&self, value: &Value) {
        self.push_frame(value.to_string());
    }

    /// Deliver a `new_message` event.
    pub fn push_message(&self, message: &Message) {
        self.push_json(&new_message_event(message));
    }

    /// Answer a ping.
    pub fn pong(&self) {
        self.push_json(&pong_event());
    }

    /// Close the connection with `code`.
    pub fn close(&self, code: u16) {
        let _ = self.events.send(TransportEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    /// Report a socket error.
    pub fn fail(&self, detail: &str) {
        let _ = self.events.send(TransportEvent::TransportError {
            detail: detail.to_owned(),
        });
    }

    /// Wait for the next frame the client sends. `None` once the client has
    /// closed its side.
    pub async fn next_frame(&mut self) -> Option<String> {
        let frame = self.frames.recv().await;
        if frame.is_none() {
            self.report_flushed();
        }
        frame
    }

    /// The next frame the client has already sent, if any.
    pub fn try_next_frame(&mut self) -> Option<String> {
        match self.frames.try_recv() {
            Ok(frame) => Some(frame),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.report_flushed();
                None
            },
            Err(mpsc::error::TryRecvError::Empty) => None,
        }
    }

    fn report_flushed(&mut self) {
        if let Some(flushed) = self.flushed.take() {
            let _ = flushed.send(());
        }
    }

    /// Number of frames waiting to be read.
    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Whether the client has dropped every handle to this connection.
    #[must_use]
    pub fn is_closed_by_client(&self) -> bool {
        self.frames.is_closed()
    }
}

// ---------------------------------------------------------------------------
// MockHistory
// ---------------------------------------------------------------------------

/// One recorded `fetch_messages` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Conversation requested.
    pub conversation_id: String,
    /// Page size requested.
    pub limit: u32,
    /// Cursor, if any.
    pub before: Option<String>,
}

/// Holds the next page request open until released.
#[derive(Debug)]
pub struct FetchGate {
    started: Arc<Notify>,
    release: oneshot::Sender<()>,
}

impl FetchGate {
    /// Wait until the held request has reached the server.
    pub async fn started(&self) {
        self.started.notified().await;
    }

    /// Let the held request complete.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// In-memory [`HistoryApi`].
///
/// Conversations are stored oldest first; pages are served newest first
/// like the real server.
#[derive(Default)]
pub struct MockHistory {
    conversations: Mutex<HashMap<String, Vec<Message>>>,
    requests: Mutex<Vec<PageRequest>>,
    posted: Mutex<Vec<(String, MessageDraft)>>,
    failures: Mutex<VecDeque<ClientError>>,
    gate: Mutex<Option<(Arc<Notify>, oneshot::Receiver<()>)>>,
    next_id: AtomicUsize,
}

impl std::fmt::Debug for MockHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHistory")
            .field("requests", &self.requests().len())
            .finish_non_exhaustive()
    }
}

impl MockHistory {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation with messages in chronological order.
    #[must_use]
    pub fn with_conversation(self, conversation_id: &str, messages: Vec<Message>) -> Self {
        self.insert(conversation_id, messages);
        self
    }

    /// Replace a conversation's messages.
    pub fn insert(&self, conversation_id: &str, messages: Vec<Message>) {
        if let Ok(mut conversations) = self.conversations.lock() {
            conversations.insert(conversation_id.to_owned(), messages);
        }
    }

    /// Store a message as if another client had posted it.
    pub fn store(&self, message: Message) {
        if let Ok(mut conversations) = self.conversations.lock() {
            conversations
                .entry(message.conversation_id.clone())
                .or_default()
                .push(message);
        }
    }

    /// Make the next request fail with `error`.
    pub fn fail_next(&self, error: ClientError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    /// Hold the next page request open until the returned gate is released.
    ///
    /// The page is computed when the request arrives, before it is held.
    #[must_use]
    pub fn hold_next_fetch(&self) -> FetchGate {
        let started = Arc::new(Notify::new());
        let (release, held) = oneshot::channel();
        if let Ok(mut gate) = self.gate.lock() {
            *gate = Some((Arc::clone(&started), held));
        }
        FetchGate { started, release }
    }

    /// Page requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Drafts posted so far, with their conversation ids.
    #[must_use]
    pub fn posted(&self) -> Vec<(String, MessageDraft)> {
        self.posted.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn take_failure(&self) -> Option<ClientError> {
        self.failures.lock().ok().and_then(|mut f| f.pop_front())
    }

    fn page(&self, conversation_id: &str, limit: u32, before: Option<&str>) -> Vec<Message> {
        let Ok(conversations) = self.conversations.lock() else {
            return Vec::new();
        };
        let Some(messages) = conversations.get(conversation_id) else {
            return Vec::new();
        };
        let end = match before {
            Some(id) => messages
                .iter()
                .position(|m| m.id == id)
                .unwrap_or(messages.len()),
            None => messages.len(),
        };
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        messages[..end]
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HistoryApi for MockHistory {
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> ClientResult<Vec<Message>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(PageRequest {
                conversation_id: conversation_id.to_owned(),
                limit,
                before: before.map(str::to_owned),
            });
        }
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        let page = self.page(conversation_id, limit, before);

        let gate = self.gate.lock().ok().and_then(|mut g| g.take());
        if let Some((started, held)) = gate {
            started.notify_one();
            let _ = held.await;
        }
        Ok(page)
    }

    async fn post_message(
        &self,
        conversation_id: &str,
        draft: &MessageDraft,
    ) -> ClientResult<Message> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        if let Ok(mut posted) = self.posted.lock() {
            posted.push((conversation_id.to_owned(), draft.clone()));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let minute = i64::try_from(n).unwrap_or(0).saturating_add(1_000);
        let message = Message {
            id: format!("posted-{n}"),
            conversation_id: conversation_id.to_owned(),
            sender: test_sender(),
            body: draft.body.clone(),
            reply_to_id: draft.reply_to_id.clone(),
            reply_to: None,
            created_at: minutes_after_epoch(minute),
        };
        self.store(message.clone());
        Ok(message)
    }

    async fn search_messages(
        &self,
        conversation_id: &str,
        query: &str,
    ) -> ClientResult<Vec<Message>> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        let Ok(conversations) = self.conversations.lock() else {
            return Ok(Vec::new());
        };
        Ok(conversations
            .get(conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .rev()
                    .filter(|m| m.body.summary().contains(query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// RecordingSession
// ---------------------------------------------------------------------------

/// [`SessionStore`] that counts logouts.
#[derive(Debug, Default)]
pub struct RecordingSession {
    token: Mutex<Option<String>>,
    logouts: AtomicUsize,
}

impl RecordingSession {
    /// A session holding `token`.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_owned())),
            logouts: AtomicUsize::new(0),
        }
    }

    /// Number of `logout` calls.
    #[must_use]
    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

impl SessionStore for RecordingSession {
    fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut token) = self.token.lock() {
            *token = None;
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingOrdering
// ---------------------------------------------------------------------------

/// [`ConversationOrdering`] that records every touch.
#[derive(Debug, Default)]
pub struct RecordingOrdering {
    touches: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl RecordingOrdering {
    /// An empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversation ids touched, in order.
    #[must_use]
    pub fn touched(&self) -> Vec<String> {
        self.touches
            .lock()
            .map(|t| t.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }
}

impl ConversationOrdering for RecordingOrdering {
    fn touch(&self, conversation_id: &str, at: DateTime<Utc>) {
        if let Ok(mut touches) = self.touches.lock() {
            touches.push((conversation_id.to_owned(), at));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test_history;

    #[tokio::test]
    async fn history_pages_newest_first() {
        let history = MockHistory::new().with_conversation("c1", test_history("c1", 5));

        let latest = history.fetch_messages("c1", 2, None).await.unwrap();
        let ids: Vec<_> = latest.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m5", "m4"]);

        let older = history.fetch_messages("c1", 2, Some("m4")).await.unwrap();
        let ids: Vec<_> = older.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m3", "m2"]);

        assert_eq!(history.requests().len(), 2);
        assert_eq!(history.requests()[1].before.as_deref(), Some("m4"));
    }

    #[tokio::test]
    async fn scripted_failure_is_returned_once() {
        let history = MockHistory::new();
        history.fail_next(ClientError::Api("boom".into()));
        assert!(history.fetch_messages("c1", 10, None).await.is_err());
        assert!(history.fetch_messages("c1", 10, None).await.is_ok());
    }

    #[tokio::test]
    async fn connector_follows_script_then_fallback() {
        let connector = MockConnector::new().with_outcomes([MockOutcome::Accept]);
        assert!(connector.open("ws://a").await.is_ok());
        assert!(connector.next_server().await.is_some());
        assert!(matches!(
            connector.open("ws://b").await,
            Err(ClientError::Transport(_))
        ));
        assert_eq!(connector.urls(), ["ws://a", "ws://b"]);
    }

    #[tokio::test]
    async fn server_reports_flush_after_last_frame() {
        let connector = MockConnector::accepting();
        let link = connector.open("ws://a").await.unwrap();
        let mut server = connector.next_server().await.unwrap();

        link.outbound.send("f1".into()).unwrap();
        drop(link.outbound);
        assert_eq!(server.try_next_frame().as_deref(), Some("f1"));

        assert_eq!(server.next_frame().await, None);
        assert!(link.flushed.await.is_ok());
    }

    #[test]
    fn session_logout_clears_token() {
        let session = RecordingSession::new("t");
        session.logout();
        assert_eq!(session.token(), None);
        assert_eq!(session.logout_count(), 1);
    }
}
