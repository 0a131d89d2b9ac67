//! Chat session facade.
//!
//! [`ChatClient`] wires the supervisor, dispatcher, cache, and recency list
//! together and gives callers one handle for a logged-in session. When the
//! server rejects the token (on the stream or the history API) the
//! connection is closed, the cache is cleared, and the session is logged out.

use std::path::Path;
use std::sync::{Arc, OnceLock, Weak};

use talkbox_config::Config;
use tokio::sync::watch;
use tracing::info;

use crate::cache::MessageCache;
use crate::connection::WsConnector;
use crate::dispatcher::EventDispatcher;
use crate::error::{ClientError, ClientResult};
use crate::history::{HistoryApi, HttpHistoryClient};
use crate::model::{MentionData, Message, MessageDraft};
use crate::ordering::RecencyList;
use crate::session::SessionStore;
use crate::supervisor::{ConnectionState, ConnectionSupervisor, SupervisorSettings, WeakSupervisor};
use crate::transport::Connector;

/// Session wrapper that tears the client down on logout.
struct Teardown {
    session: Arc<dyn SessionStore>,
    cache: OnceLock<Weak<MessageCache>>,
    supervisor: OnceLock<WeakSupervisor>,
}

impl Teardown {
    fn new(session: Arc<dyn SessionStore>) -> Self {
        Self {
            session,
            cache: OnceLock::new(),
            supervisor: OnceLock::new(),
        }
    }

    fn bind(&self, cache: &Arc<MessageCache>, supervisor: &ConnectionSupervisor) {
        let _ = self.cache.set(Arc::downgrade(cache));
        let _ = self.supervisor.set(supervisor.downgrade());
    }
}

impl SessionStore for Teardown {
    fn token(&self) -> Option<String> {
        self.session.token()
    }

    fn logout(&self) {
        if let Some(supervisor) = self.supervisor.get().and_then(WeakSupervisor::upgrade) {
            supervisor.disconnect();
        }
        if let Some(cache) = self.cache.get().and_then(Weak::upgrade) {
            cache.clear();
        }
        self.session.logout();
    }
}

/// One logged-in chat session.
pub struct ChatClient {
    teardown: Arc<Teardown>,
    cache: Arc<MessageCache>,
    dispatcher: Arc<EventDispatcher>,
    supervisor: ConnectionSupervisor,
    conversations: Arc<RecencyList>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("supervisor", &self.supervisor)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Build a client that talks to the configured server over `WebSocket`
    /// and HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the server URL is unusable or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config, session: Arc<dyn SessionStore>) -> ClientResult<Self> {
        let teardown = Arc::new(Teardown::new(session));
        let history = HttpHistoryClient::new(
            &config.server.url,
            &config.server.api_prefix,
            config.server.request_timeout(),
            Arc::clone(&teardown) as Arc<dyn SessionStore>,
        )?;
        Ok(Self::assemble(
            SupervisorSettings::from(config),
            config.history.page_size,
            teardown,
            Arc::new(WsConnector),
            Arc::new(history),
        ))
    }

    /// Load a configuration file and build a client from it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the file cannot be loaded, or any
    /// error from [`from_config`](Self::from_config).
    pub fn from_config_file(path: &Path, session: Arc<dyn SessionStore>) -> ClientResult<Self> {
        let config = Config::load_file(path)?;
        Self::from_config(&config, session)
    }

    /// Build a client from explicit collaborators.
    #[must_use]
    pub fn with_parts(
        settings: SupervisorSettings,
        page_size: u32,
        session: Arc<dyn SessionStore>,
        connector: Arc<dyn Connector>,
        history: Arc<dyn HistoryApi>,
    ) -> Self {
        Self::assemble(
            settings,
            page_size,
            Arc::new(Teardown::new(session)),
            connector,
            history,
        )
    }

    fn assemble(
        settings: SupervisorSettings,
        page_size: u32,
        teardown: Arc<Teardown>,
        connector: Arc<dyn Connector>,
        history: Arc<dyn HistoryApi>,
    ) -> Self {
        let conversations = Arc::new(RecencyList::new());
        let cache = Arc::new(
            MessageCache::new(history)
                .with_ordering(Arc::clone(&conversations) as _)
                .with_page_size(page_size),
        );
        let dispatcher = Arc::new(EventDispatcher::with_cache(Arc::clone(&cache)));
        let supervisor = ConnectionSupervisor::new(settings, connector, Arc::clone(&dispatcher))
            .with_session(Arc::clone(&teardown) as _);
        teardown.bind(&cache, &supervisor);

        Self {
            teardown,
            cache,
            dispatcher,
            supervisor,
            conversations,
        }
    }

    /// Open the event stream with the session's current token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingToken`] if the session has no token, or
    /// [`ClientError::InvalidUrl`] if the stream URL cannot be derived.
    pub fn connect(&self) -> ClientResult<()> {
        let token = self.teardown.token().ok_or(ClientError::MissingToken)?;
        self.supervisor.connect(&token)
    }

    /// Close the event stream and cancel any pending retry.
    pub fn disconnect(&self) {
        self.supervisor.disconnect();
    }

    /// Close the event stream once every frame already sent has been
    /// written to the socket.
    pub async fn disconnect_flushed(&self) {
        self.supervisor.disconnect_flushed().await;
    }

    /// Disconnect, clear the cache, and log the session out.
    pub fn logout(&self) {
        info!("Logging out");
        self.teardown.logout();
    }

    /// Send a message over the event stream. Dropped when not connected.
    pub fn send_message(&self, conversation_id: &str, draft: &MessageDraft) {
        self.supervisor.send_message(conversation_id, draft);
    }

    /// Post a message through the history API and cache the stored record.
    ///
    /// # Errors
    ///
    /// Returns the history API error.
    pub async fn submit_message(
        &self,
        conversation_id: &str,
        draft: &MessageDraft,
    ) -> ClientResult<Message> {
        self.cache.submit(conversation_id, draft).await
    }

    /// Cached messages, oldest first.
    #[must_use]
    pub fn messages(&self, conversation_id: &str) -> Vec<Message> {
        self.cache.get(conversation_id)
    }

    /// Load the newest page for a conversation.
    ///
    /// # Errors
    ///
    /// Returns the history API error.
    pub async fn load_messages(&self, conversation_id: &str) -> ClientResult<Vec<Message>> {
        self.cache.fetch_page(conversation_id, None).await
    }

    /// Load the page before `before_id`.
    ///
    /// # Errors
    ///
    /// Returns the history API error.
    pub async fn load_older(
        &self,
        conversation_id: &str,
        before_id: &str,
    ) -> ClientResult<Vec<Message>> {
        self.cache.fetch_page(conversation_id, Some(before_id)).await
    }

    /// Search a conversation.
    ///
    /// # Errors
    ///
    /// Returns the history API error.
    pub async fn search(&self, conversation_id: &str, query: &str) -> ClientResult<Vec<Message>> {
        self.cache.search(conversation_id, query).await
    }

    /// Register the new-message handler, replacing any previous one.
    pub fn on_message(&self, handler: impl Fn(Message) + Send + Sync + 'static) {
        self.dispatcher.on_message(handler);
    }

    /// Register the mention handler, replacing any previous one.
    pub fn on_mentioned(&self, handler: impl Fn(MentionData) + Send + Sync + 'static) {
        self.dispatcher.on_mentioned(handler);
    }

    /// Register the connection-error handler, replacing any previous one.
    pub fn on_connection_error(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        self.dispatcher.on_connection_error(handler);
    }

    /// Register the connected/disconnected handler, replacing any previous one.
    pub fn on_connected_changed(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
        self.dispatcher.on_connected_changed(handler);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Whether the event stream is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.subscribe()
    }

    /// The message cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<MessageCache> {
        &self.cache
    }

    /// Conversations ordered by recent activity.
    #[must_use]
    pub fn conversations(&self) -> &Arc<RecencyList> {
        &self.conversations
    }

    /// The connection supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.supervisor.disconnect();
    }
}
