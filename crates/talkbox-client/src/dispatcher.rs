//! Routes decoded stream events to the registered consumer callbacks.
//!
//! Each callback slot holds at most one handler; registering again replaces
//! the previous one. Handlers are cloned out of their slot before being
//! called, so a handler may re-register or call back into the client.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::cache::MessageCache;
use crate::error::ClientResult;
use crate::model::{MentionData, Message};
use crate::protocol::{self, InboundEvent};

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    on_message: Option<Handler<Message>>,
    on_mentioned: Option<Handler<MentionData>>,
    on_connection_error: Option<Handler<String>>,
    on_connected_changed: Option<Handler<bool>>,
}

/// Callback registry and event router.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Handlers>,
    cache: Option<Arc<MessageCache>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// A dispatcher with no cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher that appends every new message to `cache` before
    /// invoking the message handler.
    #[must_use]
    pub fn with_cache(cache: Arc<MessageCache>) -> Self {
        Self {
            handlers: RwLock::default(),
            cache: Some(cache),
        }
    }

    /// Decode one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`](crate::ClientError::Decode) for
    /// malformed frames.
    pub fn decode(frame: &[u8]) -> ClientResult<InboundEvent> {
        protocol::decode_frame(frame)
    }

    /// Register the new-message handler, replacing any previous one.
    pub fn on_message(&self, handler: impl Fn(Message) + Send + Sync + 'static) {
        self.write().on_message = Some(Arc::new(handler));
    }

    /// Register the mention handler, replacing any previous one.
    pub fn on_mentioned(&self, handler: impl Fn(MentionData) + Send + Sync + 'static) {
        self.write().on_mentioned = Some(Arc::new(handler));
    }

    /// Register the connection-error handler, replacing any previous one.
    pub fn on_connection_error(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        self.write().on_connection_error = Some(Arc::new(handler));
    }

    /// Register the connected/disconnected handler, replacing any previous one.
    pub fn on_connected_changed(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
        self.write().on_connected_changed = Some(Arc::new(handler));
    }

    /// Remove every registered handler.
    pub fn clear_handlers(&self) {
        *self.write() = Handlers::default();
    }

    /// Route one decoded event.
    pub fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::NewMessage(message) => {
                trace!(
                    conversation_id = %message.conversation_id,
                    message_id = %message.id,
                    "new_message"
                );
                if let Some(cache) = &self.cache {
                    cache.append(message.clone());
                }
                let handler = self.read().on_message.clone();
                if let Some(handler) = handler {
                    handler(message);
                }
            },
            InboundEvent::Mentioned(mention) => {
                let handler = self.read().on_mentioned.clone();
                if let Some(handler) = handler {
                    handler(mention);
                }
            },
            InboundEvent::Pong => trace!("pong"),
            InboundEvent::Unknown { kind, raw } => {
                debug!(event = %kind, frame_len = raw.len(), "Unhandled stream event");
            },
        }
    }

    /// Decode and route one frame. Malformed frames are logged and dropped.
    ///
    /// Returns the decoded event kind for callers that track pongs.
    pub fn handle_frame(&self, frame: &[u8]) -> Option<FrameKind> {
        match Self::decode(frame) {
            Ok(event) => {
                let kind = FrameKind::of(&event);
                self.dispatch(event);
                Some(kind)
            },
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Discarding undecodable frame");
                None
            },
        }
    }

    pub(crate) fn notify_connection_error(&self, message: &str) {
        let handler = self.read().on_connection_error.clone();
        if let Some(handler) = handler {
            handler(message.to_owned());
        }
    }

    pub(crate) fn notify_connected(&self, connected: bool) {
        let handler = self.read().on_connected_changed.clone();
        if let Some(handler) = handler {
            handler(connected);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Handlers> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Kind of a successfully decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `new_message`.
    NewMessage,
    /// `mentioned`.
    Mentioned,
    /// `pong`.
    Pong,
    /// Anything else.
    Unknown,
}

impl FrameKind {
    fn of(event: &InboundEvent) -> Self {
        match event {
            InboundEvent::NewMessage(_) => Self::NewMessage,
            InboundEvent::Mentioned(_) => Self::Mentioned,
            InboundEvent::Pong => Self::Pong,
            InboundEvent::Unknown { .. } => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::history::HistoryApi;
    use crate::model::MessageDraft;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const NEW_MESSAGE: &[u8] = br#"{"event":"new_message","data":{
        "id":"m1","conversation_id":"c1",
        "sender":{"id":"u1","type":"user","nickname":"alice"},
        "type":"text","content":{"text":"hi"},
        "created_at":"2024-05-01T08:00:00Z"}}"#;

    struct NoHistory;

    #[async_trait]
    impl HistoryApi for NoHistory {
        async fn fetch_messages(&self, _: &str, _: u32, _: Option<&str>) -> ClientResult<Vec<Message>> {
            Ok(Vec::new())
        }
        async fn post_message(&self, _: &str, _: &MessageDraft) -> ClientResult<Message> {
            Err(ClientError::Api("unsupported".into()))
        }
        async fn search_messages(&self, _: &str, _: &str) -> ClientResult<Vec<Message>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn new_message_reaches_handler() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.on_message(move |m| sink.lock().unwrap().push(m.id));

        assert_eq!(dispatcher.handle_frame(NEW_MESSAGE), Some(FrameKind::NewMessage));
        assert_eq!(*seen.lock().unwrap(), vec!["m1"]);
    }

    #[test]
    fn message_is_cached_before_handler_runs() {
        let cache = Arc::new(MessageCache::new(Arc::new(NoHistory)));
        let dispatcher = EventDispatcher::with_cache(Arc::clone(&cache));
        let observed = Arc::new(Mutex::new(0usize));
        let cache_view = Arc::clone(&cache);
        let seen = Arc::clone(&observed);
        dispatcher.on_message(move |m| {
            *seen.lock().unwrap() = cache_view.get(&m.conversation_id).len();
        });

        dispatcher.handle_frame(NEW_MESSAGE);
        assert_eq!(*observed.lock().unwrap(), 1);
    }

    #[test]
    fn registering_again_replaces_handler() {
        let dispatcher = EventDispatcher::new();
        let first = Arc::new(Mutex::new(0u32));
        let second = Arc::new(Mutex::new(0u32));

        let f = Arc::clone(&first);
        dispatcher.on_message(move |_| *f.lock().unwrap() = 1);
        let s = Arc::clone(&second);
        dispatcher.on_message(move |_| *s.lock().unwrap() = 1);

        dispatcher.handle_frame(NEW_MESSAGE);
        assert_eq!(*first.lock().unwrap(), 0);
        assert_eq!(*second.lock().unwrap(), 1);
    }

    #[test]
    fn mention_reaches_handler() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        dispatcher.on_mentioned(move |m| {
            *sink.lock().unwrap() = m.conversation_id().map(str::to_owned);
        });

        dispatcher.handle_frame(br#"{"event":"mentioned","data":{"conversation_id":"c9"}}"#);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("c9"));
    }

    #[test]
    fn pong_and_unknown_are_not_delivered() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&calls);
        dispatcher.on_message(move |_| *sink.lock().unwrap() = 1);

        assert_eq!(dispatcher.handle_frame(br#"{"event":"pong"}"#), Some(FrameKind::Pong));
        assert_eq!(
            dispatcher.handle_frame(br#"{"event":"typing"}"#),
            Some(FrameKind::Unknown)
        );
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.handle_frame(b"{not json"), None);
    }

    #[test]
    fn handler_may_reregister_from_inside_callback() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let inner = Arc::clone(&dispatcher);
        dispatcher.on_connected_changed(move |_| inner.on_connected_changed(|_| {}));
        dispatcher.notify_connected(true);
        dispatcher.notify_connected(false);
    }

    #[test]
    fn connection_error_handler() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        dispatcher.on_connection_error(move |msg| *sink.lock().unwrap() = msg);
        dispatcher.notify_connection_error("connection failed");
        assert_eq!(*seen.lock().unwrap(), "connection failed");

        dispatcher.clear_handlers();
        dispatcher.notify_connection_error("ignored");
        assert_eq!(*seen.lock().unwrap(), "connection failed");
    }
}
