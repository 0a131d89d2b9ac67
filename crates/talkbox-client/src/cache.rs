//! Per-conversation ordered message cache.
//!
//! Each conversation has one log, kept oldest-first with no duplicate ids.
//! Logs are created lazily and guarded by their own lock, so activity in one
//! conversation never waits on another. No lock is held across a history
//! request.
//!
//! Live messages appended while a fresh (non-`before`) page request is in
//! flight are kept after the fetched page instead of being overwritten.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::error::ClientResult;
use crate::history::HistoryApi;
use crate::model::{Message, MessageDraft};
use crate::ordering::ConversationOrdering;

/// Default number of messages per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug)]
struct Entry {
    message: Message,
    /// Sequence number for live-appended entries; `None` for fetched ones.
    live_seq: Option<u64>,
}

#[derive(Debug, Default)]
struct ConversationLog {
    entries: VecDeque<Entry>,
    ids: HashSet<String>,
    /// Last live sequence number handed out.
    live_seq: u64,
}

impl ConversationLog {
    fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    fn append_live(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.live_seq = self.live_seq.wrapping_add(1);
        self.entries.push_back(Entry {
            message,
            live_seq: Some(self.live_seq),
        });
        true
    }

    /// Replace the log with `page`, keeping live entries appended after `mark`.
    fn replace(&mut self, page: &[Message], mark: u64) {
        let carried: Vec<Entry> = self
            .entries
            .drain(..)
            .filter(|e| e.live_seq.is_some_and(|seq| seq > mark))
            .collect();

        self.ids.clear();
        for message in page {
            if self.ids.insert(message.id.clone()) {
                self.entries.push_back(Entry {
                    message: message.clone(),
                    live_seq: None,
                });
            }
        }
        for entry in carried {
            if self.ids.insert(entry.message.id.clone()) {
                self.entries.push_back(entry);
            }
        }
    }

    /// Insert an older `page` before the current entries, skipping known ids.
    fn prepend(&mut self, page: &[Message]) -> usize {
        let mut fresh = Vec::with_capacity(page.len());
        for message in page {
            if self.ids.insert(message.id.clone()) {
                fresh.push(message.clone());
            }
        }
        let added = fresh.len();
        for message in fresh.into_iter().rev() {
            self.entries.push_front(Entry {
                message,
                live_seq: None,
            });
        }
        added
    }
}

fn lock(log: &Mutex<ConversationLog>) -> MutexGuard<'_, ConversationLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts in-flight page requests for the lifetime of the guard.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Ordered, de-duplicated message store keyed by conversation.
pub struct MessageCache {
    logs: DashMap<String, Arc<Mutex<ConversationLog>>>,
    history: Arc<dyn HistoryApi>,
    ordering: Option<Arc<dyn ConversationOrdering>>,
    page_size: u32,
    in_flight: AtomicUsize,
}

impl std::fmt::Debug for MessageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCache")
            .field("conversations", &self.logs.len())
            .field("page_size", &self.page_size)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MessageCache {
    /// Create a cache paging through `history`.
    #[must_use]
    pub fn new(history: Arc<dyn HistoryApi>) -> Self {
        Self {
            logs: DashMap::new(),
            history,
            ordering: None,
            page_size: DEFAULT_PAGE_SIZE,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Notify `ordering` whenever a new message is appended.
    #[must_use]
    pub fn with_ordering(mut self, ordering: Arc<dyn ConversationOrdering>) -> Self {
        self.ordering = Some(ordering);
        self
    }

    /// Set the number of messages requested per page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn log(&self, conversation_id: &str) -> Arc<Mutex<ConversationLog>> {
        if let Some(log) = self.logs.get(conversation_id) {
            return Arc::clone(log.value());
        }
        Arc::clone(self.logs.entry(conversation_id.to_owned()).or_default().value())
    }

    /// Messages for a conversation, oldest first. Empty if never loaded.
    #[must_use]
    pub fn get(&self, conversation_id: &str) -> Vec<Message> {
        let Some(log) = self
            .logs
            .get(conversation_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return Vec::new();
        };
        lock(&log).messages()
    }

    /// Append a live message. Returns `false` if its id is already cached.
    ///
    /// On insert, the conversation ordering is told about the activity.
    pub fn append(&self, message: Message) -> bool {
        let conversation_id = message.conversation_id.clone();
        let message_id = message.id.clone();

        let inserted = lock(&self.log(&conversation_id)).append_live(message);
        if !inserted {
            trace!(conversation_id, message_id, "Duplicate message ignored");
            return false;
        }

        trace!(conversation_id, message_id, "Message appended");
        if let Some(ordering) = &self.ordering {
            ordering.touch(&conversation_id, Utc::now());
        }
        true
    }

    /// Load one page of history.
    ///
    /// Without `before`, the log is replaced by the newest page (live
    /// messages that arrived during the request are kept at the end). With
    /// `before`, the older page is inserted ahead of the existing entries.
    /// Returns the page oldest first.
    ///
    /// # Errors
    ///
    /// Returns the history error; the cache is left unchanged.
    pub async fn fetch_page(
        &self,
        conversation_id: &str,
        before: Option<&str>,
    ) -> ClientResult<Vec<Message>> {
        let log = self.log(conversation_id);
        let mark = lock(&log).live_seq;

        let mut page = {
            let _loading = LoadingGuard::new(&self.in_flight);
            self.history
                .fetch_messages(conversation_id, self.page_size, before)
                .await?
        };
        page.reverse();

        let mut guard = lock(&log);
        if before.is_some() {
            let added = guard.prepend(&page);
            debug!(conversation_id, before, added, "Prepended older page");
        } else {
            guard.replace(&page, mark);
            debug!(
                conversation_id,
                fetched = page.len(),
                total = guard.entries.len(),
                "Loaded latest page"
            );
        }
        drop(guard);

        Ok(page)
    }

    /// Search a conversation through the history API. Does not touch the cache.
    ///
    /// # Errors
    ///
    /// Returns the history error.
    pub async fn search(&self, conversation_id: &str, query: &str) -> ClientResult<Vec<Message>> {
        self.history.search_messages(conversation_id, query).await
    }

    /// Post a message through the history API and append the stored record.
    ///
    /// # Errors
    ///
    /// Returns the history error; nothing is appended.
    pub async fn submit(&self, conversation_id: &str, draft: &MessageDraft) -> ClientResult<Message> {
        let created = self.history.post_message(conversation_id, draft).await?;
        self.append(created.clone());
        Ok(created)
    }

    /// Whether any page request is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Drop every conversation log. Requests in flight land in detached logs.
    pub fn clear(&self) {
        self.logs.clear();
        debug!("Message cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::model::{MessageBody, Sender, SenderKind};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};

    fn message(id: &str, conversation_id: &str, minute: u32) -> Message {
        Message {
            id: id.to_owned(),
            conversation_id: conversation_id.to_owned(),
            sender: Sender {
                id: "u1".into(),
                kind: SenderKind::User,
                nickname: "alice".into(),
                avatar: None,
            },
            body: MessageBody::text(format!("message {id}")),
            reply_to_id: None,
            reply_to: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, minute, 0).unwrap(),
        }
    }

    /// Serves queued pages (newest first) and records requests.
    #[derive(Default)]
    struct StubHistory {
        pages: Mutex<VecDeque<ClientResult<Vec<Message>>>>,
        requests: Mutex<Vec<(String, u32, Option<String>)>>,
    }

    impl StubHistory {
        fn with_pages(pages: Vec<ClientResult<Vec<Message>>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                requests: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl HistoryApi for StubHistory {
        async fn fetch_messages(
            &self,
            conversation_id: &str,
            limit: u32,
            before: Option<&str>,
        ) -> ClientResult<Vec<Message>> {
            self.requests.lock().unwrap().push((
                conversation_id.to_owned(),
                limit,
                before.map(str::to_owned),
            ));
            self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }

        async fn post_message(
            &self,
            conversation_id: &str,
            draft: &MessageDraft,
        ) -> ClientResult<Message> {
            let mut created = message("posted", conversation_id, 59);
            created.body = draft.body.clone();
            Ok(created)
        }

        async fn search_messages(
            &self,
            conversation_id: &str,
            _query: &str,
        ) -> ClientResult<Vec<Message>> {
            Ok(vec![message("hit", conversation_id, 1)])
        }
    }

    #[derive(Default)]
    struct CountingOrdering(Mutex<Vec<(String, DateTime<Utc>)>>);

    impl ConversationOrdering for CountingOrdering {
        fn touch(&self, conversation_id: &str, at: DateTime<Utc>) {
            self.0.lock().unwrap().push((conversation_id.to_owned(), at));
        }
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn get_unknown_conversation_is_empty() {
        let cache = MessageCache::new(StubHistory::with_pages(vec![]));
        assert!(cache.get("nope").is_empty());
    }

    #[test]
    fn append_deduplicates_by_id() {
        let ordering = Arc::new(CountingOrdering::default());
        let cache =
            MessageCache::new(StubHistory::with_pages(vec![])).with_ordering(ordering.clone());

        assert!(cache.append(message("m1", "c1", 0)));
        assert!(!cache.append(message("m1", "c1", 0)));
        assert!(cache.append(message("m2", "c1", 1)));

        assert_eq!(ids(&cache.get("c1")), vec!["m1", "m2"]);
        // Ordering hears about inserts only.
        assert_eq!(ordering.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn conversations_are_independent() {
        let cache = MessageCache::new(StubHistory::with_pages(vec![]));
        cache.append(message("m1", "c1", 0));
        cache.append(message("m1", "c2", 0));
        assert_eq!(cache.get("c1").len(), 1);
        assert_eq!(cache.get("c2").len(), 1);
    }

    #[tokio::test]
    async fn fresh_fetch_reverses_and_replaces() {
        let history = StubHistory::with_pages(vec![Ok(vec![
            message("m3", "c1", 3),
            message("m2", "c1", 2),
            message("m1", "c1", 1),
        ])]);
        let cache = MessageCache::new(history.clone()).with_page_size(3);
        cache.append(message("stale", "c1", 0));

        let page = cache.fetch_page("c1", None).await.unwrap();
        assert_eq!(ids(&page), vec!["m1", "m2", "m3"]);
        // "stale" was appended before the request began, so it is replaced.
        assert_eq!(ids(&cache.get("c1")), vec!["m1", "m2", "m3"]);

        let requests = history.requests.lock().unwrap();
        assert_eq!(requests[0], ("c1".to_owned(), 3, None));
    }

    #[tokio::test]
    async fn older_page_is_prepended() {
        let history = StubHistory::with_pages(vec![
            Ok(vec![message("m4", "c1", 4), message("m3", "c1", 3)]),
            Ok(vec![message("m2", "c1", 2), message("m1", "c1", 1)]),
        ]);
        let cache = MessageCache::new(history.clone());

        cache.fetch_page("c1", None).await.unwrap();
        let older = cache.fetch_page("c1", Some("m3")).await.unwrap();
        assert_eq!(ids(&older), vec!["m1", "m2"]);
        assert_eq!(ids(&cache.get("c1")), vec!["m1", "m2", "m3", "m4"]);

        let requests = history.requests.lock().unwrap();
        assert_eq!(requests[1].2.as_deref(), Some("m3"));
    }

    #[tokio::test]
    async fn prepend_skips_known_ids() {
        let history = StubHistory::with_pages(vec![
            Ok(vec![message("m3", "c1", 3), message("m2", "c1", 2)]),
            Ok(vec![message("m2", "c1", 2), message("m1", "c1", 1)]),
        ]);
        let cache = MessageCache::new(history);
        cache.fetch_page("c1", None).await.unwrap();
        cache.fetch_page("c1", Some("m2")).await.unwrap();
        assert_eq!(ids(&cache.get("c1")), vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn empty_older_page_changes_nothing() {
        let history = StubHistory::with_pages(vec![Ok(vec![message("m1", "c1", 1)]), Ok(vec![])]);
        let cache = MessageCache::new(history);
        cache.fetch_page("c1", None).await.unwrap();
        let older = cache.fetch_page("c1", Some("m1")).await.unwrap();
        assert!(older.is_empty());
        assert_eq!(ids(&cache.get("c1")), vec!["m1"]);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_unchanged() {
        let history = StubHistory::with_pages(vec![Err(ClientError::Api("boom".into()))]);
        let cache = MessageCache::new(history);
        cache.append(message("m1", "c1", 1));

        let err = cache.fetch_page("c1", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Api(_)));
        assert_eq!(ids(&cache.get("c1")), vec!["m1"]);
        assert!(!cache.is_loading());
    }

    #[tokio::test]
    async fn submit_appends_created_record() {
        let cache = MessageCache::new(StubHistory::with_pages(vec![]));
        let created = cache.submit("c1", &MessageDraft::text("hello")).await.unwrap();
        assert_eq!(created.body, MessageBody::text("hello"));
        assert_eq!(ids(&cache.get("c1")), vec!["posted"]);
    }

    #[tokio::test]
    async fn search_does_not_touch_cache() {
        let cache = MessageCache::new(StubHistory::with_pages(vec![]));
        let hits = cache.search("c1", "anything").await.unwrap();
        assert_eq!(ids(&hits), vec!["hit"]);
        assert!(cache.get("c1").is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = MessageCache::new(StubHistory::with_pages(vec![]));
        cache.append(message("m1", "c1", 1));
        cache.clear();
        assert!(cache.get("c1").is_empty());
        assert!(cache.append(message("m1", "c1", 1)));
    }

    #[test]
    fn replace_keeps_only_late_live_entries() {
        let mut log = ConversationLog::default();
        log.append_live(message("early", "c1", 0));
        let mark = log.live_seq;
        log.append_live(message("late", "c1", 9));
        log.append_live(message("m2", "c1", 2));

        log.replace(&[message("m1", "c1", 1), message("m2", "c1", 2)], mark);
        let ids: Vec<String> = log.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1", "m2", "late"]);
    }
}
