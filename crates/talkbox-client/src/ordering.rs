//! Conversation recency ordering.
//!
//! The cache reports activity through [`ConversationOrdering::touch`]; the
//! default [`RecencyList`] keeps the most recently active conversation at
//! the front.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::model::ConversationSummary;

/// Receives "this conversation just had activity" notifications.
pub trait ConversationOrdering: Send + Sync {
    /// Record activity in `conversation_id` at `at`.
    fn touch(&self, conversation_id: &str, at: DateTime<Utc>);
}

/// Conversation list ordered by most recent activity.
#[derive(Debug, Default)]
pub struct RecencyList {
    conversations: RwLock<Vec<ConversationSummary>>,
}

impl RecencyList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list, e.g. after loading it from the server.
    pub fn replace_all(&self, conversations: Vec<ConversationSummary>) {
        *self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = conversations;
    }

    /// Current ordering, most recent first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConversationSummary> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ids in current order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }
}

impl ConversationOrdering for RecencyList {
    fn touch(&self, conversation_id: &str, at: DateTime<Utc>) {
        let mut list = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // Already at the front, or not a known conversation: nothing to do.
        let Some(index) = list.iter().position(|c| c.id == conversation_id) else {
            return;
        };
        if index == 0 {
            return;
        }

        let mut conversation = list.remove(index);
        conversation.updated_at = at;
        list.insert(0, conversation);
        trace!(conversation_id, from = index, "moved conversation to front");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConversationKind;

    fn summary(id: &str) -> ConversationSummary {
        ConversationSummary {
            id: id.to_owned(),
            kind: ConversationKind::Private,
            name: id.to_uppercase(),
            avatar: None,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn list(ids: &[&str]) -> RecencyList {
        let list = RecencyList::new();
        list.replace_all(ids.iter().map(|id| summary(id)).collect());
        list
    }

    #[test]
    fn touch_moves_to_front_and_updates_time() {
        let list = list(&["a", "b", "c"]);
        let now = Utc::now();
        list.touch("c", now);
        assert_eq!(list.ids(), vec!["c", "a", "b"]);
        assert_eq!(list.snapshot()[0].updated_at, now);
    }

    #[test]
    fn touch_front_is_a_no_op() {
        let list = list(&["a", "b"]);
        list.touch("a", Utc::now());
        assert_eq!(list.ids(), vec!["a", "b"]);
        assert_eq!(list.snapshot()[0].updated_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn touch_unknown_is_ignored() {
        let list = list(&["a", "b"]);
        list.touch("zzz", Utc::now());
        assert_eq!(list.ids(), vec!["a", "b"]);
    }
}
