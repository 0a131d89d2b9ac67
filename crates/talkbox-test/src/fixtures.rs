//! Test fixtures for common types.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};

use talkbox_client::{
    Backoff, ConversationKind, ConversationSummary, Message, MessageBody, Sender, SenderKind,
    SupervisorSettings,
};

/// Server URL used by every fixture.
pub const TEST_SERVER_URL: &str = "http://talkbox.test";

/// Fixed reference time all fixture timestamps are derived from.
#[must_use]
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Create a test sender.
#[must_use]
pub fn test_sender() -> Sender {
    Sender {
        id: "u1".to_owned(),
        kind: SenderKind::User,
        nickname: "alice".to_owned(),
        avatar: None,
    }
}

/// Create a text message at the reference time.
#[must_use]
pub fn test_message(id: &str, conversation_id: &str) -> Message {
    test_message_at(id, conversation_id, 0)
}

/// Create a text message `minute` minutes after the reference time.
#[must_use]
pub fn test_message_at(id: &str, conversation_id: &str, minute: i64) -> Message {
    Message {
        id: id.to_owned(),
        conversation_id: conversation_id.to_owned(),
        sender: test_sender(),
        body: MessageBody::text(format!("message {id}")),
        reply_to_id: None,
        reply_to: None,
        created_at: minutes_after_epoch(minute),
    }
}

/// The reference time shifted by `minute` minutes.
#[must_use]
pub fn minutes_after_epoch(minute: i64) -> DateTime<Utc> {
    let epoch = test_epoch();
    epoch
        .checked_add_signed(Duration::minutes(minute))
        .unwrap_or(epoch)
}

/// Create `count` messages `m1..=mN` in chronological order.
#[must_use]
pub fn test_history(conversation_id: &str, count: usize) -> Vec<Message> {
    (1..=count)
        .map(|n| {
            let minute = i64::try_from(n).unwrap_or(i64::MAX);
            test_message_at(&format!("m{n}"), conversation_id, minute)
        })
        .collect()
}

/// Create a conversation summary.
#[must_use]
pub fn test_conversation(id: &str, minute: i64) -> ConversationSummary {
    ConversationSummary {
        id: id.to_owned(),
        kind: ConversationKind::Private,
        name: format!("conversation {id}"),
        avatar: None,
        updated_at: minutes_after_epoch(minute),
    }
}

/// Wrap a message in a `new_message` stream event.
#[must_use]
pub fn new_message_event(message: &Message) -> Value {
    json!({ "event": "new_message", "data": message })
}

/// A `mentioned` stream event.
#[must_use]
pub fn mentioned_event(conversation_id: &str, message_id: &str) -> Value {
    json!({
        "event": "mentioned",
        "data": { "conversation_id": conversation_id, "message_id": message_id }
    })
}

/// A `pong` stream event.
#[must_use]
pub fn pong_event() -> Value {
    json!({ "event": "pong" })
}

/// Supervisor settings pointing at [`TEST_SERVER_URL`] with production
/// retry and heartbeat timings.
#[must_use]
pub fn test_settings() -> SupervisorSettings {
    SupervisorSettings {
        server_url: TEST_SERVER_URL.to_owned(),
        stream_path: "/ws".to_owned(),
        max_attempts: 5,
        backoff: Backoff::Fixed(std::time::Duration::from_secs(3)),
        heartbeat_interval: std::time::Duration::from_secs(30),
        require_pong: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_chronological() {
        let history = test_history("c1", 3);
        let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
        assert!(history[0].created_at < history[2].created_at);
    }

    #[test]
    fn new_message_event_decodes() {
        let message = test_message("m1", "c1");
        let frame = new_message_event(&message).to_string();
        let event = talkbox_client::protocol::decode_frame(frame.as_bytes()).unwrap();
        assert_eq!(event, talkbox_client::InboundEvent::NewMessage(message));
    }
}
