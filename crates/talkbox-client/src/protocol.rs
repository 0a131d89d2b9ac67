//! Event-stream wire format.
//!
//! Outbound frames are JSON objects tagged by `action`. Inbound frames are
//! `{"event": <name>, "data": <payload>}`. Only the events the client acts
//! on are modelled; everything else decodes to [`InboundEvent::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::model::{MentionData, Message, MessageDraft};

// ── Close Codes ──────────────────────────────────────────────

/// Close codes the supervisor interprets.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Connection dropped without a close frame, or the handshake failed.
    pub const ABNORMAL: u16 = 1006;
    /// Server rejected the token on an established stream.
    pub const UNAUTHORIZED: u16 = 4001;
}

/// Whether a close code means the session token is no longer valid.
#[must_use]
pub fn is_auth_close_code(code: u16) -> bool {
    code == close_code::UNAUTHORIZED
}

// ── Outbound ─────────────────────────────────────────────────

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundAction {
    /// Keep-alive.
    Ping,
    /// Send a chat message over the stream.
    SendMessage {
        /// Target conversation.
        conversation_id: String,
        /// Body type tag.
        #[serde(rename = "type")]
        kind: String,
        /// Body content object.
        content: Value,
        /// Message being replied to.
        #[serde(skip_serializing_if = "Option::is_none")]
        reply_to_id: Option<String>,
    },
}

impl OutboundAction {
    /// Build a `send_message` frame for `draft`.
    #[must_use]
    pub fn send_message(conversation_id: impl Into<String>, draft: &MessageDraft) -> Self {
        Self::SendMessage {
            conversation_id: conversation_id.into(),
            kind: draft.body.kind().to_owned(),
            content: draft.body.content(),
            reply_to_id: draft.reply_to_id.clone(),
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be serialized.
    pub fn to_frame(&self) -> ClientResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Inbound ──────────────────────────────────────────────────

/// Raw inbound frame.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// A decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A message was posted to a conversation the user belongs to.
    NewMessage(Message),
    /// The user was mentioned.
    Mentioned(MentionData),
    /// Reply to a ping.
    Pong,
    /// Any event this client does not handle.
    Unknown {
        /// Event name, empty if the frame had none.
        kind: String,
        /// The frame as received.
        raw: String,
    },
}

/// Decode one inbound frame.
///
/// # Errors
///
/// Returns [`ClientError::Decode`] if the frame is not JSON, or if a
/// `new_message` payload does not describe a message.
pub fn decode_frame(frame: &[u8]) -> ClientResult<InboundEvent> {
    let raw: InboundFrame =
        serde_json::from_slice(frame).map_err(|e| ClientError::Decode(e.to_string()))?;

    let kind = raw.event.unwrap_or_default();
    match kind.as_str() {
        "new_message" => {
            let data = raw
                .data
                .ok_or_else(|| ClientError::Decode("new_message without data".to_owned()))?;
            let message: Message =
                serde_json::from_value(data).map_err(|e| ClientError::Decode(e.to_string()))?;
            Ok(InboundEvent::NewMessage(message))
        },
        "mentioned" => Ok(InboundEvent::Mentioned(MentionData(
            raw.data.unwrap_or(Value::Null),
        ))),
        "pong" => Ok(InboundEvent::Pong),
        _ => Ok(InboundEvent::Unknown {
            kind,
            raw: String::from_utf8_lossy(frame).into_owned(),
        }),
    }
}

// ── URLs ─────────────────────────────────────────────────────

/// Derive the event-stream URL from the HTTP base URL.
///
/// `http` becomes `ws` and `https` becomes `wss`; `stream_path` is appended
/// to any existing base path and the token is passed as a `token` query
/// parameter.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] if `base` is not an http(s) URL.
pub fn stream_url(base: &str, stream_path: &str, token: &str) -> ClientResult<String> {
    let mut url = url::Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {base}"
            )));
        },
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::InvalidUrl(format!("cannot derive stream URL from {base}")))?;

    let path = format!("{}{}", url.path().trim_end_matches('/'), stream_path);
    url.set_path(&path);
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageBody;

    #[test]
    fn ping_frame() {
        assert_eq!(OutboundAction::Ping.to_frame().unwrap(), r#"{"action":"ping"}"#);
    }

    #[test]
    fn send_message_frame() {
        let frame = OutboundAction::send_message("c1", &MessageDraft::text("hi"))
            .to_frame()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["action"], "send_message");
        assert_eq!(value["conversation_id"], "c1");
        assert_eq!(value["type"], "text");
        assert_eq!(value["content"]["text"], "hi");
        assert!(value.get("reply_to_id").is_none());
    }

    #[test]
    fn send_message_frame_with_reply() {
        let draft = MessageDraft::text("same").replying_to("m1");
        let frame = OutboundAction::send_message("c1", &draft).to_frame().unwrap();
        assert!(frame.contains(r#""reply_to_id":"m1""#));
    }

    #[test]
    fn resent_card_keeps_every_field() {
        let content = serde_json::json!({
            "title": "Deploy", "color": "#f00", "content": "all green",
            "note": "v1.2", "url": "https://ci/1"
        });
        let draft = MessageDraft {
            body: MessageBody::from_parts("card", content.clone()).unwrap(),
            reply_to_id: None,
        };
        let frame = OutboundAction::send_message("c1", &draft).to_frame().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "card");
        assert_eq!(value["content"], content);
    }

    #[test]
    fn decodes_new_message() {
        let frame = br#"{"event":"new_message","data":{
            "id":"m1","conversation_id":"c1",
            "sender":{"id":"u1","type":"bot","nickname":"deploy"},
            "type":"text","content":{"text":"done"},
            "created_at":"2024-05-01T08:00:00Z"}}"#;
        match decode_frame(frame).unwrap() {
            InboundEvent::NewMessage(msg) => {
                assert_eq!(msg.conversation_id, "c1");
                assert_eq!(msg.body, MessageBody::text("done"));
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_mentioned_and_pong() {
        let event = decode_frame(br#"{"event":"mentioned","data":{"conversation_id":"c2"}}"#)
            .unwrap();
        assert!(matches!(event, InboundEvent::Mentioned(ref m) if m.conversation_id() == Some("c2")));
        assert_eq!(decode_frame(br#"{"event":"pong"}"#).unwrap(), InboundEvent::Pong);
    }

    #[test]
    fn unknown_event_is_not_an_error() {
        let frame = r#"{"event":"typing","data":{"user_id":"u2"}}"#;
        let event = decode_frame(frame.as_bytes()).unwrap();
        assert_eq!(
            event,
            InboundEvent::Unknown {
                kind: "typing".into(),
                raw: frame.to_owned(),
            }
        );

        let event = decode_frame(br"{}").unwrap();
        assert_eq!(
            event,
            InboundEvent::Unknown {
                kind: String::new(),
                raw: "{}".to_owned(),
            }
        );
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        assert!(matches!(decode_frame(b"not json"), Err(ClientError::Decode(_))));
        assert!(matches!(
            decode_frame(br#"{"event":"new_message"}"#),
            Err(ClientError::Decode(_))
        ));
        assert!(matches!(
            decode_frame(br#"{"event":"new_message","data":{"id":"m1"}}"#),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn stream_url_from_https_base() {
        let url = stream_url("https://talkbox.example", "/ws", "abc").unwrap();
        assert_eq!(url, "wss://talkbox.example/ws?token=abc");
    }

    #[test]
    fn stream_url_keeps_base_path_and_port() {
        let url = stream_url("http://localhost:8080/chat/", "/ws", "t").unwrap();
        assert_eq!(url, "ws://localhost:8080/chat/ws?token=t");
    }

    #[test]
    fn stream_url_encodes_token() {
        let url = stream_url("https://h", "/ws", "a b&c").unwrap();
        assert_eq!(url, "wss://h/ws?token=a+b%26c");
    }

    #[test]
    fn stream_url_rejects_other_schemes() {
        assert!(stream_url("ftp://h", "/ws", "t").is_err());
        assert!(stream_url("nonsense", "/ws", "t").is_err());
    }

    #[test]
    fn auth_close_code() {
        assert!(is_auth_close_code(4001));
        assert!(!is_auth_close_code(close_code::ABNORMAL));
        assert!(!is_auth_close_code(close_code::NORMAL));
    }
}
