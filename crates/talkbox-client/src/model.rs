//! Chat data types shared by the event stream, the history API, and the cache.
//!
//! The server describes message bodies as a `type` tag next to a free-form
//! `content` object. On the Rust side that pair becomes [`MessageBody`], one
//! variant per known type. Unknown types are kept as [`MessageBody::Other`]
//! so a newer server never makes a whole page undecodable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who sent a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    /// A human user.
    #[default]
    User,
    /// A bot account.
    Bot,
}

/// Message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// Sender identifier.
    pub id: String,
    /// User or bot.
    #[serde(rename = "type", default)]
    pub kind: SenderKind,
    /// Display name.
    #[serde(default)]
    pub nickname: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Body of a `text` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    /// Message text.
    pub text: String,
    /// Ids of the users mentioned in the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<String>>,
}

/// Body of an `image` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Image URL.
    pub url: String,
    /// Pixel width.
    #[serde(default)]
    pub width: u32,
    /// Pixel height.
    #[serde(default)]
    pub height: u32,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Thumbnail URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Body of a `video` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoContent {
    /// Video URL.
    pub url: String,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: f64,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Poster frame URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Body of a `file` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    /// Download URL.
    pub url: String,
    /// Original file name.
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
}

/// Body of a `card` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardContent {
    /// Card title.
    pub title: String,
    /// Accent color, e.g. `#f00`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Card body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Footnote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Link target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Typed message body.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Plain text.
    Text(TextContent),
    /// Image attachment.
    Image(ImageContent),
    /// Video attachment.
    Video(VideoContent),
    /// File attachment.
    File(FileContent),
    /// Rich card.
    Card(CardContent),
    /// A type this client does not know. Kept verbatim.
    Other {
        /// The `type` tag as sent by the server.
        kind: String,
        /// Raw content object.
        content: Value,
    },
}

impl MessageBody {
    /// Convenience constructor for a text body.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent {
            text: text.into(),
            mentions: None,
        })
    }

    /// The wire `type` tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::File(_) => "file",
            Self::Card(_) => "card",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Build a body from its wire `type` tag and `content` object.
    ///
    /// # Errors
    ///
    /// Returns an error if the content does not match the known shape for
    /// `kind`.
    pub fn from_parts(kind: &str, content: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            "text" => Self::Text(serde_json::from_value(content)?),
            "image" => Self::Image(serde_json::from_value(content)?),
            "video" => Self::Video(serde_json::from_value(content)?),
            "file" => Self::File(serde_json::from_value(content)?),
            "card" => Self::Card(serde_json::from_value(content)?),
            other => Self::Other {
                kind: other.to_owned(),
                content,
            },
        })
    }

    /// The wire `content` object.
    #[must_use]
    pub fn content(&self) -> Value {
        let value = match self {
            Self::Text(c) => serde_json::to_value(c),
            Self::Image(c) => serde_json::to_value(c),
            Self::Video(c) => serde_json::to_value(c),
            Self::File(c) => serde_json::to_value(c),
            Self::Card(c) => serde_json::to_value(c),
            Self::Other { content, .. } => return content.clone(),
        };
        value.unwrap_or_default()
    }

    /// A short single-line rendering, used for previews and logs.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Text(c) => c.text.clone(),
            Self::Image(_) => "[image]".to_owned(),
            Self::Video(_) => "[video]".to_owned(),
            Self::File(c) => format!("[file] {}", c.name),
            Self::Card(c) => format!("[card] {}", c.title),
            Self::Other { kind, .. } => format!("[{kind}]"),
        }
    }
}

/// Preview of the message being replied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPreview {
    /// Quoted message id.
    pub id: String,
    /// Quoted message type tag.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Quoted content object.
    #[serde(default)]
    pub content: Value,
    /// Display name of the quoted sender.
    #[serde(default)]
    pub sender_name: String,
}

/// A chat message. Immutable once received; identified by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage", into = "WireMessage")]
pub struct Message {
    /// Unique message id.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author.
    pub sender: Sender,
    /// Typed body.
    pub body: MessageBody,
    /// Id of the message this one replies to.
    pub reply_to_id: Option<String>,
    /// Preview of the replied-to message, when the server includes it.
    pub reply_to: Option<ReplyPreview>,
    /// Server creation time.
    pub created_at: DateTime<Utc>,
}

/// Wire shape of [`Message`]: body split into `type` and `content`.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    id: String,
    conversation_id: String,
    sender: Sender,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to: Option<ReplyPreview>,
    created_at: DateTime<Utc>,
}

impl TryFrom<WireMessage> for Message {
    type Error = serde_json::Error;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            body: MessageBody::from_parts(&wire.kind, wire.content)?,
            id: wire.id,
            conversation_id: wire.conversation_id,
            sender: wire.sender,
            reply_to_id: wire.reply_to_id,
            reply_to: wire.reply_to,
            created_at: wire.created_at,
        })
    }
}

impl From<Message> for WireMessage {
    fn from(msg: Message) -> Self {
        Self {
            kind: msg.body.kind().to_owned(),
            content: msg.body.content(),
            id: msg.id,
            conversation_id: msg.conversation_id,
            sender: msg.sender,
            reply_to_id: msg.reply_to_id,
            reply_to: msg.reply_to,
            created_at: msg.created_at,
        }
    }
}

/// An outgoing message that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    /// Body to send.
    pub body: MessageBody,
    /// Optional message being replied to.
    pub reply_to_id: Option<String>,
}

impl MessageDraft {
    /// A plain text draft.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: MessageBody::text(text),
            reply_to_id: None,
        }
    }

    /// Mark this draft as a reply.
    #[must_use]
    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to_id = Some(message_id.into());
        self
    }

    /// JSON body for the history API's post endpoint.
    #[must_use]
    pub fn to_request_body(&self) -> Value {
        let mut body = serde_json::json!({
            "type": self.body.kind(),
            "content": self.body.content(),
        });
        if let (Some(reply), Some(map)) = (&self.reply_to_id, body.as_object_mut()) {
            map.insert("reply_to_id".to_owned(), Value::String(reply.clone()));
        }
        body
    }
}

/// Payload of a `mentioned` event.
///
/// The server does not pin this shape down, so it is kept opaque with
/// accessors for the fields a client usually needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MentionData(pub Value);

impl MentionData {
    /// Conversation the mention happened in, if present.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.0.get("conversation_id").and_then(Value::as_str)
    }

    /// Mentioning message id, if present.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.0
            .get("message_id")
            .or_else(|| self.0.get("id"))
            .and_then(Value::as_str)
    }
}

/// Conversation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// One-to-one chat.
    #[default]
    Private,
    /// Group chat.
    Group,
}

/// Entry in the conversation recency list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: String,
    /// Private or group.
    #[serde(rename = "type", default)]
    pub kind: ConversationKind,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Last activity time.
    pub updated_at: DateTime<Utc>,
}
