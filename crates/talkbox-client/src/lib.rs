//! Talkbox client - event-stream connection manager and message cache.
//!
//! This crate keeps a Talkbox chat client in sync with the server:
//! - One supervised `WebSocket` event stream with bounded reconnection
//! - Keep-alive pings, with an optional dead-connection watchdog
//! - Routing of `new_message` / `mentioned` events to registered callbacks
//! - A per-conversation, ordered, de-duplicated message cache with paging
//!
//! # Architecture
//!
//! ```text
//! ChatClient (facade)
//! ├── ConnectionSupervisor ── Connector (WsConnector)
//! │   ├── ReconnectPolicy
//! │   └── heartbeat task
//! ├── EventDispatcher ── consumer callbacks
//! └── MessageCache ── HistoryApi (HttpHistoryClient)
//!     └── ConversationOrdering (RecencyList)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use talkbox_client::prelude::*;
//! use talkbox_config::Config;
//!
//! # async fn example() -> ClientResult<()> {
//! let config = Config::default();
//! let session = Arc::new(MemorySession::new("token"));
//! let client = ChatClient::from_config(&config, session)?;
//!
//! client.on_message(|message| println!("{}: {}", message.sender.nickname, message.body.summary()));
//! client.connect()?;
//! client.load_messages("conversation-id").await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod backoff;
pub mod cache;
pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod history;
pub mod model;
pub mod ordering;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use backoff::{Backoff, ReconnectPolicy};
pub use cache::MessageCache;
pub use client::ChatClient;
pub use connection::WsConnector;
pub use dispatcher::{EventDispatcher, FrameKind};
pub use error::{ClientError, ClientResult};
pub use history::{HistoryApi, HttpHistoryClient};
pub use model::{
    CardContent, ConversationKind, ConversationSummary, FileContent, ImageContent, MentionData,
    Message, MessageBody, MessageDraft, ReplyPreview, Sender, SenderKind, TextContent,
    VideoContent,
};
pub use ordering::{ConversationOrdering, RecencyList};
pub use protocol::{InboundEvent, OutboundAction};
pub use session::{MemorySession, SessionStore};
pub use supervisor::{ConnectionState, ConnectionSupervisor, SupervisorSettings, WeakSupervisor};
pub use transport::{Connector, TransportConnection, TransportEvent, TransportLink};
