//! Prelude module - commonly used types for convenient import.
//!
//! Use `use talkbox_client::prelude::*;` to import all essential types.

// Facade
pub use crate::{ChatClient, ClientError, ClientResult};

// Connection
pub use crate::{ConnectionState, ConnectionSupervisor, Connector, SupervisorSettings, WsConnector};

// Data
pub use crate::{MentionData, Message, MessageBody, MessageDraft, Sender, SenderKind};

// Collaborators
pub use crate::{HistoryApi, MemorySession, MessageCache, RecencyList, SessionStore};
