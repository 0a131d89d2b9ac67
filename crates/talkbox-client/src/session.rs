//! Session collaborator: supplies the bearer token and receives logout.

use std::sync::{PoisonError, RwLock};

use tracing::info;

/// Source of the current bearer token.
///
/// `logout` is called when the server rejects the token, on the stream or
/// on the history API.
pub trait SessionStore: Send + Sync {
    /// Current token, if logged in.
    fn token(&self) -> Option<String>;

    /// Drop the session. Must be idempotent.
    fn logout(&self);
}

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySession {
    token: RwLock<Option<String>>,
}

impl MemorySession {
    /// A session holding `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Replace the token, e.g. after logging in again.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }
}

impl SessionStore for MemorySession {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn logout(&self) {
        if self
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!("Session logged out");
        }
    }
}
