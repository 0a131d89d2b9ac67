//! History API collaborator.
//!
//! [`HistoryApi`] is the seam the cache pages through. [`HttpHistoryClient`]
//! implements it against the Talkbox REST API:
//!
//! - `GET  {api}/conversations/{id}/messages?limit=N[&before=ID]`
//! - `GET  {api}/conversations/{id}/messages/search?q=Q`
//! - `POST {api}/conversations/{id}/messages`
//!
//! Responses use a `{code, message, data}` envelope where a non-zero `code`
//! is an application error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::model::{Message, MessageDraft};
use crate::session::SessionStore;

/// Paged access to a conversation's messages.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    /// Fetch up to `limit` messages, newest first.
    ///
    /// With `before`, returns messages strictly older than that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> ClientResult<Vec<Message>>;

    /// Create a message and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    async fn post_message(&self, conversation_id: &str, draft: &MessageDraft)
    -> ClientResult<Message>;

    /// Full-text search within a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    async fn search_messages(&self, conversation_id: &str, query: &str)
    -> ClientResult<Vec<Message>>;
}

/// [`HistoryApi`] over HTTP.
pub struct HttpHistoryClient {
    client: reqwest::Client,
    api_base: Url,
    session: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for HttpHistoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHistoryClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpHistoryClient {
    /// Create a client for `server_url` + `api_prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(
        server_url: &str,
        api_prefix: &str,
        timeout: Duration,
        session: Arc<dyn SessionStore>,
    ) -> ClientResult<Self> {
        let api_base = api_base(server_url, api_prefix)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base,
            session,
        })
    }

    fn endpoint(&self, conversation_id: &str, tail: &[&str]) -> ClientResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["conversations", conversation_id, "messages"])
            .extend(tail);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> ClientResult<reqwest::RequestBuilder> {
        let Some(token) = self.session.token() else {
            return Ok(request);
        };
        let mut auth_value = HeaderValue::try_from(format!("Bearer {token}"))
            .map_err(|e| ClientError::Api(format!("Invalid token characters: {e}")))?;
        auth_value.set_sensitive(true);
        Ok(request.header(reqwest::header::AUTHORIZATION, auth_value))
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> ClientResult<T> {
        let response = self.authorize(request)?.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("History API rejected the session token");
            self.session.logout();
            return Err(ClientError::Unauthorized);
        }

        let body: Value = if status.is_success() {
            response.json().await?
        } else {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "History API error");
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(ClientError::Api(message));
        };

        Ok(serde_json::from_value(unwrap_envelope(body)?)?)
    }
}

#[async_trait]
impl HistoryApi for HttpHistoryClient {
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> ClientResult<Vec<Message>> {
        let url = self.endpoint(conversation_id, &[])?;
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_owned()));
        }
        debug!(conversation_id, limit, before, "Fetching message page");
        self.execute(self.client.get(url).query(&query)).await
    }

    async fn post_message(
        &self,
        conversation_id: &str,
        draft: &MessageDraft,
    ) -> ClientResult<Message> {
        let url = self.endpoint(conversation_id, &[])?;
        debug!(conversation_id, kind = draft.body.kind(), "Posting message");
        self.execute(self.client.post(url).json(&draft.to_request_body()))
            .await
    }

    async fn search_messages(
        &self,
        conversation_id: &str,
        query: &str,
    ) -> ClientResult<Vec<Message>> {
        let url = self.endpoint(conversation_id, &["search"])?;
        debug!(conversation_id, "Searching messages");
        self.execute(self.client.get(url).query(&[("q", query)]))
            .await
    }
}

/// Join the server URL and API prefix into a base for endpoint paths.
fn api_base(server_url: &str, api_prefix: &str) -> ClientResult<Url> {
    let mut url = Url::parse(server_url)?;
    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl(server_url.to_owned()));
    }
    let path = format!(
        "{}{}",
        url.path().trim_end_matches('/'),
        api_prefix.trim_end_matches('/')
    );
    url.set_path(&path);
    Ok(url)
}

/// Strip the `{code, message, data}` envelope.
///
/// Bodies without a `code` field are returned unchanged, as is the whole
/// body when an envelope carries no `data`.
fn unwrap_envelope(body: Value) -> ClientResult<Value> {
    let mut map = match body {
        Value::Object(map) => map,
        other => return Ok(other),
    };
    if map
        .get("code")
        .and_then(Value::as_i64)
        .is_some_and(|code| code != 0)
    {
        let message = map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_owned();
        return Err(ClientError::Api(message));
    }
    match map.remove("data") {
        Some(data) => Ok(data),
        None => Ok(Value::Object(map)),
    }
}
