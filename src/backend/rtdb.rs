//! Realtime Database REST client
//!
//! Messages live at `/rooms/{room}/messages/{pushId}`. Reads use the
//! streaming (server-sent events) variant of the REST API; writes are plain
//! POSTs whose push id comes back in the response body.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{sse, Backend, EventStream};
use crate::models::{OutgoingMessage, RoomName};

/// Response to a POST on a list location.
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Authenticated client for one database.
pub struct RealtimeDb {
    http: reqwest::Client,
    base: Url,
    id_token: String,
    history_limit: usize,
}

impl RealtimeDb {
    pub fn new(base: Url, id_token: String, history_limit: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            id_token,
            history_limit,
        }
    }

    /// Build an authenticated URL for a location below the database root.
    fn location(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Database URL {} cannot be used as a base", self.base))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("auth", &self.id_token);
        Ok(url)
    }

    fn messages_url(&self, room: &RoomName) -> Result<Url> {
        self.location(&["rooms", room.as_str(), "messages.json"])
    }

    /// List the names of all rooms that have at least one message.
    pub async fn list_rooms(&self) -> Result<Vec<String>> {
        let mut url = self.location(&["rooms.json"])?;
        url.query_pairs_mut().append_pair("shallow", "true");
        tracing::debug!("Room GET {}", url.path());

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Room GET {} failed", url.path()))?;
        let resp = check_response(resp, url.path()).await?;

        let body: Option<serde_json::Map<String, serde_json::Value>> = resp
            .json()
            .await
            .context("Failed to parse room list")?;
        Ok(room_names(body))
    }
}

/// Sorted keys of a shallow `/rooms` read; `null` means no rooms.
fn room_names(body: Option<serde_json::Map<String, serde_json::Value>>) -> Vec<String> {
    let mut rooms: Vec<String> = body
        .unwrap_or_default()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    rooms.sort();
    rooms
}

/// JSON body for a new message; the server fills in the timestamp.
fn write_body(message: &OutgoingMessage) -> Result<serde_json::Value> {
    let mut body = serde_json::to_value(message).context("Failed to serialize message")?;
    body["timestamp"] = serde_json::json!({ ".sv": "timestamp" });
    Ok(body)
}

#[async_trait]
impl Backend for RealtimeDb {
    async fn subscribe(&self, room: &RoomName) -> Result<EventStream> {
        let mut url = self.messages_url(room)?;
        url.query_pairs_mut()
            .append_pair("orderBy", "\"timestamp\"")
            .append_pair("limitToLast", &self.history_limit.to_string());
        tracing::info!("Opening event stream for room '{}'", room);

        let resp = self
            .http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Stream GET {} failed", url.path()))?;
        let resp = check_response(resp, url.path()).await?;

        Ok(sse::event_stream(Box::pin(resp.bytes_stream())))
    }

    async fn write(&self, room: &RoomName, message: &OutgoingMessage) -> Result<String> {
        let url = self.messages_url(room)?;
        let body = write_body(message)?;
        tracing::debug!("Message POST {}", url.path());

        let resp = self
            .http
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Message POST {} failed", url.path()))?;
        let resp = check_response(resp, url.path()).await?;

        let pushed: PushResponse = resp
            .json()
            .await
            .context("Failed to parse write response")?;
        Ok(pushed.name)
    }
}

/// Check HTTP response status code and return a clear error on failure.
///
/// `path` is logged instead of the full URL, which carries the id token.
async fn check_response(resp: reqwest::Response, path: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Token may be invalid -- run 'roomchat login'.",
            path
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), path, body);
    }
    Ok(resp)
}
