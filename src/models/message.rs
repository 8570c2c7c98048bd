//! Message-related models

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::sync::SyncError;

/// A chat message as delivered by the backend.
///
/// Records are immutable once written: the backend assigns `id` and
/// `timestamp` (milliseconds since the Unix epoch) at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: String,
    pub sender_id: String,
    /// Display name snapshot taken when the message was sent.
    pub sender_name: String,
    pub text: String,
    pub timestamp: i64,
}

impl MessageRecord {
    /// Local wall-clock time of the message, if the timestamp is representable.
    pub fn sent_at(&self) -> Option<DateTime<Local>> {
        DateTime::from_timestamp_millis(self.timestamp).map(|t| t.with_timezone(&Local))
    }
}

/// Message body as stored under its key in the backend.
///
/// Every field is optional here so that a malformed child can be reported
/// instead of failing the whole batch it arrived in.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    sender_id: Option<String>,
    sender_name: Option<String>,
    text: Option<String>,
    timestamp: Option<i64>,
}

impl WireMessage {
    /// Decode a backend child value stored under key `id`.
    pub fn decode(id: &str, value: serde_json::Value) -> Result<MessageRecord> {
        let wire: WireMessage = serde_json::from_value(value)
            .with_context(|| format!("message {} has an invalid shape", id))?;
        wire.into_record(id)
    }

    fn into_record(self, id: &str) -> Result<MessageRecord> {
        if id.is_empty() {
            bail!("message without id");
        }
        let timestamp = self
            .timestamp
            .with_context(|| format!("message {} missing timestamp", id))?;
        let sender_id = self
            .sender_id
            .filter(|s| !s.is_empty())
            .with_context(|| format!("message {} missing senderId", id))?;

        Ok(MessageRecord {
            id: id.to_string(),
            sender_id,
            sender_name: self.sender_name.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            timestamp,
        })
    }
}

/// A message about to be written; the backend assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
}

impl OutgoingMessage {
    /// Build an outgoing message, rejecting text that is blank after trimming.
    pub fn new(sender_id: &str, sender_name: &str, text: &str) -> Result<Self, SyncError> {
        if text.trim().is_empty() {
            return Err(SyncError::Validation("message text is blank".to_string()));
        }
        Ok(Self {
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            text: text.to_string(),
        })
    }
}
