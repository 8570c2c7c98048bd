//! Managed message backend
//!
//! The synchronizer only needs two operations from the backend: a cancelable
//! per-room change stream and a write that assigns id and timestamp. Both sit
//! behind the [`Backend`] trait so the session can be driven by the Realtime
//! Database adapter in production and by an in-memory store in tests.

#[cfg(test)]
pub mod memory;
pub mod rtdb;
pub mod sse;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::models::{OutgoingMessage, RoomName};
use crate::sync::FeedEvent;

/// One item of a room's change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Changes delivered together; applied and committed as one batch.
    Changes(Vec<FeedEvent>),
    /// A change that could not be decoded. Carries the reason.
    Malformed(String),
    /// The stream failed and will deliver nothing more.
    Failed(String),
}

/// Change stream for one room. Dropping it cancels the subscription.
pub type EventStream = BoxStream<'static, BackendEvent>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Open the change stream for `room`.
    async fn subscribe(&self, room: &RoomName) -> Result<EventStream>;

    /// Write a message to `room`. Returns the id assigned by the backend.
    async fn write(&self, room: &RoomName, message: &OutgoingMessage) -> Result<String>;
}
