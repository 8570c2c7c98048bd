//! In-process backend for tests
//!
//! Assigns ids and timestamps on write, fans writes out to live subscribers,
//! and lets tests push arbitrary events (late, malformed, failing) into a
//! room's open streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Backend, BackendEvent, EventStream};
use crate::models::{MessageRecord, OutgoingMessage, RoomName};
use crate::sync::FeedEvent;

/// Server clock origin; seeded test records use smaller timestamps.
const CLOCK_START: i64 = 1_000_000;

#[derive(Default)]
struct Inner {
    rooms: HashMap<String, Vec<MessageRecord>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<BackendEvent>>>,
    next_id: u64,
    clock: i64,
    writes: usize,
    reject_writes: bool,
    refuse_subscriptions: bool,
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.lock().clock = CLOCK_START;
        Arc::new(backend)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store records in a room without notifying subscribers.
    pub fn seed(&self, room: &str, records: Vec<MessageRecord>) {
        self.lock()
            .rooms
            .entry(room.to_string())
            .or_default()
            .extend(records);
    }

    /// Deliver `event` to every open stream of `room`.
    pub fn inject(&self, room: &str, event: BackendEvent) {
        let mut inner = self.lock();
        if let Some(subs) = inner.subscribers.get_mut(room) {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Number of streams of `room` whose receiving side is still alive.
    pub fn open_streams(&self, room: &str) -> usize {
        let mut inner = self.lock();
        match inner.subscribers.get_mut(room) {
            Some(subs) => {
                subs.retain(|tx| !tx.is_closed());
                subs.len()
            }
            None => 0,
        }
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn reject_writes(&self, reject: bool) {
        self.lock().reject_writes = reject;
    }

    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.lock().refuse_subscriptions = refuse;
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn subscribe(&self, room: &RoomName) -> Result<EventStream> {
        let mut inner = self.lock();
        if inner.refuse_subscriptions {
            bail!("permission denied for room '{}'", room);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let initial = inner
            .rooms
            .get(room.as_str())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(FeedEvent::Upsert)
            .collect();
        let _ = tx.send(BackendEvent::Changes(initial));
        inner
            .subscribers
            .entry(room.to_string())
            .or_default()
            .push(tx);

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn write(&self, room: &RoomName, message: &OutgoingMessage) -> Result<String> {
        let mut inner = self.lock();
        if inner.reject_writes {
            bail!("write rejected by rules");
        }

        inner.writes += 1;
        inner.next_id += 1;
        inner.clock += 1000;
        let record = MessageRecord {
            id: format!("m{:04}", inner.next_id),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            text: message.text.clone(),
            timestamp: inner.clock,
        };

        inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .push(record.clone());
        let event = BackendEvent::Changes(vec![FeedEvent::Upsert(record.clone())]);
        if let Some(subs) = inner.subscribers.get_mut(room.as_str()) {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }

        Ok(record.id)
    }
}
