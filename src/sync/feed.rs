//! Ordered, deduplicated message buffer for one room

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::MessageRecord;

/// A single change to a room's message set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Upsert(MessageRecord),
    Remove(String),
}

/// Messages of one room, ordered by `(timestamp, id)` ascending.
///
/// The ordered entries live behind an `Arc` so a snapshot is a pointer copy.
/// Mutations go through `Arc::make_mut`, which clones only while an older
/// snapshot is still held elsewhere; outstanding snapshots never change.
#[derive(Debug, Default)]
pub struct RoomFeed {
    entries: Arc<Vec<MessageRecord>>,
    /// id -> timestamp of the stored entry, used to locate it by binary search.
    index: HashMap<String, i64>,
}

impl RoomFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns whether the ordered sequence changed.
    pub fn apply(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Upsert(record) => self.upsert(record),
            FeedEvent::Remove(id) => self.remove(&id),
        }
    }

    /// The current ordered sequence.
    pub fn snapshot(&self) -> Arc<Vec<MessageRecord>> {
        Arc::clone(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, timestamp: i64, id: &str) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| (e.timestamp, e.id.as_str()).cmp(&(timestamp, id)))
    }

    fn upsert(&mut self, record: MessageRecord) -> bool {
        if let Some(&old_ts) = self.index.get(&record.id) {
            if let Ok(pos) = self.position(old_ts, &record.id) {
                if self.entries[pos] == record {
                    return false;
                }
                Arc::make_mut(&mut self.entries).remove(pos);
            }
        }

        let pos = match self.position(record.timestamp, &record.id) {
            Ok(pos) | Err(pos) => pos,
        };
        self.index.insert(record.id.clone(), record.timestamp);
        Arc::make_mut(&mut self.entries).insert(pos, record);
        true
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(ts) = self.index.remove(id) else {
            return false;
        };
        match self.position(ts, id) {
            Ok(pos) => {
                Arc::make_mut(&mut self.entries).remove(pos);
                true
            }
            Err(_) => false,
        }
    }
}
