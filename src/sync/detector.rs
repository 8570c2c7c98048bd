//! Decides which incoming message deserves a notification

use std::collections::HashSet;

use crate::models::MessageRecord;

/// Emits the newest message of a snapshot when it is new to this room
/// session and was written by someone else.
///
/// Only the trailing entry of each snapshot is considered. Several messages
/// landing between two observations produce at most one notification, and a
/// late message that sorts before the current tail produces none.
#[derive(Debug)]
pub struct NewMessageDetector {
    local_user: String,
    /// Set once the first non-empty snapshot of a room session was observed.
    primed: bool,
    last_seen: Option<String>,
    emitted: HashSet<String>,
}

impl NewMessageDetector {
    pub fn new(local_user: impl Into<String>) -> Self {
        Self {
            local_user: local_user.into(),
            primed: false,
            last_seen: None,
            emitted: HashSet::new(),
        }
    }

    /// Forget everything about the previous room session.
    pub fn reset(&mut self) {
        self.primed = false;
        self.last_seen = None;
        self.emitted.clear();
    }

    #[cfg(test)]
    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Inspect a committed snapshot. Returns the message to notify about, if any.
    ///
    /// The first non-empty snapshot after a reset only seeds `last_seen` from
    /// its tail, so the initial history of a room never notifies. Empty
    /// snapshots before that leave the detector unprimed.
    pub fn observe(&mut self, snapshot: &[MessageRecord]) -> Option<MessageRecord> {
        let newest = snapshot.last()?;

        if !self.primed {
            self.primed = true;
            self.last_seen = Some(newest.id.clone());
            tracing::debug!("Detector seeded with {}", newest.id);
            return None;
        }

        if newest.sender_id == self.local_user
            || self.last_seen.as_deref() == Some(newest.id.as_str())
            || self.emitted.contains(&newest.id)
        {
            return None;
        }

        self.emitted.insert(newest.id.clone());
        Some(newest.clone())
    }

    /// Record that the presentation layer surfaced message `id`.
    ///
    /// Ids this session never emitted (for example one acknowledged after a
    /// room switch) are ignored.
    pub fn mark_notified(&mut self, id: &str) {
        if self.emitted.contains(id) {
            self.last_seen = Some(id.to_string());
        }
    }
}
