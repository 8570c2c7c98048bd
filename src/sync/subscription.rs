//! Single active room subscription with generation tagging

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::feed::RoomFeed;
use super::SyncError;
use crate::backend::{Backend, BackendEvent};
use crate::models::{MessageRecord, RoomName};

/// A backend event stamped with the generation of the subscription that
/// produced it.
#[derive(Debug)]
pub struct Tagged {
    pub generation: u64,
    pub event: BackendEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No room selected.
    Idle,
    /// Subscribed, initial load not yet received.
    Connecting,
    Live,
    /// The stream failed; the feed is frozen until the next switch.
    Failed(SyncError),
}

/// What handling one tagged event did.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// From a superseded subscription; discarded.
    Stale,
    /// A batch was applied. `first` marks the room's initial load.
    Committed { changed: bool, first: bool },
    /// The event could not be decoded; the feed is untouched.
    Rejected(SyncError),
    Failed(SyncError),
}

/// Owns the room feed and at most one live backend subscription.
///
/// Every subscription gets a fresh generation number and its pump task tags
/// each event with it. A switch bumps the generation before anything else,
/// so events still in flight from the previous room are recognised and
/// dropped even if the old stream emits after being cancelled.
pub struct RoomSubscription {
    backend: Arc<dyn Backend>,
    generation: u64,
    room: Option<RoomName>,
    state: SubscriptionState,
    feed: RoomFeed,
    pump: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<Tagged>,
    events_rx: mpsc::UnboundedReceiver<Tagged>,
}

impl RoomSubscription {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            generation: 0,
            room: None,
            state: SubscriptionState::Idle,
            feed: RoomFeed::new(),
            pump: None,
            events_tx,
            events_rx,
        }
    }

    pub fn room(&self) -> Option<&RoomName> {
        self.room.as_ref()
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> Arc<Vec<MessageRecord>> {
        self.feed.snapshot()
    }

    /// Subscribe to `room`, replacing the current subscription.
    ///
    /// Returns false (and does nothing) when `room` is already the active,
    /// healthy room. A failed room is always re-subscribed.
    pub fn switch_to(&mut self, room: RoomName) -> bool {
        if self.room.as_ref() == Some(&room)
            && !matches!(self.state, SubscriptionState::Failed(_))
        {
            tracing::debug!("Already subscribed to room '{}'", room);
            return false;
        }

        self.cancel();
        self.generation += 1;
        tracing::info!(
            "Switching to room '{}' (generation {})",
            room,
            self.generation
        );

        self.feed = RoomFeed::new();
        self.state = SubscriptionState::Connecting;
        self.pump = Some(tokio::spawn(pump(
            Arc::clone(&self.backend),
            room.clone(),
            self.generation,
            self.events_tx.clone(),
        )));
        self.room = Some(room);
        true
    }

    /// Drop the active subscription and return to `Idle`.
    pub fn leave(&mut self) -> bool {
        let Some(room) = self.room.take() else {
            return false;
        };
        self.cancel();
        self.generation += 1;
        tracing::info!("Left room '{}'", room);

        self.feed = RoomFeed::new();
        self.state = SubscriptionState::Idle;
        true
    }

    /// Wait for the next event from any pump, stale ones included.
    pub async fn next_event(&mut self) -> Option<Tagged> {
        self.events_rx.recv().await
    }

    /// Apply a tagged event to the feed if it belongs to the current generation.
    pub fn handle(&mut self, tagged: Tagged) -> Outcome {
        if tagged.generation != self.generation {
            tracing::debug!(
                "Dropping event from stale generation {} (current {})",
                tagged.generation,
                self.generation
            );
            return Outcome::Stale;
        }
        let Some(room) = self.room.clone() else {
            return Outcome::Stale;
        };
        if matches!(self.state, SubscriptionState::Failed(_)) {
            return Outcome::Stale;
        }

        match tagged.event {
            BackendEvent::Changes(events) => {
                let first = self.state == SubscriptionState::Connecting;
                self.state = SubscriptionState::Live;
                let mut changed = false;
                for event in events {
                    changed |= self.feed.apply(event);
                }
                if first {
                    tracing::info!(
                        "Room '{}' loaded with {} messages",
                        room,
                        self.feed.len()
                    );
                }
                Outcome::Committed { changed, first }
            }
            BackendEvent::Malformed(reason) => {
                tracing::warn!("Room '{}': dropping malformed event: {}", room, reason);
                Outcome::Rejected(SyncError::Decode(reason))
            }
            BackendEvent::Failed(reason) => {
                tracing::warn!("Room '{}': subscription failed: {}", room, reason);
                let err = SyncError::Subscription {
                    room: room.to_string(),
                    reason,
                };
                self.cancel();
                self.state = SubscriptionState::Failed(err.clone());
                Outcome::Failed(err)
            }
        }
    }

    fn cancel(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Forward one backend stream into the shared event channel.
async fn pump(
    backend: Arc<dyn Backend>,
    room: RoomName,
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
) {
    let mut stream = match backend.subscribe(&room).await {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send(Tagged {
                generation,
                event: BackendEvent::Failed(format!("{:#}", e)),
            });
            return;
        }
    };

    while let Some(event) = stream.next().await {
        let failed = matches!(event, BackendEvent::Failed(_));
        if tx.send(Tagged { generation, event }).is_err() || failed {
            return;
        }
    }

    let _ = tx.send(Tagged {
        generation,
        event: BackendEvent::Failed("event stream ended".to_string()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::sync::FeedEvent;
    use std::time::Duration;

    fn msg(id: &str, timestamp: i64, sender: &str) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            sender_id: sender.to_string(),
            sender_name: sender.to_string(),
            text: "hello".to_string(),
            timestamp,
        }
    }

    fn room(name: &str) -> RoomName {
        RoomName::parse(name).unwrap()
    }

    /// Receive and handle events until one commits for the current generation.
    async fn pump_until_committed(sub: &mut RoomSubscription) -> Outcome {
        loop {
            let tagged = tokio::time::timeout(Duration::from_secs(1), sub.next_event())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            match sub.handle(tagged) {
                Outcome::Stale => continue,
                outcome => return outcome,
            }
        }
    }

    #[tokio::test]
    async fn test_initial_load_commits_first_batch() {
        let backend = MemoryBackend::new();
        backend.seed("general", vec![msg("2", 2000, "U2"), msg("1", 1000, "U1")]);
        let mut sub = RoomSubscription::new(backend.clone());

        assert!(sub.switch_to(room("general")));
        assert_eq!(*sub.state(), SubscriptionState::Connecting);

        let outcome = pump_until_committed(&mut sub).await;
        assert_eq!(outcome, Outcome::Committed { changed: true, first: true });
        assert_eq!(*sub.state(), SubscriptionState::Live);
        let ids: Vec<_> = sub.snapshot().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_switch_to_same_room_is_noop() {
        let backend = MemoryBackend::new();
        let mut sub = RoomSubscription::new(backend.clone());

        assert!(sub.switch_to(room("general")));
        let generation = sub.generation();
        assert!(!sub.switch_to(room(" general ")));
        assert_eq!(sub.generation(), generation);
    }

    #[tokio::test]
    async fn test_stale_generation_never_reaches_new_feed() {
        let backend = MemoryBackend::new();
        backend.seed("b", vec![msg("b1", 1000, "U2")]);
        let mut sub = RoomSubscription::new(backend.clone());

        sub.switch_to(room("a"));
        let gen_a = sub.generation();
        sub.switch_to(room("b"));
        assert!(sub.generation() > gen_a);

        // An event the old stream emitted after cancellation.
        let late = Tagged {
            generation: gen_a,
            event: BackendEvent::Changes(vec![FeedEvent::Upsert(msg("a1", 500, "U2"))]),
        };
        assert_eq!(sub.handle(late), Outcome::Stale);

        pump_until_committed(&mut sub).await;
        let ids: Vec<_> = sub.snapshot().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec!["b1"]);
    }

    #[tokio::test]
    async fn test_switch_cancels_previous_stream() {
        let backend = MemoryBackend::new();
        let mut sub = RoomSubscription::new(backend.clone());

        sub.switch_to(room("a"));
        pump_until_committed(&mut sub).await;
        assert_eq!(backend.open_streams("a"), 1);

        sub.switch_to(room("b"));
        pump_until_committed(&mut sub).await;
        tokio::task::yield_now().await;
        assert_eq!(backend.open_streams("a"), 0);
        assert_eq!(backend.open_streams("b"), 1);
    }

    #[tokio::test]
    async fn test_failure_freezes_feed_until_switch() {
        let backend = MemoryBackend::new();
        backend.seed("general", vec![msg("1", 1000, "U2")]);
        let mut sub = RoomSubscription::new(backend.clone());

        sub.switch_to(room("general"));
        pump_until_committed(&mut sub).await;

        backend.inject("general", BackendEvent::Failed("connection reset".to_string()));
        let outcome = pump_until_committed(&mut sub).await;
        assert!(matches!(outcome, Outcome::Failed(SyncError::Subscription { .. })));
        assert!(matches!(sub.state(), SubscriptionState::Failed(_)));
        assert_eq!(sub.snapshot().len(), 1);

        // Same generation, after failure: ignored.
        let late = Tagged {
            generation: sub.generation(),
            event: BackendEvent::Changes(vec![FeedEvent::Remove("1".to_string())]),
        };
        assert_eq!(sub.handle(late), Outcome::Stale);
        assert_eq!(sub.snapshot().len(), 1);

        // Re-selecting the failed room resubscribes.
        assert!(sub.switch_to(room("general")));
        let outcome = pump_until_committed(&mut sub).await;
        assert_eq!(outcome, Outcome::Committed { changed: true, first: true });
    }

    #[tokio::test]
    async fn test_refused_subscription_fails() {
        let backend = MemoryBackend::new();
        backend.refuse_subscriptions(true);
        let mut sub = RoomSubscription::new(backend.clone());

        sub.switch_to(room("secret"));
        let outcome = pump_until_committed(&mut sub).await;
        let Outcome::Failed(SyncError::Subscription { room, reason }) = outcome else {
            panic!("expected subscription failure, got {:?}", outcome);
        };
        assert_eq!(room, "secret");
        assert!(reason.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_malformed_event_is_rejected() {
        let backend = MemoryBackend::new();
        let mut sub = RoomSubscription::new(backend.clone());
        sub.switch_to(room("general"));
        pump_until_committed(&mut sub).await;

        backend.inject("general", BackendEvent::Malformed("missing timestamp".to_string()));
        let outcome = pump_until_committed(&mut sub).await;
        assert_eq!(
            outcome,
            Outcome::Rejected(SyncError::Decode("missing timestamp".to_string()))
        );
        assert_eq!(*sub.state(), SubscriptionState::Live);
    }

    #[tokio::test]
    async fn test_leave_returns_to_idle() {
        let backend = MemoryBackend::new();
        backend.seed("general", vec![msg("1", 1000, "U2")]);
        let mut sub = RoomSubscription::new(backend.clone());

        assert!(!sub.leave());
        sub.switch_to(room("general"));
        pump_until_committed(&mut sub).await;

        assert!(sub.leave());
        assert_eq!(*sub.state(), SubscriptionState::Idle);
        assert!(sub.room().is_none());
        assert!(sub.snapshot().is_empty());
    }
}
