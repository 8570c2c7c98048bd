//! Chat session: the surface the presentation layer talks to
//!
//! Uses an mpsc channel pair, like a small actor. The handle sends `Command`
//! values; a background tokio task owns the subscription, feed and detector,
//! multiplexes commands with backend events, publishes the ordered view on a
//! `watch` channel and pushes `SessionEvent`s back.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::detector::NewMessageDetector;
use super::subscription::{Outcome, RoomSubscription, SubscriptionState, Tagged};
use super::SyncError;
use crate::backend::Backend;
use crate::models::{MessageRecord, OutgoingMessage, RoomName};

/// Who is using this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
}

/// The continuously updated read side of a session.
#[derive(Debug, Clone)]
pub struct FeedView {
    pub room: Option<RoomName>,
    /// Changes whenever the feed is replaced (room switch or leave).
    pub generation: u64,
    pub state: SubscriptionState,
    pub messages: Arc<Vec<MessageRecord>>,
}

impl FeedView {
    fn empty() -> Self {
        Self {
            room: None,
            generation: 0,
            state: SubscriptionState::Idle,
            messages: Arc::new(Vec::new()),
        }
    }
}

/// Pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A message from someone else arrived at the tail of the feed. Emitted
    /// at most once per message id per room session.
    NewMessage(MessageRecord),
    Error(SyncError),
}

enum Command {
    SwitchRoom(RoomName),
    LeaveRoom,
    Send(OutgoingMessage),
    Acknowledge(String),
}

/// Handle to a running chat session. Dropping it stops the session task.
pub struct ChatSession {
    profile: Profile,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<FeedView>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ChatSession {
    /// Start the session task. Must be called inside a tokio runtime.
    pub fn start(backend: Arc<dyn Backend>, profile: Profile) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(FeedView::empty());

        let core = SessionCore {
            subscription: RoomSubscription::new(Arc::clone(&backend)),
            detector: NewMessageDetector::new(profile.user_id.clone()),
            backend,
            view: view_tx,
            events: event_tx,
        };
        tokio::spawn(session_loop(core, cmd_rx));

        Self {
            profile,
            commands: cmd_tx,
            view: view_rx,
            events: event_rx,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Subscribe to `name`, replacing the current room. Re-selecting the
    /// active room is a no-op unless its subscription failed.
    pub fn switch_room(&self, name: &str) -> Result<(), SyncError> {
        let room = RoomName::parse(name)?;
        self.dispatch(Command::SwitchRoom(room));
        Ok(())
    }

    pub fn leave_room(&self) {
        self.dispatch(Command::LeaveRoom);
    }

    /// Send `text` to the active room as this session's user.
    pub fn send(&self, text: &str) -> Result<(), SyncError> {
        self.send_as(&self.profile.user_id, &self.profile.display_name, text)
    }

    /// Send `text` to the active room.
    ///
    /// Blank text is rejected here, before anything reaches the backend.
    /// Delivery is fire-and-forget: a backend failure arrives later as
    /// `SessionEvent::Error(SyncError::Write { .. })`, and the message only
    /// shows up in the view once the backend streams it back.
    pub fn send_as(&self, sender_id: &str, sender_name: &str, text: &str) -> Result<(), SyncError> {
        let message = OutgoingMessage::new(sender_id, sender_name, text)?;
        self.dispatch(Command::Send(message));
        Ok(())
    }

    /// Tell the detector that a `NewMessage` was surfaced to the user.
    pub fn acknowledge_notified(&self, id: &str) {
        self.dispatch(Command::Acknowledge(id.to_string()));
    }

    /// A receiver that is updated on every committed change of the feed.
    pub fn observe(&self) -> watch::Receiver<FeedView> {
        self.view.clone()
    }

    /// The current ordered messages.
    pub fn snapshot(&self) -> Arc<Vec<MessageRecord>> {
        Arc::clone(&self.view.borrow().messages)
    }

    /// Wait for the next session event. Returns `None` once the session
    /// task has stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Return a pending session event without waiting.
    #[cfg(test)]
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    fn dispatch(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            tracing::error!("Session task stopped -- command dropped");
        }
    }
}

/// State owned by the session task.
struct SessionCore {
    backend: Arc<dyn Backend>,
    subscription: RoomSubscription,
    detector: NewMessageDetector,
    view: watch::Sender<FeedView>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

async fn session_loop(mut core: SessionCore, mut commands: mpsc::UnboundedReceiver<Command>) {
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(cmd) => core.handle_command(cmd),
                None => break,
            },
            Some(tagged) = core.subscription.next_event() => core.handle_event(tagged),
        }
    }
    tracing::debug!("Chat session closed");
}

impl SessionCore {
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SwitchRoom(room) => {
                if self.subscription.switch_to(room) {
                    self.detector.reset();
                    self.publish();
                }
            }
            Command::LeaveRoom => {
                if self.subscription.leave() {
                    self.detector.reset();
                    self.publish();
                }
            }
            Command::Send(message) => self.send(message),
            Command::Acknowledge(id) => self.detector.mark_notified(&id),
        }
    }

    fn handle_event(&mut self, tagged: Tagged) {
        match self.subscription.handle(tagged) {
            Outcome::Stale => {}
            Outcome::Committed { changed, first } => {
                if changed || first {
                    self.publish();
                }
                let snapshot = self.subscription.snapshot();
                if let Some(message) = self.detector.observe(&snapshot) {
                    tracing::debug!("New message {} from {}", message.id, message.sender_name);
                    self.emit(SessionEvent::NewMessage(message));
                }
            }
            Outcome::Rejected(err) => self.emit(SessionEvent::Error(err)),
            Outcome::Failed(err) => {
                self.publish();
                self.emit(SessionEvent::Error(err));
            }
        }
    }

    fn send(&self, message: OutgoingMessage) {
        let Some(room) = self.subscription.room().cloned() else {
            self.emit(SessionEvent::Error(SyncError::Validation(
                "no active room to send to".to_string(),
            )));
            return;
        };

        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        tokio::spawn(async move {
            match backend.write(&room, &message).await {
                Ok(id) => tracing::debug!("Message {} written to room '{}'", id, room),
                Err(e) => {
                    let err = SyncError::Write {
                        room: room.to_string(),
                        reason: format!("{:#}", e),
                    };
                    tracing::warn!("{}", err);
                    let _ = events.send(SessionEvent::Error(err));
                }
            }
        });
    }

    fn publish(&self) {
        self.view.send_replace(FeedView {
            room: self.subscription.room().cloned(),
            generation: self.subscription.generation(),
            state: self.subscription.state().clone(),
            messages: self.subscription.snapshot(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Session handle dropped -- event discarded");
        }
    }
}
