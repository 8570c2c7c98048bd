//! Line-oriented rendering of the feed view

use std::collections::HashSet;

use crate::models::MessageRecord;
use crate::sync::{FeedView, SubscriptionState};

/// One printable line for a message: `[HH:MM] name: text`.
pub fn format_line(message: &MessageRecord, own_user_id: &str) -> String {
    let time = message
        .sent_at()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let name = if message.sender_id == own_user_id {
        "you"
    } else if message.sender_name.is_empty() {
        "?"
    } else {
        message.sender_name.as_str()
    };
    format!("[{}] {}: {}", time, name, message.text)
}

/// Tracks what has been printed so each view update only prints new lines.
///
/// Late messages that sort before already printed ones are printed when they
/// arrive, not re-threaded into place.
pub struct FeedPrinter {
    own_user_id: String,
    generation: u64,
    loaded: bool,
    printed: HashSet<String>,
}

impl FeedPrinter {
    pub fn new(own_user_id: impl Into<String>) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            generation: 0,
            loaded: false,
            printed: HashSet::new(),
        }
    }

    /// Lines to print for `view`, given everything printed before.
    pub fn render(&mut self, view: &FeedView) -> Vec<String> {
        let mut lines = Vec::new();

        if view.generation != self.generation {
            self.generation = view.generation;
            self.loaded = false;
            self.printed.clear();
            match view.room {
                Some(ref room) => lines.push(format!("-- room: {} --", room)),
                None => lines.push("-- left room; /room <name> to join one --".to_string()),
            }
        }

        if view.state == SubscriptionState::Live && !self.loaded {
            self.loaded = true;
            if view.messages.is_empty() {
                lines.push("(no messages yet)".to_string());
            }
        }

        for message in view.messages.iter() {
            if self.printed.insert(message.id.clone()) {
                lines.push(format_line(message, &self.own_user_id));
            }
        }
        lines
    }
}
