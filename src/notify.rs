//! Local notifications for incoming messages

use std::io::Write;

/// Delivers a notification to the user. Implementations decide how (and
/// whether) it is shown.
pub trait Notifier {
    fn notify(&self, sender_name: &str, text: &str);
}

/// Rings the terminal bell and prints a one-line banner on stderr.
pub struct TerminalNotifier {
    enabled: bool,
}

impl TerminalNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, sender_name: &str, text: &str) {
        if !self.enabled {
            return;
        }
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "\x07*** New message from {}: {}", sender_name, text);
    }
}
