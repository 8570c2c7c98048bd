//! Interactive chat: stdin lines in, feed updates and notifications out

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::render::FeedPrinter;
use crate::models::MessageRecord;
use crate::notify::{Notifier, TerminalNotifier};
use crate::sync::{ChatSession, SessionEvent};

/// What a line typed by the user asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message(String),
    Switch(String),
    Leave,
    Help,
    Quit,
    Empty,
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    if !trimmed.starts_with('/') {
        return Input::Message(line.trim_end_matches(['\r', '\n']).to_string());
    }

    let (cmd, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (trimmed, ""),
    };
    match cmd {
        "/quit" | "/exit" => Input::Quit,
        "/leave" => Input::Leave,
        "/room" | "/join" if !arg.is_empty() => Input::Switch(arg.to_string()),
        _ => Input::Help,
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /room <name>   switch to (or create) a room");
    println!("  /leave         leave the current room");
    println!("  /quit          exit");
    println!("Anything else is sent as a message.");
}

/// Surface a new message and tell the session it was shown.
fn notify_and_acknowledge(session: &ChatSession, notifier: &dyn Notifier, message: &MessageRecord) {
    notifier.notify(&message.sender_name, &message.text);
    session.acknowledge_notified(&message.id);
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run(mut session: ChatSession, room: &str, notifications: bool) -> Result<()> {
    session.switch_room(room)?;

    let notifier = TerminalNotifier::new(notifications);
    let mut printer = FeedPrinter::new(session.profile().user_id.clone());
    let mut view = session.observe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Chatting as {}. Type /help for commands.",
        session.profile().display_name
    );

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_input(&line) {
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Help => print_help(),
                    Input::Leave => session.leave_room(),
                    Input::Switch(name) => {
                        if let Err(e) = session.switch_room(&name) {
                            eprintln!("error: {}", e);
                        }
                    }
                    Input::Message(text) => {
                        if let Err(e) = session.send(&text) {
                            eprintln!("error: {}", e);
                        }
                    }
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                for line in printer.render(&current) {
                    println!("{}", line);
                }
            }
            event = session.next_event() => match event {
                Some(SessionEvent::NewMessage(message)) => {
                    notify_and_acknowledge(&session, &notifier, &message);
                }
                Some(SessionEvent::Error(e)) => eprintln!("error: {}", e),
                None => break,
            },
        }
    }

    tracing::debug!("Leaving interactive chat");
    Ok(())
}
