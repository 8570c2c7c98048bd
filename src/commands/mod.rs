//! CLI commands that talk to the database

mod interactive;
mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::auth;
use crate::backend::rtdb::RealtimeDb;
use crate::backend::Backend;
use crate::config::Config;
use crate::models::{OutgoingMessage, RoomName};
use crate::sync::{ChatSession, Profile, SubscriptionState};

/// How long `read` waits for the initial load of a room.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings changes requested by `roomchat config`.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    pub display_name: Option<String>,
    pub notifications: Option<bool>,
    pub history_limit: Option<usize>,
}

impl ConfigUpdate {
    fn is_empty(&self) -> bool {
        self.database_url.is_none()
            && self.api_key.is_none()
            && self.display_name.is_none()
            && self.notifications.is_none()
            && self.history_limit.is_none()
    }

    fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(url) = self.database_url {
            url::Url::parse(url.trim())
                .with_context(|| format!("Invalid database URL '{}'", url))?;
            config.database_url = Some(url.trim().to_string());
        }
        if let Some(key) = self.api_key {
            config.api_key = Some(key.trim().to_string());
        }
        if let Some(name) = self.display_name {
            let name = name.trim();
            config.display_name = (!name.is_empty()).then(|| name.to_string());
        }
        if let Some(enabled) = self.notifications {
            config.notifications = enabled;
        }
        if let Some(limit) = self.history_limit {
            if limit == 0 {
                bail!("History limit must be at least 1");
            }
            config.history_limit = limit;
        }
        Ok(())
    }
}

/// Update settings, or print them when nothing was given.
pub async fn configure(update: ConfigUpdate) -> Result<()> {
    let mut config = Config::load()?;

    if update.is_empty() {
        println!(
            "database_url  = {}",
            config.database_url.as_deref().unwrap_or("(not set)")
        );
        println!(
            "api_key       = {}",
            if config.api_key.is_some() { "(set)" } else { "(not set)" }
        );
        println!(
            "display_name  = {}",
            config.display_name.as_deref().unwrap_or("(default)")
        );
        println!(
            "notifications = {}",
            if config.notifications { "on" } else { "off" }
        );
        println!("history_limit = {}", config.history_limit);
        return Ok(());
    }

    update.apply(&mut config)?;
    config.save()?;
    println!("Configuration saved.");
    Ok(())
}

/// Everything needed to talk to the database as the signed-in user.
struct Connection {
    db: RealtimeDb,
    profile: Profile,
    notifications: bool,
}

impl Connection {
    async fn open() -> Result<Self> {
        let identity = auth::current_identity().await?;
        let config = Config::load()?;

        let db = RealtimeDb::new(
            config.database_url()?,
            identity.id_token,
            config.history_limit,
        );
        let profile = Profile {
            display_name: config.display_name_for(&identity.user_id),
            user_id: identity.user_id,
        };
        Ok(Self {
            db,
            profile,
            notifications: config.notifications,
        })
    }

    fn session(self) -> ChatSession {
        ChatSession::start(Arc::new(self.db), self.profile)
    }
}

/// List rooms that have messages.
pub async fn list_rooms() -> Result<()> {
    let conn = Connection::open().await?;
    let rooms = conn.db.list_rooms().await?;

    println!("\nRooms:");
    println!("{:-<40}", "");

    if rooms.is_empty() {
        println!("  (no rooms yet; `roomchat chat <name>` creates one)");
        return Ok(());
    }
    for room in &rooms {
        println!("  {}", room);
    }
    Ok(())
}

/// Print the most recent messages of a room and exit.
pub async fn read_room(room: &str) -> Result<()> {
    let room = RoomName::parse(room)?;
    let conn = Connection::open().await?;
    let own_user_id = conn.profile.user_id.clone();

    let session = conn.session();
    session.switch_room(room.as_str())?;

    let mut view = session.observe();
    let loaded = tokio::time::timeout(
        READ_TIMEOUT,
        view.wait_for(|v| matches!(v.state, SubscriptionState::Live | SubscriptionState::Failed(_))),
    )
    .await
    .with_context(|| format!("Timed out loading room '{}'", room))?
    .context("Chat session stopped")?
    .state
    .clone();

    if let SubscriptionState::Failed(e) = loaded {
        bail!("{}", e);
    }

    let messages = session.snapshot();
    if messages.is_empty() {
        println!("(no messages)");
        return Ok(());
    }
    for message in messages.iter() {
        println!("{}", render::format_line(message, &own_user_id));
    }
    Ok(())
}

/// Post one message to a room.
pub async fn send_message(room: &str, text: &str) -> Result<()> {
    let room = RoomName::parse(room)?;
    let conn = Connection::open().await?;
    let message = OutgoingMessage::new(
        &conn.profile.user_id,
        &conn.profile.display_name,
        text,
    )?;

    let id = conn.db.write(&room, &message).await?;
    tracing::debug!("Message {} written to room {}", id, room);
    println!("Message sent.");
    Ok(())
}

/// Join `room` and chat interactively.
pub async fn chat(room: &str) -> Result<()> {
    RoomName::parse(room)?;
    let conn = Connection::open().await?;
    let notifications = conn.notifications;
    interactive::run(conn.session(), room, notifications).await
}
