//! roomchat - terminal client for realtime chat rooms
//!
//! Anonymous users join named rooms backed by a Firebase Realtime Database
//! and see messages as they arrive.

mod auth;
mod backend;
mod commands;
mod config;
mod models;
mod notify;
mod sync;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "roomchat")]
#[command(about = "Realtime chat rooms in the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in anonymously
    Login {
        /// Create a new anonymous account even if one is cached
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current sign-in status
    Status,

    /// Show or change settings
    Config {
        /// Realtime Database URL, e.g. https://my-app-default-rtdb.firebaseio.com
        #[arg(long)]
        database_url: Option<String>,

        /// Web API key for anonymous sign-in
        #[arg(long)]
        api_key: Option<String>,

        /// Display name shown with your messages (empty resets to default)
        #[arg(long)]
        name: Option<String>,

        /// Terminal notifications for incoming messages
        #[arg(long, value_enum)]
        notifications: Option<Toggle>,

        /// Number of recent messages loaded when joining a room
        #[arg(long)]
        history: Option<usize>,
    },

    /// List rooms
    Rooms,

    /// Print recent messages from a room
    Read {
        /// Room name
        room: String,
    },

    /// Send a message
    Send {
        /// Room name
        #[arg(short, long)]
        room: String,

        /// Message text
        message: String,
    },

    /// Join a room and chat interactively
    Chat {
        /// Room to join first
        #[arg(default_value = "general")]
        room: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Login { force } => {
            tracing::info!("Starting anonymous sign-in...");
            auth::login(force).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Config {
            database_url,
            api_key,
            name,
            notifications,
            history,
        } => {
            commands::configure(commands::ConfigUpdate {
                database_url,
                api_key,
                display_name: name,
                notifications: notifications.map(|t| matches!(t, Toggle::On)),
                history_limit: history,
            })
            .await?;
        }
        Commands::Rooms => {
            commands::list_rooms().await?;
        }
        Commands::Read { room } => {
            commands::read_room(&room).await?;
        }
        Commands::Send { room, message } => {
            tracing::info!("Sending message...");
            commands::send_message(&room, &message).await?;
        }
        Commands::Chat { room } => {
            commands::chat(&room).await?;
        }
    }

    Ok(())
}
