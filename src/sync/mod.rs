//! Room-scoped message stream synchronizer
//!
//! Keeps one ordered, deduplicated view of the active room's messages,
//! decides which incoming messages deserve a notification, and exposes both
//! to the presentation layer through [`ChatSession`].

mod detector;
mod error;
mod feed;
mod session;
mod subscription;

pub use error::SyncError;
pub use feed::FeedEvent;
pub use session::{ChatSession, FeedView, Profile, SessionEvent};
pub use subscription::SubscriptionState;
