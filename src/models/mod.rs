//! Data models for rooms and messages

mod message;
mod room;

pub use message::*;
pub use room::*;
