//! Authentication
//!
//! Signs the user in anonymously through the Identity Toolkit REST API and
//! keeps the resulting id token fresh. The rest of the client only sees the
//! opaque user id and the token sent along with database requests.

pub mod anonymous;
pub mod tokens;

pub use anonymous::{current_identity, login, logout, status};
pub use tokens::{StoredToken, TokenStore};

/// The signed-in user as seen by the rest of the client.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub id_token: String,
}
