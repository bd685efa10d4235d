//! Domain model structs persisted in the SQLite database.
//!
//! Messages are stored exactly as they travel over the wire, so the
//! shared [`Message`] type is reused. Users carry a credential column that
//! the wire type deliberately lacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use parley_shared::protocol::{Message, UserProfile};
pub use parley_shared::types::{MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Avatar reference.
    pub profile_pic: Option<String>,
    /// Opaque hash produced by the account service.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The client-facing view, without the password hash.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            profile_pic: self.profile_pic.clone(),
            created_at: self.created_at,
        }
    }
}

/// Input for [`Database::insert_user`](crate::Database::insert_user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub profile_pic: Option<String>,
    pub password_hash: String,
}
