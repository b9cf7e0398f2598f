use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A registered principal. Identity is immutable; email is the natural key
/// for lookups and is matched case-insensitively at login.
#[derive(Debug, Serialize, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    /// Stored bcrypt hash. Never serialized: the password must not leave
    /// the system in plaintext or serialized form.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
