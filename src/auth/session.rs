//!
//! # Refresh sessions
//!
//! Persists the longer-lived opaque credential used solely to obtain new
//! access tokens. Invariant: at most one live refresh session per user,
//! enforced by a unique constraint on `refresh_sessions.user_id` rather than
//! any in-process lock, so the invariant holds across server instances.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::auth::generate_opaque_token;
use crate::error::AppError;

/// A persisted refresh session row.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshSession {
    pub id: i32,
    pub user_id: i32,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Store for refresh sessions, one live session per user.
///
/// Refresh endpoints reissue the access token only; the refresh session
/// itself is replaced only on a fresh login. This is a known weaker point
/// compared to rotate-on-use schemes (see DESIGN.md).
pub struct RefreshSessionStore {
    pool: PgPool,
    ttl: chrono::Duration,
}

impl RefreshSessionStore {
    pub fn new(pool: PgPool, ttl_days: i64) -> Self {
        Self {
            pool,
            ttl: chrono::Duration::days(ttl_days),
        }
    }

    /// Creates a new session for the user, replacing any existing one.
    ///
    /// The replace is a single upsert against the unique `user_id`
    /// constraint, so two concurrent logins for the same user cannot leave
    /// two live sessions.
    pub async fn create_session(&self, user_id: i32) -> Result<RefreshSession, AppError> {
        let token = generate_opaque_token();
        let expires_at = Utc::now() + self.ttl;

        let session = sqlx::query_as::<_, RefreshSession>(
            "INSERT INTO refresh_sessions (user_id, token, expires_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (user_id)
             DO UPDATE SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
             RETURNING id, user_id, token, expires_at",
        )
        .bind(user_id)
        .bind(&token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<RefreshSession>, AppError> {
        let session = sqlx::query_as::<_, RefreshSession>(
            "SELECT id, user_id, token, expires_at FROM refresh_sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Checks the session against the clock. An expired session found here
    /// is deleted on the spot, so no dangling expired rows survive a
    /// verification attempt.
    pub async fn verify_not_expired(
        &self,
        session: RefreshSession,
    ) -> Result<RefreshSession, AppError> {
        if session.expires_at < Utc::now() {
            self.delete_by_token(&session.token).await?;
            return Err(AppError::ExpiredCredential);
        }
        Ok(session)
    }

    /// Idempotent: deleting a non-existent session is not an error.
    pub async fn delete_by_user(&self, user_id: i32) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Idempotent: deleting a non-existent session is not an error.
    pub async fn delete_by_token(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM refresh_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
