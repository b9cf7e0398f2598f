use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::project::ProjectRole;

/// Lifecycle state of a project invitation.
/// Corresponds to the `invitation_status` SQL enum.
///
/// `Pending` is the only non-terminal state; `Accepted`, `Cancelled`, and
/// `Expired` are terminal and admit no further transitions.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Cancelled,
    Expired,
}

/// A pending, time-boxed, single-redemption offer of membership at a
/// specific role. The opaque token is the sole authorizer for both preview
/// and acceptance.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Invitation {
    pub id: i32,
    pub project_id: i32,
    pub inviter_id: i32,
    /// Target email. Acceptance requires the authenticated principal's
    /// email to match this exactly.
    pub email: String,
    pub role: ProjectRole,
    /// Unguessable URL-safe token; never logged in full.
    #[serde(skip_serializing)]
    pub token: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub accepted_by: Option<i32>,
}

impl Invitation {
    /// Whether the expiry has passed at `now`. Authoritative even when the
    /// persisted status still reads pending because the background sweep
    /// has not yet run.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// An invitation is active while it is pending and not yet expired.
    /// At most one active invitation may exist per (project, email) pair.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired(now)
    }
}
