//!
//! # Invitation lifecycle
//!
//! Manages project-membership invitations through their state machine:
//! `PENDING -> {ACCEPTED, CANCELLED, EXPIRED}`, all three terminal. Every
//! multi-step transition (supersede-then-insert on create, check-then-accept
//! plus membership insert on accept) runs inside one transaction, and the
//! accepted row is taken `FOR UPDATE` so a race with the expiry sweep is
//! resolved by the lazy clock check here, which is authoritative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::auth::generate_opaque_token;
use crate::error::AppError;
use crate::membership::insert_member;
use crate::models::{Invitation, InvitationStatus, ProjectMember, ProjectRole};

/// Unauthenticated invitation details shown on the accept page.
#[derive(Debug, Serialize)]
pub struct InvitationPreview {
    pub project_id: i32,
    pub project_name: String,
    pub project_description: Option<String>,
    /// French display label for the offered role.
    pub role: String,
    pub inviter_name: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PreviewRow {
    project_id: i32,
    project_name: String,
    project_description: Option<String>,
    role: ProjectRole,
    inviter_name: String,
    email: String,
    status: InvitationStatus,
    expires_at: DateTime<Utc>,
}

/// Manages the lifecycle of project-membership invitations.
pub struct InvitationRegistry {
    pool: PgPool,
    ttl: chrono::Duration,
}

impl InvitationRegistry {
    pub fn new(pool: PgPool, ttl_days: i64) -> Self {
        Self {
            pool,
            ttl: chrono::Duration::days(ttl_days),
        }
    }

    /// Creates a new pending invitation for `(project_id, email)`.
    ///
    /// Preconditions enforced in one transaction: the inviter holds the
    /// admin role, and the target email does not already belong to a member.
    /// Any prior active invitation for the same pair is superseded
    /// (cancelled) before the new row is inserted; a pending row whose
    /// expiry has already passed is flipped to expired instead. The
    /// at-most-one-pending invariant itself is carried by the unique
    /// partial index on `(project_id, email) WHERE status = 'pending'`.
    pub async fn create(
        &self,
        project_id: i32,
        email: &str,
        role: ProjectRole,
        inviter_id: i32,
    ) -> Result<Invitation, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inviter_role: Option<(ProjectRole,)> = sqlx::query_as(
            "SELECT role FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(inviter_id)
        .fetch_optional(&mut *tx)
        .await?;

        if inviter_role.map(|(r,)| r) != Some(ProjectRole::Admin) {
            return Err(AppError::Forbidden("Only admins can invite members".into()));
        }

        // An existing account with this email must not already be a member.
        let member_with_email: Option<(i32,)> = sqlx::query_as(
            "SELECT m.id FROM project_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.project_id = $1 AND lower(u.email) = lower($2)",
        )
        .bind(project_id)
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        if member_with_email.is_some() {
            return Err(AppError::AlreadyMember);
        }

        // A pending row past its expiry is dead but still occupies the
        // unique pending slot for the pair; flip it before superseding.
        sqlx::query(
            "UPDATE project_invitations SET status = 'expired'
             WHERE project_id = $1 AND email = $2 AND status = 'pending' AND expires_at <= $3",
        )
        .bind(project_id)
        .bind(email)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Supersede: a new invitation implicitly cancels any prior active
        // one for the same (project, email) pair.
        let superseded = sqlx::query(
            "UPDATE project_invitations SET status = 'cancelled'
             WHERE project_id = $1 AND email = $2 AND status = 'pending'",
        )
        .bind(project_id)
        .bind(email)
        .execute(&mut *tx)
        .await?;

        if superseded.rows_affected() > 0 {
            log::info!(
                "Superseded {} active invitation(s) for {} on project {}",
                superseded.rows_affected(),
                email,
                project_id
            );
        }

        let invitation = sqlx::query_as::<_, Invitation>(
            "INSERT INTO project_invitations
                 (project_id, inviter_id, email, role, token, status, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
             RETURNING id, project_id, inviter_id, email, role, token, status,
                       created_at, expires_at, accepted_at, accepted_by",
        )
        .bind(project_id)
        .bind(inviter_id)
        .bind(email)
        .bind(role)
        .bind(generate_opaque_token())
        .bind(now)
        .bind(now + self.ttl)
        .fetch_one(&mut *tx)
        .await
        // A concurrent create for the same pair that committed first holds
        // the unique pending slot; surface that as a conflict, not a 500.
        .map_err(|e| {
            AppError::on_unique_violation(
                e,
                AppError::BadRequest("An invitation for this email is already pending".into()),
            )
        })?;

        tx.commit().await?;

        log::info!(
            "Created invitation {} for {} to project {} with role {:?}",
            invitation.id,
            email,
            project_id,
            role
        );

        Ok(invitation)
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<Invitation>, AppError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            "SELECT id, project_id, inviter_id, email, role, token, status,
                    created_at, expires_at, accepted_at, accepted_by
             FROM project_invitations WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invitation)
    }

    /// Accepts the invitation identified by `token` on behalf of the
    /// authenticated user, atomically transitioning it to ACCEPTED and
    /// creating the corresponding membership.
    ///
    /// The expiry check is lazy: a pending invitation whose `expires_at`
    /// has passed fails with `InvitationExpired` even when the sweep has
    /// not yet flipped its persisted status (the row is flipped here).
    pub async fn accept(
        &self,
        token: &str,
        user_id: i32,
        user_email: &str,
    ) -> Result<(Invitation, ProjectMember), AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let invitation = sqlx::query_as::<_, Invitation>(
            "SELECT id, project_id, inviter_id, email, role, token, status,
                    created_at, expires_at, accepted_at, accepted_by
             FROM project_invitations WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::InvitationNotFound)?;

        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::InvitationNotPending);
        }

        if invitation.is_expired(now) {
            // The sweep has not flipped this row yet; do it now so the
            // terminal state is persisted, then fail the acceptance.
            sqlx::query("UPDATE project_invitations SET status = 'expired' WHERE id = $1")
                .bind(invitation.id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Err(AppError::InvitationExpired);
        }

        // A different authenticated user must not redeem someone else's
        // invitation token.
        if invitation.email != user_email {
            return Err(AppError::EmailMismatch);
        }

        let member = insert_member(&mut tx, invitation.project_id, user_id, invitation.role).await?;

        let accepted = sqlx::query_as::<_, Invitation>(
            "UPDATE project_invitations
             SET status = 'accepted', accepted_at = $1, accepted_by = $2
             WHERE id = $3
             RETURNING id, project_id, inviter_id, email, role, token, status,
                       created_at, expires_at, accepted_at, accepted_by",
        )
        .bind(now)
        .bind(user_id)
        .bind(invitation.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        log::info!(
            "User {} accepted invitation {} to project {} with role {:?}",
            user_id,
            accepted.id,
            accepted.project_id,
            accepted.role
        );

        Ok((accepted, member))
    }

    /// Cancels a pending invitation. The canceller must be an admin of the
    /// invitation's project.
    pub async fn cancel(&self, invitation_id: i32, canceller_id: i32) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let invitation = sqlx::query_as::<_, Invitation>(
            "SELECT id, project_id, inviter_id, email, role, token, status,
                    created_at, expires_at, accepted_at, accepted_by
             FROM project_invitations WHERE id = $1 FOR UPDATE",
        )
        .bind(invitation_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::InvitationNotFound)?;

        let canceller_role: Option<(ProjectRole,)> = sqlx::query_as(
            "SELECT role FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(invitation.project_id)
        .bind(canceller_id)
        .fetch_optional(&mut *tx)
        .await?;

        if canceller_role.map(|(r,)| r) != Some(ProjectRole::Admin) {
            return Err(AppError::Forbidden(
                "Only admins can cancel invitations".into(),
            ));
        }

        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::InvitationNotPending);
        }

        sqlx::query("UPDATE project_invitations SET status = 'cancelled' WHERE id = $1")
            .bind(invitation.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!(
            "Invitation {} cancelled by user {}",
            invitation.id,
            canceller_id
        );

        Ok(())
    }

    /// Unauthenticated preview for the accept page. Fails the same way
    /// `accept` does for missing, expired, or terminal invitations, but
    /// performs no mutation.
    pub async fn preview(&self, token: &str) -> Result<InvitationPreview, AppError> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, PreviewRow>(
            "SELECT i.project_id, p.name AS project_name,
                    p.description AS project_description,
                    i.role, u.username AS inviter_name, i.email, i.status,
                    i.expires_at
             FROM project_invitations i
             JOIN projects p ON p.id = i.project_id
             JOIN users u ON u.id = i.inviter_id
             WHERE i.token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::InvitationNotFound)?;

        if row.status != InvitationStatus::Pending {
            return Err(AppError::InvitationNotPending);
        }
        if row.expires_at < now {
            return Err(AppError::InvitationExpired);
        }

        Ok(InvitationPreview {
            project_id: row.project_id,
            project_name: row.project_name,
            project_description: row.project_description,
            role: row.role.display_label().to_string(),
            inviter_name: row.inviter_name,
            email: row.email,
            expires_at: row.expires_at,
        })
    }

    /// All invitations ever issued for a project, newest first.
    pub async fn list_for_project(&self, project_id: i32) -> Result<Vec<Invitation>, AppError> {
        let invitations = sqlx::query_as::<_, Invitation>(
            "SELECT id, project_id, inviter_id, email, role, token, status,
                    created_at, expires_at, accepted_at, accepted_by
             FROM project_invitations WHERE project_id = $1
             ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(invitations)
    }

    /// Batch-transitions every pending invitation past its expiry to
    /// EXPIRED. Idempotent and safe to run concurrently with `accept`:
    /// the lazy check there is authoritative for any row both observe.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE project_invitations SET status = 'expired'
             WHERE status = 'pending' AND expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            log::info!("Expired {} old invitation(s)", count);
        }
        Ok(count)
    }
}
