//!
//! # Project membership authorization
//!
//! Role-based permission checks over the (project, user, role) relation and
//! the mutations that preserve its one invariant: a project with any members
//! must always retain at least one admin. The last-admin guard reads the
//! admin count and applies the mutation inside a single transaction with the
//! project's membership rows locked, so two concurrent demotions cannot both
//! observe "not the last admin".

use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::error::AppError;
use crate::models::{ProjectMember, ProjectRole};

/// A roster entry with the member's identity joined in.
#[derive(Debug, Serialize, FromRow)]
pub struct MemberInfo {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub role: ProjectRole,
}

/// Evaluates role-based permission checks against a project's membership
/// roster.
pub struct MembershipAuthorizer {
    pool: PgPool,
}

impl MembershipAuthorizer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pure predicate: does the user hold the admin role on the project?
    pub async fn is_admin(&self, project_id: i32, user_id: i32) -> Result<bool, AppError> {
        Ok(self.member_role(project_id, user_id).await? == Some(ProjectRole::Admin))
    }

    /// Pure predicate: does the user hold any membership in the project?
    pub async fn is_member(&self, project_id: i32, user_id: i32) -> Result<bool, AppError> {
        Ok(self.member_role(project_id, user_id).await?.is_some())
    }

    pub async fn member_role(
        &self,
        project_id: i32,
        user_id: i32,
    ) -> Result<Option<ProjectRole>, AppError> {
        let role = sqlx::query_as::<_, (ProjectRole,)>(
            "SELECT role FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role.map(|(r,)| r))
    }

    /// Adds a new member. Used by direct-invite flows; invitation acceptance
    /// reaches the same insert through [`insert_member`] inside its own
    /// transaction.
    pub async fn add_member(
        &self,
        project_id: i32,
        user_id: i32,
        role: ProjectRole,
    ) -> Result<ProjectMember, AppError> {
        let mut tx = self.pool.begin().await?;
        let member = insert_member(&mut tx, project_id, user_id, role).await?;
        tx.commit().await?;
        Ok(member)
    }

    /// Updates a member's role, rejecting any demotion that would leave the
    /// project without an admin.
    pub async fn change_role(
        &self,
        project_id: i32,
        target_user_id: i32,
        new_role: ProjectRole,
    ) -> Result<ProjectMember, AppError> {
        let mut tx = self.pool.begin().await?;

        let target = lock_and_find(&mut tx, project_id, target_user_id).await?;

        if target.role == ProjectRole::Admin && new_role != ProjectRole::Admin {
            guard_last_admin(&mut tx, project_id).await?;
        }

        let updated = sqlx::query_as::<_, ProjectMember>(
            "UPDATE project_members SET role = $1
             WHERE project_id = $2 AND user_id = $3
             RETURNING id, project_id, user_id, role",
        )
        .bind(new_role)
        .bind(project_id)
        .bind(target_user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Removes a member, with the same last-admin guard as [`change_role`]
    /// generalized to removal.
    pub async fn remove_member(
        &self,
        project_id: i32,
        target_user_id: i32,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let target = lock_and_find(&mut tx, project_id, target_user_id).await?;

        if target.role == ProjectRole::Admin {
            guard_last_admin(&mut tx, project_id).await?;
        }

        sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(target_user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_members(&self, project_id: i32) -> Result<Vec<MemberInfo>, AppError> {
        let members = sqlx::query_as::<_, MemberInfo>(
            "SELECT m.user_id, u.username, u.email, m.role
             FROM project_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.project_id = $1
             ORDER BY u.username",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }
}

/// Locks the project's membership rows and returns the target membership.
/// The row locks serialize concurrent last-admin checks on the same project.
async fn lock_and_find(
    tx: &mut PgConnection,
    project_id: i32,
    user_id: i32,
) -> Result<ProjectMember, AppError> {
    sqlx::query("SELECT id FROM project_members WHERE project_id = $1 FOR UPDATE")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query_as::<_, ProjectMember>(
        "SELECT id, project_id, user_id, role
         FROM project_members WHERE project_id = $1 AND user_id = $2",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Member not found".into()))
}

/// Fails with `LastAdminViolation` when the project has exactly one admin.
/// Must run after [`lock_and_find`] so the count is read under the row locks.
async fn guard_last_admin(tx: &mut PgConnection, project_id: i32) -> Result<(), AppError> {
    let (admins,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM project_members WHERE project_id = $1 AND role = 'admin'",
    )
    .bind(project_id)
    .fetch_one(&mut *tx)
    .await?;

    if admins <= 1 {
        return Err(AppError::LastAdminViolation);
    }
    Ok(())
}

/// Inserts a membership row, rejecting duplicates with `AlreadyMember`.
/// Shared by direct member addition and invitation acceptance so both paths
/// hit the same uniqueness constraint.
pub(crate) async fn insert_member(
    tx: &mut PgConnection,
    project_id: i32,
    user_id: i32,
    role: ProjectRole,
) -> Result<ProjectMember, AppError> {
    let existing: Option<(i32,)> = sqlx::query_as(
        "SELECT id FROM project_members WHERE project_id = $1 AND user_id = $2",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    if existing.is_some() {
        return Err(AppError::AlreadyMember);
    }

    let member = sqlx::query_as::<_, ProjectMember>(
        "INSERT INTO project_members (project_id, user_id, role)
         VALUES ($1, $2, $3)
         RETURNING id, project_id, user_id, role",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role)
    .fetch_one(&mut *tx)
    .await?;

    Ok(member)
}
