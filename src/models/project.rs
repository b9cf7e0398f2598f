use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A member's role within a project.
/// Corresponds to the `project_role` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "project_role", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectRole {
    /// Full control, including membership management. Every project with
    /// members must retain at least one admin.
    Admin,
    /// Can work on the project's contents.
    Member,
    /// Read-only access.
    Observer,
}

impl ProjectRole {
    /// French display label for this role, used in invitation previews and
    /// notification emails. Total over the closed set of roles.
    pub fn display_label(&self) -> &'static str {
        match self {
            ProjectRole::Admin => "Administrateur",
            ProjectRole::Member => "Membre",
            ProjectRole::Observer => "Observateur",
        }
    }
}

/// A project entity as stored in the database and returned by the API.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i32,
    /// Globally unique name.
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// Input structure for creating a project.
#[derive(Debug, Deserialize, Validate)]
pub struct ProjectInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
}

/// The (project, user, role) authorization fact.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ProjectMember {
    pub id: i32,
    pub project_id: i32,
    pub user_id: i32,
    pub role: ProjectRole,
}
