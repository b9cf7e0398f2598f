use crate::{
    auth::CurrentUser,
    error::AppError,
    membership::MembershipAuthorizer,
    models::{Project, ProjectInput, ProjectRole},
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: ProjectRole,
}

#[derive(Debug, Deserialize)]
pub struct DeleteConfirmation {
    /// Must match the project's name exactly; a typo-proofing step before
    /// an irreversible cascade.
    pub confirmation_name: String,
}

/// Creates a project with a globally unique name. The creator becomes its
/// first admin and a default settings row is initialized, all in one
/// transaction.
#[post("")]
pub async fn create_project(
    pool: web::Data<PgPool>,
    user: CurrentUser,
    project_data: web::Json<ProjectInput>,
) -> Result<impl Responder, AppError> {
    project_data.validate()?;

    let mut tx = pool.begin().await?;

    let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM projects WHERE name = $1")
        .bind(&project_data.name)
        .fetch_optional(&mut *tx)
        .await?;

    if existing.is_some() {
        return Err(AppError::BadRequest("Project name already exists".into()));
    }

    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (name, description, start_date)
         VALUES ($1, $2, $3)
         RETURNING id, name, description, start_date, created_at",
    )
    .bind(&project_data.name)
    .bind(&project_data.description)
    .bind(project_data.start_date)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO project_members (project_id, user_id, role) VALUES ($1, $2, 'admin')")
        .bind(project.id)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO project_settings (project_id) VALUES ($1)")
        .bind(project.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(HttpResponse::Created().json(project))
}

/// Lists the projects the caller is a member of.
#[get("")]
pub async fn list_projects(
    pool: web::Data<PgPool>,
    user: CurrentUser,
) -> Result<impl Responder, AppError> {
    let projects = sqlx::query_as::<_, Project>(
        "SELECT p.id, p.name, p.description, p.start_date, p.created_at
         FROM projects p
         JOIN project_members m ON m.project_id = p.id
         WHERE m.user_id = $1
         ORDER BY p.created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(projects))
}

/// Project roster. Visible to any member of the project.
#[get("/{id}/members")]
pub async fn list_members(
    authorizer: web::Data<MembershipAuthorizer>,
    user: CurrentUser,
    project_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let project_id = project_id.into_inner();

    if !authorizer.is_member(project_id, user.id).await? {
        return Err(AppError::Forbidden(
            "Only project members can view the roster".into(),
        ));
    }

    let members = authorizer.list_members(project_id).await?;
    Ok(HttpResponse::Ok().json(members))
}

/// Changes a member's role. Admin only; a demotion that would leave the
/// project without an admin is rejected.
#[put("/{id}/members/{user_id}")]
pub async fn change_member_role(
    authorizer: web::Data<MembershipAuthorizer>,
    user: CurrentUser,
    path: web::Path<(i32, i32)>,
    body: web::Json<RoleChange>,
) -> Result<impl Responder, AppError> {
    let (project_id, target_user_id) = path.into_inner();

    if !authorizer.is_admin(project_id, user.id).await? {
        return Err(AppError::Forbidden("Only admins can change roles".into()));
    }

    let member = authorizer
        .change_role(project_id, target_user_id, body.role)
        .await?;

    Ok(HttpResponse::Ok().json(member))
}

/// Removes a member. Admin only; removing the last admin is rejected.
#[delete("/{id}/members/{user_id}")]
pub async fn remove_member(
    authorizer: web::Data<MembershipAuthorizer>,
    user: CurrentUser,
    path: web::Path<(i32, i32)>,
) -> Result<impl Responder, AppError> {
    let (project_id, target_user_id) = path.into_inner();

    if !authorizer.is_admin(project_id, user.id).await? {
        return Err(AppError::Forbidden("Only admins can remove members".into()));
    }

    authorizer.remove_member(project_id, target_user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Member removed successfully" })))
}

/// Deletes a project and everything hanging off it.
///
/// The deletion protocol is a fixed, foreign-key-ordered sequence inside a
/// single transaction: task history, task assignees, tasks, invitations,
/// members, settings, then the project row itself. The order is load-bearing
/// and must not be rearranged.
#[delete("/{id}")]
pub async fn delete_project(
    pool: web::Data<PgPool>,
    authorizer: web::Data<MembershipAuthorizer>,
    user: CurrentUser,
    project_id: web::Path<i32>,
    body: web::Json<DeleteConfirmation>,
) -> Result<impl Responder, AppError> {
    let project_id = project_id.into_inner();

    if !authorizer.is_admin(project_id, user.id).await? {
        return Err(AppError::Forbidden("Only admins can delete projects".into()));
    }

    let project: Option<(String,)> = sqlx::query_as("SELECT name FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(&**pool)
        .await?;

    let (name,) = project.ok_or_else(|| AppError::NotFound("Project not found".into()))?;

    if body.confirmation_name != name {
        return Err(AppError::BadRequest(
            "Project name confirmation does not match".into(),
        ));
    }

    let mut tx = pool.begin().await?;

    let steps = [
        "DELETE FROM task_history WHERE task_id IN (SELECT id FROM tasks WHERE project_id = $1)",
        "DELETE FROM task_assignees WHERE task_id IN (SELECT id FROM tasks WHERE project_id = $1)",
        "DELETE FROM tasks WHERE project_id = $1",
        "DELETE FROM project_invitations WHERE project_id = $1",
        "DELETE FROM project_members WHERE project_id = $1",
        "DELETE FROM project_settings WHERE project_id = $1",
        "DELETE FROM projects WHERE id = $1",
    ];

    for step in steps {
        sqlx::query(step).bind(project_id).execute(&mut *tx).await?;
    }

    tx.commit().await?;

    log::info!("Project {} ({}) deleted by user {}", project_id, name, user.id);

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Project deleted successfully" })))
}
