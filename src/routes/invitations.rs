use crate::{
    auth::CurrentUser,
    config::Config,
    error::AppError,
    invitations::InvitationRegistry,
    membership::MembershipAuthorizer,
    models::ProjectRole,
    notify::{InvitationEmail, InvitationNotifier},
};
use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct InvitationRequest {
    #[validate(email)]
    pub email: String,
    pub role: ProjectRole,
}

/// Invite an email to a project. Admin only.
///
/// Notification is best-effort: when delivery fails, the invitation still
/// stands and the response carries a warning instead of an error.
#[post("/project/{project_id}")]
pub async fn create_invitation(
    pool: web::Data<PgPool>,
    registry: web::Data<InvitationRegistry>,
    notifier: web::Data<dyn InvitationNotifier>,
    config: web::Data<Config>,
    user: CurrentUser,
    project_id: web::Path<i32>,
    body: web::Json<InvitationRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let project_id = project_id.into_inner();

    let invitation = registry
        .create(project_id, &body.email, body.role, user.id)
        .await?;

    let (project_name,): (String,) = sqlx::query_as("SELECT name FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_one(&**pool)
        .await?;

    let user_exists: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM users WHERE lower(email) = lower($1)")
            .bind(&body.email)
            .fetch_optional(&**pool)
            .await?;
    let user_exists = user_exists.is_some();

    let email = InvitationEmail {
        to: invitation.email.clone(),
        inviter_name: user.username.clone(),
        project_name,
        role_label: invitation.role.display_label().to_string(),
        accept_url: format!("{}/invitations/accept/{}", config.base_url, invitation.token),
        user_exists,
    };

    let mut response = json!({
        "invitation": invitation,
        "userExists": user_exists,
        "message": "Invitation sent successfully"
    });

    if let Err(e) = notifier.send_invitation(&email) {
        log::error!("Failed to notify {} about invitation {}: {}", email.to, invitation.id, e);
        response["message"] = json!("Invitation created");
        response["warning"] = json!("Invitation created but the notification failed to send");
    }

    Ok(HttpResponse::Ok().json(response))
}

/// Invitation details for the accept page. Public: the token itself is the
/// sole authorizer, no login required.
#[get("/details/{token}")]
pub async fn invitation_details(
    registry: web::Data<InvitationRegistry>,
    token: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let preview = registry.preview(&token).await?;
    Ok(HttpResponse::Ok().json(preview))
}

/// Accept an invitation as the authenticated user.
#[post("/accept/{token}")]
pub async fn accept_invitation(
    registry: web::Data<InvitationRegistry>,
    user: CurrentUser,
    token: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let (invitation, member) = registry.accept(&token, user.id, &user.email).await?;

    Ok(HttpResponse::Ok().json(json!({
        "member": member,
        "projectId": invitation.project_id,
        "message": "Invitation accepted successfully"
    })))
}

/// Cancel a pending invitation. Admin only.
#[post("/cancel/{invitation_id}")]
pub async fn cancel_invitation(
    registry: web::Data<InvitationRegistry>,
    user: CurrentUser,
    invitation_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    registry.cancel(invitation_id.into_inner(), user.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Invitation cancelled" })))
}

/// All invitations for a project. Admin only.
#[get("/project/{project_id}")]
pub async fn list_project_invitations(
    registry: web::Data<InvitationRegistry>,
    authorizer: web::Data<MembershipAuthorizer>,
    user: CurrentUser,
    project_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let project_id = project_id.into_inner();

    if !authorizer.is_admin(project_id, user.id).await? {
        return Err(AppError::Forbidden(
            "Only admins can view invitations".into(),
        ));
    }

    let invitations = registry.list_for_project(project_id).await?;
    Ok(HttpResponse::Ok().json(invitations))
}
