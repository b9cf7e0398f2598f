pub mod auth;
pub mod health;
pub mod invitations;
pub mod projects;

use actix_web::web;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::register)
            .service(auth::login)
            .service(auth::refresh)
            .service(auth::logout)
            .service(auth::check),
    )
    .service(
        web::scope("/projects")
            .service(projects::create_project)
            .service(projects::list_projects)
            .service(projects::list_members)
            .service(projects::change_member_role)
            .service(projects::remove_member)
            .service(projects::delete_project),
    )
    .service(
        web::scope("/invitations")
            .service(invitations::create_invitation)
            .service(invitations::invitation_details)
            .service(invitations::accept_invitation)
            .service(invitations::cancel_invitation)
            .service(invitations::list_project_invitations),
    );
}
