use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use crewdeck::auth::{session::RefreshSessionStore, AuthMiddleware, TokenService};
use crewdeck::config::Config;
use crewdeck::invitations::InvitationRegistry;
use crewdeck::membership::MembershipAuthorizer;
use crewdeck::notify::{InvitationNotifier, LogNotifier};
use crewdeck::routes;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let token_service = web::Data::new(TokenService::new(
        config.jwt_secret.as_bytes(),
        config.access_token_ttl_hours,
    ));
    let sessions = web::Data::new(RefreshSessionStore::new(
        pool.clone(),
        config.refresh_token_ttl_days,
    ));
    let authorizer = web::Data::new(MembershipAuthorizer::new(pool.clone()));
    let registry = web::Data::new(InvitationRegistry::new(
        pool.clone(),
        config.invitation_ttl_days,
    ));
    let notifier: web::Data<dyn InvitationNotifier> =
        web::Data::from(Arc::new(LogNotifier) as Arc<dyn InvitationNotifier>);

    let bind_addr = (config.server_host.clone(), config.server_port);
    log::info!("Starting Crewdeck server at {}", config.server_url());

    let config_data = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(config_data.clone())
            .app_data(token_service.clone())
            .app_data(sessions.clone())
            .app_data(authorizer.clone())
            .app_data(registry.clone())
            .app_data(notifier.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(routes::health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(routes::config),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
