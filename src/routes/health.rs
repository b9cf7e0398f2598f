use actix_web::{get, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

/// Liveness probe.
///
/// Sits outside the `/api` scope and the authentication gate; reports the
/// service name, its crate version, and the server clock. Deliberately does
/// not touch the database.
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
        "timestamp": Utc::now()
    }))
}
