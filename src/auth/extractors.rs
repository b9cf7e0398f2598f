use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use serde::Serialize;
use std::future::{ready, Ready};

use crate::error::AppError;

/// The authenticated principal for the current request.
///
/// Inserted into request extensions by `AuthMiddleware` after the access
/// token has been verified and its subject resolved to a live user row.
/// The value is request-scoped: concurrent requests can never observe each
/// other's principal.
///
/// On routes where the middleware left the request anonymous (no token,
/// expired token, malformed token, deleted user), this extractor rejects
/// with `Unauthenticated`, which is what turns the gate's silent downgrade
/// into the handler's 401.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub email: String,
}

impl FromRequest for CurrentUser {
    type Error = ActixError; // AppError converts into ActixError via ResponseError
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<CurrentUser>().cloned() {
            Some(user) => ready(Ok(user)),
            None => {
                let err = AppError::Unauthenticated("Authentication required".to_string());
                ready(Err(err.into()))
            }
        }
    }
}
