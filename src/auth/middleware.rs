//!
//! # Authentication gate
//!
//! Per-request filter executed before any protected handler. It resolves a
//! principal from the incoming credentials (Bearer header or `accessToken`
//! cookie) and attaches it to request-scoped extensions. Verification
//! failures are downgraded to "anonymous" here; the decision to reject is
//! deferred to the handler's own [`crate::auth::CurrentUser`] extractor, so
//! an invalid token yields a clean 401 from the handler rather than a hard
//! failure in the filter chain.

use std::rc::Rc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use sqlx::PgPool;

use crate::auth::{CurrentUser, TokenService, ACCESS_TOKEN_COOKIE};

/// Endpoint prefixes that pass through unauthenticated: registration, login,
/// refresh, logout, and the public invitation preview. `/api/auth/check` is
/// deliberately absent: it needs the gate to resolve the principal.
/// `/health` sits outside the `/api` scope entirely.
const PUBLIC_PREFIXES: &[&str] = &[
    "/api/auth/register",
    "/api/auth/login",
    "/api/auth/refresh",
    "/api/auth/logout",
    "/api/invitations/details/",
];

pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    // Rc so the service can be moved into the async block after the
    // principal lookup awaits on the database.
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        // Pre-flight requests and public endpoints skip the gate entirely.
        if req.method() == Method::OPTIONS
            || PUBLIC_PREFIXES.iter().any(|p| req.path().starts_with(p))
        {
            return Box::pin(async move { service.call(req).await });
        }

        // Prefer the Authorization header, fall back to the cookie the
        // login flow sets. Absence of both means the request proceeds
        // anonymously.
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_owned)
            .or_else(|| req.cookie(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_owned()));

        Box::pin(async move {
            if let Some(token) = token {
                if let Some(user) = resolve_principal(&req, &token).await {
                    // Populated at most once per request; never shared
                    // across requests.
                    req.extensions_mut().insert(user);
                }
            }
            service.call(req).await
        })
    }
}

/// Verifies the token and resolves its subject to a live user row.
/// Any failure (bad token, expired token, deleted user) logs and returns
/// `None`, leaving the request anonymous.
async fn resolve_principal(req: &ServiceRequest, token: &str) -> Option<CurrentUser> {
    let token_service = req.app_data::<web::Data<TokenService>>()?;

    let claims = match token_service.verify(token, None) {
        Ok(claims) => claims,
        Err(e) => {
            log::warn!("Access token rejected: {}", e);
            return None;
        }
    };

    let pool = req.app_data::<web::Data<PgPool>>()?;
    let user = sqlx::query_as::<_, CurrentUser>(
        "SELECT id, username, email FROM users WHERE id = $1",
    )
    .bind(claims.sub)
    .fetch_optional(pool.get_ref())
    .await;

    match user {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            // A valid token for a deleted user must not resolve to a
            // stale principal.
            log::warn!("Access token subject {} no longer exists", claims.sub);
            None
        }
        Err(e) => {
            log::error!("Principal lookup failed: {}", e);
            None
        }
    }
}
