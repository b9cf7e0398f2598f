use crate::{
    auth::{
        hash_password, session::RefreshSessionStore, verify_password, CurrentUser, LoginRequest,
        RegisterRequest, TokenService, UserSummary, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
    },
    config::Config,
    error::AppError,
};
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use sqlx::PgPool;
use validator::Validate;

/// Builds a credential-carrying cookie with the transport attributes every
/// auth cookie shares: HTTP-only, SameSite=Lax, path `/`.
fn credential_cookie(name: &'static str, value: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(max_age_secs))
        .finish()
}

/// Clearing a cookie means re-issuing it empty with max-age 0.
fn cleared_cookie(name: &'static str) -> Cookie<'static> {
    credential_cookie(name, String::new(), 0)
}

/// Register a new user
///
/// Creates a new user account. Registration does not log the user in; the
/// client follows up with a login request.
#[post("/register")]
pub async fn register(
    pool: web::Data<PgPool>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    // Validate input
    register_data.validate()?;

    // Check if email already exists (emails are matched case-insensitively)
    let existing_user: Option<(i32,)> =
        sqlx::query_as("SELECT id FROM users WHERE lower(email) = lower($1)")
            .bind(&register_data.email)
            .fetch_optional(&**pool)
            .await?;

    if existing_user.is_some() {
        return Err(AppError::BadRequest("Email already registered".into()));
    }

    // Hash password
    let password_hash = hash_password(&register_data.password)?;

    let user = sqlx::query_as::<_, UserSummary>(
        "INSERT INTO users (username, email, password_hash)
         VALUES ($1, $2, $3)
         RETURNING id, username, email",
    )
    .bind(&register_data.username)
    .bind(&register_data.email)
    .bind(&password_hash)
    .fetch_one(&**pool)
    .await
    // A concurrent registration can slip between the pre-check and the
    // insert; the unique index on lower(email) rejects it, and that must
    // read the same as the sequential duplicate, not a 500.
    .map_err(|e| {
        AppError::on_unique_violation(e, AppError::BadRequest("Email already registered".into()))
    })?;

    Ok(HttpResponse::Created().json(user))
}

/// Login
///
/// Verifies the credentials, issues a fresh access token, and replaces any
/// prior refresh session. Both tokens travel back as cookies; the body only
/// carries the principal summary. An unknown email and a wrong password are
/// indistinguishable to the caller.
#[post("/login")]
pub async fn login(
    pool: web::Data<PgPool>,
    token_service: web::Data<TokenService>,
    sessions: web::Data<RefreshSessionStore>,
    config: web::Data<Config>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    // Validate input
    login_data.validate()?;

    let user: Option<(i32, String, String, String)> = sqlx::query_as(
        "SELECT id, username, email, password_hash FROM users WHERE lower(email) = lower($1)",
    )
    .bind(&login_data.email)
    .fetch_optional(&**pool)
    .await?;

    let (id, username, email, password_hash) = user.ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&login_data.password, &password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    let access_token = token_service.issue(id)?;
    let session = sessions.create_session(id).await?;

    Ok(HttpResponse::Ok()
        .cookie(credential_cookie(
            ACCESS_TOKEN_COOKIE,
            access_token,
            config.access_token_ttl_hours * 3600,
        ))
        .cookie(credential_cookie(
            REFRESH_TOKEN_COOKIE,
            session.token,
            config.refresh_token_ttl_days * 86400,
        ))
        .json(UserSummary { id, username, email }))
}

/// Refresh
///
/// Exchanges a live refresh session for a new access token. The refresh
/// session itself is not rotated here; it is replaced only on a fresh login.
#[post("/refresh")]
pub async fn refresh(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    token_service: web::Data<TokenService>,
    sessions: web::Data<RefreshSessionStore>,
    config: web::Data<Config>,
) -> Result<impl Responder, AppError> {
    let refresh_token = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_owned())
        .ok_or(AppError::MissingCredential)?;

    let session = sessions
        .find_by_token(&refresh_token)
        .await?
        .ok_or(AppError::InvalidCredential)?;

    // An expired session found here is deleted by the store.
    let session = sessions.verify_not_expired(session).await?;

    // Resolve the owning principal; a session for a deleted user is dead.
    let user = sqlx::query_as::<_, UserSummary>(
        "SELECT id, username, email FROM users WHERE id = $1",
    )
    .bind(session.user_id)
    .fetch_optional(&**pool)
    .await?
    .ok_or(AppError::InvalidCredential)?;

    let access_token = token_service.issue(user.id)?;

    Ok(HttpResponse::Ok()
        .cookie(credential_cookie(
            ACCESS_TOKEN_COOKIE,
            access_token,
            config.access_token_ttl_hours * 3600,
        ))
        .json(user))
}

/// Logout
///
/// Destroys the refresh session (if any) and unconditionally clears both
/// credential cookies. Idempotent; does not require the caller to be
/// authenticated.
#[post("/logout")]
pub async fn logout(
    req: HttpRequest,
    sessions: web::Data<RefreshSessionStore>,
) -> Result<impl Responder, AppError> {
    if let Some(cookie) = req.cookie(REFRESH_TOKEN_COOKIE) {
        sessions.delete_by_token(cookie.value()).await?;
    }

    Ok(HttpResponse::Ok()
        .cookie(cleared_cookie(ACCESS_TOKEN_COOKIE))
        .cookie(cleared_cookie(REFRESH_TOKEN_COOKIE))
        .json(serde_json::json!({ "message": "Logged out" })))
}

/// Check
///
/// Pure read: 200 with the principal summary when a valid unexpired access
/// token resolves to a live user, 401 otherwise. Never mutates anything.
#[get("/check")]
pub async fn check(user: CurrentUser) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(UserSummary {
        id: user.id,
        username: user.username,
        email: user.email,
    }))
}
