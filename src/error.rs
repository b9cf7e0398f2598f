//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the
//! application. The taxonomy deliberately separates not-found conditions from
//! policy violations (invitation state, last-admin guard) so that callers can
//! map each to the correct response code without string-matching messages.
//!
//! `AppError` implements `actix_web::error::ResponseError` to convert
//! application errors into HTTP responses with JSON bodies. `From`
//! implementations for `sqlx::Error`, `validator::ValidationErrors`,
//! `jsonwebtoken::errors::Error`, and `bcrypt::BcryptError` allow conversion
//! with the `?` operator.

use actix_web::{error::ResponseError, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Represents all possible errors that can occur within the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Login failed: unknown email or wrong password (HTTP 401).
    /// A single variant for both factors so login never discloses which
    /// one was wrong.
    InvalidCredentials,
    /// A protected call was made without a resolvable principal (HTTP 401).
    Unauthenticated(String),
    /// A refresh was attempted without supplying a refresh token (HTTP 401).
    MissingCredential,
    /// A supplied opaque credential does not match any live session (HTTP 401).
    InvalidCredential,
    /// A credential (access token or refresh session) has passed its
    /// expiry (HTTP 401).
    ExpiredCredential,
    /// A token's signature or encoding is invalid (HTTP 401).
    MalformedCredential,
    /// A token verified fine but its subject differs from the expected
    /// one (HTTP 401).
    SubjectMismatch,
    /// The caller is authenticated but lacks the required role (HTTP 403).
    Forbidden(String),
    /// No invitation exists for the given token or id (HTTP 404).
    InvitationNotFound,
    /// The invitation's expiry has passed, whether or not the sweep has
    /// flipped its persisted status yet (HTTP 400).
    InvitationExpired,
    /// The invitation is in a terminal state and cannot transition (HTTP 400).
    InvitationNotPending,
    /// The accepting principal's email does not match the invitation's
    /// target email (HTTP 403).
    EmailMismatch,
    /// The mutation would leave a project with members but no admin (HTTP 400).
    LastAdminViolation,
    /// The target principal already holds a membership in the project (HTTP 400).
    AlreadyMember,
    /// A malformed or invalid request (HTTP 400).
    BadRequest(String),
    /// A requested resource was not found (HTTP 404).
    NotFound(String),
    /// Failed input validation (HTTP 422 Unprocessable Entity).
    ValidationError(String),
    /// An error originating from database operations (HTTP 500).
    DatabaseError(String),
    /// An unexpected server-side error (HTTP 500).
    InternalServerError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::InvalidCredentials => write!(f, "Invalid credentials"),
            AppError::Unauthenticated(msg) => write!(f, "Unauthenticated: {}", msg),
            AppError::MissingCredential => write!(f, "No refresh token provided"),
            AppError::InvalidCredential => write!(f, "Credential not recognized"),
            AppError::ExpiredCredential => write!(f, "Credential has expired"),
            AppError::MalformedCredential => write!(f, "Credential is malformed"),
            AppError::SubjectMismatch => write!(f, "Credential subject mismatch"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::InvitationNotFound => write!(f, "Invitation not found"),
            AppError::InvitationExpired => write!(f, "Invitation has expired"),
            AppError::InvitationNotPending => write!(f, "Invitation is no longer valid"),
            AppError::EmailMismatch => {
                write!(f, "You can only accept invitations sent to your email")
            }
            AppError::LastAdminViolation => {
                write!(f, "Project must retain at least one admin")
            }
            AppError::AlreadyMember => write!(f, "User is already a member of this project"),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

/// Converts `AppError` variants into `HttpResponse` objects.
///
/// Credential-layer failures all collapse to 401 with a generic message;
/// policy violations surface their specific message with a 400/403 so the
/// client can fix the input and retry.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::InvalidCredentials
            | AppError::MissingCredential
            | AppError::InvalidCredential
            | AppError::ExpiredCredential
            | AppError::MalformedCredential
            | AppError::SubjectMismatch => HttpResponse::Unauthorized().json(json!({
                "error": self.to_string()
            })),
            AppError::Unauthenticated(msg) => HttpResponse::Unauthorized().json(json!({
                "error": msg
            })),
            AppError::Forbidden(msg) => HttpResponse::Forbidden().json(json!({
                "error": msg
            })),
            AppError::EmailMismatch => HttpResponse::Forbidden().json(json!({
                "error": self.to_string()
            })),
            AppError::InvitationNotFound => HttpResponse::NotFound().json(json!({
                "error": self.to_string()
            })),
            AppError::InvitationExpired
            | AppError::InvitationNotPending
            | AppError::LastAdminViolation
            | AppError::AlreadyMember => HttpResponse::BadRequest().json(json!({
                "error": self.to_string()
            })),
            AppError::BadRequest(msg) => HttpResponse::BadRequest().json(json!({
                "error": msg
            })),
            AppError::NotFound(msg) => HttpResponse::NotFound().json(json!({
                "error": msg
            })),
            AppError::ValidationError(msg) => HttpResponse::UnprocessableEntity().json(json!({
                "error": msg
            })),
            // Database errors are presented as generic internal server errors.
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                HttpResponse::InternalServerError().json(json!({
                    "error": "Internal server error"
                }))
            }
        }
    }
}

impl AppError {
    /// Maps a Postgres unique-constraint violation to the given conflict
    /// error; every other error goes through the usual `From` conversion.
    /// Used where a race can surface a uniqueness invariant as a database
    /// error after the sequential pre-check passed.
    pub fn on_unique_violation(error: sqlx::Error, conflict: AppError) -> AppError {
        match &error {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => conflict,
            _ => AppError::from(error),
        }
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// `sqlx::Error::RowNotFound` maps to `AppError::NotFound`; other database
/// errors become `AppError::DatabaseError`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// Converts `jsonwebtoken::errors::Error` into the credential taxonomy:
/// an expired signature becomes `ExpiredCredential`, everything else
/// (bad signature, bad encoding) becomes `MalformedCredential`.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        match error.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredCredential,
            _ => AppError::MalformedCredential,
        }
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::InternalServerError`.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_responses() {
        // Credential-layer failures are all 401
        assert_eq!(AppError::InvalidCredentials.error_response().status(), 401);
        assert_eq!(AppError::MissingCredential.error_response().status(), 401);
        assert_eq!(AppError::ExpiredCredential.error_response().status(), 401);
        assert_eq!(AppError::MalformedCredential.error_response().status(), 401);
        assert_eq!(
            AppError::Unauthenticated("No token".into())
                .error_response()
                .status(),
            401
        );

        // Role / target violations
        assert_eq!(
            AppError::Forbidden("Admins only".into())
                .error_response()
                .status(),
            403
        );
        assert_eq!(AppError::EmailMismatch.error_response().status(), 403);

        // Invitation and membership state violations
        assert_eq!(AppError::InvitationNotFound.error_response().status(), 404);
        assert_eq!(AppError::InvitationExpired.error_response().status(), 400);
        assert_eq!(AppError::InvitationNotPending.error_response().status(), 400);
        assert_eq!(AppError::LastAdminViolation.error_response().status(), 400);
        assert_eq!(AppError::AlreadyMember.error_response().status(), 400);

        // Generic variants
        assert_eq!(
            AppError::NotFound("Resource not found".into())
                .error_response()
                .status(),
            404
        );
        assert_eq!(
            AppError::ValidationError("bad input".into())
                .error_response()
                .status(),
            422
        );
        assert_eq!(
            AppError::InternalServerError("boom".into())
                .error_response()
                .status(),
            500
        );
    }

    #[test]
    fn test_jwt_error_mapping() {
        let expired = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::ExpiredSignature,
        );
        assert_eq!(AppError::from(expired), AppError::ExpiredCredential);

        let invalid = jsonwebtoken::errors::Error::from(
            jsonwebtoken::errors::ErrorKind::InvalidSignature,
        );
        assert_eq!(AppError::from(invalid), AppError::MalformedCredential);
    }

    #[test]
    fn test_on_unique_violation_passes_other_errors_through() {
        // Only code 23505 is rewritten; anything else takes the normal path.
        let mapped = AppError::on_unique_violation(
            sqlx::Error::RowNotFound,
            AppError::BadRequest("conflict".into()),
        );
        assert_eq!(mapped, AppError::NotFound("Record not found".into()));
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        // Database details must never leak to the client.
        let err = AppError::DatabaseError("connection refused to 10.0.0.5".into());
        let response = err.error_response();
        assert_eq!(response.status(), 500);
    }
}
