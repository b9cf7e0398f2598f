pub mod extractors;
pub mod middleware;
pub mod password;
pub mod session;
pub mod token;

use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Re-export necessary items
pub use extractors::CurrentUser;
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenService};

/// Cookie carrying the short-lived signed access token.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Cookie carrying the opaque refresh session token.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Length of generated opaque tokens (refresh sessions, invitations).
/// 48 alphanumeric characters carry ~285 bits of entropy, comfortably above
/// the 128-bit floor these tokens require as their sole guessing defense.
const OPAQUE_TOKEN_LEN: usize = 48;

/// Generates a URL-safe opaque token with cryptographically secure
/// randomness. Used for refresh sessions and invitation tokens.
pub fn generate_opaque_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// User's email address.
    /// Must be a valid email format. Matched case-insensitively at login.
    #[validate(email)]
    pub email: String,
    /// User's password.
    /// Must be at least 6 characters long.
    #[validate(length(min = 6))]
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Desired username for the new account.
    /// Must be between 3 and 32 characters, alphanumeric, and can include underscores or hyphens.
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    /// Email address for the new account.
    /// Must be a valid email format.
    #[validate(email)]
    pub email: String,
    /// Password for the new account.
    /// Must be at least 6 characters long.
    #[validate(length(min = 6))]
    pub password: String,
}

/// Principal summary returned by login, refresh, and check.
/// Never carries the password hash or any token material in the body;
/// tokens travel only as cookies.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub email: String,
}
