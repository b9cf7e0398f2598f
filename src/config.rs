use std::env;

/// Process-wide configuration, loaded once at startup.
///
/// Key material (the JWT signing secret) is injected here rather than read
/// ad hoc inside the token layer, so swapping the verification key is a
/// deployment concern, not a code change.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub server_host: String,
    /// HMAC secret for signing/verifying access tokens.
    pub jwt_secret: String,
    /// Access token lifetime in hours. Access tokens are never revoked,
    /// only expire.
    pub access_token_ttl_hours: i64,
    /// Refresh session lifetime in days.
    pub refresh_token_ttl_days: i64,
    /// Invitation lifetime in days.
    pub invitation_ttl_days: i64,
    /// Base URL used to build invitation accept links.
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            access_token_ttl_hours: env::var("ACCESS_TOKEN_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("ACCESS_TOKEN_TTL_HOURS must be a number"),
            refresh_token_ttl_days: env::var("REFRESH_TOKEN_TTL_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .expect("REFRESH_TOKEN_TTL_DAYS must be a number"),
            invitation_ttl_days: env::var("INVITATION_TTL_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .expect("INVITATION_TTL_DAYS must be a number"),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:4200".to_string()),
        }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}
