use crate::error::AppError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Represents the claims encoded within an access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject of the token: the user's unique identifier.
    pub sub: i32,
    /// Issuance timestamp (seconds since epoch).
    pub iat: usize,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
}

/// Mints and verifies short-lived signed access tokens.
///
/// Stateless: a token carries no revocation state, its security model is
/// "short-lived, never revoked, only expires". Key material is injected at
/// construction (from [`crate::config::Config`]), so swapping the
/// verification key requires no code change.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    /// Produces a signed token for the given user with an absolute expiry
    /// of `now + ttl`. Deterministic given the signing key; no side effects.
    pub fn issue(&self, user_id: i32) -> Result<String, AppError> {
        let now = chrono::Utc::now();
        let expiration = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::InternalServerError("Token expiry overflow".into()))?;

        let claims = Claims {
            sub: user_id,
            iat: now.timestamp() as usize,
            exp: expiration.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
    }

    /// Verifies a token string and decodes its claims.
    ///
    /// Fails with `ExpiredCredential` once the expiry has passed,
    /// `MalformedCredential` on a bad signature or encoding, and
    /// `SubjectMismatch` when an expected-subject hint is supplied and
    /// does not match the decoded subject.
    pub fn verify(
        &self,
        token: &str,
        expected_subject: Option<i32>,
    ) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)?;

        if let Some(expected) = expected_subject {
            if claims.sub != expected {
                return Err(AppError::SubjectMismatch);
            }
        }

        Ok(claims)
    }
}
