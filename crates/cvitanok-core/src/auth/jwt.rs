use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::config::Config;
use crate::error::{AppError, ErrorCode};
use crate::models::user;

/// Audience of access tokens.
pub const AUTH_AUDIENCE: &str = "cvitanok:auth";
/// Audience of password reset tokens.
pub const RESET_PASSWORD_AUDIENCE: &str = "cvitanok:reset";
/// Audience of email verification tokens.
pub const VERIFY_AUDIENCE: &str = "cvitanok:verify";

/// Lifetime of reset and verification tokens.
const ONE_TIME_TOKEN_MINUTES: i64 = 60;

/// JWT claims payload.
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Which kind of token this is
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Email the verification token was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Fingerprint of the password hash a reset token was issued against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_fgpt: Option<String>,
}

impl Claims {
    fn new(subject: String, audience: &str, lifetime_minutes: i64) -> Self {
        let now = Utc::now();
        Claims {
            sub: subject,
            aud: audience.to_string(),
            exp: (now + Duration::minutes(lifetime_minutes)).timestamp() as usize,
            iat: now.timestamp() as usize,
            email: None,
            password_fgpt: None,
        }
    }

    /// The subject as a user id.
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

fn sign(claims: &Claims, config: &Config) -> Result<String, AppError> {
    encode(
        &Header::new(config.token_algorithm),
        claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
}

fn verify(token: &str, audience: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(config.token_algorithm);
    validation.set_audience(&[audience]);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
}

/// SHA-256 of a password hash; embedded in reset tokens.
pub fn password_fingerprint(hashed_password: &str) -> String {
    hex::encode(Sha256::digest(hashed_password.as_bytes()))
}

/// Create an access token for `user_id`.
pub fn create_access_token(user_id: i32, config: &Config) -> Result<String, AppError> {
    let claims = Claims::new(
        user_id.to_string(),
        AUTH_AUDIENCE,
        config.access_token_expire_minutes,
    );
    sign(&claims, config)
}

/// Validate an access token and return the claims.
pub fn validate_access_token(token: &str, config: &Config) -> Result<Claims, AppError> {
    verify(token, AUTH_AUDIENCE, config)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

/// Create a password reset token. It stops validating once the user's
/// password changes.
pub fn create_reset_token(user: &user::Model, config: &Config) -> Result<String, AppError> {
    let mut claims = Claims::new(
        user.id.to_string(),
        RESET_PASSWORD_AUDIENCE,
        ONE_TIME_TOKEN_MINUTES,
    );
    claims.password_fgpt = Some(password_fingerprint(&user.hashed_password));
    sign(&claims, config)
}

/// Decode a reset token. The fingerprint still has to be compared against
/// the stored user.
pub fn validate_reset_token(token: &str, config: &Config) -> Result<Claims, AppError> {
    verify(token, RESET_PASSWORD_AUDIENCE, config)
        .map_err(|_| AppError::rejected(ErrorCode::ResetPasswordBadToken, "Invalid reset token"))
}

/// Create an email verification token.
pub fn create_verify_token(user: &user::Model, config: &Config) -> Result<String, AppError> {
    let mut claims = Claims::new(user.id.to_string(), VERIFY_AUDIENCE, ONE_TIME_TOKEN_MINUTES);
    claims.email = Some(user.email.clone());
    sign(&claims, config)
}

pub fn validate_verify_token(token: &str, config: &Config) -> Result<Claims, AppError> {
    verify(token, VERIFY_AUDIENCE, config).map_err(|_| {
        AppError::rejected(ErrorCode::VerifyUserBadToken, "Invalid verification token")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "SECRET_KEY" => Some("unit-test-secret".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn user() -> user::Model {
        let now = Utc::now().naive_utc();
        user::Model {
            id: 7,
            email: "a@example.com".into(),
            hashed_password: "$argon2id$stub".into(),
            is_active: true,
            is_superuser: false,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn audiences_do_not_mix() {
        let config = config();
        let reset = create_reset_token(&user(), &config).unwrap();
        assert!(validate_access_token(&reset, &config).is_err());

        let access = create_access_token(7, &config).unwrap();
        assert_eq!(validate_access_token(&access, &config).unwrap().user_id(), Some(7));
        assert!(validate_verify_token(&access, &config).is_err());
    }

    #[test]
    fn reset_token_carries_fingerprint() {
        let config = config();
        let user = user();
        let claims = validate_reset_token(&create_reset_token(&user, &config).unwrap(), &config).unwrap();
        assert_eq!(
            claims.password_fgpt.as_deref(),
            Some(password_fingerprint(&user.hashed_password).as_str())
        );
    }
}
