use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Lifetime of tokens minted by `generate_token`
const TOKEN_TTL_HOURS: i64 = 24;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // user id
    #[serde(default)]
    pub email: String,
    pub exp: i64, // expiration timestamp
    pub iat: i64, // issued at timestamp
}

/// Bearer tokens are issued by the account service; this side only verifies them.
pub struct AuthService;

impl AuthService {
    /// Mint a token signed with the shared secret (local tooling and tests)
    pub fn generate_token(user_id: Uuid, email: &str, config: &Config) -> AppResult<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::hours(TOKEN_TTL_HOURS);

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            exp: exp.unix_timestamp(),
            iat: now.unix_timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify and decode a JWT token
    pub fn verify_token(token: &str, config: &Config) -> AppResult<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let config = Config::with_defaults("test-secret");
        let user_id = Uuid::new_v4();

        let token = AuthService::generate_token(user_id, "qa@example.com", &config).unwrap();
        let claims = AuthService::verify_token(&token, &config).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "qa@example.com");
    }

    #[test]
    fn test_token_with_other_secret_is_rejected() {
        let config = Config::with_defaults("test-secret");
        let token = AuthService::generate_token(Uuid::new_v4(), "qa@example.com", &config).unwrap();

        let mut other = config.clone();
        other.jwt_secret = "another-secret".to_string();

        assert!(matches!(
            AuthService::verify_token(&token, &other),
            Err(AppError::InvalidToken)
        ));
    }
}
