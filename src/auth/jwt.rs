//! Access/refresh token pairs, HS256.
//!
//! Both tokens carry the same claims apart from `token_type`, which is
//! checked on verification so a refresh token cannot be replayed as an
//! access token or vice versa.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::errors::ApiError;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub exp: i64,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Result<Self, ApiError> {
        if config.secret.trim().is_empty() {
            return Err(ApiError::Internal(
                "jwt.secret is not configured".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn create_token_pair(&self, user_id: i64, username: &str) -> Result<TokenPair, ApiError> {
        let access_token =
            self.sign(user_id, username, TOKEN_TYPE_ACCESS, self.config.access_exp)?;
        let refresh_token =
            self.sign(user_id, username, TOKEN_TYPE_REFRESH, self.config.refresh_exp)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.config.access_exp,
        })
    }

    /// Decodes and validates a token, requiring the expected `token_type`.
    pub fn verify_token(&self, token: &str, expected_type: &str) -> Result<Claims, ApiError> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| ApiError::Unauthorized)?;

        if decoded.claims.token_type != expected_type {
            return Err(ApiError::Unauthorized);
        }

        Ok(decoded.claims)
    }

    fn sign(
        &self,
        user_id: i64,
        username: &str,
        token_type: &str,
        lifetime_secs: i64,
    ) -> Result<String, ApiError> {
        let claims = Claims {
            user_id,
            username: username.to_string(),
            exp: Utc::now().timestamp() + lifetime_secs,
            token_type: token_type.to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(ApiError::internal)
    }
}
