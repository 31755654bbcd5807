//! SMS login flow.
//!
//! `send_sms` issues a six-digit code; `login_sms` trades a valid code for a
//! token pair, creating the account on first login.

use std::sync::OnceLock;

use regex::Regex;

use crate::auth::codes::SmsCodeStore;
use crate::auth::jwt::{JwtService, TokenPair};
use crate::auth::sms::{gen_code, ZtSmsSender};
use crate::errors::ApiError;
use crate::users::{User, UserStore};

fn mobile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^1\d{10}$").expect("valid pattern"))
}

/// Mainland mobile numbers only: 11 digits starting with 1.
pub fn validate_mobile(mobile: &str) -> Result<(), ApiError> {
    if mobile_pattern().is_match(mobile) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("手机号格式不正确".to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LoginResult {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthService {
    codes: SmsCodeStore,
    users: UserStore,
    jwt: JwtService,
    sms: ZtSmsSender,
}

impl AuthService {
    pub fn new(codes: SmsCodeStore, users: UserStore, jwt: JwtService, sms: ZtSmsSender) -> Self {
        Self {
            codes,
            users,
            jwt,
            sms,
        }
    }

    pub async fn send_sms(&self, mobile: &str) -> Result<(), ApiError> {
        validate_mobile(mobile)?;

        let code = gen_code();
        self.codes.put(mobile, &code).await?;
        self.sms.send_code(mobile, &code).await
    }

    pub async fn login_sms(&self, mobile: &str, code: &str) -> Result<LoginResult, ApiError> {
        validate_mobile(mobile)?;
        self.codes.validate(mobile, code).await?;

        let user = match self.users.get_by_mobile(mobile).await? {
            Some(user) => user,
            None => {
                // First login creates the account with a default display name
                // from the last four digits of the number.
                let suffix = &mobile[mobile.len() - 4..];
                let user = self.users.create(mobile, &format!("用户{}", suffix)).await?;
                tracing::info!("created user {} for mobile {}", user.id, mobile);
                user
            }
        };

        self.users.update_last_login(user.id).await?;
        let tokens = self.jwt.create_token_pair(user.id, &user.name)?;

        Ok(LoginResult { tokens, user })
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }
}
