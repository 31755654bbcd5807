//! ZT SMS gateway client.
//!
//! The gateway authenticates with `md5(md5(password) + tkey)` where `tkey`
//! is the current time as `yyyyMMddHHmmss`. Responses are JSON with a
//! numeric `code` field, 200 meaning accepted.

use std::time::Duration;

use chrono::Local;
use md5::{Digest, Md5};
use rand::Rng;
use serde_json::Value;

use crate::config::SmsConfig;
use crate::errors::ApiError;

const CODE_TEMPLATE: &str = "您的验证码为{code}，600秒内有效，请勿泄露给他人。";

#[derive(Clone)]
pub struct ZtSmsSender {
    client: reqwest::Client,
    config: SmsConfig,
}

impl ZtSmsSender {
    pub fn new(config: SmsConfig, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self { client, config })
    }

    /// Sends a verification code to `mobile`. With `enabled: false` the code
    /// is only logged, which keeps local development off the paid gateway.
    pub async fn send_code(&self, mobile: &str, code: &str) -> Result<(), ApiError> {
        let content = CODE_TEMPLATE.replace("{code}", code);

        if !self.config.enabled {
            tracing::info!("SMS disabled, would send to {}: {}", mobile, content);
            return Ok(());
        }

        let tkey = Local::now().format("%Y%m%d%H%M%S").to_string();
        let password = sign_password(&self.config.password, &tkey);

        let body = serde_json::json!({
            "username": self.config.username,
            "tkey": tkey,
            "password": password,
            "mobile": mobile,
            "content": content,
            "productid": self.config.product_id,
            "xh": "",
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "SMS gateway returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::upstream)?;
        let code = payload.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);
        if code != 200 {
            let msg = payload
                .get("msg")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            return Err(ApiError::Upstream(format!(
                "SMS gateway rejected request: {} ({})",
                msg, code
            )));
        }

        Ok(())
    }
}

/// Six random decimal digits, leading zeros kept.
pub fn gen_code() -> String {
    let n: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", n)
}

fn sign_password(password: &str, tkey: &str) -> String {
    let inner = md5_hex(password.as_bytes());
    md5_hex(format!("{}{}", inner, tkey).as_bytes())
}

fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_code_is_six_decimal_digits() {
        for _ in 0..100 {
            let code = gen_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn password_signature_is_deterministic_for_a_given_tkey() {
        let a = sign_password("hunter2", "20260831120000");
        let b = sign_password("hunter2", "20260831120000");
        let c = sign_password("hunter2", "20260831120001");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn known_md5_vector() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
