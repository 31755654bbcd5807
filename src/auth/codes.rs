//! Verification code storage.
//!
//! One live code per mobile number. Codes expire after ten minutes and are
//! consumed on successful validation, so a code can never authenticate twice.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::errors::ApiError;

const CODE_TTL_SECS: i64 = 600;

#[derive(Clone)]
pub struct SmsCodeStore {
    pool: SqlitePool,
}

impl SmsCodeStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sms_codes (
                mobile     TEXT PRIMARY KEY,
                code       TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    /// Stores `code` for `mobile`, replacing any earlier code.
    pub async fn put(&self, mobile: &str, code: &str) -> Result<(), ApiError> {
        sqlx::query(
            r#"
            INSERT INTO sms_codes (mobile, code, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(mobile) DO UPDATE SET
                code = excluded.code,
                created_at = excluded.created_at
            "#,
        )
        .bind(mobile)
        .bind(code)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Checks `code` against the stored one and consumes it on success.
    /// Expired or mismatched codes leave the row untouched only in the
    /// mismatch case; expired rows are deleted either way.
    pub async fn validate(&self, mobile: &str, code: &str) -> Result<(), ApiError> {
        let row = sqlx::query("SELECT code, created_at FROM sms_codes WHERE mobile = ?")
            .bind(mobile)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let Some(row) = row else {
            return Err(ApiError::BadRequest("验证码无效或已过期".to_string()));
        };

        let stored: String = row.get("code");
        let created_at: i64 = row.get("created_at");

        if Utc::now().timestamp() - created_at > CODE_TTL_SECS {
            self.delete(mobile).await?;
            return Err(ApiError::BadRequest("验证码无效或已过期".to_string()));
        }

        if stored != code {
            return Err(ApiError::BadRequest("验证码错误".to_string()));
        }

        self.delete(mobile).await
    }

    async fn delete(&self, mobile: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM sms_codes WHERE mobile = ?")
            .bind(mobile)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }
}
