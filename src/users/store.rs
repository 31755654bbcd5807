//! User persistence on SQLite.

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::errors::ApiError;

/// Timestamps are unix seconds, UTC.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub mobile: String,
    pub name: String,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub name: Option<String>,
    pub mobile: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                mobile     TEXT NOT NULL UNIQUE,
                name       TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_login INTEGER
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(Self { pool })
    }

    pub async fn create(&self, mobile: &str, name: &str) -> Result<User, ApiError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("INSERT INTO users (mobile, name, created_at) VALUES (?, ?, ?)")
            .bind(mobile)
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(User {
            id: result.last_insert_rowid(),
            mobile: mobile.to_string(),
            name: name.to_string(),
            created_at: now,
            last_login: None,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, ApiError> {
        let row = sqlx::query(
            "SELECT id, mobile, name, created_at, last_login FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(row.map(user_from_row))
    }

    pub async fn get_by_mobile(&self, mobile: &str) -> Result<Option<User>, ApiError> {
        let row = sqlx::query(
            "SELECT id, mobile, name, created_at, last_login FROM users WHERE mobile = ?",
        )
        .bind(mobile)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(row.map(user_from_row))
    }

    pub async fn update_last_login(&self, id: i64) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    /// Paginated listing, newest first, with optional substring filters.
    /// `page` is 1-based.
    pub async fn list(
        &self,
        filter: &UserFilter,
        page: i64,
        page_size: i64,
    ) -> Result<UserPage, ApiError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        let name_pattern = filter.name.as_deref().map(|n| format!("%{}%", n));
        let mobile_pattern = filter.mobile.as_deref().map(|m| format!("%{}%", m));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE (? IS NULL OR name LIKE ?)
              AND (? IS NULL OR mobile LIKE ?)
            "#,
        )
        .bind(name_pattern.as_deref())
        .bind(name_pattern.as_deref())
        .bind(mobile_pattern.as_deref())
        .bind(mobile_pattern.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let rows = sqlx::query(
            r#"
            SELECT id, mobile, name, created_at, last_login FROM users
            WHERE (? IS NULL OR name LIKE ?)
              AND (? IS NULL OR mobile LIKE ?)
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(name_pattern.as_deref())
        .bind(name_pattern.as_deref())
        .bind(mobile_pattern.as_deref())
        .bind(mobile_pattern.as_deref())
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(UserPage {
            users: rows.into_iter().map(user_from_row).collect(),
            total,
            page,
            page_size,
        })
    }
}

fn user_from_row(row: sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        mobile: row.get("mobile"),
        name: row.get("name"),
        created_at: row.get("created_at"),
        last_login: row.get("last_login"),
    }
}
