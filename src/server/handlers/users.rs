use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use crate::auth::Claims;
use crate::errors::ApiError;
use crate::state::AppState;
use crate::users::{User, UserFilter, UserPage};

#[derive(Debug, Deserialize)]
pub struct UserInfoQuery {
    pub id: Option<i64>,
}

pub async fn get_user_info(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UserInfoQuery>,
) -> Result<Json<User>, ApiError> {
    // Without an explicit id, return the caller's own record.
    let id = query.id.unwrap_or(claims.user_id);
    let user = state
        .users
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("用户不存在".to_string()))?;

    Ok(Json(user))
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    pub name: Option<String>,
    pub mobile: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<UserPage>, ApiError> {
    let filter = UserFilter {
        name: query.name,
        mobile: query.mobile,
    };
    let page = state.users.list(&filter, query.page, query.page_size).await?;

    Ok(Json(page))
}
