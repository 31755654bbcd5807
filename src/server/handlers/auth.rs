use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::LoginResult;
use crate::errors::ApiError;
use crate::state::AppState;

pub async fn send_sms(
    State(state): State<AppState>,
    Path(mobile): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // Throttle before touching the gateway; one message per minute per number.
    state.sms_limiter.check(&mobile)?;
    state.auth.send_sms(&mobile).await?;

    Ok(Json(json!({ "message": "验证码已发送" })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub mobile: String,
    pub code: String,
}

pub async fn login_sms(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResult>, ApiError> {
    let result = state.auth.login_sms(&request.mobile, &request.code).await?;
    Ok(Json(result))
}
