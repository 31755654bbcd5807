//! Bearer token middleware.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::jwt::TOKEN_TYPE_ACCESS;
use crate::errors::ApiError;
use crate::state::AppState;

/// Paths reachable without a token. The SMS login endpoints must be open or
/// nobody could ever obtain a token; chat is open to anonymous use.
const OPEN_PREFIXES: [&str; 4] = [
    "/health",
    "/api/v1/auth/send_sms",
    "/api/v1/auth/login_sms",
    "/api/v1/chat",
];

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path();
    if OPEN_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.auth.jwt().verify_token(token, TOKEN_TYPE_ACCESS)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
