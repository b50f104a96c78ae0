//! Bearer-token guard for the internal API

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use shared::error::AppError;

use crate::state::AppState;

/// Rejects requests without `Authorization: Bearer $INTERNAL_API_TOKEN`
pub async fn require_internal_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::not_authenticated().into_response())?;

    if Sha256::digest(token.trim().as_bytes()) != Sha256::digest(state.internal_api_token.as_bytes())
    {
        tracing::warn!(path = %request.uri().path(), "Rejected internal API token");
        return Err(AppError::not_authenticated().into_response());
    }

    Ok(next.run(request).await)
}
