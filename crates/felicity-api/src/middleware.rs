use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use felicity_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// The caller's raw bearer token, forwarded to the core API on access checks.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let claims = verify_token(&state.jwt_secret, &token).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(BearerToken(token));
    Ok(next.run(req).await)
}

pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
