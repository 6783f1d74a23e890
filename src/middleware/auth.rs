use crate::accounts::AuthError;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Extracts the token from a `Bearer <token>` authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::Unauthorized("Missing Authorization header"))?;

    let value = header
        .to_str()
        .map_err(|_| AuthError::Unauthorized("Invalid Authorization header format"))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized(
            "Invalid Authorization header format. Expected 'Bearer <token>'",
        ))
}

/// Route guard: rejects requests without a valid, unrevoked session token and
/// stores the token's `Claims` in the request extensions for handlers.
pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    let claims = match state.tokens.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("JWT verification failed: {}", e);
            return AuthError::Unauthorized("Invalid or expired token").into_response();
        }
    };

    match state.accounts.is_revoked(claims.jti).await {
        Ok(false) => {}
        Ok(true) => return AuthError::Unauthorized("Session has been signed out").into_response(),
        Err(e) => return AuthError::Store(e).into_response(),
    }

    request.extensions_mut().insert(claims);
    next.run(request).await
}
