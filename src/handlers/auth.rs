use crate::accounts::{claims_expiry, normalize_email, validate_credentials, AuthError};
use crate::db::StoreError;
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::auth_rate_limit_middleware;
use crate::models::auth::{AuthResponse, Claims, Credentials, UserResponse};
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{get, post},
    Router,
};
use bcrypt::{hash, verify};
use serde_json::json;
use std::sync::Arc;

pub fn auth_routes() -> Router {
    let public_routes = Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .layer(axum::middleware::from_fn(auth_rate_limit_middleware));

    let protected_routes = Router::new()
        .route("/api/auth/signout", post(sign_out))
        .route("/api/auth/session", get(current_session))
        .layer(axum::middleware::from_fn(auth_middleware));

    public_routes.merge(protected_routes)
}

async fn sign_up(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<Json<AuthResponse>, AuthError> {
    let email = normalize_email(&payload.email);
    validate_credentials(&email, &payload.password)?;

    let password_hash = hash(&payload.password, state.config.bcrypt_cost)
        .map_err(|e| AuthError::Internal(format!("Error hashing password: {}", e)))?;

    let user = match state.accounts.create_user(&email, &password_hash).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id = %user.id, "user registered");

    // A fresh account is signed in straight away.
    let token = state.tokens.issue(&user)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "User registered successfully".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn sign_in(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<Credentials>,
) -> Result<Json<AuthResponse>, AuthError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AuthError::InvalidInput("Email and password are required"));
    }

    let user = state
        .accounts
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    match verify(&payload.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return Err(AuthError::InvalidCredentials),
        Err(e) => return Err(AuthError::Internal(format!("Error verifying password: {}", e))),
    }

    let token = state.tokens.issue(&user)?;
    tracing::info!(user_id = %user.id, "user signed in");

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        token,
    }))
}

async fn sign_out(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, AuthError> {
    state
        .accounts
        .revoke_token(claims.jti, claims_expiry(&claims))
        .await?;

    tracing::info!(user_id = %claims.sub, "user signed out");
    Ok(Json(json!({ "success": true, "message": "Signed out" })))
}

async fn current_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, AuthError> {
    let user = state
        .accounts
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::Unauthorized("User not found"))?;

    Ok(Json(json!({
        "success": true,
        "user": UserResponse::from(user)
    })))
}

#[cfg(test)]
mod tests {
    use crate::testing::{send, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let app = TestApp::new();

        let (status, body) = send(
            &app.router,
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({ "email": "Ada@Example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert!(body["token"].as_str().is_some());

        let (status, body) = send(
            &app.router,
            "POST",
            "/api/auth/signin",
            None,
            Some(json!({ "email": "ada@example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn duplicate_sign_up_conflicts() {
        let app = TestApp::new();
        let credentials = json!({ "email": "ada@example.com", "password": "hunter22" });

        let (status, _) = send(&app.router, "POST", "/api/auth/signup", None, Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app.router, "POST", "/api/auth/signup", None, Some(credentials)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = TestApp::new();
        app.sign_up("ada@example.com", "hunter22").await;

        let (status, body) = send(
            &app.router,
            "POST",
            "/api/auth/signin",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let app = TestApp::new();
        let (status, _) = send(
            &app.router,
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({ "email": "ada@example.com", "password": "123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_out_tokens_stop_working() {
        let app = TestApp::new();
        let token = app.sign_up("ada@example.com", "hunter22").await;

        let (status, body) = send(&app.router, "GET", "/api/auth/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "ada@example.com");

        let (status, _) = send(&app.router, "POST", "/api/auth/signout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app.router, "GET", "/api/auth/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Session has been signed out");
    }

    #[tokio::test]
    async fn guarded_routes_require_a_token() {
        let app = TestApp::new();
        for (method, uri) in [
            ("GET", "/api/history"),
            ("DELETE", "/api/history"),
            ("POST", "/api/chat"),
            ("POST", "/api/transcribe"),
            ("GET", "/api/auth/session"),
        ] {
            let (status, _) = send(&app.router, method, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        }

        let (status, _) = send(&app.router, "GET", "/api/history", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
