use crate::history::PAGE_SIZE;
use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const PING_TIMEOUT: Duration = Duration::from_secs(3);

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(status))
}

async fn status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let database = match tokio::time::timeout(PING_TIMEOUT, state.history.ping()).await {
        Ok(Ok(())) => "connected",
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "database ping failed");
            "unavailable"
        }
        Err(_) => {
            tracing::warn!("database ping timed out");
            "unavailable"
        }
    };

    Json(json!({
        "status": if database == "connected" { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": database,
            "provider": state.config.openai.base_url,
        },
        "config": {
            "chatTimeoutSecs": state.config.chat_timeout.as_secs(),
            "speechInputLimit": state.config.speech_input_limit,
            "pageSize": PAGE_SIZE,
        }
    }))
}

#[cfg(test)]
mod tests {
    use crate::testing::{send, TestApp};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn reports_config_and_services() {
        let app = TestApp::new();

        let (status, body) = send(&app.router, "GET", "/api/status", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["services"]["database"], "connected");
        assert_eq!(body["config"]["chatTimeoutSecs"], 60);
        assert_eq!(body["config"]["speechInputLimit"], 500);
        assert_eq!(body["config"]["pageSize"], 20);
    }

    #[tokio::test]
    async fn degraded_when_the_database_is_down() {
        let app = TestApp::new();
        app.history.set_unavailable(true);

        let (_, body) = send(&app.router, "GET", "/api/status", None, None).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["services"]["database"], "unavailable");
    }
}
