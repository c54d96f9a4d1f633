use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::router::AppState;

/// GET /test: round-trip to the portal and report its URL.
pub async fn test_portal(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.portal.check_connection().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "response": "portal connection verified",
                "content": format!("Portal URL: {}", state.portal.url()),
            })),
        ),
        Err(e) => {
            tracing::error!(portal = %state.portal.url(), error = %e, "portal connectivity check failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "response": "portal unreachable",
                    "content": e.to_string(),
                })),
            )
        }
    }
}
