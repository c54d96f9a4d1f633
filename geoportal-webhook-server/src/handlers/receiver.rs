//! Webhook receiver endpoints:
//!   POST /receiver: accept a webhook envelope or registration handshake
//!   GET  /receiver: liveness probe

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use geoportal_webhook_core::webhook::ReceiverPayload;
use serde_json::{json, Value};

use crate::router::AppState;

/// POST /receiver: always 202, whatever the payload. Processing happens on
/// the background worker.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    match serde_json::from_slice::<ReceiverPayload>(&body) {
        Ok(payload) => {
            if let ReceiverPayload::Webhook(hook) = &payload {
                tracing::info!(
                    webhook = %hook.info.webhook_name,
                    events = hook.events.len(),
                    "webhook received"
                );
            }
            state.queue.enqueue(payload).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "unrecognized receiver payload, dropping");
        }
    }
    (StatusCode::ACCEPTED, Json(json!({ "response": "accepted" })))
}

/// GET /receiver
pub async fn liveness() -> Json<Value> {
    Json(json!({
        "content": "GET request successful",
        "response": "accepted",
    }))
}
