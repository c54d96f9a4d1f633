//! Router construction for the webhook receiver.

use std::sync::Arc;

use axum::{routing::get, Router};
use geoportal_webhook_core::portal::Portal;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::worker::WorkQueue;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub queue: WorkQueue,
    pub portal: Arc<dyn Portal>,
}

impl AppState {
    pub fn new(queue: WorkQueue, portal: Arc<dyn Portal>) -> Self {
        Self { queue, portal }
    }
}

/// Build the full axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::info::api_info))
        .route(
            "/receiver",
            get(handlers::receiver::liveness).post(handlers::receiver::receive),
        )
        // path the portal webhooks were originally registered with
        .route(
            "/reciever",
            get(handlers::receiver::liveness).post(handlers::receiver::receive),
        )
        .route("/test", get(handlers::portal::test_portal))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
