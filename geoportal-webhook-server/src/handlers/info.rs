use axum::Json;
use serde_json::{json, Value};

use crate::config::{API_CONTACT_EMAIL, API_CONTACT_NAME, API_DESCRIPTION, API_TITLE, API_VERSION};

/// GET /: API metadata.
pub async fn api_info() -> Json<Value> {
    Json(json!({
        "title": API_TITLE,
        "version": API_VERSION,
        "description": API_DESCRIPTION,
        "contact": { "name": API_CONTACT_NAME, "email": API_CONTACT_EMAIL },
    }))
}
