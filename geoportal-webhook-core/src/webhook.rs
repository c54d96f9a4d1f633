//! Portal webhook payloads as delivered to `POST /receiver`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Operation reported by a webhook event. Other operations are not acted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOperation {
    Add,
    Update,
}

impl FromStr for EventOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            other => Err(format!("unsupported webhook operation '{other}'")),
        }
    }
}

/// One change notification. `id` names the item the event is about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub operation: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub source: String,
    pub user_id: String,
    pub username: String,
    pub when: i64,
}

impl Event {
    pub fn operation(&self) -> Result<EventOperation, String> {
        self.operation.parse()
    }

    /// Only item events refer to content that can carry tags.
    pub fn is_item_event(&self) -> bool {
        self.source.eq_ignore_ascii_case("item")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookInfo {
    #[serde(rename = "portalURL")]
    pub portal_url: String,
    #[serde(rename = "webhookId")]
    pub webhook_id: String,
    #[serde(rename = "webhookName")]
    pub webhook_name: String,
    pub when: i64,
}

/// Envelope carrying a batch of events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub events: Vec<Event>,
    pub info: WebhookInfo,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookRegistry {
    pub name: String,
}

/// Handshake the portal sends when a webhook is registered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookRegistration {
    #[serde(rename = "WebhookRegistry")]
    pub webhook_registry: WebhookRegistry,
}

/// Anything the receiver endpoint accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReceiverPayload {
    Webhook(Webhook),
    Registration(WebhookRegistration),
}
