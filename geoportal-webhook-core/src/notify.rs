//! Notification Emitter: best-effort chat messages.

use crate::error::{Error, Result};
use crate::types::{ContentItem, Notification, SharingAction, SharingMechanism, SharingTarget};
use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Outbound notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Wraps a `Notifier` so that delivery can never fail the caller.
#[derive(Clone)]
pub struct NotificationEmitter {
    notifier: Arc<dyn Notifier>,
}

impl NotificationEmitter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Send a notification. Failures are logged and dropped.
    pub async fn emit(&self, title: &str, text: &str) {
        let notification = Notification::new(title, text);
        if let Err(e) = self.notifier.send(&notification).await {
            tracing::warn!(title, error = %e, "notification not delivered");
        }
    }

    /// Announce a completed sharing change.
    pub async fn emit_change(&self, item: &ContentItem, action: &SharingAction) {
        self.emit(action.title(), &change_text(item, action)).await;
    }
}

/// Human-readable description of one completed change.
pub fn change_text(item: &ContentItem, action: &SharingAction) -> String {
    let scope = match &action.target {
        SharingTarget::Organization => "the organization".to_string(),
        SharingTarget::Group(id) => format!("group {id}"),
    };
    let verb = match action.mechanism {
        SharingMechanism::Share => "shared with",
        SharingMechanism::Unshare => "unshared from",
    };
    format!(
        "Item '{}' ({}) owned by {} was {} {} because it is tagged '{}'.",
        item.title, item.id, item.owner, verb, scope, action.tag
    )
}

// ── MemoryNotifier ──

/// Records notifications in memory. Can be switched to fail every send.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.failing.lock() {
            *f = failing;
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.title).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut s) = self.sent.lock() {
            s.clear();
        }
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let failing = *self.failing.lock().map_err(|e| anyhow!("Lock: {}", e))?;
        if failing {
            return Err(Error::NotificationDelivery(
                "memory notifier set to fail".into(),
            ));
        }
        self.sent
            .lock()
            .map_err(|e| anyhow!("Lock: {}", e))?
            .push(notification.clone());
        Ok(())
    }
}
