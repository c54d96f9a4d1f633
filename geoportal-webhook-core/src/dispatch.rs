//! Event Dispatch: one webhook batch in, reconciliation per referenced item.
//!
//! Nothing here returns an error. Failures are contained at the smallest
//! unit (tag, event, batch) and logged, and the caller always acknowledges
//! the delivery upstream.

use crate::error::Error;
use crate::notify::NotificationEmitter;
use crate::policy::{load_policies, PolicySource, PolicyTable};
use crate::portal::Portal;
use crate::reconcile::Reconciler;
use crate::scanner::find_applicable;
use crate::types::SharingAction;
use crate::webhook::{Event, ReceiverPayload, Webhook, WebhookRegistration};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub const WEBHOOK_RECEIVED: &str = "Webhook received";
pub const REGISTRATION_RECEIVED: &str = "Webhook registration received";

/// What happened to one batch. Used for logging and tests only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub events: usize,
    pub skipped: usize,
    pub reconciled: usize,
    pub not_found: usize,
    pub lookup_failures: usize,
    pub applied: Vec<SharingAction>,
    pub tag_failures: usize,
    pub policy_table_unavailable: bool,
}

pub struct EventDispatcher {
    portal: Arc<dyn Portal>,
    policies: Arc<dyn PolicySource>,
    reconciler: Reconciler,
    emitter: NotificationEmitter,
}

impl EventDispatcher {
    pub fn new(
        portal: Arc<dyn Portal>,
        policies: Arc<dyn PolicySource>,
        emitter: NotificationEmitter,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&portal), emitter.clone());
        Self {
            portal,
            policies,
            reconciler,
            emitter,
        }
    }

    pub async fn handle_payload(&self, payload: &ReceiverPayload) -> DispatchReport {
        match payload {
            ReceiverPayload::Webhook(hook) => self.handle(hook).await,
            ReceiverPayload::Registration(reg) => {
                self.handle_registration(reg).await;
                DispatchReport::default()
            }
        }
    }

    pub async fn handle_registration(&self, registration: &WebhookRegistration) {
        tracing::info!(
            name = %registration.webhook_registry.name,
            "webhook registration received"
        );
        self.emitter
            .emit(REGISTRATION_RECEIVED, &to_json(registration))
            .await;
    }

    /// Process a batch sequentially against one policy table snapshot.
    pub async fn handle(&self, webhook: &Webhook) -> DispatchReport {
        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "webhook_batch",
            %batch_id,
            webhook = %webhook.info.webhook_name,
            events = webhook.events.len()
        );
        self.handle_batch(webhook).instrument(span).await
    }

    async fn handle_batch(&self, webhook: &Webhook) -> DispatchReport {
        let mut report = DispatchReport {
            events: webhook.events.len(),
            ..Default::default()
        };

        self.emitter.emit(WEBHOOK_RECEIVED, &to_json(webhook)).await;

        let actionable: Vec<&Event> = webhook
            .events
            .iter()
            .filter(|event| is_actionable(event))
            .collect();
        report.skipped = report.events - actionable.len();
        if actionable.is_empty() {
            tracing::debug!("no item events to reconcile");
            return report;
        }

        let table = match load_policies(self.policies.as_ref()).await {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(error = %e, "policy table unavailable, skipping reconciliation for batch");
                report.policy_table_unavailable = true;
                return report;
            }
        };

        for event in actionable {
            self.handle_event(event, &table, &mut report).await;
        }

        tracing::info!(
            reconciled = report.reconciled,
            applied = report.applied.len(),
            not_found = report.not_found,
            tag_failures = report.tag_failures,
            "webhook batch processed"
        );
        report
    }

    async fn handle_event(&self, event: &Event, table: &PolicyTable, report: &mut DispatchReport) {
        let mut item = match self.portal.get_item(&event.id).await {
            Ok(item) => item,
            Err(e @ Error::ItemNotFound(_)) => {
                tracing::warn!(item_id = %event.id, error = %e, "event references missing item, skipping");
                report.not_found += 1;
                return;
            }
            Err(e) => {
                tracing::error!(item_id = %event.id, error = %e, "item lookup failed, skipping event");
                report.lookup_failures += 1;
                return;
            }
        };

        let matches = find_applicable(&item.tags, table);
        tracing::debug!(
            item_id = %item.id,
            tags = item.tags.len(),
            matches = matches.len(),
            "scanned item tags"
        );
        let item_report = self.reconciler.reconcile_item(&mut item, &matches).await;
        report.reconciled += 1;
        report.tag_failures += item_report.failed;
        report.applied.extend(item_report.applied);
    }
}

fn is_actionable(event: &Event) -> bool {
    if !event.is_item_event() {
        tracing::debug!(id = %event.id, source = %event.source, "ignoring non-item event");
        return false;
    }
    match event.operation() {
        Ok(_) => true,
        Err(reason) => {
            tracing::warn!(item_id = %event.id, %reason, "ignoring event");
            false
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<unserializable payload: {e}>"))
}
