//! geoportal-webhook-core: tag-driven sharing reconciliation.
//!
//! Webhook events from the portal name content items. Each item's tags are
//! cross-referenced against the tag policy table, and every matching policy
//! is reconciled against the item's current sharing state. Collaborators
//! (portal, policy source, notification sink) sit behind traits so the
//! server crate can plug in HTTP implementations and tests can use the
//! in-memory ones shipped here.

pub mod dispatch;
pub mod error;
pub mod notify;
pub mod policy;
pub mod portal;
pub mod reconcile;
pub mod scanner;
pub mod types;
pub mod webhook;

pub use error::{Error, Result};
