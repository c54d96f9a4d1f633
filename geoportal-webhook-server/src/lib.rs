//! geoportal-webhook-server: HTTP receiver, ArcGIS portal client and Teams
//! notifier around `geoportal-webhook-core`.

pub mod arcgis;
pub mod config;
pub mod handlers;
pub mod policy_source;
pub mod router;
pub mod teams;
pub mod worker;
