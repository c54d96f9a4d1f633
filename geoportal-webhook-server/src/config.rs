//! Process configuration, read once at startup.
//!
//! Reads `.env` (if present) and then the environment. Variable names match
//! the ones the function app has always been deployed with.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::path::PathBuf;

pub const API_TITLE: &str = "GeoPortal 2.0 Webhook Automation API";
pub const API_VERSION: &str = "v0.1";
pub const API_DESCRIPTION: &str =
    "An API to process webhooks from ArcGIS Enterprise and carry out automated tasks.";
pub const API_CONTACT_NAME: &str = "WaTech";
pub const API_CONTACT_EMAIL: &str = "gis@watech.wa.gov";

const PORTAL_URL: &str = "Gp2ApplicationUrl";
const PORTAL_USER: &str = "Gp2AutomationAdminUser";
const PORTAL_PASSWORD: &str = "Gp2AutomationAdminPw";
const TEAMS_URL: &str = "Gp2TeamsChannelNotificationURI";
const TAG_SERVICE_GUID: &str = "Gp2AdminTagResultServiceGUID";
const POLICY_FILE: &str = "GP2_POLICY_FILE";
const POLICY_LAYER: &str = "GP2_POLICY_LAYER";
const BIND_ADDR: &str = "GP2_BIND_ADDR";
const QUEUE_CAPACITY: &str = "GP2_QUEUE_CAPACITY";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Where the tag policy table comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicySourceConfig {
    /// Hosted feature service (the tag management survey results).
    FeatureService { item_id: String, layer: u32 },
    /// Local YAML file, for development and disconnected runs.
    YamlFile(PathBuf),
}

#[derive(Clone)]
pub struct Settings {
    pub portal_url: String,
    pub portal_user: String,
    portal_password: String,
    pub teams_notification_url: String,
    pub policy: PolicySourceConfig,
    pub bind_addr: String,
    pub queue_capacity: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} must be set"));

        let policy = match get(POLICY_FILE) {
            Some(path) => PolicySourceConfig::YamlFile(PathBuf::from(path)),
            None => PolicySourceConfig::FeatureService {
                item_id: required(TAG_SERVICE_GUID)?,
                layer: match get(POLICY_LAYER) {
                    Some(v) => v
                        .parse()
                        .with_context(|| format!("{POLICY_LAYER} must be a layer index"))?,
                    None => 0,
                },
            },
        };

        let queue_capacity = match get(QUEUE_CAPACITY) {
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("{QUEUE_CAPACITY} must be a positive integer"))?,
            None => DEFAULT_QUEUE_CAPACITY,
        };

        Ok(Self {
            portal_url: required(PORTAL_URL)?.trim_end_matches('/').to_string(),
            portal_user: required(PORTAL_USER)?,
            portal_password: required(PORTAL_PASSWORD)?,
            teams_notification_url: required(TEAMS_URL)?,
            policy,
            bind_addr: get(BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            queue_capacity,
        })
    }

    pub fn portal_password(&self) -> &str {
        &self.portal_password
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("portal_url", &self.portal_url)
            .field("portal_user", &self.portal_user)
            .field("portal_password", &"<redacted>")
            .field("teams_notification_url", &self.teams_notification_url)
            .field("policy", &self.policy)
            .field("bind_addr", &self.bind_addr)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            (PORTAL_URL, "https://gis.example.gov/portal/"),
            (PORTAL_USER, "gp2_automation"),
            (PORTAL_PASSWORD, "hunter2"),
            (TEAMS_URL, "https://teams.example/hook"),
            (TAG_SERVICE_GUID, "0123abcd"),
        ]
    }

    #[test]
    fn defaults_and_trailing_slash() {
        let s = Settings::from_lookup(lookup(&base())).unwrap();
        assert_eq!(s.portal_url, "https://gis.example.gov/portal");
        assert_eq!(s.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(s.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(
            s.policy,
            PolicySourceConfig::FeatureService {
                item_id: "0123abcd".into(),
                layer: 0
            }
        );
        assert_eq!(s.portal_password(), "hunter2");
    }

    #[test]
    fn missing_required_names_the_variable() {
        let pairs: Vec<_> = base()
            .into_iter()
            .filter(|(k, _)| *k != PORTAL_PASSWORD)
            .collect();
        let err = Settings::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains(PORTAL_PASSWORD));
    }

    #[test]
    fn policy_file_replaces_feature_service() {
        let pairs: Vec<_> = base()
            .into_iter()
            .filter(|(k, _)| *k != TAG_SERVICE_GUID)
            .chain([(POLICY_FILE, "policies.yaml")])
            .collect();
        let s = Settings::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            s.policy,
            PolicySourceConfig::YamlFile(PathBuf::from("policies.yaml"))
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        let mut pairs = base();
        pairs.push((QUEUE_CAPACITY, "0"));
        assert!(Settings::from_lookup(lookup(&pairs)).is_err());

        let mut pairs = base();
        pairs.push((POLICY_LAYER, "first"));
        assert!(Settings::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let s = Settings::from_lookup(lookup(&base())).unwrap();
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
