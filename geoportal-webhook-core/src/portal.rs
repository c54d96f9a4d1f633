//! Portal trait: the only way reconciliation touches remote item state.
//!
//! The server crate implements it over the ArcGIS REST API. `MemoryPortal`
//! backs tests and local runs.

use crate::error::{Error, Result};
use crate::types::ContentItem;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

/// Session handle to the GIS portal.
///
/// Constructed once per process and passed to every component that needs
/// it. Each call is assumed atomic on the portal side; sequences of calls
/// are not.
#[async_trait]
pub trait Portal: Send + Sync {
    /// Base URL of the portal.
    fn url(&self) -> &str;

    /// User name this process acts as. Added to groups alongside item owners.
    fn service_account(&self) -> &str;

    /// Round-trip to the portal to prove the session works.
    async fn check_connection(&self) -> Result<()>;

    /// Fetch an item with its tags and current sharing state.
    async fn get_item(&self, item_id: &str) -> Result<ContentItem>;

    /// Set or clear organization-wide visibility. Group sharing is untouched.
    async fn set_org_sharing(&self, item: &ContentItem, shared: bool) -> Result<()>;

    async fn share_with_group(&self, item: &ContentItem, group_id: &str) -> Result<()>;

    async fn unshare_from_group(&self, item: &ContentItem, group_id: &str) -> Result<()>;

    /// Make sure every user in `users` is a member of the group.
    async fn add_group_members(&self, group_id: &str, users: &[String]) -> Result<()>;
}

// ── MemoryPortal ──

#[derive(Default)]
struct MemoryPortalState {
    items: HashMap<String, ContentItem>,
    groups: HashMap<String, BTreeSet<String>>,
    denied_items: HashSet<String>,
    rejecting_groups: HashSet<String>,
    offline: bool,
    mutations: Vec<String>,
}

/// In-memory Portal for tests and local runs.
///
/// Mirrors the platform rule that a private item cannot be shared with a
/// group: `share_with_group` fails unless the item is already org-shared.
/// Every successful mutation is appended to an ordered log.
pub struct MemoryPortal {
    url: String,
    service_account: String,
    inner: RwLock<MemoryPortalState>,
}

impl MemoryPortal {
    pub fn new(url: impl Into<String>, service_account: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_account: service_account.into(),
            inner: RwLock::new(MemoryPortalState::default()),
        }
    }

    pub fn with_item(self, item: ContentItem) -> Self {
        self.insert_item(item);
        self
    }

    pub fn with_group(self, group_id: &str) -> Self {
        self.insert_group(group_id);
        self
    }

    pub fn insert_item(&self, item: ContentItem) {
        if let Ok(mut state) = self.inner.write() {
            state.items.insert(item.id.clone(), item);
        }
    }

    pub fn insert_group(&self, group_id: &str) {
        if let Ok(mut state) = self.inner.write() {
            state.groups.entry(group_id.to_string()).or_default();
        }
    }

    /// Make every sharing mutation on `item_id` fail with `PermissionDenied`.
    pub fn deny_sharing(&self, item_id: &str) {
        if let Ok(mut state) = self.inner.write() {
            state.denied_items.insert(item_id.to_string());
        }
    }

    /// Make `share_with_group` to `group_id` fail while membership changes
    /// still succeed.
    pub fn reject_group_shares(&self, group_id: &str) {
        if let Ok(mut state) = self.inner.write() {
            state.rejecting_groups.insert(group_id.to_string());
        }
    }

    /// Make `check_connection` fail.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.inner.write() {
            state.offline = offline;
        }
    }

    pub fn item(&self, item_id: &str) -> Option<ContentItem> {
        self.inner
            .read()
            .ok()
            .and_then(|s| s.items.get(item_id).cloned())
    }

    pub fn group_members(&self, group_id: &str) -> BTreeSet<String> {
        self.inner
            .read()
            .ok()
            .and_then(|s| s.groups.get(group_id).cloned())
            .unwrap_or_default()
    }

    /// Ordered log of successful mutations, e.g. `share_group abc G1`.
    pub fn mutations(&self) -> Vec<String> {
        self.inner
            .read()
            .map(|s| s.mutations.clone())
            .unwrap_or_default()
    }
}

impl MemoryPortalState {
    fn writable_item(&mut self, item_id: &str) -> Result<&mut ContentItem> {
        if self.denied_items.contains(item_id) {
            return Err(Error::PermissionDenied(format!(
                "not allowed to change sharing of item {item_id}"
            )));
        }
        self.items
            .get_mut(item_id)
            .ok_or_else(|| Error::ItemNotFound(item_id.to_string()))
    }
}

#[async_trait]
impl Portal for MemoryPortal {
    fn url(&self) -> &str {
        &self.url
    }

    fn service_account(&self) -> &str {
        &self.service_account
    }

    async fn check_connection(&self) -> Result<()> {
        let state = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        if state.offline {
            return Err(Error::Portal(format!("{} is unreachable", self.url)));
        }
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> Result<ContentItem> {
        let state = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        state
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound(item_id.to_string()))
    }

    async fn set_org_sharing(&self, item: &ContentItem, shared: bool) -> Result<()> {
        let mut state = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let sharing = &mut state.writable_item(&item.id)?.sharing;
        sharing.org_shared = shared;
        if !shared {
            sharing.public = false;
        }
        state
            .mutations
            .push(format!("org_share {} {}", item.id, shared));
        Ok(())
    }

    async fn share_with_group(&self, item: &ContentItem, group_id: &str) -> Result<()> {
        let mut state = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        if !state.groups.contains_key(group_id) {
            return Err(Error::GroupNotFound(group_id.to_string()));
        }
        if state.rejecting_groups.contains(group_id) {
            return Err(Error::Portal(format!(
                "notSharedWith: [\"{group_id}\"]"
            )));
        }
        let stored = state.writable_item(&item.id)?;
        if !stored.sharing.org_shared {
            return Err(Error::Portal(format!(
                "item {} is private and cannot be shared with group {group_id}",
                item.id
            )));
        }
        stored.sharing.groups.insert(group_id.to_string());
        state
            .mutations
            .push(format!("share_group {} {group_id}", item.id));
        Ok(())
    }

    async fn unshare_from_group(&self, item: &ContentItem, group_id: &str) -> Result<()> {
        let mut state = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        state.writable_item(&item.id)?.sharing.groups.remove(group_id);
        state
            .mutations
            .push(format!("unshare_group {} {group_id}", item.id));
        Ok(())
    }

    async fn add_group_members(&self, group_id: &str, users: &[String]) -> Result<()> {
        let mut state = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;
        let members = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| Error::GroupNotFound(group_id.to_string()))?;
        members.extend(users.iter().cloned());
        state
            .mutations
            .push(format!("add_members {group_id} {}", users.join(",")));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SharingState;

    fn item(id: &str, org_shared: bool) -> ContentItem {
        ContentItem {
            id: id.into(),
            title: "Parcels".into(),
            owner: "alice".into(),
            tags: vec![],
            sharing: SharingState {
                org_shared,
                public: false,
                groups: BTreeSet::new(),
            },
        }
    }

    #[tokio::test]
    async fn get_missing_item_is_not_found() {
        let portal = MemoryPortal::new("https://portal", "svc");
        let err = portal.get_item("nope").await.unwrap_err();
        assert!(matches!(err, Error::ItemNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn private_item_cannot_be_group_shared() {
        let portal = MemoryPortal::new("https://portal", "svc")
            .with_item(item("a", false))
            .with_group("G1");
        let it = portal.get_item("a").await.unwrap();
        let err = portal.share_with_group(&it, "G1").await.unwrap_err();
        assert!(matches!(err, Error::Portal(_)));

        portal.set_org_sharing(&it, true).await.unwrap();
        portal.share_with_group(&it, "G1").await.unwrap();
        let stored = portal.item("a").unwrap();
        assert!(stored.sharing.groups.contains("G1"));
        assert_eq!(
            portal.mutations(),
            vec!["org_share a true".to_string(), "share_group a G1".to_string()]
        );
    }

    #[tokio::test]
    async fn membership_requires_existing_group() {
        let portal = MemoryPortal::new("https://portal", "svc");
        let err = portal
            .add_group_members("ghost", &["alice".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(_)));
    }

    #[tokio::test]
    async fn denied_item_rejects_mutation() {
        let portal = MemoryPortal::new("https://portal", "svc").with_item(item("a", false));
        portal.deny_sharing("a");
        let it = portal.get_item("a").await.unwrap();
        let err = portal.set_org_sharing(&it, true).await.unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert!(portal.mutations().is_empty());
    }

    #[tokio::test]
    async fn offline_portal_fails_connection_check() {
        let portal = MemoryPortal::new("https://portal", "svc");
        assert!(portal.check_connection().await.is_ok());
        portal.set_offline(true);
        assert!(portal.check_connection().await.is_err());
    }
}
