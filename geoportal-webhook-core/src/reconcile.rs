//! Sharing Reconciler: drive one item's sharing toward each matching tag policy.
//!
//! Each (item, tag) step reads the item's sharing state, decides whether the
//! policy is already satisfied, and if not applies the smallest mutation that
//! satisfies it. A satisfied policy is a no-op with no notification, so
//! replaying the same event is harmless.
//!
//! Group shares carry a platform precondition: the portal refuses to share a
//! private item with a group. Before such a share the item is made org-shared,
//! and it stays org-shared afterwards (`satisfy_group_share_precondition`).

use crate::error::{Error, Result};
use crate::notify::NotificationEmitter;
use crate::portal::Portal;
use crate::types::{ContentItem, PolicyEntry, SharingAction, SharingMechanism, SharingTarget};
use std::sync::Arc;

/// Result of reconciling one tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied(SharingAction),
    AlreadySatisfied,
}

/// Per-item tally of a reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemReport {
    pub applied: Vec<SharingAction>,
    pub satisfied: usize,
    pub failed: usize,
}

pub struct Reconciler {
    portal: Arc<dyn Portal>,
    emitter: NotificationEmitter,
}

impl Reconciler {
    pub fn new(portal: Arc<dyn Portal>, emitter: NotificationEmitter) -> Self {
        Self { portal, emitter }
    }

    /// Reconcile every matching tag in order. Failures are logged per tag
    /// and never stop the remaining tags.
    pub async fn reconcile_item(
        &self,
        item: &mut ContentItem,
        matches: &[(String, PolicyEntry)],
    ) -> ItemReport {
        let mut report = ItemReport::default();
        for (tag, policy) in matches {
            match self.reconcile(item, tag, policy).await {
                Ok(Outcome::Applied(action)) => report.applied.push(action),
                Ok(Outcome::AlreadySatisfied) => report.satisfied += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        item_id = %item.id,
                        tag = %tag,
                        action = %SharingAction::new(&item.id, tag, policy),
                        error = %e,
                        "sharing reconciliation failed for tag"
                    );
                }
            }
        }
        report
    }

    /// Apply one tag's policy to `item`.
    ///
    /// On success `item.sharing` reflects the new remote state, so later tags
    /// in the same pass decide against it. Notifies once per applied change.
    pub async fn reconcile(
        &self,
        item: &mut ContentItem,
        tag: &str,
        policy: &PolicyEntry,
    ) -> Result<Outcome> {
        if item.sharing.satisfies(policy) {
            tracing::debug!(item_id = %item.id, tag, "policy already satisfied");
            return Ok(Outcome::AlreadySatisfied);
        }

        let action = SharingAction::new(&item.id, tag, policy);
        match (&policy.target, policy.mechanism) {
            (SharingTarget::Organization, SharingMechanism::Share) => {
                self.set_org_sharing(item, true, &action).await?;
            }
            (SharingTarget::Organization, SharingMechanism::Unshare) => {
                self.set_org_sharing(item, false, &action).await?;
            }
            (SharingTarget::Group(group_id), SharingMechanism::Share) => {
                self.ensure_membership(item, group_id).await?;
                let forced = self.satisfy_group_share_precondition(item, &action).await?;
                if let Err(e) = self.portal.share_with_group(item, group_id).await {
                    if forced {
                        tracing::warn!(
                            item_id = %item.id,
                            group_id = %group_id,
                            "group share failed after forcing org share; item left org-shared"
                        );
                    }
                    return Err(sharing_error(&action, e));
                }
                item.sharing.groups.insert(group_id.clone());
            }
            (SharingTarget::Group(group_id), SharingMechanism::Unshare) => {
                self.portal
                    .unshare_from_group(item, group_id)
                    .await
                    .map_err(|e| sharing_error(&action, e))?;
                item.sharing.groups.remove(group_id);
            }
        }

        tracing::info!(item_id = %item.id, tag, action = action.title(), "sharing updated");
        self.emitter.emit_change(item, &action).await;
        Ok(Outcome::Applied(action))
    }

    async fn set_org_sharing(
        &self,
        item: &mut ContentItem,
        shared: bool,
        action: &SharingAction,
    ) -> Result<()> {
        self.portal
            .set_org_sharing(item, shared)
            .await
            .map_err(|e| sharing_error(action, e))?;
        item.sharing.org_shared = shared;
        if !shared {
            item.sharing.public = false;
        }
        Ok(())
    }

    /// The owner and the service account must both belong to the target group
    /// before the portal accepts the share.
    async fn ensure_membership(&self, item: &ContentItem, group_id: &str) -> Result<()> {
        let mut users = vec![item.owner.clone()];
        let service_account = self.portal.service_account();
        if service_account != item.owner {
            users.push(service_account.to_string());
        }
        self.portal
            .add_group_members(group_id, &users)
            .await
            .map_err(|e| Error::Membership {
                group_id: group_id.to_string(),
                reason: e.to_string(),
            })
    }

    /// A private item cannot be shared with a group. Make it org-shared first
    /// and leave it that way. Emits nothing on its own. Returns whether the
    /// org share had to be applied.
    async fn satisfy_group_share_precondition(
        &self,
        item: &mut ContentItem,
        action: &SharingAction,
    ) -> Result<bool> {
        if item.sharing.org_shared {
            return Ok(false);
        }
        tracing::debug!(item_id = %item.id, "forcing org share ahead of group share");
        self.set_org_sharing(item, true, action).await?;
        Ok(true)
    }
}

fn sharing_error(action: &SharingAction, cause: Error) -> Error {
    Error::SharingOperation {
        item_id: action.item_id.clone(),
        action: action.title().to_string(),
        reason: cause.to_string(),
    }
}
