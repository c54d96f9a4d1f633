use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for a reconciliation pass.
///
/// Every variant is contained at the smallest unit it affects (one tag, one
/// event, one batch). None of them reach the HTTP boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("policy source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("membership update failed for group {group_id}: {reason}")]
    Membership { group_id: String, reason: String },

    #[error("{action} failed on item {item_id}: {reason}")]
    SharingOperation {
        item_id: String,
        action: String,
        reason: String,
    },

    #[error("notification delivery failed: {0}")]
    NotificationDelivery(String),

    #[error("portal request failed: {0}")]
    Portal(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound(_) | Self::GroupNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_sharing_operation() {
        let e = Error::SharingOperation {
            item_id: "abc123".into(),
            action: "Group Share".into(),
            reason: "permission denied".into(),
        };
        assert_eq!(
            e.to_string(),
            "Group Share failed on item abc123: permission denied"
        );
    }

    #[test]
    fn display_membership() {
        let e = Error::Membership {
            group_id: "G1".into(),
            reason: "group not found: G1".into(),
        };
        assert_eq!(
            e.to_string(),
            "membership update failed for group G1: group not found: G1"
        );
    }

    #[test]
    fn not_found_classification() {
        assert!(Error::ItemNotFound("x".into()).is_not_found());
        assert!(Error::GroupNotFound("g".into()).is_not_found());
        assert!(!Error::PermissionDenied("x".into()).is_not_found());
        assert!(!Error::Internal(anyhow::anyhow!("boom")).is_not_found());
    }
}
