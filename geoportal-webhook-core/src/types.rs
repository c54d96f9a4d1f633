use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ─── Policy vocabulary ────────────────────────────────────────

/// Direction of a sharing action: grant or revoke visibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharingMechanism {
    Share,
    Unshare,
}

impl FromStr for SharingMechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "share" => Ok(Self::Share),
            "unshare" => Ok(Self::Unshare),
            other => Err(format!("unrecognized sharing mechanism '{other}'")),
        }
    }
}

impl fmt::Display for SharingMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Share => f.write_str("SHARE"),
            Self::Unshare => f.write_str("UNSHARE"),
        }
    }
}

/// Scope of visibility. A group target always carries its group id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharingTarget {
    Organization,
    Group(String),
}

/// Target kind as it appears in the policy table, before the group id is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Organization,
    Group,
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "organization" | "org" => Ok(Self::Organization),
            "group" => Ok(Self::Group),
            other => Err(format!("unrecognized sharing target '{other}'")),
        }
    }
}

impl fmt::Display for SharingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization => f.write_str("organization"),
            Self::Group(id) => write!(f, "group {id}"),
        }
    }
}

/// Immutable policy row keyed (in the table) by tag name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub mechanism: SharingMechanism,
    pub target: SharingTarget,
}

impl PolicyEntry {
    pub fn new(mechanism: SharingMechanism, target: SharingTarget) -> Self {
        Self { mechanism, target }
    }

    pub fn share_org() -> Self {
        Self::new(SharingMechanism::Share, SharingTarget::Organization)
    }

    pub fn unshare_org() -> Self {
        Self::new(SharingMechanism::Unshare, SharingTarget::Organization)
    }

    pub fn share_group(group_id: impl Into<String>) -> Self {
        Self::new(SharingMechanism::Share, SharingTarget::Group(group_id.into()))
    }

    pub fn unshare_group(group_id: impl Into<String>) -> Self {
        Self::new(
            SharingMechanism::Unshare,
            SharingTarget::Group(group_id.into()),
        )
    }
}

// ─── Content items ────────────────────────────────────────────

/// Current visibility of an item: org-wide flag plus the groups it is shared with.
///
/// `public` items are visible to everyone and therefore also `org_shared`.
/// Policies never set it; it is tracked so that mutations leave it as found.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingState {
    pub org_shared: bool,
    #[serde(default)]
    pub public: bool,
    pub groups: BTreeSet<String>,
}

impl SharingState {
    /// True when applying `policy` would change nothing.
    pub fn satisfies(&self, policy: &PolicyEntry) -> bool {
        match (&policy.target, policy.mechanism) {
            (SharingTarget::Organization, SharingMechanism::Share) => self.org_shared,
            (SharingTarget::Organization, SharingMechanism::Unshare) => !self.org_shared,
            (SharingTarget::Group(id), SharingMechanism::Share) => self.groups.contains(id),
            (SharingTarget::Group(id), SharingMechanism::Unshare) => !self.groups.contains(id),
        }
    }
}

/// A portal content item. Owned by the portal; this system only changes its sharing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub tags: Vec<String>,
    pub sharing: SharingState,
}

// ─── Derived, ephemeral ───────────────────────────────────────

/// One (mechanism, target) applied to one item because of one tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharingAction {
    pub item_id: String,
    pub tag: String,
    pub mechanism: SharingMechanism,
    pub target: SharingTarget,
}

impl SharingAction {
    pub fn new(item_id: &str, tag: &str, policy: &PolicyEntry) -> Self {
        Self {
            item_id: item_id.to_string(),
            tag: tag.to_string(),
            mechanism: policy.mechanism,
            target: policy.target.clone(),
        }
    }

    /// Notification title for this action.
    pub fn title(&self) -> &'static str {
        match (&self.target, self.mechanism) {
            (SharingTarget::Organization, SharingMechanism::Share) => "Org Share",
            (SharingTarget::Organization, SharingMechanism::Unshare) => "Org Unshare",
            (SharingTarget::Group(_), SharingMechanism::Share) => "Group Share",
            (SharingTarget::Group(_), SharingMechanism::Unshare) => "Group Unshare",
        }
    }
}

impl fmt::Display for SharingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on item {} (tag '{}')",
            self.mechanism, self.target, self.item_id, self.tag
        )
    }
}

/// Fire-and-forget chat message. Serializes as the Teams `{title, text}` card body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub text: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_parses_case_insensitively() {
        assert_eq!(
            "SHARE".parse::<SharingMechanism>().unwrap(),
            SharingMechanism::Share
        );
        assert_eq!(
            " unshare ".parse::<SharingMechanism>().unwrap(),
            SharingMechanism::Unshare
        );
        assert!("revoke".parse::<SharingMechanism>().is_err());
    }

    #[test]
    fn target_kind_accepts_org_alias() {
        assert_eq!(
            "Organization".parse::<TargetKind>().unwrap(),
            TargetKind::Organization
        );
        assert_eq!("ORG".parse::<TargetKind>().unwrap(), TargetKind::Organization);
        assert_eq!("group".parse::<TargetKind>().unwrap(), TargetKind::Group);
        assert!("everyone".parse::<TargetKind>().is_err());
    }

    #[test]
    fn satisfies_covers_all_branches() {
        let mut state = SharingState::default();
        assert!(!state.satisfies(&PolicyEntry::share_org()));
        assert!(state.satisfies(&PolicyEntry::unshare_org()));
        assert!(!state.satisfies(&PolicyEntry::share_group("G1")));
        assert!(state.satisfies(&PolicyEntry::unshare_group("G1")));

        state.org_shared = true;
        state.groups.insert("G1".into());
        assert!(state.satisfies(&PolicyEntry::share_org()));
        assert!(!state.satisfies(&PolicyEntry::unshare_org()));
        assert!(state.satisfies(&PolicyEntry::share_group("G1")));
        assert!(!state.satisfies(&PolicyEntry::unshare_group("G1")));
    }

    #[test]
    fn public_flag_defaults_off_when_absent() {
        let state: SharingState =
            serde_json::from_str(r#"{"org_shared": true, "groups": []}"#).unwrap();
        assert!(state.org_shared);
        assert!(!state.public);
    }

    #[test]
    fn action_titles() {
        let t = |p: PolicyEntry| SharingAction::new("i", "t", &p).title();
        assert_eq!(t(PolicyEntry::share_org()), "Org Share");
        assert_eq!(t(PolicyEntry::unshare_org()), "Org Unshare");
        assert_eq!(t(PolicyEntry::share_group("G")), "Group Share");
        assert_eq!(t(PolicyEntry::unshare_group("G")), "Group Unshare");
    }

    #[test]
    fn notification_serializes_as_card_body() {
        let n = Notification::new("Org Share", "done");
        assert_eq!(
            serde_json::to_value(&n).unwrap(),
            serde_json::json!({"title": "Org Share", "text": "done"})
        );
    }
}
