//! Policy Table Loader: tag name → sharing policy, fetched fresh per batch.

use crate::error::{Error, Result};
use crate::types::{PolicyEntry, SharingMechanism, SharingTarget, TargetKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw row of the tabular policy source. Columns are optional because
/// the source is edited by hand (survey form) and may be incomplete.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRow {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub sharing_mechanism: Option<String>,
    #[serde(default)]
    pub sharing_target: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

impl PolicyRow {
    pub fn new(tag: &str, mechanism: &str, target: &str, group_id: Option<&str>) -> Self {
        Self {
            tag_name: Some(tag.to_string()),
            sharing_mechanism: Some(mechanism.to_string()),
            sharing_target: Some(target.to_string()),
            group_id: group_id.map(str::to_string),
        }
    }

    /// Validate the row into `(tag, entry)`. The error string says why it was rejected.
    pub fn parse(&self) -> std::result::Result<(String, PolicyEntry), String> {
        let tag = non_empty(&self.tag_name).ok_or("missing tag_name")?;
        let mechanism: SharingMechanism = non_empty(&self.sharing_mechanism)
            .ok_or("missing sharing_mechanism")?
            .parse()?;
        let kind: TargetKind = non_empty(&self.sharing_target)
            .ok_or("missing sharing_target")?
            .parse()?;
        let target = match kind {
            TargetKind::Organization => SharingTarget::Organization,
            TargetKind::Group => SharingTarget::Group(
                non_empty(&self.group_id)
                    .ok_or("GROUP target requires a group_id")?
                    .to_string(),
            ),
        };
        Ok((tag.to_string(), PolicyEntry::new(mechanism, target)))
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Backing tabular source of policy rows.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetch every row. Any failure to query is `Error::SourceUnavailable`.
    async fn fetch_rows(&self) -> Result<Vec<PolicyRow>>;
}

/// Immutable snapshot of the policy table for one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyTable {
    entries: BTreeMap<String, PolicyEntry>,
}

impl PolicyTable {
    pub fn get(&self, tag: &str) -> Option<&PolicyEntry> {
        self.entries.get(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PolicyEntry)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, PolicyEntry)> for PolicyTable {
    fn from_iter<I: IntoIterator<Item = (String, PolicyEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Build a policy table from raw rows.
///
/// Invalid rows are logged and skipped. For duplicate tag names the first
/// valid row wins.
pub fn build_table(rows: &[PolicyRow]) -> PolicyTable {
    let mut entries = BTreeMap::new();
    for (index, row) in rows.iter().enumerate() {
        match row.parse() {
            Ok((tag, entry)) => {
                if entries.contains_key(&tag) {
                    tracing::warn!(row = index, tag = %tag, "duplicate policy row for tag, keeping the first");
                    continue;
                }
                entries.insert(tag, entry);
            }
            Err(reason) => {
                tracing::warn!(row = index, tag = ?row.tag_name, %reason, "skipping malformed policy row");
            }
        }
    }
    PolicyTable { entries }
}

/// Fetch and validate the current policy table.
pub async fn load_policies(source: &dyn PolicySource) -> Result<PolicyTable> {
    let rows = source.fetch_rows().await.map_err(|e| match e {
        Error::SourceUnavailable(_) => e,
        other => Error::SourceUnavailable(other.to_string()),
    })?;
    let table = build_table(&rows);
    tracing::debug!(
        rows = rows.len(),
        policies = table.len(),
        "loaded tag policy table"
    );
    Ok(table)
}

// ── StaticPolicySource ──

/// Fixed set of rows, for tests and local runs.
#[derive(Clone, Debug, Default)]
pub struct StaticPolicySource {
    rows: Vec<PolicyRow>,
    unavailable: bool,
}

impl StaticPolicySource {
    pub fn new(rows: Vec<PolicyRow>) -> Self {
        Self {
            rows,
            unavailable: false,
        }
    }

    /// A source whose every query fails.
    pub fn unavailable() -> Self {
        Self {
            rows: Vec::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn fetch_rows(&self) -> Result<Vec<PolicyRow>> {
        if self.unavailable {
            return Err(Error::SourceUnavailable(
                "static policy source marked unavailable".into(),
            ));
        }
        Ok(self.rows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_source_yields_empty_table() {
        let table = load_policies(&StaticPolicySource::new(vec![]))
            .await
            .unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn unavailable_source_is_an_error() {
        let err = load_policies(&StaticPolicySource::unavailable())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn group_row_without_group_id_is_skipped() {
        let rows = vec![
            PolicyRow::new("public-data", "SHARE", "ORGANIZATION", None),
            PolicyRow::new("planning", "SHARE", "GROUP", None),
            PolicyRow::new("planning-blank", "SHARE", "GROUP", Some("   ")),
            PolicyRow::new("transport", "SHARE", "GROUP", Some("G1")),
        ];
        let table = load_policies(&StaticPolicySource::new(rows)).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("public-data"), Some(&PolicyEntry::share_org()));
        assert_eq!(table.get("transport"), Some(&PolicyEntry::share_group("G1")));
        assert!(table.get("planning").is_none());
        assert!(table.get("planning-blank").is_none());
    }

    #[test]
    fn unrecognized_values_are_skipped() {
        let rows = vec![
            PolicyRow::new("a", "GRANT", "ORGANIZATION", None),
            PolicyRow::new("b", "SHARE", "EVERYONE", None),
            PolicyRow::default(),
            PolicyRow::new("c", "unshare", "org", None),
        ];
        let table = build_table(&rows);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("c"), Some(&PolicyEntry::unshare_org()));
    }

    #[test]
    fn org_target_ignores_group_id() {
        let table = build_table(&[PolicyRow::new("a", "SHARE", "ORGANIZATION", Some("G9"))]);
        assert_eq!(table.get("a"), Some(&PolicyEntry::share_org()));
    }

    #[test]
    fn first_duplicate_wins_and_names_are_trimmed() {
        let rows = vec![
            PolicyRow::new(" roads ", "SHARE", "GROUP", Some("G1")),
            PolicyRow::new("roads", "UNSHARE", "GROUP", Some("G1")),
        ];
        let table = build_table(&rows);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("roads"), Some(&PolicyEntry::share_group("G1")));
    }

    #[test]
    fn rows_deserialize_with_missing_columns() {
        let row: PolicyRow =
            serde_json::from_str(r#"{"tag_name": "x", "sharing_mechanism": "SHARE"}"#).unwrap();
        assert_eq!(row.sharing_target, None);
        assert!(row.parse().is_err());
    }
}
