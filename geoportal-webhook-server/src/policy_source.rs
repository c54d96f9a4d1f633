//! Tag policy sources: the hosted survey-results table, or a local YAML file.

use crate::arcgis::ArcGisPortal;
use async_trait::async_trait;
use geoportal_webhook_core::policy::{PolicyRow, PolicySource};
use geoportal_webhook_core::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Reads policy rows from a layer of a hosted feature service.
///
/// The service is addressed by its portal item id. The item's `url` is
/// resolved on every fetch so that a republished service is picked up.
pub struct FeatureTablePolicySource {
    portal: Arc<ArcGisPortal>,
    item_id: String,
    layer: u32,
}

impl FeatureTablePolicySource {
    pub fn new(portal: Arc<ArcGisPortal>, item_id: String, layer: u32) -> Self {
        Self {
            portal,
            item_id,
            layer,
        }
    }

    async fn query_rows(&self) -> Result<Vec<PolicyRow>> {
        let item = self.portal.item_json(&self.item_id).await?;
        let service_url = item
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Portal(format!("item {} has no service url", self.item_id))
            })?
            .trim_end_matches('/');

        let query_url = format!("{service_url}/{}/query", self.layer);
        let mut rows = Vec::new();
        loop {
            let offset = rows.len().to_string();
            let result = self
                .portal
                .get_json_url(
                    &query_url,
                    &[
                        ("where", "1=1"),
                        ("outFields", "*"),
                        ("returnGeometry", "false"),
                        ("orderByFields", "objectid"),
                        ("resultOffset", offset.as_str()),
                    ],
                    || Error::Portal(format!("layer {} not found", self.layer)),
                )
                .await?;
            let page = rows_from_features(&result);
            let more = exceeded_transfer_limit(&result);
            if more && page.is_empty() {
                tracing::warn!(
                    item_id = %self.item_id,
                    rows = rows.len(),
                    "policy query reports more rows but returned none, table may be truncated"
                );
                break;
            }
            rows.extend(page);
            if !more {
                break;
            }
            tracing::debug!(item_id = %self.item_id, rows = rows.len(), "fetching next policy page");
        }
        Ok(rows)
    }
}

#[async_trait]
impl PolicySource for FeatureTablePolicySource {
    async fn fetch_rows(&self) -> Result<Vec<PolicyRow>> {
        self.query_rows().await.map_err(|e| {
            Error::SourceUnavailable(format!("tag policy service {}: {e}", self.item_id))
        })
    }
}

/// `features[].attributes` of a query response. Attributes that do not fit
/// the row shape become an empty row, which the loader then rejects.
fn rows_from_features(result: &Value) -> Vec<PolicyRow> {
    result
        .get("features")
        .and_then(Value::as_array)
        .map(|features| {
            features
                .iter()
                .filter_map(|f| f.get("attributes"))
                .map(|attrs| serde_json::from_value(attrs.clone()).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

/// Set when the service capped the page at its `maxRecordCount`.
fn exceeded_transfer_limit(result: &Value) -> bool {
    result
        .get("exceededTransferLimit")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Reads a YAML list of policy rows from disk on every fetch.
pub struct YamlPolicySource {
    path: PathBuf,
}

impl YamlPolicySource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PolicySource for YamlPolicySource {
    async fn fetch_rows(&self) -> Result<Vec<PolicyRow>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::SourceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_yaml::from_str(&text)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoportal_webhook_core::policy::load_policies;
    use geoportal_webhook_core::types::PolicyEntry;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn feature_attributes_become_rows() {
        let result = json!({
            "features": [
                {"attributes": {"objectid": 1, "tag_name": "roads", "sharing_mechanism": "SHARE",
                                "sharing_target": "GROUP", "group_id": "G1"}},
                {"attributes": {"objectid": 2, "tag_name": "open", "sharing_mechanism": "SHARE",
                                "sharing_target": "ORGANIZATION", "group_id": null}},
                {"attributes": {"objectid": 3, "tag_name": 42}}
            ]
        });
        let rows = rows_from_features(&result);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            PolicyRow::new("roads", "SHARE", "GROUP", Some("G1"))
        );
        assert_eq!(rows[1].group_id, None);
        assert_eq!(rows[2], PolicyRow::default());
    }

    #[test]
    fn transfer_limit_flag() {
        assert!(exceeded_transfer_limit(&json!({"features": [], "exceededTransferLimit": true})));
        assert!(!exceeded_transfer_limit(&json!({"features": [], "exceededTransferLimit": false})));
        assert!(!exceeded_transfer_limit(&json!({"features": []})));
    }

    #[test]
    fn empty_query_result_has_no_rows() {
        assert!(rows_from_features(&json!({"features": []})).is_empty());
        assert!(rows_from_features(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn yaml_file_loads_and_skips_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
- tag_name: roads
  sharing_mechanism: SHARE
  sharing_target: GROUP
  group_id: G1
- tag_name: broken
  sharing_mechanism: SHARE
  sharing_target: GROUP
- tag_name: open
  sharing_mechanism: SHARE
  sharing_target: ORGANIZATION
"#
        )
        .unwrap();

        let source = YamlPolicySource::new(file.path().to_path_buf());
        let table = load_policies(&source).await.unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("roads"), Some(&PolicyEntry::share_group("G1")));
    }

    #[tokio::test]
    async fn missing_yaml_file_is_source_unavailable() {
        let source = YamlPolicySource::new(PathBuf::from("/nonexistent/policies.yaml"));
        let err = source.fetch_rows().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }
}
