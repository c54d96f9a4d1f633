//! ArcGIS Enterprise portal client over the sharing REST API.
//!
//! One `ArcGisPortal` is created at startup and shared by the HTTP layer and
//! the background worker. The token is generated on connect and refreshed
//! when it is close to expiry.

use crate::config::Settings;
use anyhow::Context;
use async_trait::async_trait;
use geoportal_webhook_core::portal::Portal;
use geoportal_webhook_core::types::{ContentItem, SharingState};
use geoportal_webhook_core::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tokio::sync::RwLock;

/// Requested token lifetime, in minutes.
const TOKEN_EXPIRATION_MINUTES: &str = "120";
/// Refresh this long before the portal says the token expires.
const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;

#[derive(Clone, Debug)]
struct Token {
    value: String,
    expires_ms: i64,
}

impl Token {
    fn is_fresh(&self, now_ms: i64) -> bool {
        self.expires_ms - now_ms > TOKEN_REFRESH_MARGIN_MS
    }
}

pub struct ArcGisPortal {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<Token>>,
}

impl ArcGisPortal {
    /// Build the client and sign in. Fails if the portal rejects the credentials.
    ///
    /// Tokens are bound to the portal URL as referer, so every request the
    /// client sends carries that `Referer` header.
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.portal_url.trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_str(&base_url).context("Portal URL is not a valid Referer")?,
        );
        let http = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;
        let portal = Self {
            http,
            base_url,
            username: settings.portal_user.clone(),
            password: settings.portal_password().to_string(),
            token: RwLock::new(None),
        };
        portal
            .token()
            .await
            .with_context(|| format!("Failed to sign in to {}", portal.base_url))?;
        tracing::info!(portal = %portal.base_url, user = %portal.username, "connected to portal");
        Ok(portal)
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/sharing/rest{}", self.base_url, path)
    }

    async fn token(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp_millis();
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        // another task may have refreshed while we waited for the lock
        if let Some(token) = slot.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.value.clone());
            }
        }
        let token = self.generate_token().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn generate_token(&self) -> Result<Token> {
        #[derive(Deserialize)]
        struct TokenResponse {
            token: String,
            expires: i64,
        }

        tracing::debug!(portal = %self.base_url, "generating portal token");
        let response = self
            .http
            .post(self.rest_url("/generateToken"))
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("client", "referer"),
                ("referer", self.base_url.as_str()),
                ("expiration", TOKEN_EXPIRATION_MINUTES),
                ("f", "json"),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let value = read_json(response).await?;
        let value = check_fault(value, || Error::PermissionDenied("sign-in rejected".into()))?;
        let parsed: TokenResponse = serde_json::from_value(value)
            .map_err(|e| Error::Portal(format!("unexpected token response: {e}")))?;
        Ok(Token {
            value: parsed.token,
            expires_ms: parsed.expires,
        })
    }

    /// GET any portal or service URL with the session token attached.
    pub(crate) async fn get_json_url(
        &self,
        url: &str,
        query: &[(&str, &str)],
        missing: impl FnOnce() -> Error,
    ) -> Result<Value> {
        let token = self.token().await?;
        let response = self
            .http
            .get(url)
            .query(query)
            .query(&[("f", "json"), ("token", token.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        check_fault(read_json(response).await?, missing)
    }

    async fn get_json(&self, path: &str, missing: impl FnOnce() -> Error) -> Result<Value> {
        self.get_json_url(&self.rest_url(path), &[], missing).await
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
        missing: impl FnOnce() -> Error,
    ) -> Result<Value> {
        let token = self.token().await?;
        let mut params = form.to_vec();
        params.push(("f", "json"));
        params.push(("token", token.as_str()));
        let response = self
            .http
            .post(self.rest_url(path))
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;
        check_fault(read_json(response).await?, missing)
    }

    /// Raw item JSON. Used by the policy source to find the service URL.
    pub(crate) async fn item_json(&self, item_id: &str) -> Result<Value> {
        self.get_json(&format!("/content/items/{item_id}"), || {
            Error::ItemNotFound(item_id.to_string())
        })
        .await
    }

    async fn share(&self, item: &ContentItem, form: &[(&str, &str)]) -> Result<()> {
        let path = format!("/content/users/{}/items/{}/share", item.owner, item.id);
        let value = self
            .post_form(&path, form, || Error::ItemNotFound(item.id.clone()))
            .await?;
        ensure_empty(&value, "notSharedWith")
    }

    async fn group_usernames(&self, group_id: &str) -> Result<BTreeSet<String>> {
        let value = self
            .get_json(&format!("/community/groups/{group_id}/users"), || {
                Error::GroupNotFound(group_id.to_string())
            })
            .await?;
        Ok(parse_group_users(&value))
    }
}

#[async_trait]
impl Portal for ArcGisPortal {
    fn url(&self) -> &str {
        &self.base_url
    }

    fn service_account(&self) -> &str {
        &self.username
    }

    async fn check_connection(&self) -> Result<()> {
        self.get_json("/portals/self", || Error::Portal("portal self not found".into()))
            .await
            .map(|_| ())
    }

    async fn get_item(&self, item_id: &str) -> Result<ContentItem> {
        let item = self.item_json(item_id).await?;
        let groups = self
            .get_json(&format!("/content/items/{item_id}/groups"), || {
                Error::ItemNotFound(item_id.to_string())
            })
            .await?;
        parse_item(&item, &groups)
    }

    async fn set_org_sharing(&self, item: &ContentItem, shared: bool) -> Result<()> {
        let everyone = flag(shared && item.sharing.public);
        self.share(item, &[("everyone", everyone), ("org", flag(shared))])
            .await
    }

    async fn share_with_group(&self, item: &ContentItem, group_id: &str) -> Result<()> {
        self.share(
            item,
            &[
                ("everyone", flag(item.sharing.public)),
                ("org", flag(item.sharing.org_shared)),
                ("groups", group_id),
            ],
        )
        .await
    }

    async fn unshare_from_group(&self, item: &ContentItem, group_id: &str) -> Result<()> {
        let path = format!("/content/users/{}/items/{}/unshare", item.owner, item.id);
        let value = self
            .post_form(&path, &[("groups", group_id)], || {
                Error::ItemNotFound(item.id.clone())
            })
            .await?;
        ensure_empty(&value, "notUnsharedFrom")
    }

    async fn add_group_members(&self, group_id: &str, users: &[String]) -> Result<()> {
        self.get_json(&format!("/community/groups/{group_id}"), || {
            Error::GroupNotFound(group_id.to_string())
        })
        .await?;

        let existing = self.group_usernames(group_id).await?;
        let missing: Vec<&str> = users
            .iter()
            .map(String::as_str)
            .filter(|u| !existing.contains(*u))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let joined = missing.join(",");
        tracing::debug!(group_id, users = %joined, "adding users to group");
        let value = self
            .post_form(
                &format!("/community/groups/{group_id}/addUsers"),
                &[("users", joined.as_str())],
                || Error::GroupNotFound(group_id.to_string()),
            )
            .await?;
        ensure_empty(&value, "notAdded")
    }
}

// ─── Response helpers ─────────────────────────────────────────

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::Portal(e.to_string())
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Portal(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| Error::Portal(format!("invalid JSON response: {e}")))
}

/// The portal reports failures as HTTP 200 with an `error` object.
fn check_fault(value: Value, missing: impl FnOnce() -> Error) -> Result<Value> {
    let Some(fault) = value.get("error") else {
        return Ok(value);
    };
    let code = fault.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = fault
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown portal error")
        .to_string();
    let lowered = message.to_ascii_lowercase();
    Err(match code {
        403 | 498 | 499 => Error::PermissionDenied(message),
        400 | 404
            if lowered.contains("not exist")
                || lowered.contains("not found")
                || lowered.contains("inaccessible") =>
        {
            missing()
        }
        _ => Error::Portal(format!("{code}: {message}")),
    })
}

fn ensure_empty(value: &Value, key: &str) -> Result<()> {
    match value.get(key).and_then(Value::as_array) {
        Some(list) if !list.is_empty() => Err(Error::Portal(format!(
            "{key}: {}",
            serde_json::to_string(list).unwrap_or_default()
        ))),
        _ => Ok(()),
    }
}

fn parse_item(item: &Value, groups: &Value) -> Result<ContentItem> {
    #[derive(Deserialize)]
    struct ItemResponse {
        id: String,
        #[serde(default)]
        title: Option<String>,
        owner: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        access: Option<String>,
    }

    let parsed: ItemResponse = serde_json::from_value(item.clone())
        .map_err(|e| Error::Portal(format!("unexpected item response: {e}")))?;
    let public = parsed.access.as_deref() == Some("public");
    let org_shared = public || parsed.access.as_deref() == Some("org");
    Ok(ContentItem {
        title: parsed.title.unwrap_or_else(|| parsed.id.clone()),
        id: parsed.id,
        owner: parsed.owner,
        tags: parsed.tags,
        sharing: SharingState {
            org_shared,
            public,
            groups: parse_item_groups(groups),
        },
    })
}

/// Item groups are split by the caller's relationship to each group.
fn parse_item_groups(value: &Value) -> BTreeSet<String> {
    ["admin", "member", "other"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(|g| g.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn parse_group_users(value: &Value) -> BTreeSet<String> {
    let owner = value.get("owner").and_then(Value::as_str);
    ["admins", "users"]
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .chain(owner)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_item_and_groups() {
        let item = json!({
            "id": "9f2a7c1e",
            "title": "Road Centerlines",
            "owner": "alice",
            "tags": ["roads", "transport"],
            "access": "shared"
        });
        let groups = json!({
            "admin": [{"id": "G1", "title": "Transport"}],
            "member": [{"id": "G2"}],
            "other": []
        });
        let parsed = parse_item(&item, &groups).unwrap();
        assert_eq!(parsed.id, "9f2a7c1e");
        assert_eq!(parsed.tags, vec!["roads", "transport"]);
        assert!(!parsed.sharing.org_shared);
        assert_eq!(
            parsed.sharing.groups,
            BTreeSet::from(["G1".to_string(), "G2".to_string()])
        );
    }

    #[test]
    fn org_and_public_access_count_as_org_shared() {
        for (access, org, public) in [
            ("org", true, false),
            ("public", true, true),
            ("private", false, false),
        ] {
            let item = json!({"id": "x", "owner": "o", "access": access});
            let parsed = parse_item(&item, &json!({})).unwrap();
            assert_eq!(parsed.sharing.org_shared, org, "access={access}");
            assert_eq!(parsed.sharing.public, public, "access={access}");
            assert_eq!(parsed.title, "x");
        }
    }

    #[test]
    fn fault_mapping() {
        let missing = json!({"error": {"code": 400, "message": "Item does not exist or is inaccessible."}});
        let err = check_fault(missing, || Error::ItemNotFound("x".into())).unwrap_err();
        assert!(matches!(err, Error::ItemNotFound(_)));

        let denied = json!({"error": {"code": 403, "message": "You do not have permissions"}});
        let err = check_fault(denied, || Error::ItemNotFound("x".into())).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        let other = json!({"error": {"code": 500, "message": "boom"}});
        let err = check_fault(other, || Error::ItemNotFound("x".into())).unwrap_err();
        assert!(matches!(err, Error::Portal(ref m) if m == "500: boom"));

        let ok = json!({"id": "x"});
        assert_eq!(check_fault(ok.clone(), || Error::ItemNotFound("x".into())).unwrap(), ok);
    }

    #[test]
    fn non_empty_rejection_lists_fail() {
        assert!(ensure_empty(&json!({"notSharedWith": [], "itemId": "x"}), "notSharedWith").is_ok());
        assert!(ensure_empty(&json!({"itemId": "x"}), "notSharedWith").is_ok());
        assert!(ensure_empty(&json!({"notAdded": ["bob"]}), "notAdded").is_err());
    }

    #[test]
    fn group_users_include_owner_and_admins() {
        let value = json!({"owner": "carol", "admins": ["carol", "dan"], "users": ["erin"]});
        assert_eq!(
            parse_group_users(&value),
            BTreeSet::from(["carol".to_string(), "dan".to_string(), "erin".to_string()])
        );
    }

    #[test]
    fn token_freshness_uses_margin() {
        let token = Token {
            value: "t".into(),
            expires_ms: 1_000_000,
        };
        assert!(token.is_fresh(1_000_000 - TOKEN_REFRESH_MARGIN_MS - 1));
        assert!(!token.is_fresh(1_000_000 - TOKEN_REFRESH_MARGIN_MS));
    }
}
