//! PostgREST client for the hosted store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::query::{validate_identifier, Select};
use super::{OnConflict, Row, Store};

pub const URL_VAR: &str = "SUPABASE_URL";
pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";
pub const SERVICE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Access level a client is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dashboard reads
    Read,
    /// Loader writes
    Write,
}

impl Role {
    fn key_var(self) -> &'static str {
        match self {
            Role::Read => ANON_KEY_VAR,
            Role::Write => SERVICE_KEY_VAR,
        }
    }
}

/// Endpoint and API key
#[derive(Clone)]
pub struct Credentials {
    pub url: String,
    pub key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env(role: Role) -> Result<Self> {
        Self::from_lookup(role, |k| std::env::var(k).ok())
    }

    /// Resolve credentials through `lookup`; missing or empty values are errors
    pub fn from_lookup(role: Role, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing env var {key}"))
        };
        Ok(Self {
            url: get(URL_VAR)?,
            key: get(role.key_var())?,
        })
    }
}

/// Build the headers every request carries
pub fn auth_headers(key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "apikey",
        HeaderValue::from_str(key).context("Invalid API key header value")?,
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", key))
            .context("Invalid authorization header value")?,
    );
    Ok(headers)
}

/// `Prefer` header value for an upsert
pub fn prefer_header(mode: OnConflict) -> &'static str {
    match mode {
        OnConflict::Merge => "resolution=merge-duplicates,return=minimal",
        OnConflict::Ignore => "resolution=ignore-duplicates,return=minimal",
    }
}

/// Store reached over PostgREST
pub struct RestStore {
    client: reqwest::Client,
    base: Url,
}

impl RestStore {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&format!(
            "{}/rest/v1/",
            credentials.url.trim_end_matches('/')
        ))
        .with_context(|| format!("Invalid {}: {}", URL_VAR, credentials.url))?;

        let client = reqwest::Client::builder()
            .default_headers(auth_headers(&credentials.key)?)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, base })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        validate_identifier(table)?;
        Ok(self.base.join(table)?)
    }
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{} failed with {}: {}", what, status, body)
}

#[async_trait]
impl Store for RestStore {
    async fn select(&self, query: &Select, offset: usize, limit: usize) -> Result<Vec<Row>> {
        query.validate()?;
        let url = self.table_url(&query.table)?;
        let params = query.to_rest_params(offset, limit);
        debug!("GET {} {:?}", url, params);

        let resp = self
            .client
            .get(url)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", query.table))?;
        let resp = check_status(resp, &format!("select {}", query.table)).await?;

        Ok(resp.json::<Vec<Row>>().await?)
    }

    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        conflict_columns: &[&str],
        mode: OnConflict,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for c in conflict_columns {
            validate_identifier(c)?;
        }
        let url = self.table_url(table)?;
        debug!("POST {} ({} rows)", url, rows.len());

        let resp = self
            .client
            .post(url)
            .query(&[("on_conflict", conflict_columns.join(","))])
            .header("Prefer", prefer_header(mode))
            .json(rows)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", table))?;
        check_status(resp, &format!("upsert {}", table)).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_credentials_read_role() {
        let creds = Credentials::from_lookup(
            Role::Read,
            lookup(&[(URL_VAR, "https://x.supabase.co"), (ANON_KEY_VAR, "anon")]),
        )
        .unwrap();
        assert_eq!(creds.url, "https://x.supabase.co");
        assert_eq!(creds.key, "anon");
    }

    #[test]
    fn test_credentials_write_role_needs_service_key() {
        let err = Credentials::from_lookup(
            Role::Write,
            lookup(&[(URL_VAR, "https://x.supabase.co"), (ANON_KEY_VAR, "anon")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains(SERVICE_KEY_VAR));
    }

    #[test]
    fn test_credentials_missing_url() {
        let err = Credentials::from_lookup(Role::Read, lookup(&[(ANON_KEY_VAR, "anon")])).unwrap_err();
        assert!(err.to_string().contains(URL_VAR));
    }

    #[test]
    fn test_credentials_empty_is_missing() {
        let result = Credentials::from_lookup(
            Role::Read,
            lookup(&[(URL_VAR, "  "), (ANON_KEY_VAR, "anon")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let creds = Credentials {
            url: "https://x.supabase.co".to_string(),
            key: "secret".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_auth_headers() {
        let headers = auth_headers("abc").unwrap();
        assert_eq!(headers.get("apikey").unwrap(), "abc");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert!(auth_headers("bad\nkey").is_err());
    }

    #[test]
    fn test_prefer_header() {
        assert!(prefer_header(OnConflict::Merge).contains("merge-duplicates"));
        assert!(prefer_header(OnConflict::Ignore).contains("ignore-duplicates"));
    }

    #[test]
    fn test_table_url() {
        let creds = Credentials {
            url: "https://x.supabase.co/".to_string(),
            key: "k".to_string(),
        };
        let store = RestStore::new(creds, Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.table_url("result_joined").unwrap().as_str(),
            "https://x.supabase.co/rest/v1/result_joined"
        );
        assert!(store.table_url("../auth").is_err());
    }
}
