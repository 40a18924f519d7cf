//! The remote database catalog: payloads, the [`Catalog`] trait, and an HTTP client.

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::default::Default;

// ----------------------------------------------------------------------------
// Payloads
// ----------------------------------------------------------------------------

/// One database returned by `system/findDatabases`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DatabaseEntry {
    pub id: String,
}

/// Response of `system/findDatabases`.
///
/// A non-null `next` means the catalog holds more results than were returned.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FindDatabases {
    pub results: Vec<DatabaseEntry>,
    #[serde(default)]
    pub next: Option<Value>,
}

/// Response of `<database-id>/describe`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DatabaseDescription {
    pub id: String,
    pub name: String,
}

/// One entry of a folder listing.
///
/// `path` is the full remote path, ex. `dnax://database-xxxx/table.mt/_SUCCESS`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FolderEntry {
    pub path: String,
}

/// Response of `<database-id>/listFolder`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ListFolder {
    pub results: Vec<FolderEntry>,
}

// ----------------------------------------------------------------------------
// Catalog
// ----------------------------------------------------------------------------

/// Remote catalog of tabular databases.
///
/// Every method is exactly one remote call; implementations must not paginate
/// or recurse on their own.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Enumerate the databases visible to the caller.
    async fn find_databases(&self) -> Result<FindDatabases, Report>;

    /// Describe one database by id.
    async fn describe_database(&self, database_id: &str) -> Result<DatabaseDescription, Report>;

    /// List the immediate entries of a folder inside a database.
    async fn list_folder(
        &self,
        database_id: &str,
        folder: &str,
        include_hidden: bool,
    ) -> Result<ListFolder, Report>;
}

// ----------------------------------------------------------------------------
// API Server
// ----------------------------------------------------------------------------

/// Connection settings of the platform API server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DxApi {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Bearer token. Never written back out with the config.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for DxApi {
    fn default() -> Self {
        Self::new()
    }
}

impl DxApi {
    pub fn new() -> Self {
        DxApi {
            protocol: "https".to_string(),
            host: "api.dnanexus.com".to_string(),
            port: 443,
            token: None,
        }
    }

    /// Base url of the API server, ex. `https://api.dnanexus.com:443`.
    ///
    /// ```rust
    /// use loftee_path::DxApi;
    /// assert_eq!(DxApi::default().url(), "https://api.dnanexus.com:443");
    /// ```
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Extract the bearer token from a `DX_SECURITY_CONTEXT` JSON value.
    ///
    /// ```rust
    /// use loftee_path::DxApi;
    /// let context = r#"{"auth_token_type": "Bearer", "auth_token": "abc"}"#;
    /// assert_eq!(DxApi::token_from_security_context(context)?, "abc");
    /// assert!(DxApi::token_from_security_context("{}").is_err());
    /// # Ok::<(), color_eyre::eyre::Report>(())
    /// ```
    pub fn token_from_security_context(context: &str) -> Result<String, Report> {
        let context: Value = serde_json::from_str(context)
            .wrap_err("Failed to parse DX_SECURITY_CONTEXT as JSON.")?;
        context["auth_token"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| eyre!("DX_SECURITY_CONTEXT has no auth_token."))
    }
}

// ----------------------------------------------------------------------------
// HTTP Client
// ----------------------------------------------------------------------------

/// [`Catalog`] backed by the platform's JSON-over-HTTP API.
#[derive(Clone, Debug)]
pub struct DxClient {
    api: DxApi,
    client: reqwest::Client,
}

impl DxClient {
    pub fn new(api: DxApi) -> Self {
        DxClient { api, client: reqwest::Client::new() }
    }

    /// POST one API route and decode its JSON answer.
    async fn call<T>(&self, route: &str, input: Value) -> Result<T, Report>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{route}", self.api.url());
        debug!("Catalog request: {url} {input}");

        let mut request = self.client.post(&url).json(&input);
        if let Some(token) = &self.api.token {
            request = request.bearer_auth(token);
        }
        let response =
            request.send().await.wrap_err_with(|| format!("Catalog request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(eyre!("Catalog request failed: {url}")
                .suggestion(format!("Status code: {status}"))
                .suggestion(body));
        }

        let output = response
            .json::<T>()
            .await
            .wrap_err_with(|| format!("Failed to decode catalog response: {url}"))?;
        Ok(output)
    }
}

#[async_trait]
impl Catalog for DxClient {
    async fn find_databases(&self) -> Result<FindDatabases, Report> {
        self.call("system/findDatabases", json!({})).await
    }

    async fn describe_database(&self, database_id: &str) -> Result<DatabaseDescription, Report> {
        self.call(&format!("{database_id}/describe"), json!({})).await
    }

    async fn list_folder(
        &self,
        database_id: &str,
        folder: &str,
        include_hidden: bool,
    ) -> Result<ListFolder, Report> {
        let input = json!({ "folder": folder, "includeHidden": include_hidden });
        self.call(&format!("{database_id}/listFolder"), input).await
    }
}
