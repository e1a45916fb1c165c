//! Ledger read client
//!
//! Abstracts the four read endpoints of the ledger's REST API behind
//! [`LedgerReader`] so query code can be exercised against a mock node.

use crate::error::{LedgerError, Result};
use crate::key::normalize_key;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;

/// Body of a table item lookup. The key is normalized for `key_type` when
/// the request is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableItemRequest {
    pub key_type: String,
    pub value_type: String,
    pub key: Value,
}

impl TableItemRequest {
    pub fn new(key_type: impl Into<String>, value_type: impl Into<String>, key: Value) -> Self {
        let key_type = key_type.into();
        let key = normalize_key(&key_type, key);
        Self {
            key_type,
            value_type: value_type.into(),
            key,
        }
    }
}

/// Body of a view function call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRequest {
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl ViewRequest {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            type_arguments: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Append an argument normalized for its move type (`address`, `u8`, `u64`, ...)
    pub fn arg(mut self, arg_type: &str, value: Value) -> Self {
        self.arguments.push(normalize_key(arg_type, value));
        self
    }
}

/// Read-only access to a ledger node
#[async_trait]
pub trait LedgerReader: Debug + Send + Sync {
    /// `data` of the named resource under `account`, or `None` if the
    /// account has no such resource
    async fn account_resource(&self, account: &str, resource_type: &str)
        -> Result<Option<Value>>;

    /// Value stored under a key of the table `handle`, or `None` if the key
    /// is absent
    async fn table_item(&self, handle: &str, request: &TableItemRequest) -> Result<Option<Value>>;

    /// Call a side-effect-free view function; the ledger answers with a
    /// JSON array of return values
    async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>>;

    /// Up to `limit` records of the event stream `field` on the resource
    /// `event_handle` (a resource type) of `account`. A missing stream reads
    /// as empty.
    async fn events(
        &self,
        account: &str,
        event_handle: &str,
        field: &str,
        limit: usize,
    ) -> Result<Vec<Value>>;
}

/// HTTP implementation over the node's `/v1` REST API
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    base_url: String,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl HttpLedgerClient {
    /// `base_url` is the node root; a trailing `/v1` is accepted.
    /// `timeout` bounds each request end to end.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url: String = base_url.into();
        let trimmed = base_url.trim_end_matches('/');
        let base_url = trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            http,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn add_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref key) = self.api_key {
            req.header("x-api-key", key).bearer_auth(key)
        } else {
            req
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// 200 → body, 404 → `None`, anything else → transient
    async fn read(&self, req: reqwest::RequestBuilder, url: &str) -> Result<Option<Value>> {
        let resp = self.add_auth(req).send().await?;
        let status = resp.status().as_u16();
        tracing::debug!(url, status, "ledger response");

        match status {
            200..=299 => Ok(Some(resp.json::<Value>().await?)),
            404 => Ok(None),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(LedgerError::Transient {
                    status: Some(status),
                    message: format!("{url}: {}", truncate(&body, 200)),
                })
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn expect_array(value: Value, what: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(LedgerError::InvalidResponse(format!(
            "{what}: expected an array, got {other}"
        ))),
    }
}

#[async_trait]
impl LedgerReader for HttpLedgerClient {
    async fn account_resource(
        &self,
        account: &str,
        resource_type: &str,
    ) -> Result<Option<Value>> {
        let url = self.url(&format!("accounts/{account}/resource/{resource_type}"));
        match self.read(self.http.get(&url), &url).await? {
            Some(mut body) => match body.get_mut("data") {
                Some(data) => Ok(Some(data.take())),
                None => Err(LedgerError::InvalidResponse(format!(
                    "resource {resource_type} has no data"
                ))),
            },
            None => Ok(None),
        }
    }

    async fn table_item(&self, handle: &str, request: &TableItemRequest) -> Result<Option<Value>> {
        let url = self.url(&format!("tables/{handle}/item"));
        self.read(self.http.post(&url).json(request), &url).await
    }

    async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>> {
        let url = self.url("view");
        match self.read(self.http.post(&url).json(request), &url).await? {
            Some(body) => expect_array(body, &request.function),
            None => Err(LedgerError::Transient {
                status: Some(404),
                message: format!("view function {} not found", request.function),
            }),
        }
    }

    async fn events(
        &self,
        account: &str,
        event_handle: &str,
        field: &str,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let url = self.url(&format!("accounts/{account}/events/{event_handle}/{field}"));
        let req = self.http.get(&url).query(&[("limit", limit)]);
        match self.read(req, &url).await? {
            Some(body) => expect_array(body, field),
            None => Ok(Vec::new()),
        }
    }
}
