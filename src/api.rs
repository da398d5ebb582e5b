//! Remote SQL-over-HTTP client.
//!
//! The store of record is a hosted Postgres reached through its HTTP query
//! endpoint: each statement is a `POST <endpoint>/sql` carrying
//! `{"query": ..., "params": [...]}` and answered with `{"rows": [...]}`.
//! The connection string travels in the `Neon-Connection-String` header; an
//! optional bearer token is sent alongside.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Default timeout for SQL requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything that can run a parameterized statement against the remote store.
#[async_trait]
pub trait SqlTransport: Send + Sync {
    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Value>>;
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the SQL endpoint base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/sql` segment (it is appended per request)
pub fn normalize_endpoint(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/sql") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

/// The HTTP endpoint talks to the direct host, not the pooled one.
pub fn http_connection_string(raw: &str) -> String {
    raw.trim().replace("-pooler", "")
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into the error taxonomy.
fn transport_error(url: &str, err: &reqwest::Error) -> AppError {
    if err.is_connect() {
        return AppError::Connectivity(format!("Cannot reach SQL endpoint at {url}"));
    }
    if err.is_timeout() {
        return AppError::Connectivity(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return AppError::Remote(format!("Invalid SQL endpoint URL: {url}"));
    }
    if err.is_request() {
        return AppError::Connectivity(format!("Network error communicating with {url}: {err}"));
    }
    AppError::Remote(format!("Unexpected failure talking to {url}: {err}"))
}

fn status_error(status: StatusCode, body_text: &str) -> AppError {
    let detail = serde_json::from_str::<Value>(body_text)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body_text.trim().to_string());

    let code = status.as_u16();
    match code {
        s if s >= 500 => AppError::Connectivity(format!("SQL endpoint server error (HTTP {s})")),
        401 | 403 => AppError::Remote(format!("SQL endpoint rejected credentials (HTTP {code})")),
        _ if detail.is_empty() => AppError::Remote(format!("HTTP {code}")),
        _ => AppError::Remote(format!("{detail} (HTTP {code})")),
    }
}

/// Pull the row array out of a response body.
fn extract_rows(body: Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows,
        Value::Object(mut obj) => match obj.remove("rows") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HttpSqlClient {
    client: Client,
    endpoint: String,
    connection_string: Option<String>,
    token: Option<String>,
}

impl HttpSqlClient {
    pub fn new(
        endpoint: &str,
        connection_string: Option<String>,
        token: Option<String>,
    ) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint);
        if endpoint.is_empty() {
            return Err(AppError::Unexpected("SQL endpoint is empty".into()));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            connection_string: connection_string
                .map(|c| http_connection_string(&c))
                .filter(|c| !c.is_empty()),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, timeout: Duration, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/sql", self.endpoint))
            .timeout(timeout)
            .json(body);
        if let Some(conn) = &self.connection_string {
            req = req.header("Neon-Connection-String", conn);
        }
        if let Some(token) = &self.token {
            req = req.bearer_auth(token.trim());
        }
        req
    }

    /// Test connectivity with a trivial statement.
    pub async fn test_connectivity(&self) -> ConnectivityResult {
        let body = serde_json::json!({ "query": "SELECT 1", "params": [] });
        let start = Instant::now();
        match self.request(CONNECTIVITY_TIMEOUT, &body).send().await {
            Ok(resp) => {
                let latency = start.elapsed().as_millis() as u64;
                let status = resp.status();
                if status.is_success() {
                    info!(latency_ms = latency, "SQL endpoint connectivity test passed");
                    ConnectivityResult {
                        success: true,
                        latency_ms: Some(latency),
                        error: None,
                    }
                } else {
                    ConnectivityResult {
                        success: false,
                        latency_ms: Some(latency),
                        error: Some(status_error(status, "").to_string()),
                    }
                }
            }
            Err(e) => ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(transport_error(&self.endpoint, &e).to_string()),
            },
        }
    }
}

#[async_trait]
impl SqlTransport for HttpSqlClient {
    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Value>> {
        let body = serde_json::json!({ "query": sql, "params": params });
        let resp = self
            .request(DEFAULT_TIMEOUT, &body)
            .send()
            .await
            .map_err(|e| transport_error(&self.endpoint, &e))?;
        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .map_err(|e| transport_error(&self.endpoint, &e))?;

        if !status.is_success() {
            return Err(status_error(status, &body_text));
        }
        if body_text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let json: Value = serde_json::from_str(&body_text)
            .map_err(|e| AppError::Remote(format!("Invalid JSON from SQL endpoint: {e}")))?;
        let rows = extract_rows(json);
        debug!(rows = rows.len(), "remote statement executed");
        Ok(rows)
    }
}

/// Result of a connectivity test.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
