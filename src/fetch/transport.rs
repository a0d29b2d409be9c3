//! Wire transports for the aggregate endpoint.
//!
//! Upstream deployments disagree on how they want the request shaped:
//! newer ones take a JSON body, older ones a form body, and the
//! oldest only read query parameters. Each shape is one [`Transport`];
//! the fetcher walks them in order, so adding or reordering strategies
//! is a data change, not a code change.
//!
//! All three send the same logical request: the location id under the
//! scope's name plus a comma-joined `types` list, answered by a JSON
//! object keyed by stringified item id.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{KaupangError, Result};
use crate::queue::QueueTask;

/// Raw upstream payload: per-item objects keyed by stringified item id.
pub type RawPayload = serde_json::Map<String, Value>;

/// Per-request timeout of the bundled HTTP client.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// One strategy for getting a task's ids to the upstream endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &str;

    /// Execute one fetch attempt for the task.
    async fn attempt(&self, task: &QueueTask) -> Result<RawPayload>;
}

/// POST with a JSON body.
pub struct JsonBodyTransport {
    http: Client,
    url: String,
}

impl JsonBodyTransport {
    /// Create a transport against the given endpoint URL.
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Create a transport with its own default HTTP client.
    pub fn with_base_url(url: impl Into<String>) -> Result<Self> {
        Ok(Self::new(default_client()?, url))
    }
}

#[async_trait]
impl Transport for JsonBodyTransport {
    fn name(&self) -> &str {
        "json_body"
    }

    async fn attempt(&self, task: &QueueTask) -> Result<RawPayload> {
        let request = self.http.post(&self.url).json(&json_body(task));
        execute(self.name(), request).await
    }
}

/// POST with a form-encoded body.
pub struct FormBodyTransport {
    http: Client,
    url: String,
}

impl FormBodyTransport {
    /// Create a transport against the given endpoint URL.
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Create a transport with its own default HTTP client.
    pub fn with_base_url(url: impl Into<String>) -> Result<Self> {
        Ok(Self::new(default_client()?, url))
    }
}

#[async_trait]
impl Transport for FormBodyTransport {
    fn name(&self) -> &str {
        "form_body"
    }

    async fn attempt(&self, task: &QueueTask) -> Result<RawPayload> {
        let request = self.http.post(&self.url).form(&request_params(task));
        execute(self.name(), request).await
    }
}

/// GET with query parameters.
pub struct QueryTransport {
    http: Client,
    url: String,
}

impl QueryTransport {
    /// Create a transport against the given endpoint URL.
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Create a transport with its own default HTTP client.
    pub fn with_base_url(url: impl Into<String>) -> Result<Self> {
        Ok(Self::new(default_client()?, url))
    }
}

#[async_trait]
impl Transport for QueryTransport {
    fn name(&self) -> &str {
        "query"
    }

    async fn attempt(&self, task: &QueueTask) -> Result<RawPayload> {
        let request = self.http.get(&self.url).query(&request_params(task));
        execute(self.name(), request).await
    }
}

/// Build the bundled HTTP client.
pub(crate) fn default_client() -> Result<Client> {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| KaupangError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// JSON request body: `{"<scope>": <location>, "types": "34,35"}`.
fn json_body(task: &QueueTask) -> Value {
    let mut body = serde_json::Map::new();
    body.insert(
        task.scope.as_str().to_string(),
        Value::from(task.location),
    );
    body.insert("types".to_string(), Value::from(join_ids(task)));
    Value::Object(body)
}

/// Form/query parameters, same fields as the JSON body.
fn request_params(task: &QueueTask) -> [(&'static str, String); 2] {
    [
        (task.scope.as_str(), task.location.to_string()),
        ("types", join_ids(task)),
    ]
}

fn join_ids(task: &QueueTask) -> String {
    task.items
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

async fn execute(name: &str, request: reqwest::RequestBuilder) -> Result<RawPayload> {
    let response = request
        .send()
        .await
        .map_err(|e| KaupangError::Http(e.to_string()))?;
    read_payload(name, response).await
}

/// Check the status, then parse the body tolerantly.
///
/// Bodies that are empty, non-JSON, or not a non-empty object all map
/// to `EmptyResponse`, which is retried like any transient fault
/// before the chain falls through to the next transport.
async fn read_payload(name: &str, response: reqwest::Response) -> Result<RawPayload> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(&response, status));
    }

    let text = response
        .text()
        .await
        .map_err(|e| KaupangError::Http(e.to_string()))?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        Ok(_) => {
            debug!(transport = name, "response was not a non-empty JSON object");
            Err(KaupangError::EmptyResponse)
        }
        Err(error) => {
            debug!(transport = name, %error, "unparseable response body");
            Err(KaupangError::EmptyResponse)
        }
    }
}

fn status_error(response: &reqwest::Response, status: StatusCode) -> KaupangError {
    match status.as_u16() {
        429 => {
            // Honour a retry-after header when present
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            KaupangError::RateLimited { retry_after }
        }
        code => KaupangError::Api {
            status: code,
            message: format!("upstream returned {status}"),
        },
    }
}
