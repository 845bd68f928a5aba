//! HTTP fetch tool: performs a real HTTP request with `reqwest`.
//!
//! Returns the status code, response headers, and body (truncated to a
//! configurable size). Non-2xx statuses are reported, not treated as errors.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use async_trait::async_trait;
use orcha_core::tool::{ParameterKind, ParameterSpec, Tool, ToolParameters};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

const METHODS: [&str; 6] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

pub struct HttpFetchTool {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Use a preconfigured client (proxies, TLS roots, default headers).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Cap on the returned body, in bytes.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

impl Default for HttpFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct FetchResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: String,
    truncated: bool,
    elapsed_ms: u64,
}

#[async_trait]
impl Tool for HttpFetchTool {
    fn name(&self) -> &str {
        "http_fetch"
    }

    fn description(&self) -> &str {
        "Make an HTTP request to a URL. Supports GET, POST, PUT, PATCH, DELETE and HEAD. \
         Returns the response status code, headers, and body."
    }

    fn parameters(&self) -> ToolParameters {
        ToolParameters::new()
            .with(
                "url",
                ParameterSpec::new(ParameterKind::String, "The http:// or https:// URL to fetch")
                    .required(),
            )
            .with(
                "method",
                ParameterSpec::new(ParameterKind::String, "HTTP method (default GET)")
                    .one_of(METHODS),
            )
            .with(
                "headers",
                ParameterSpec::new(ParameterKind::Object, "Request headers as name/value pairs"),
            )
            .with(
                "body",
                ParameterSpec::new(ParameterKind::String, "Request body (POST, PUT, PATCH)"),
            )
            .with(
                "timeout_secs",
                ParameterSpec::new(ParameterKind::Number, "Request timeout in seconds (default 30)"),
            )
    }

    async fn execute(&self, arguments: Value) -> anyhow::Result<Value> {
        let url = arguments["url"].as_str().unwrap_or_default();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("URL must start with http:// or https://");
        }

        let method: reqwest::Method = arguments["method"]
            .as_str()
            .unwrap_or("GET")
            .parse()
            .context("Invalid HTTP method")?;

        let timeout = arguments["timeout_secs"]
            .as_f64()
            .filter(|t| *t > 0.0 && t.is_finite())
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let mut request = self.client.request(method.clone(), url).timeout(timeout);

        if let Some(headers) = arguments["headers"].as_object() {
            for (name, value) in headers {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.header(name.as_str(), value);
            }
        }
        if let Some(body) = arguments["body"].as_str() {
            request = request.body(body.to_string());
        }

        debug!(%method, url, "Fetching");
        let started = Instant::now();

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();

        let bytes = response.bytes().await.context("Failed to read response body")?;
        let truncated = bytes.len() > self.max_body_bytes;
        let body = String::from_utf8_lossy(&bytes[..bytes.len().min(self.max_body_bytes)])
            .into_owned();

        let out = FetchResponse {
            status,
            headers,
            body,
            truncated,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        Ok(serde_json::to_value(out)?)
    }
}
