//! REST client for the ads API
//!
//! `ApiClient` owns the HTTP stack: versioned headers, query-string
//! construction (the API rejects percent-encoded URN list parameters, so
//! those are appended raw), and per-page retries with capped exponential
//! backoff and jitter. The `PageFetcher` trait is the seam the sync runner
//! and the analytics engine are written against, so tests can substitute an
//! in-memory fetcher.

use crate::auth::AuthContext;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// A single page request against an endpoint
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Path below the API root, e.g. `adAccounts` or `adAccounts/123/adCampaigns`
    pub path: String,
    /// Query parameters; values are percent-encoded, keys written literally
    pub params: Vec<(String, String)>,
    /// Query parameters appended without encoding (URN lists)
    pub raw_params: Vec<(String, String)>,
    /// Record offset to start from
    pub start: u64,
    /// Records requested
    pub count: u64,
}

impl PageRequest {
    /// Create a request for the given path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add an encoded query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add a raw (unencoded) query parameter
    pub fn raw_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_params.push((key.into(), value.into()));
        self
    }

    /// Set the page window
    pub fn window(mut self, start: u64, count: u64) -> Self {
        self.start = start;
        self.count = count;
        self
    }
}

/// Paging metadata reported by the API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paging {
    pub start: Option<u64>,
    pub count: Option<u64>,
    pub total: Option<u64>,
}

/// One page of raw records
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Value>,
    pub paging: Option<Paging>,
}

impl Page {
    /// Parse a response body into a page.
    ///
    /// Accepted shapes: `{"elements": [...], "paging": {...}}`, a top-level
    /// array, or a single entity object (a one-record page).
    pub fn parse(body: Value) -> SyncResult<Self> {
        match body {
            Value::Object(mut map) => {
                if let Some(elements) = map.remove("elements") {
                    let records = match elements {
                        Value::Array(items) => items,
                        other => {
                            return Err(SyncError::transport(format!(
                                "elements is not an array: {}",
                                other
                            )))
                        }
                    };
                    let paging = map
                        .remove("paging")
                        .and_then(|p| serde_json::from_value(p).ok());
                    Ok(Self { records, paging })
                } else {
                    // Single-entity response: one record, no further pages
                    Ok(Self {
                        records: vec![Value::Object(map)],
                        paging: None,
                    })
                }
            }
            Value::Array(items) => Ok(Self {
                records: items,
                paging: None,
            }),
            other => Err(SyncError::transport(format!(
                "unexpected response body: {}",
                other
            ))),
        }
    }

    /// Number of records on this page
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page carries no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fetches one page of records for a request
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> SyncResult<Page>;
}

/// Retry policy applied per individual page request
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 1000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff for a 0-indexed attempt, capped at 60s
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.backoff_ms * 2u64.pow(attempt.min(16));
        let backoff_ms = if self.jitter {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(0..=(base_ms / 4).max(1));
            base_ms.saturating_add(jitter)
        } else {
            base_ms
        };
        Duration::from_millis(backoff_ms.min(60_000))
    }
}

/// HTTP client for the ads API
pub struct ApiClient {
    http: reqwest::Client,
    auth: AuthContext,
    base_url: String,
    api_version: String,
    user_agent: Option<String>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client from config
    pub fn from_config(config: &crate::config::TapConfig) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SyncError::transport(format!("failed to build HTTP client: {}", e)))?;

        let auth = AuthContext::from_config(config, http.clone())?;

        Ok(Self {
            http,
            auth,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            user_agent: config.user_agent.clone(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                backoff_ms: config.retry_backoff_ms as u64,
                jitter: config.retry_jitter,
            },
            timeout: Duration::from_secs(config.timeout_secs as u64),
        })
    }

    /// Build the full request URL. Keys are written literally (the API uses
    /// bracketed and dotted keys), values are percent-encoded, and raw
    /// params are appended untouched.
    fn build_url(base_url: &str, request: &PageRequest) -> String {
        let mut url = format!("{}/{}", base_url, request.path.trim_start_matches('/'));
        let mut sep = '?';

        let push = |url: &mut String, sep: &mut char, key: &str, value: &str| {
            url.push(*sep);
            url.push_str(key);
            url.push('=');
            url.push_str(value);
            *sep = '&';
        };

        if request.start > 0 {
            push(&mut url, &mut sep, "start", &request.start.to_string());
        }
        if request.count > 0 {
            push(&mut url, &mut sep, "count", &request.count.to_string());
        }
        for (key, value) in &request.params {
            push(&mut url, &mut sep, key, &urlencoding::encode(value));
        }
        for (key, value) in &request.raw_params {
            push(&mut url, &mut sep, key, value);
        }
        url
    }

    async fn send_once(&self, url: &str) -> SyncResult<Page> {
        let token = self.auth.bearer_token().await?;

        let mut builder = self
            .http
            .get(url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .header("LinkedIn-Version", &self.api_version)
            .header("Content-Type", "application/json")
            .header("X-Restli-Protocol-Version", "2.0.0");
        if let Some(agent) = &self.user_agent {
            builder = builder.header("User-Agent", agent.as_str());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Err(SyncError::Timeout(format!("request to {} timed out", url)))
            }
            Err(e) if e.is_connect() => {
                return Err(SyncError::transient(format!("connect error: {}", e)))
            }
            Err(e) => return Err(SyncError::transport(format!("request failed: {}", e))),
        };

        let status = response.status();
        if status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| SyncError::transport(format!("malformed JSON body: {}", e)))?;
            return Page::parse(body);
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            429 => Err(SyncError::RateLimited(body)),
            401 | 403 => Err(SyncError::Auth(format!("{}: {}", status, body))),
            s if status.is_server_error() => {
                Err(SyncError::transient(format!("server error {}: {}", s, body)))
            }
            _ => Err(SyncError::transport(format!(
                "client error {}: {}",
                status, body
            ))),
        }
    }
}

#[async_trait]
impl PageFetcher for ApiClient {
    async fn fetch_page(&self, request: &PageRequest) -> SyncResult<Page> {
        let url = Self::build_url(&self.base_url, request);
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let backoff = self.retry.backoff(attempt - 1);
                debug!(attempt, ?backoff, "retrying page request");
                tokio::time::sleep(backoff).await;
            }

            match self.send_once(&url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() => {
                    warn!(attempt = attempt + 1, error = %e, "page request failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| SyncError::transport("retries exhausted with no error".to_string())))
    }
}
