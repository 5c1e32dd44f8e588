//! Configuration types for adtap
//!
//! The tap is configured from a single YAML or JSON document. Credentials are
//! either a static bearer token or an OAuth refresh-token grant; the sync
//! window is `[start_date, end_date]` and entity identifiers select which
//! account/campaign/owner the streams are scoped to.

use crate::error::{Result, TapError};
use crate::types::SensitiveString;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Root tap configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct TapConfig {
    /// Static bearer token (alternative to `oauth_credentials`)
    #[serde(default)]
    pub access_token: Option<SensitiveString>,

    /// OAuth refresh-token credentials (alternative to `access_token`)
    #[serde(default)]
    pub oauth_credentials: Option<OAuthCredentials>,

    /// Earliest record timestamp to sync (RFC-3339 instant or `YYYY-MM-DD`)
    #[validate(length(min = 1))]
    pub start_date: String,

    /// Latest record timestamp to sync (RFC-3339 instant or `YYYY-MM-DD`).
    /// Defaults to the current time.
    #[serde(default)]
    pub end_date: Option<String>,

    /// Ad account id the account-scoped streams are bound to
    #[serde(default)]
    pub accounts: Option<String>,

    /// Campaign id used by the analytics entity filter
    #[serde(default)]
    pub campaign: Option<String>,

    /// Organization id owning the sponsored contents
    #[serde(default)]
    pub owner: Option<String>,

    /// Creative id injected into creative-pivoted analytics rows
    #[serde(default)]
    pub creative: Option<String>,

    /// API version sent in the version header (default: 202305)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// User-Agent header (optional)
    #[serde(default)]
    pub user_agent: Option<String>,

    /// API root URL
    #[serde(default = "default_base_url")]
    #[validate(url)]
    pub base_url: String,

    /// OAuth token endpoint used for refresh-token grants
    #[serde(default = "default_token_endpoint")]
    #[validate(url)]
    pub token_endpoint: String,

    /// Records requested per page (default: 100)
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 1000))]
    pub page_size: u64,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_secs: u32,

    /// Maximum retries per page request (default: 3)
    #[serde(default = "default_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,

    /// Retry backoff base in milliseconds (default: 1000)
    #[serde(default = "default_retry_backoff")]
    #[validate(range(min = 100, max = 60000))]
    pub retry_backoff_ms: u32,

    /// Add jitter to retry backoff (default: true)
    #[serde(default = "default_true")]
    pub retry_jitter: bool,
}

/// OAuth refresh-token credentials
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: SensitiveString,
    pub refresh_token: SensitiveString,
}

fn default_api_version() -> String {
    "202305".to_string()
}

fn default_base_url() -> String {
    "https://api.linkedin.com/rest".to_string()
}

fn default_token_endpoint() -> String {
    "https://www.linkedin.com/oauth/v2/accessToken".to_string()
}

fn default_page_size() -> u64 {
    100
}

fn default_timeout() -> u32 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u32 {
    1000
}

fn default_true() -> bool {
    true
}

impl TapConfig {
    /// Load configuration from a YAML or JSON file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| TapError::config(format!("failed to parse config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    /// Run field validation plus the cross-field checks serde cannot express
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| TapError::config(e.to_string()))?;

        if self.access_token.is_none() && self.oauth_credentials.is_none() {
            return Err(TapError::config(
                "either access_token or oauth_credentials must be set",
            ));
        }

        let start = self.start_bound()?;
        let end = self.end_bound()?;
        if start > end {
            return Err(TapError::config(format!(
                "start_date {} is after end_date {}",
                start, end
            )));
        }
        Ok(())
    }

    /// Lower bound of the sync window
    pub fn start_bound(&self) -> Result<DateTime<Utc>> {
        parse_bound(&self.start_date, false)
            .ok_or_else(|| TapError::config(format!("unparseable start_date: {}", self.start_date)))
    }

    /// Upper bound of the sync window (now, when unset)
    pub fn end_bound(&self) -> Result<DateTime<Utc>> {
        match &self.end_date {
            Some(raw) => parse_bound(raw, true)
                .ok_or_else(|| TapError::config(format!("unparseable end_date: {}", raw))),
            None => Ok(Utc::now()),
        }
    }
}

/// Parse a window bound: an RFC-3339 instant, or a bare date which expands to
/// start-of-day (lower bound) or end-of-day (upper bound) UTC.
fn parse_bound(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)?
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)?
    };
    Some(DateTime::from_naive_utc_and_offset(date.and_time(time), Utc))
}
