//! Testing utilities
//!
//! An in-memory `PageFetcher` for exercising the paginator, the analytics
//! scatter-gather, and the sync runner without a live API. Datasets are
//! routed by request path plus, when present, the `fields` parameter, so
//! sibling analytics chunk fetches can serve distinct partial records.

use crate::client::{Page, PageFetcher, PageRequest, Paging};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory page fetcher serving fixed datasets
#[derive(Debug, Default)]
pub struct StaticFetcher {
    datasets: HashMap<String, Vec<Value>>,
    /// Every request received, for assertions on params and offsets
    pub requests: Mutex<Vec<PageRequest>>,
}

impl StaticFetcher {
    /// Create an empty fetcher (every request errors)
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the records served for a route key
    pub fn route(mut self, key: impl Into<String>, records: Vec<Value>) -> Self {
        self.datasets.insert(key.into(), records);
        self
    }

    /// Route key for a request: the path, plus the `pivot` and `fields`
    /// params when set, so sibling analytics fetches stay distinguishable
    pub fn key_for(request: &PageRequest) -> String {
        let mut key = request.path.trim_start_matches('/').to_string();
        let mut sep = '?';
        for param in ["pivot", "fields"] {
            if let Some((_, value)) = request.params.iter().find(|(k, _)| k == param) {
                key.push(sep);
                key.push_str(param);
                key.push('=');
                key.push_str(value);
                sep = '&';
            }
        }
        key
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> SyncResult<Page> {
        self.requests.lock().unwrap().push(request.clone());

        let key = Self::key_for(request);
        let records = self
            .datasets
            .get(&key)
            .ok_or_else(|| SyncError::transport(format!("no dataset for route '{}'", key)))?;

        let start = request.start as usize;
        let count = if request.count == 0 {
            records.len()
        } else {
            request.count as usize
        };
        let end = (start + count).min(records.len());
        let slice = if start >= records.len() {
            Vec::new()
        } else {
            records[start..end].to_vec()
        };

        Ok(Page {
            records: slice,
            paging: Some(Paging {
                start: Some(request.start),
                count: Some(count as u64),
                total: Some(records.len() as u64),
            }),
        })
    }
}
