//! adtap - incremental extraction connector for social-ads REST APIs
//!
//! The tap reads advertising entities (accounts, campaigns, creatives, ...)
//! and daily analytics from a versioned ads REST API and emits normalized
//! JSONL records plus bookmark state for downstream ingestion.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌────────────────┐   ┌────────────┐
//! │  ApiClient │──▶│ Paginator │──▶│ scatter-gather │──▶│ Normalizer │──▶ JSONL
//! │ (reqwest)  │   │ (cursor)  │   │ (analytics)    │   │ + window   │    + state
//! └────────────┘   └───────────┘   └────────────────┘   └────────────┘
//! ```
//!
//! Streams are declarative: one [`streams::StreamDef`] entry per stream
//! drives routing, query parameters, normalization, and schema rendering.
//! The [`client::PageFetcher`] trait is the seam between the sync logic and
//! HTTP, so the whole pipeline runs against an in-memory fetcher in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use adtap::{ApiClient, RecordWriter, State, SyncRunner, TapConfig};
//!
//! let config = TapConfig::load("config.yaml")?;
//! let client = ApiClient::from_config(&config)?;
//! let state = State::load("state.json")?;
//!
//! let mut runner = SyncRunner::new(&client, &config, state);
//! let summary = runner.sync_all(&mut RecordWriter::stdout()).await?;
//! ```

pub mod analytics;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod normalize;
pub mod output;
pub mod paginator;
pub mod state;
pub mod streams;
pub mod sync_runner;
pub mod testing;
pub mod types;

// Re-export the main surface at the crate root
pub use analytics::{
    merge_chunk_records, scatter_gather, Pivot, RowKey, ANALYTICS_FIELD_CHUNKS,
    MAX_FIELDS_PER_REQUEST,
};
pub use auth::{AuthContext, Credentials};
pub use client::{ApiClient, Page, PageFetcher, PageRequest, Paging, RetryPolicy};
pub use config::{OAuthCredentials, TapConfig};
pub use error::{Result, SyncError, SyncResult, TapError};
pub use normalize::{normalize_record, NormalizeSpec, SyncWindow, UrnField};
pub use output::RecordWriter;
pub use paginator::{fetch_all_pages, Paginator};
pub use state::{State, StreamState};
pub use streams::{discover_catalog, find_stream, StreamDef, StreamKind, ALL_STREAMS};
pub use sync_runner::{StreamSummary, SyncRunner, SyncSummary};
pub use types::SensitiveString;

// Re-export commonly used dependencies for downstream embedding
pub use async_trait::async_trait;
pub use serde_json::Value as JsonValue;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        async_trait, fetch_all_pages, find_stream, merge_chunk_records, normalize_record,
        scatter_gather, ApiClient, AuthContext, JsonValue, NormalizeSpec, Page, PageFetcher,
        PageRequest, Paginator, Pivot, RecordWriter, Result, SensitiveString, State, StreamDef,
        SyncError, SyncResult, SyncRunner, SyncWindow, TapConfig, TapError, ALL_STREAMS,
    };
}
