//! Sync orchestration
//!
//! Drives every enabled stream from the declarative table: entity streams
//! paginate to completion and normalize record by record; analytics streams
//! scatter-gather their column chunks first, then normalize the merged
//! records. One stream's fatal error is recorded in the summary and the
//! remaining streams still run. Records that fail shape validation are
//! logged with their identifying fields and skipped individually.

use crate::analytics::{scatter_gather, Pivot};
use crate::client::PageFetcher;
use crate::config::TapConfig;
use crate::error::{Result, SyncError, SyncResult};
use crate::normalize::{normalize_record, SyncWindow};
use crate::output::RecordWriter;
use crate::paginator::fetch_all_pages;
use crate::state::State;
use crate::streams::{StreamDef, StreamKind, ALL_STREAMS};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

/// Outcome of one stream's sync
#[derive(Debug, Clone)]
pub struct StreamSummary {
    pub name: String,
    pub records_emitted: u64,
    /// Records outside the replication window
    pub records_filtered: u64,
    /// Malformed records skipped after logging
    pub records_skipped: u64,
    pub error: Option<String>,
}

/// Outcome of a whole sync run
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub streams: Vec<StreamSummary>,
}

impl SyncSummary {
    /// Stream names that failed fatally
    pub fn failed_streams(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Total records emitted across streams
    pub fn records_emitted(&self) -> u64 {
        self.streams.iter().map(|s| s.records_emitted).sum()
    }
}

#[derive(Debug, Default)]
struct Counters {
    emitted: u64,
    filtered: u64,
    skipped: u64,
}

/// Drives a full sync against a page fetcher
pub struct SyncRunner<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    config: &'a TapConfig,
    state: State,
}

impl<'a, F: PageFetcher + ?Sized> SyncRunner<'a, F> {
    pub fn new(fetcher: &'a F, config: &'a TapConfig, state: State) -> Self {
        Self {
            fetcher,
            config,
            state,
        }
    }

    /// Current bookmark state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Take the bookmark state after a run
    pub fn into_state(self) -> State {
        self.state
    }

    /// Connectivity check: fetch a single accounts page
    pub async fn check(&self) -> SyncResult<()> {
        let def = crate::streams::find_stream("accounts")
            .ok_or_else(|| SyncError::Config("accounts stream missing from table".into()))?;
        let request = def.base_request(self.config)?.window(0, 1);
        self.fetcher.fetch_page(&request).await?;
        Ok(())
    }

    /// Sync every enabled stream, emitting records and per-stream state
    pub async fn sync_all(&mut self, writer: &mut RecordWriter) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        for def in ALL_STREAMS {
            if !def.enabled(self.config) {
                info!(stream = def.name, "skipping stream: required ids not configured");
                continue;
            }

            info!(stream = def.name, "starting sync");
            match self.sync_stream(def, writer).await {
                Ok(counters) => {
                    info!(
                        stream = def.name,
                        emitted = counters.emitted,
                        filtered = counters.filtered,
                        skipped = counters.skipped,
                        "stream complete"
                    );
                    writer.write_state(&self.state)?;
                    summary.streams.push(StreamSummary {
                        name: def.name.to_string(),
                        records_emitted: counters.emitted,
                        records_filtered: counters.filtered,
                        records_skipped: counters.skipped,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(stream = def.name, error = %e, "stream failed; continuing with remaining streams");
                    summary.streams.push(StreamSummary {
                        name: def.name.to_string(),
                        records_emitted: 0,
                        records_filtered: 0,
                        records_skipped: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        writer.flush()?;
        Ok(summary)
    }

    async fn sync_stream(
        &mut self,
        def: &StreamDef,
        writer: &mut RecordWriter,
    ) -> SyncResult<Counters> {
        let raw = match def.kind {
            StreamKind::Entity => {
                let base = def.base_request(self.config)?;
                fetch_all_pages(self.fetcher, &base, self.config.page_size).await?
            }
            StreamKind::Analytics(pivot) => {
                let requests = def.analytics_requests(self.config)?;
                let mut records = scatter_gather(
                    self.fetcher,
                    def.name,
                    pivot,
                    requests,
                    self.config.page_size,
                )
                .await?;
                for record in &mut records {
                    self.inject_pivot_id(record, pivot);
                }
                records
            }
        };

        self.emit_records(def, raw, writer)
    }

    /// The analytics payload does not always echo the entity the fetch was
    /// filtered by; fill the pivot id from config when the record lacks it.
    fn inject_pivot_id(&self, record: &mut Value, pivot: Pivot) {
        let Some(map) = record.as_object_mut() else {
            return;
        };
        if map.contains_key(pivot.id_field()) {
            return;
        }
        let configured = match pivot {
            Pivot::Campaign => self.config.campaign.as_deref(),
            Pivot::Creative => self.config.creative.as_deref(),
        };
        if let Some(id) = configured {
            let value = id
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(id.to_string()));
            map.insert(pivot.id_field().to_string(), value);
        }
    }

    fn emit_records(
        &mut self,
        def: &StreamDef,
        raw: Vec<Value>,
        writer: &mut RecordWriter,
    ) -> SyncResult<Counters> {
        let window = self.effective_window(def)?;
        let mut counters = Counters::default();
        let mut bookmark: Option<String> = None;

        for record in raw {
            match normalize_record(record, &def.normalize, def.name, &window) {
                Ok(Some(normalized)) => {
                    if let Some(key) = def.replication_key {
                        if let Some(value) = normalized.get(key).and_then(Value::as_str) {
                            if bookmark.as_deref().map_or(true, |b| value > b) {
                                bookmark = Some(value.to_string());
                            }
                        }
                    }
                    writer
                        .write_record(def.name, &normalized)
                        .map_err(|e| SyncError::State(e.to_string()))?;
                    counters.emitted += 1;
                }
                Ok(None) => counters.filtered += 1,
                Err(e @ SyncError::SchemaShape { .. }) => {
                    warn!(stream = def.name, error = %e, "skipping malformed record");
                    counters.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if let (Some(key), Some(value)) = (def.replication_key, bookmark) {
            self.state.advance(def.name, key, value);
        }
        Ok(counters)
    }

    /// The replication window: the configured bounds, with the lower bound
    /// raised to the stream's bookmark when one is stored.
    fn effective_window(&self, def: &StreamDef) -> SyncResult<SyncWindow> {
        let mut start = self
            .config
            .start_bound()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let end = self
            .config
            .end_bound()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        if let Some(cursor) = self.state.cursor(def.name) {
            if let Some(resumed) = parse_cursor(cursor) {
                if resumed > start {
                    start = resumed;
                }
            } else {
                return Err(SyncError::State(format!(
                    "unparseable bookmark '{}' for stream '{}'",
                    cursor, def.name
                )));
            }
        }

        Ok(SyncWindow { start, end })
    }
}

/// Parse a bookmark value: an RFC-3339 instant or a bare date
fn parse_cursor(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_time(NaiveTime::MIN),
        Utc,
    ))
}
