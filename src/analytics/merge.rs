//! Scatter-gather fetch and merge for split analytics streams
//!
//! One fully paginated fetch runs per column chunk; all chunk fetches share
//! identical filter, pivot, sort, and date-range parameters and differ only
//! in `fields`, so the remote API returns congruent pagination and the
//! partial records can be merged rank-wise. Two hard checks guard the merge:
//! every chunk must return the same record count, and at every rank the
//! extractable row-key components must agree across chunks. A violation of
//! either aborts the stream with zero records emitted - a truncated merge is
//! data loss, not a best effort.

use super::Pivot;
use crate::client::{PageFetcher, PageRequest};
use crate::error::{SyncError, SyncResult};
use crate::paginator::fetch_all_pages;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::debug;

/// The identity of a logical analytics row, as far as a partial record
/// exposes it. Only the first chunk requests `dateRange`, and the entity id
/// is not part of the raw metric payload at all on some API versions, so
/// both components are optional; verification uses whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowKey {
    pub entity: Option<String>,
    pub day: Option<NaiveDate>,
}

impl RowKey {
    /// Extract the key components a partial record carries
    pub fn extract(record: &Value, pivot: Pivot) -> Self {
        let entity = record
            .get(pivot.id_field())
            .or_else(|| record.get("pivotValue"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        let day = record
            .get("dateRange")
            .and_then(|r| r.get("start"))
            .and_then(|start| {
                let year = start.get("year")?.as_i64()?;
                let month = start.get("month")?.as_i64()?;
                let date = start.get("day")?.as_i64()?;
                NaiveDate::from_ymd_opt(year as i32, month as u32, date as u32)
            });

        Self { entity, day }
    }

    /// Fold another partial's key into this one. Components present on both
    /// sides must match; a `None` on either side is compatible with anything.
    fn absorb(&mut self, other: Self) -> Result<(), (String, String)> {
        let conflict = (self.entity.is_some() && other.entity.is_some() && self.entity != other.entity)
            || (self.day.is_some() && other.day.is_some() && self.day != other.day);
        if conflict {
            return Err((self.to_string(), other.to_string()));
        }
        if self.entity.is_none() {
            self.entity = other.entity;
        }
        if self.day.is_none() {
            self.day = other.day;
        }
        Ok(())
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(entity={}, day={})",
            self.entity.as_deref().unwrap_or("-"),
            self.day.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
        )
    }
}

/// Merge N chunk fetches into complete records.
///
/// Every chunk must contribute exactly one partial record per rank; the
/// merged record at rank `i` is the field union of all chunks' rank-`i`
/// partials. By construction no field name appears in two chunks.
pub fn merge_chunk_records(
    stream: &str,
    pivot: Pivot,
    chunks: Vec<Vec<Value>>,
) -> SyncResult<Vec<Value>> {
    let Some(expected) = chunks.first().map(|c| c.len()) else {
        return Ok(Vec::new());
    };

    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.len() != expected {
            return Err(SyncError::MergeCountMismatch {
                stream: stream.to_string(),
                chunk: index,
                expected,
                actual: chunk.len(),
            });
        }
    }

    let mut merged = Vec::with_capacity(expected);
    for rank in 0..expected {
        let mut record = Map::new();
        let mut key = RowKey::default();

        for chunk in &chunks {
            let partial = chunk[rank].as_object().ok_or_else(|| {
                SyncError::schema_shape(
                    stream,
                    format!("rank={}", rank),
                    "partial analytics record is not an object",
                )
            })?;

            key.absorb(RowKey::extract(&chunk[rank], pivot))
                .map_err(|(left, right)| SyncError::MergeKeyMismatch {
                    stream: stream.to_string(),
                    rank,
                    left,
                    right,
                })?;

            for (field, value) in partial {
                record.insert(field.clone(), value.clone());
            }
        }
        merged.push(Value::Object(record));
    }

    debug!(stream, records = merged.len(), chunks = chunks.len(), "merged analytics chunks");
    Ok(merged)
}

/// Run the full scatter-gather for one logical analytics stream: paginate
/// every chunk request to completion concurrently, wait for all of them,
/// then merge. The first chunk error aborts the whole gather; partial
/// results are never merged.
pub async fn scatter_gather<F>(
    fetcher: &F,
    stream: &str,
    pivot: Pivot,
    chunk_requests: Vec<PageRequest>,
    page_size: u64,
) -> SyncResult<Vec<Value>>
where
    F: PageFetcher + ?Sized,
{
    let fetches = chunk_requests
        .iter()
        .map(|request| fetch_all_pages(fetcher, request, page_size));
    let chunks = futures::future::try_join_all(fetches).await?;
    merge_chunk_records(stream, pivot, chunks)
}
