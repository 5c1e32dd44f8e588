//! Page-cursor walking
//!
//! The cursor is the absolute count of records already consumed; each page
//! request passes it as the `start` offset. One stop rule applies to every
//! endpoint: pagination ends when a page comes back empty, or with fewer
//! records than requested (a short page is the last page; its records are
//! still consumed). A server-reported offset that disagrees with the
//! requested one is a fatal pagination error, never silent termination.

use crate::client::{Page, PageFetcher, PageRequest};
use crate::error::{SyncError, SyncResult};
use serde_json::Value;

/// Walks a stream's page cursor until the stop rule fires
#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: u64,
    consumed: u64,
    finished: bool,
}

impl Paginator {
    /// Create a paginator requesting `page_size` records per page
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size: page_size.max(1),
            consumed: 0,
            finished: false,
        }
    }

    /// Offset to request next, or `None` when the stream is exhausted
    pub fn next_start(&self) -> Option<u64> {
        if self.finished {
            None
        } else {
            Some(self.consumed)
        }
    }

    /// Page size to request
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Total records consumed so far
    pub fn records_consumed(&self) -> u64 {
        self.consumed
    }

    /// Whether the stop rule has fired
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Account for a fetched page and advance or terminate the cursor.
    ///
    /// Returns an error when called after termination or when the server's
    /// paging metadata contradicts the requested offset.
    pub fn observe(&mut self, page: &Page) -> SyncResult<()> {
        if self.finished {
            return Err(SyncError::pagination(
                "page observed after pagination finished",
            ));
        }

        if let Some(paging) = &page.paging {
            if let Some(reported) = paging.start {
                if reported != self.consumed {
                    return Err(SyncError::pagination(format!(
                        "server reported offset {} but {} records were requested from offset {}",
                        reported, self.page_size, self.consumed
                    )));
                }
            }
        }

        let len = page.len() as u64;
        if len == 0 {
            self.finished = true;
            return Ok(());
        }

        self.consumed += len;

        if len < self.page_size {
            self.finished = true;
        }
        if let Some(total) = page.paging.as_ref().and_then(|p| p.total) {
            if self.consumed >= total {
                self.finished = true;
            }
        }
        Ok(())
    }
}

/// Run a base request through the paginator until the stop rule fires,
/// collecting every record served along the way.
pub async fn fetch_all_pages<F>(
    fetcher: &F,
    base: &PageRequest,
    page_size: u64,
) -> SyncResult<Vec<Value>>
where
    F: PageFetcher + ?Sized,
{
    let mut paginator = Paginator::new(page_size);
    let mut records = Vec::new();

    while let Some(start) = paginator.next_start() {
        let request = base.clone().window(start, page_size);
        let page = fetcher.fetch_page(&request).await?;
        paginator.observe(&page)?;
        records.extend(page.records);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Paging;
    use serde_json::json;

    fn page_of(len: usize, start: u64) -> Page {
        Page {
            records: (0..len).map(|i| json!({"i": start + i as u64})).collect(),
            paging: Some(Paging {
                start: Some(start),
                count: None,
                total: None,
            }),
        }
    }

    #[test]
    fn test_terminates_within_bound_and_never_revisits() {
        // 250 records served in pages of 100
        let total = 250u64;
        let page_size = 100u64;
        let mut paginator = Paginator::new(page_size);
        let mut seen_starts = Vec::new();
        let mut calls = 0;

        while let Some(start) = paginator.next_start() {
            assert!(!seen_starts.contains(&start));
            seen_starts.push(start);
            calls += 1;

            let remaining = total.saturating_sub(start);
            let len = remaining.min(page_size) as usize;
            paginator.observe(&page_of(len, start)).unwrap();
        }

        assert_eq!(paginator.records_consumed(), total);
        // ceil(250 / 100) + 1 = 4
        assert!(calls <= 4);
    }

    #[test]
    fn test_short_page_is_consumed_then_stops() {
        let mut paginator = Paginator::new(100);
        paginator.observe(&page_of(100, 0)).unwrap();
        assert_eq!(paginator.next_start(), Some(100));
        paginator.observe(&page_of(37, 100)).unwrap();
        assert!(paginator.is_finished());
        assert_eq!(paginator.records_consumed(), 137);
    }

    #[test]
    fn test_empty_first_page_stops_immediately() {
        let mut paginator = Paginator::new(100);
        paginator
            .observe(&Page {
                records: vec![],
                paging: None,
            })
            .unwrap();
        assert!(paginator.is_finished());
        assert_eq!(paginator.records_consumed(), 0);
    }

    #[test]
    fn test_exact_multiple_needs_trailing_empty_page() {
        let mut paginator = Paginator::new(100);
        paginator.observe(&page_of(100, 0)).unwrap();
        paginator.observe(&page_of(100, 100)).unwrap();
        assert!(!paginator.is_finished());
        paginator.observe(&page_of(0, 200)).unwrap();
        assert!(paginator.is_finished());
        assert_eq!(paginator.records_consumed(), 200);
    }

    #[test]
    fn test_known_total_stops_full_final_page() {
        let mut paginator = Paginator::new(100);
        let mut page = page_of(100, 0);
        page.paging.as_mut().unwrap().total = Some(100);
        paginator.observe(&page).unwrap();
        assert!(paginator.is_finished());
    }

    #[test]
    fn test_non_monotonic_offset_is_fatal() {
        let mut paginator = Paginator::new(100);
        paginator.observe(&page_of(100, 0)).unwrap();
        // Server claims it served offset 0 again
        let err = paginator.observe(&page_of(100, 0)).unwrap_err();
        assert!(matches!(err, SyncError::Pagination(_)));
    }

    #[test]
    fn test_observe_after_finish_is_error() {
        let mut paginator = Paginator::new(100);
        paginator.observe(&page_of(3, 0)).unwrap();
        assert!(paginator.is_finished());
        assert!(paginator.observe(&page_of(3, 3)).is_err());
    }

    #[test]
    fn test_single_entity_page_without_paging() {
        let mut paginator = Paginator::new(100);
        let page = Page {
            records: vec![json!({"id": 1})],
            paging: None,
        };
        paginator.observe(&page).unwrap();
        // One record < page size: the single-object response ends pagination
        assert!(paginator.is_finished());
        assert_eq!(paginator.records_consumed(), 1);
    }
}
