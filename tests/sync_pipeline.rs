//! End-to-end sync over an in-memory page fetcher: entity pagination with
//! window filtering, analytics scatter-gather with chunk merging and pivot
//! id injection, bookmark advancement, and per-stream failure isolation.

use adtap::analytics::{fields_param, ANALYTICS_FIELD_CHUNKS};
use adtap::testing::StaticFetcher;
use adtap::{RecordWriter, State, SyncRunner, TapConfig};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn messages(&self) -> Vec<Value> {
        let raw = self.0.lock().unwrap();
        String::from_utf8(raw.clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn records_for(&self, stream: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|m| m["type"] == "record" && m["stream"] == stream)
            .map(|m| m["record"].clone())
            .collect()
    }
}

fn config() -> TapConfig {
    serde_yaml::from_str(
        r#"
        access_token: test-token
        start_date: "2023-06-01"
        end_date: "2023-06-30"
        campaign: "211290954"
        creative: "204930534"
    "#,
    )
    .unwrap()
}

fn analytics_route(pivot: &str, chunk: usize) -> String {
    format!(
        "adAnalytics?pivot={}&fields={}",
        pivot,
        fields_param(ANALYTICS_FIELD_CHUNKS[chunk])
    )
}

/// Two daily analytics rows split across the four column chunks. Only the
/// first chunk carries `dateRange`.
fn analytics_chunks() -> [Vec<Value>; 4] {
    [
        vec![
            json!({"clicks": 10, "dateRange": {
                "start": {"year": 2023, "month": 6, "day": 1},
                "end": {"year": 2023, "month": 6, "day": 2}}}),
            json!({"clicks": 12, "dateRange": {
                "start": {"year": 2023, "month": 6, "day": 2},
                "end": {"year": 2023, "month": 6, "day": 3}}}),
        ],
        vec![
            json!({"costInUsd": "1.50", "totalEngagements": 5}),
            json!({"costInUsd": "2.25", "totalEngagements": 7}),
        ],
        vec![json!({"likes": 3}), json!({"likes": 4})],
        vec![json!({"impressions": 100}), json!({"impressions": 120})],
    ]
}

fn accounts_records() -> Vec<Value> {
    vec![
        // 2023-06-17T11:06:40Z, inside the window
        json!({"id": 1, "status": "ACTIVE", "changeAuditStamps": {
            "created": {"time": 1686000000000i64},
            "lastModified": {"time": 1687000000000i64}}}),
        // 2023-10-01, outside the window
        json!({"id": 2, "status": "ACTIVE", "changeAuditStamps": {
            "created": {"time": 1696118400000i64},
            "lastModified": {"time": 1696118400000i64}}}),
    ]
}

fn full_fetcher() -> StaticFetcher {
    let mut fetcher = StaticFetcher::new().route("adAccounts", accounts_records());
    for pivot in ["CAMPAIGN", "CREATIVE"] {
        for (chunk, records) in analytics_chunks().into_iter().enumerate() {
            fetcher = fetcher.route(analytics_route(pivot, chunk), records);
        }
    }
    fetcher
}

#[tokio::test]
async fn test_full_sync_emits_merged_and_filtered_records() {
    let fetcher = full_fetcher();
    let config = config();
    let buf = SharedBuf::default();
    let mut writer = RecordWriter::new(Box::new(buf.clone()));

    let mut runner = SyncRunner::new(&fetcher, &config, State::new());
    let summary = runner.sync_all(&mut writer).await.unwrap();

    assert!(summary.failed_streams().is_empty(), "{:?}", summary);

    // Entity stream: the out-of-window record is filtered
    let accounts = buf.records_for("accounts");
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0]["id"], 1);
    assert_eq!(accounts[0]["last_modified_time"], "2023-06-17T11:06:40+00:00");

    // Analytics: four chunks merged into complete daily rows
    let by_campaign = buf.records_for("ad_analytics_by_campaign");
    assert_eq!(by_campaign.len(), 2);
    let first = &by_campaign[0];
    assert_eq!(first["campaign_id"], 211290954i64);
    assert_eq!(first["day"], "2023-06-01");
    assert_eq!(first["clicks"], 10);
    assert_eq!(first["costInUsd"], "1.50");
    assert_eq!(first["likes"], 3);
    assert_eq!(first["impressions"], 100);

    let by_creative = buf.records_for("ad_analytics_by_creative");
    assert_eq!(by_creative.len(), 2);
    assert_eq!(by_creative[1]["creative_id"], 204930534i64);
    assert_eq!(by_creative[1]["day"], "2023-06-02");

    // Bookmarks advanced to the highest emitted replication value
    let state = runner.into_state();
    assert_eq!(state.cursor("accounts"), Some("2023-06-17T11:06:40+00:00"));
    assert_eq!(state.cursor("ad_analytics_by_campaign"), Some("2023-06-02"));

    // A state envelope follows every completed stream
    let states = buf
        .messages()
        .into_iter()
        .filter(|m| m["type"] == "state")
        .count();
    assert_eq!(states, 3);
}

#[tokio::test]
async fn test_chunk_count_mismatch_fails_stream_without_truncation() {
    let mut fetcher = StaticFetcher::new().route("adAccounts", accounts_records());
    for (chunk, mut records) in analytics_chunks().into_iter().enumerate() {
        // CREATIVE chunk 2 drops a record: the merge must fail loudly
        fetcher = fetcher.route(analytics_route("CAMPAIGN", chunk), records.clone());
        if chunk == 2 {
            records.pop();
        }
        fetcher = fetcher.route(analytics_route("CREATIVE", chunk), records);
    }

    let config = config();
    let buf = SharedBuf::default();
    let mut writer = RecordWriter::new(Box::new(buf.clone()));

    let mut runner = SyncRunner::new(&fetcher, &config, State::new());
    let summary = runner.sync_all(&mut writer).await.unwrap();

    // The campaign pivot is unaffected
    assert_eq!(buf.records_for("ad_analytics_by_campaign").len(), 2);

    // The creative pivot emits nothing and reports the mismatch
    assert!(buf.records_for("ad_analytics_by_creative").is_empty());
    let failed: Vec<_> = summary
        .streams
        .iter()
        .filter(|s| s.error.is_some())
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "ad_analytics_by_creative");
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap()
        .contains("merge cardinality mismatch"));

    // No bookmark for the failed stream
    assert_eq!(runner.state().cursor("ad_analytics_by_creative"), None);
}

#[tokio::test]
async fn test_rerun_resumes_from_bookmark() {
    let fetcher = full_fetcher();
    let config = config();

    // First run
    let mut runner = SyncRunner::new(&fetcher, &config, State::new());
    runner
        .sync_all(&mut RecordWriter::new(Box::new(std::io::sink())))
        .await
        .unwrap();
    let state = runner.into_state();

    // Second run with the carried-over state: the accounts record at the
    // bookmark instant is re-emitted (inclusive window), nothing older is
    let buf = SharedBuf::default();
    let mut writer = RecordWriter::new(Box::new(buf.clone()));
    let mut runner = SyncRunner::new(&fetcher, &config, state);
    let summary = runner.sync_all(&mut writer).await.unwrap();

    assert!(summary.failed_streams().is_empty());
    let accounts = buf.records_for("accounts");
    assert_eq!(accounts.len(), 1);
    assert_eq!(runner.state().cursor("accounts"), Some("2023-06-17T11:06:40+00:00"));
}
