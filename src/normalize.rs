//! Record normalization
//!
//! Every raw record is post-processed before emission: millisecond-epoch
//! audit stamps become ISO-8601 UTC strings under uniform keys, URN
//! references get their trailing ids extracted into companion fields, and
//! analytics date ranges collapse into a single `day` value. Records whose
//! shape does not support a required derivation fail with a typed error
//! carrying the record's identity - malformed data is observable, never
//! silently dropped. Because the remote API has no native last-modified
//! filter, the normalizer also enforces the sync window client-side.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// The inclusive `[start, end]` replication window
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// Whether an instant falls inside the window
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// A URN reference field and the id field derived from it
#[derive(Debug, Clone, Copy)]
pub struct UrnField {
    /// Source field holding the colon-delimited URN
    pub field: &'static str,
    /// Derived field the extracted id is written to
    pub target: &'static str,
    /// Index of the id segment after splitting on `:`
    pub index: usize,
    /// Whether the segment must parse as an integer
    pub numeric: bool,
}

/// Per-stream normalization behavior, driven from the stream table
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeSpec {
    /// Derive `created_time`/`last_modified_time` from audit stamps
    /// (nested `changeAuditStamps` or flat `createdAt`/`lastModifiedAt`);
    /// a record with neither shape is malformed
    pub audit_stamps: bool,
    /// URN reference fields to extract ids from, when present
    pub urn_ids: &'static [UrnField],
    /// Derive `run_schedule_start` from `runSchedule.start`, when present
    pub run_schedule: bool,
    /// Derive `day` from `dateRange.start`
    pub derive_day: bool,
    /// Drop records whose `last_modified_time` is outside the sync window
    pub window_filter: bool,
}

/// Normalize one record. Returns `Ok(None)` when the record falls outside
/// the replication window.
pub fn normalize_record(
    record: Value,
    spec: &NormalizeSpec,
    stream: &str,
    window: &SyncWindow,
) -> SyncResult<Option<Value>> {
    let mut map = match record {
        Value::Object(map) => map,
        other => {
            return Err(SyncError::schema_shape(
                stream,
                "<unknown>",
                format!("record is not an object: {}", other),
            ))
        }
    };
    let identity = record_identity(&map);

    if spec.audit_stamps {
        normalize_audit_stamps(&mut map, stream, &identity)?;
    }

    for urn in spec.urn_ids {
        extract_urn_id(&mut map, urn, stream, &identity)?;
    }

    if spec.run_schedule {
        normalize_run_schedule(&mut map, stream, &identity)?;
    }

    if spec.derive_day {
        derive_day(&mut map, stream, &identity)?;
    }

    if spec.window_filter {
        let raw = map
            .get("last_modified_time")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SyncError::schema_shape(stream, &identity, "missing last_modified_time for window filter")
            })?;
        let instant = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| {
                SyncError::schema_shape(
                    stream,
                    &identity,
                    format!("unparseable last_modified_time '{}': {}", raw, e),
                )
            })?
            .with_timezone(&Utc);
        if !window.contains(instant) {
            return Ok(None);
        }
    }

    Ok(Some(Value::Object(map)))
}

/// Best-effort identifier of a record for log correlation
fn record_identity(map: &Map<String, Value>) -> String {
    for field in ["id", "campaign_id", "creative_id", "user", "account"] {
        if let Some(value) = map.get(field) {
            match value {
                Value::String(s) => return format!("{}={}", field, s),
                Value::Number(n) => return format!("{}={}", field, n),
                _ => {}
            }
        }
    }
    "<unknown>".to_string()
}

fn normalize_audit_stamps(
    map: &mut Map<String, Value>,
    stream: &str,
    identity: &str,
) -> SyncResult<()> {
    let (created, modified) = if let Some(stamps) = map.get("changeAuditStamps") {
        let created = stamps
            .get("created")
            .and_then(|c| c.get("time"))
            .ok_or_else(|| {
                SyncError::schema_shape(stream, identity, "missing changeAuditStamps.created.time")
            })?;
        let modified = stamps
            .get("lastModified")
            .and_then(|m| m.get("time"))
            .ok_or_else(|| {
                SyncError::schema_shape(stream, identity, "missing changeAuditStamps.lastModified.time")
            })?;
        (created.clone(), modified.clone())
    } else if let Some(created) = map.get("createdAt") {
        let modified = map.get("lastModifiedAt").ok_or_else(|| {
            SyncError::schema_shape(stream, identity, "createdAt present but lastModifiedAt missing")
        })?;
        (created.clone(), modified.clone())
    } else {
        return Err(SyncError::schema_shape(
            stream,
            identity,
            "no changeAuditStamps or createdAt/lastModifiedAt fields found",
        ));
    };

    let created_time = epoch_ms_to_iso(&created, stream, identity, "created time")?;
    let last_modified_time = epoch_ms_to_iso(&modified, stream, identity, "last modified time")?;
    map.insert("created_time".to_string(), Value::String(created_time));
    map.insert(
        "last_modified_time".to_string(),
        Value::String(last_modified_time),
    );
    Ok(())
}

fn extract_urn_id(
    map: &mut Map<String, Value>,
    urn: &UrnField,
    stream: &str,
    identity: &str,
) -> SyncResult<()> {
    // URN reference fields are optional on most streams
    let Some(value) = map.get(urn.field) else {
        return Ok(());
    };

    let raw = value.as_str().ok_or_else(|| {
        SyncError::schema_shape(
            stream,
            identity,
            format!("{} is not a URN string: {}", urn.field, value),
        )
    })?;

    let segments: Vec<&str> = raw.split(':').collect();
    let segment = segments.get(urn.index).copied().ok_or_else(|| {
        SyncError::schema_shape(
            stream,
            identity,
            format!(
                "malformed URN in {}: '{}' has {} segments, need index {}",
                urn.field,
                raw,
                segments.len(),
                urn.index
            ),
        )
    })?;

    let derived = if urn.numeric {
        let id: i64 = segment.parse().map_err(|_| {
            SyncError::schema_shape(
                stream,
                identity,
                format!("URN segment '{}' in {} is not numeric", segment, urn.field),
            )
        })?;
        Value::from(id)
    } else {
        Value::String(segment.to_string())
    };

    map.insert(urn.target.to_string(), derived);
    Ok(())
}

fn normalize_run_schedule(
    map: &mut Map<String, Value>,
    stream: &str,
    identity: &str,
) -> SyncResult<()> {
    let Some(schedule) = map.get("runSchedule") else {
        return Ok(());
    };
    let start = schedule.get("start").ok_or_else(|| {
        SyncError::schema_shape(stream, identity, "runSchedule present but missing start")
    })?;
    let iso = epoch_ms_to_iso(start, stream, identity, "runSchedule.start")?;
    map.insert("run_schedule_start".to_string(), Value::String(iso));
    Ok(())
}

fn derive_day(map: &mut Map<String, Value>, stream: &str, identity: &str) -> SyncResult<()> {
    let start = map
        .get("dateRange")
        .and_then(|r| r.get("start"))
        .ok_or_else(|| SyncError::schema_shape(stream, identity, "missing dateRange.start"))?;

    let part = |name: &str| -> SyncResult<i64> {
        start.get(name).and_then(Value::as_i64).ok_or_else(|| {
            SyncError::schema_shape(
                stream,
                identity,
                format!("missing or non-integer dateRange.start.{}", name),
            )
        })
    };
    let year = part("year")?;
    let month = part("month")?;
    let day = part("day")?;

    let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .ok_or_else(|| {
            SyncError::schema_shape(
                stream,
                identity,
                format!("invalid dateRange.start {}-{}-{}", year, month, day),
            )
        })?;

    map.insert("day".to_string(), Value::String(date.to_string()));
    Ok(())
}

/// Convert a millisecond epoch (number or numeric string) to an ISO-8601
/// UTC string with second precision.
fn epoch_ms_to_iso(
    value: &Value,
    stream: &str,
    identity: &str,
    what: &str,
) -> SyncResult<String> {
    let ms = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        SyncError::schema_shape(
            stream,
            identity,
            format!("{} is not a millisecond epoch: {}", what, value),
        )
    })?;

    let instant = DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| {
        SyncError::schema_shape(
            stream,
            identity,
            format!("{} epoch {} out of range", what, ms),
        )
    })?;
    Ok(instant.to_rfc3339_opts(SecondsFormat::Secs, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wide_window() -> SyncWindow {
        SyncWindow {
            start: DateTime::parse_from_rfc3339("2000-01-01T00:00:00+00:00")
                .unwrap()
                .with_timezone(&Utc),
            end: DateTime::parse_from_rfc3339("2100-01-01T00:00:00+00:00")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    fn stamps_spec() -> NormalizeSpec {
        NormalizeSpec {
            audit_stamps: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_nested_audit_stamps() {
        let record = json!({
            "changeAuditStamps": {
                "created": {"time": "1700000000000"},
                "lastModified": {"time": "1700000100000"}
            }
        });

        let out = normalize_record(record, &stamps_spec(), "accounts", &wide_window())
            .unwrap()
            .unwrap();

        assert_eq!(out["created_time"], "2023-11-14T22:13:20+00:00");
        assert_eq!(out["last_modified_time"], "2023-11-14T22:15:00+00:00");
        assert!(out["last_modified_time"].as_str() >= out["created_time"].as_str());
    }

    #[test]
    fn test_flat_audit_stamps() {
        let record = json!({"createdAt": 1700000000000i64, "lastModifiedAt": 1700000100000i64});

        let out = normalize_record(record, &stamps_spec(), "creatives", &wide_window())
            .unwrap()
            .unwrap();

        assert_eq!(out["created_time"], "2023-11-14T22:13:20+00:00");
        assert_eq!(out["last_modified_time"], "2023-11-14T22:15:00+00:00");
    }

    #[test]
    fn test_missing_both_stamp_shapes_fails() {
        let err = normalize_record(json!({"id": 7}), &stamps_spec(), "accounts", &wide_window())
            .unwrap_err();
        match err {
            SyncError::SchemaShape { record_id, message, .. } => {
                assert_eq!(record_id, "id=7");
                assert!(message.contains("changeAuditStamps"));
            }
            other => panic!("expected SchemaShape, got {other}"),
        }
    }

    #[test]
    fn test_partial_nested_stamps_fail() {
        let record = json!({"changeAuditStamps": {"created": {"time": 1}}});
        let err = normalize_record(record, &stamps_spec(), "accounts", &wide_window()).unwrap_err();
        assert!(err.to_string().contains("lastModified"));
    }

    #[test]
    fn test_urn_id_extraction() {
        const URNS: &[UrnField] = &[
            UrnField { field: "account", target: "account_id", index: 3, numeric: true },
            UrnField { field: "user", target: "user_person_id", index: 3, numeric: false },
        ];
        let spec = NormalizeSpec { urn_ids: URNS, ..Default::default() };

        let record = json!({
            "account": "urn:li:sponsoredAccount:508123456",
            "user": "urn:li:person:AbC-123"
        });
        let out = normalize_record(record, &spec, "account_users", &wide_window())
            .unwrap()
            .unwrap();

        assert_eq!(out["account_id"], 508123456i64);
        assert_eq!(out["user_person_id"], "AbC-123");
    }

    #[test]
    fn test_absent_urn_field_is_not_an_error() {
        const URNS: &[UrnField] =
            &[UrnField { field: "campaignGroup", target: "campaign_group_id", index: 3, numeric: true }];
        let spec = NormalizeSpec { urn_ids: URNS, ..Default::default() };

        let out = normalize_record(json!({"id": 1}), &spec, "campaigns", &wide_window())
            .unwrap()
            .unwrap();
        assert!(out.get("campaign_group_id").is_none());
    }

    #[test]
    fn test_short_urn_fails() {
        const URNS: &[UrnField] =
            &[UrnField { field: "account", target: "account_id", index: 3, numeric: true }];
        let spec = NormalizeSpec { urn_ids: URNS, ..Default::default() };

        let err = normalize_record(
            json!({"account": "urn:li"}),
            &spec,
            "accounts",
            &wide_window(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("malformed URN"));
    }

    #[test]
    fn test_non_numeric_urn_segment_fails() {
        const URNS: &[UrnField] =
            &[UrnField { field: "account", target: "account_id", index: 3, numeric: true }];
        let spec = NormalizeSpec { urn_ids: URNS, ..Default::default() };

        let err = normalize_record(
            json!({"account": "urn:li:sponsoredAccount:not-a-number"}),
            &spec,
            "accounts",
            &wide_window(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not numeric"));
    }

    #[test]
    fn test_run_schedule_start() {
        let spec = NormalizeSpec { run_schedule: true, ..Default::default() };
        let record = json!({"runSchedule": {"start": 1700000000000i64}});

        let out = normalize_record(record, &spec, "campaign_groups", &wide_window())
            .unwrap()
            .unwrap();
        assert_eq!(out["run_schedule_start"], "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn test_day_derivation() {
        let spec = NormalizeSpec { derive_day: true, ..Default::default() };
        let record = json!({"dateRange": {"start": {"year": 2023, "month": 6, "day": 1}}});

        let out = normalize_record(record, &spec, "ad_analytics_by_campaign", &wide_window())
            .unwrap()
            .unwrap();
        assert_eq!(out["day"], "2023-06-01");
    }

    #[test]
    fn test_day_missing_subfield_fails() {
        let spec = NormalizeSpec { derive_day: true, ..Default::default() };
        let record = json!({"dateRange": {"start": {"year": 2023, "day": 1}}});

        let err = normalize_record(record, &spec, "ad_analytics_by_campaign", &wide_window())
            .unwrap_err();
        assert!(err.to_string().contains("dateRange.start.month"));
    }

    #[test]
    fn test_window_filter() {
        let spec = NormalizeSpec { audit_stamps: true, window_filter: true, ..Default::default() };
        let window = SyncWindow {
            start: DateTime::parse_from_rfc3339("2023-11-01T00:00:00+00:00")
                .unwrap()
                .with_timezone(&Utc),
            end: DateTime::parse_from_rfc3339("2023-11-30T23:59:59+00:00")
                .unwrap()
                .with_timezone(&Utc),
        };

        // Within window: 2023-11-14
        let within = json!({"changeAuditStamps": {
            "created": {"time": 1700000000000i64},
            "lastModified": {"time": 1700000100000i64}
        }});
        assert!(normalize_record(within, &spec, "accounts", &window)
            .unwrap()
            .is_some());

        // Before window: 2023-10-01
        let before = json!({"changeAuditStamps": {
            "created": {"time": 1696118400000i64},
            "lastModified": {"time": 1696118400000i64}
        }});
        assert!(normalize_record(before, &spec, "accounts", &window)
            .unwrap()
            .is_none());

        // After window: 2023-12-15
        let after = json!({"changeAuditStamps": {
            "created": {"time": 1702598400000i64},
            "lastModified": {"time": 1702598400000i64}
        }});
        assert!(normalize_record(after, &spec, "accounts", &window)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_non_object_record_fails() {
        let err = normalize_record(json!([1, 2]), &stamps_spec(), "accounts", &wide_window())
            .unwrap_err();
        assert!(matches!(err, SyncError::SchemaShape { .. }));
    }
}
