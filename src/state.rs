//! State management for incremental sync
//!
//! Tracks, per stream, the highest replication-key value emitted so far.
//! The next run resumes from that bookmark. Replication values are ISO-8601
//! strings (instants or dates), so ordering is lexicographic.

use crate::error::{Result, TapError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// State for tracking sync progress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// Per-stream state
    pub streams: HashMap<String, StreamState>,
}

impl State {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a specific stream
    pub fn get_stream(&self, stream_name: &str) -> Option<&StreamState> {
        self.streams.get(stream_name)
    }

    /// Advance a stream's bookmark: the cursor only ever moves forward.
    pub fn advance(
        &mut self,
        stream_name: impl Into<String>,
        cursor_field: impl Into<String>,
        cursor_value: impl Into<String>,
    ) {
        let name = stream_name.into();
        let value = cursor_value.into();
        let entry = self
            .streams
            .entry(name.clone())
            .or_insert_with(|| StreamState::new(name));
        entry.cursor_field = Some(cursor_field.into());
        match &entry.cursor_value {
            Some(current) if current.as_str() >= value.as_str() => {}
            _ => entry.cursor_value = Some(value),
        }
    }

    /// Bookmark value for a stream, if any
    pub fn cursor(&self, stream_name: &str) -> Option<&str> {
        self.streams
            .get(stream_name)
            .and_then(|s| s.cursor_value.as_deref())
    }

    /// Check if state is empty
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Load state from a JSON file; a missing file is an empty state
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| TapError::state(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Persist state to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| TapError::state(format!("failed to serialize state: {}", e)))?;
        std::fs::write(path.as_ref(), raw)?;
        Ok(())
    }
}

/// State for a single stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamState {
    /// Stream name
    pub stream_name: String,

    /// Replication key field name
    pub cursor_field: Option<String>,

    /// Highest replication value emitted
    pub cursor_value: Option<String>,
}

impl StreamState {
    /// Create new stream state
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            cursor_field: None,
            cursor_value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_moves_forward_only() {
        let mut state = State::new();

        state.advance("accounts", "last_modified_time", "2023-06-01T00:00:00+00:00");
        state.advance("accounts", "last_modified_time", "2023-06-15T00:00:00+00:00");
        // An older value must not move the bookmark backwards
        state.advance("accounts", "last_modified_time", "2023-05-01T00:00:00+00:00");

        assert_eq!(state.cursor("accounts"), Some("2023-06-15T00:00:00+00:00"));
    }

    #[test]
    fn test_streams_are_independent() {
        let mut state = State::new();
        state.advance("accounts", "last_modified_time", "2023-06-01T00:00:00+00:00");
        state.advance("ad_analytics_by_campaign", "day", "2023-06-03");

        assert_eq!(state.cursor("accounts"), Some("2023-06-01T00:00:00+00:00"));
        assert_eq!(state.cursor("ad_analytics_by_campaign"), Some("2023-06-03"));
        assert_eq!(state.cursor("campaigns"), None);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = State::new();
        state.advance("accounts", "last_modified_time", "2023-06-01T00:00:00+00:00");
        state.save(&path).unwrap();

        let restored = State::load(&path).unwrap();
        assert_eq!(restored.cursor("accounts"), Some("2023-06-01T00:00:00+00:00"));

        let field = restored
            .get_stream("accounts")
            .unwrap()
            .cursor_field
            .clone();
        assert_eq!(field.as_deref(), Some("last_modified_time"));
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let state = State::load("/nonexistent/state.json").unwrap();
        assert!(state.is_empty());
    }
}
