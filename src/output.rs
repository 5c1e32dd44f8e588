//! JSONL output for records and state
//!
//! Emitted messages are newline-delimited JSON envelopes: `record` messages
//! carry one normalized record for a stream, `state` messages carry the
//! bookmark map after a stream completes. Downstream loaders consume the
//! stream line by line.

use crate::error::{Result, TapError};
use crate::state::State;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

/// Writes JSONL record/state envelopes
pub struct RecordWriter {
    out: Box<dyn Write + Send>,
}

impl RecordWriter {
    /// Write to an arbitrary sink
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    /// Write to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Write to a file, truncating it
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::create(path.as_ref())?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emit one record envelope
    pub fn write_record(&mut self, stream: &str, record: &Value) -> Result<()> {
        self.write_line(&json!({
            "type": "record",
            "stream": stream,
            "record": record,
        }))
    }

    /// Emit a state envelope
    pub fn write_state(&mut self, state: &State) -> Result<()> {
        self.write_line(&json!({
            "type": "state",
            "value": state,
        }))
    }

    /// Flush the underlying sink
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(TapError::Io)
    }

    fn write_line(&mut self, message: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.out, message)
            .map_err(|e| TapError::Output(format!("failed to serialize message: {}", e)))?;
        self.out.write_all(b"\n").map_err(TapError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
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
        fn lines(&self) -> Vec<Value> {
            let raw = self.0.lock().unwrap();
            String::from_utf8(raw.clone())
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    #[test]
    fn test_record_and_state_envelopes() {
        let buf = SharedBuf::default();
        let mut writer = RecordWriter::new(Box::new(buf.clone()));

        writer
            .write_record("accounts", &json!({"id": 1, "name": "acct"}))
            .unwrap();

        let mut state = State::new();
        state.advance("accounts", "last_modified_time", "2023-06-01T00:00:00+00:00");
        writer.write_state(&state).unwrap();
        writer.flush().unwrap();

        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "record");
        assert_eq!(lines[0]["stream"], "accounts");
        assert_eq!(lines[0]["record"]["id"], 1);
        assert_eq!(lines[1]["type"], "state");
        assert_eq!(
            lines[1]["value"]["streams"]["accounts"]["cursor_value"],
            "2023-06-01T00:00:00+00:00"
        );
    }
}
