//! Error types for adtap
//!
//! Provides structured error handling for both the tap runtime and the
//! per-stream sync machinery.

use thiserror::Error;

/// Result type alias for the tap runtime
pub type Result<T> = std::result::Result<T, TapError>;

/// Result type alias for per-stream sync operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Main error type for the tap runtime
#[derive(Error, Debug)]
pub enum TapError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stream sync error, tagged with the failing stream
    #[error("Stream '{name}' error: {source}")]
    Stream {
        name: String,
        #[source]
        source: SyncError,
    },

    /// State persistence error
    #[error("State error: {0}")]
    State(String),

    /// Output writer error
    #[error("Output error: {0}")]
    Output(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sync error outside any particular stream (auth bootstrap, etc.)
    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl TapError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a stream error
    pub fn stream(name: impl Into<String>, source: SyncError) -> Self {
        Self::Stream {
            name: name.into(),
            source,
        }
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

/// Errors that can occur while syncing a single stream
#[derive(Debug, Error)]
pub enum SyncError {
    /// The stream cannot be built from the provided configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication against the remote API failed
    #[error("authentication error: {0}")]
    Auth(String),

    /// Network failure or non-2xx response after retries are exhausted,
    /// including unparseable response bodies
    #[error("transport error: {0}")]
    Transport(String),

    /// Rate limited by the remote API (429)
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Timeout waiting for a response
    #[error("timeout: {0}")]
    Timeout(String),

    /// Transient failure that may succeed on retry (connect errors, 5xx)
    #[error("transient error (retryable): {0}")]
    Transient(String),

    /// Page cursor went backwards, repeated, or could not be interpreted
    #[error("pagination error: {0}")]
    Pagination(String),

    /// A record did not have the shape the normalizer requires
    #[error("schema shape error in stream '{stream}' (record {record_id}): {message}")]
    SchemaShape {
        stream: String,
        /// Best-effort identifier of the offending record, for log correlation
        record_id: String,
        message: String,
    },

    /// Analytics chunk fetches returned differing record counts
    #[error(
        "merge cardinality mismatch in stream '{stream}': chunk {chunk} returned {actual} records, expected {expected}"
    )]
    MergeCountMismatch {
        stream: String,
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    /// Analytics chunk fetches disagreed on a row key at the same rank
    #[error("merge key mismatch in stream '{stream}' at rank {rank}: {left} != {right}")]
    MergeKeyMismatch {
        stream: String,
        rank: usize,
        left: String,
        right: String,
    },

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// State management error
    #[error("state error: {0}")]
    State(String),
}

impl SyncError {
    /// Check if this error is retryable at the single-page level
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::Timeout(_) | Self::Transient(_)
        )
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a pagination error
    pub fn pagination(msg: impl Into<String>) -> Self {
        Self::Pagination(msg.into())
    }

    /// Create a schema shape error
    pub fn schema_shape(
        stream: impl Into<String>,
        record_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SchemaShape {
            stream: stream.into(),
            record_id: record_id.into(),
            message: message.into(),
        }
    }
}
