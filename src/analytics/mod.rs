//! Daily analytics extraction
//!
//! The analytics endpoint aggregates metrics by a pivot dimension and caps
//! each request at 20 metric fields. A logical analytics stream is therefore
//! served as a scatter-gather: one fully paginated fetch per column chunk,
//! all sharing identical filter/date-range parameters, merged rank-wise into
//! complete records afterwards.

pub mod columns;
pub mod merge;

pub use columns::{all_metric_fields, fields_param, ANALYTICS_FIELD_CHUNKS, MAX_FIELDS_PER_REQUEST};
pub use merge::{merge_chunk_records, scatter_gather, RowKey};

use serde::{Deserialize, Serialize};

/// Dimension the analytics endpoint aggregates by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pivot {
    Campaign,
    Creative,
}

impl Pivot {
    /// Value sent in the `pivot` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "CAMPAIGN",
            Self::Creative => "CREATIVE",
        }
    }

    /// Name of the derived entity-id field on emitted records
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign_id",
            Self::Creative => "creative_id",
        }
    }
}

impl std::fmt::Display for Pivot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
