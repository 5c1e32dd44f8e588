//! Declarative stream definitions
//!
//! Every stream is one entry in a static table: route, finder parameters,
//! replication and primary keys, normalization behavior, and a field table
//! the JSON schema is rendered from. The sync runner is driven entirely by
//! this table; there is no per-stream type.

use crate::analytics::{columns, Pivot};
use crate::client::PageRequest;
use crate::config::TapConfig;
use crate::error::{SyncError, SyncResult};
use crate::normalize::{NormalizeSpec, UrnField};
use serde_json::{json, Map, Value};

/// How a stream's records are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Plain paginated entity endpoint
    Entity,
    /// Column-split analytics endpoint, scatter-gathered by pivot
    Analytics(Pivot),
}

/// Endpoint path, possibly scoped under the configured ad account
#[derive(Debug, Clone, Copy)]
pub enum Route {
    /// Path below the API root
    Fixed(&'static str),
    /// `adAccounts/{account}/<suffix>`
    AccountScoped(&'static str),
}

/// Config identifier a URN query parameter is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigId {
    Accounts,
    Campaign,
    Owner,
    Creative,
}

/// A query parameter carrying a URN assembled from config. These are
/// appended to the URL without percent-encoding; the API rejects encoded
/// URN list parameters.
#[derive(Debug, Clone, Copy)]
pub struct UrnParam {
    pub key: &'static str,
    pub prefix: &'static str,
    pub source: ConfigId,
}

/// Semantic field type for schema rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    DateTime,
    Date,
    Object,
    StringArray,
}

/// One parameterized stream definition
#[derive(Debug, Clone, Copy)]
pub struct StreamDef {
    pub name: &'static str,
    pub kind: StreamKind,
    pub route: Route,
    /// Value of the `q` finder parameter, when the endpoint uses one
    pub finder: Option<&'static str>,
    /// Fixed extra query parameters
    pub params: &'static [(&'static str, &'static str)],
    /// URN parameters assembled from config ids
    pub urn_params: &'static [UrnParam],
    pub replication_key: Option<&'static str>,
    pub primary_keys: &'static [&'static str],
    pub normalize: NormalizeSpec,
    /// Field table the JSON schema is rendered from
    pub fields: &'static [(&'static str, FieldType)],
}

const ACCOUNT_URN: UrnField = UrnField {
    field: "account",
    target: "account_id",
    index: 3,
    numeric: true,
};
const CAMPAIGN_GROUP_URN: UrnField = UrnField {
    field: "campaignGroup",
    target: "campaign_group_id",
    index: 3,
    numeric: true,
};
const CAMPAIGN_URN: UrnField = UrnField {
    field: "campaign",
    target: "campaign_id",
    index: 3,
    numeric: true,
};
const USER_URN: UrnField = UrnField {
    field: "user",
    target: "user_person_id",
    index: 3,
    numeric: false,
};

/// Metric fields served as strings by the analytics endpoint; everything
/// else in the chunk table is an integer count.
const STRING_METRICS: &[&str] = &[
    "costInUsd",
    "costInLocalCurrency",
    "conversionValueInLocalCurrency",
    "jobApplications",
    "jobApplyClicks",
    "postViewJobApplications",
    "postViewRegistrations",
    "registrations",
    "viralJobApplications",
    "viralJobApplyClicks",
    "viralRegistrations",
];

const ACCOUNTS_FIELDS: &[(&str, FieldType)] = &[
    ("changeAuditStamps", FieldType::Object),
    ("created_time", FieldType::DateTime),
    ("last_modified_time", FieldType::DateTime),
    ("currency", FieldType::String),
    ("id", FieldType::Integer),
    ("name", FieldType::String),
    ("notifiedOnCampaignOptimization", FieldType::Boolean),
    ("notifiedOnCreativeApproval", FieldType::Boolean),
    ("notifiedOnCreativeRejection", FieldType::Boolean),
    ("notifiedOnEndOfCampaign", FieldType::Boolean),
    ("notifiedOnNewFeaturesEnabled", FieldType::Boolean),
    ("reference", FieldType::String),
    ("servingStatuses", FieldType::StringArray),
    ("status", FieldType::String),
    ("test", FieldType::Boolean),
    ("totalBudget", FieldType::Object),
    ("type", FieldType::String),
    ("version", FieldType::Object),
];

const ACCOUNT_USERS_FIELDS: &[(&str, FieldType)] = &[
    ("account", FieldType::String),
    ("account_id", FieldType::Integer),
    ("campaignContact", FieldType::Boolean),
    ("changeAuditStamps", FieldType::Object),
    ("created_time", FieldType::DateTime),
    ("last_modified_time", FieldType::DateTime),
    ("role", FieldType::String),
    ("user", FieldType::String),
    ("user_person_id", FieldType::String),
];

const VIDEO_ADS_FIELDS: &[(&str, FieldType)] = &[
    ("account", FieldType::String),
    ("account_id", FieldType::Integer),
    ("changeAuditStamps", FieldType::Object),
    ("created_time", FieldType::DateTime),
    ("last_modified_time", FieldType::DateTime),
    ("contentReference", FieldType::String),
    ("name", FieldType::String),
    ("type", FieldType::String),
];

const CAMPAIGN_GROUPS_FIELDS: &[(&str, FieldType)] = &[
    ("account", FieldType::String),
    ("account_id", FieldType::Integer),
    ("backfilled", FieldType::Boolean),
    ("changeAuditStamps", FieldType::Object),
    ("created_time", FieldType::DateTime),
    ("last_modified_time", FieldType::DateTime),
    ("id", FieldType::Integer),
    ("name", FieldType::String),
    ("runSchedule", FieldType::Object),
    ("run_schedule_start", FieldType::DateTime),
    ("servingStatuses", FieldType::StringArray),
    ("status", FieldType::String),
    ("test", FieldType::Boolean),
    ("totalBudget", FieldType::Object),
];

const CAMPAIGNS_FIELDS: &[(&str, FieldType)] = &[
    ("account", FieldType::String),
    ("account_id", FieldType::Integer),
    ("audienceExpansionEnabled", FieldType::Boolean),
    ("campaignGroup", FieldType::String),
    ("campaign_group_id", FieldType::Integer),
    ("changeAuditStamps", FieldType::Object),
    ("costType", FieldType::String),
    ("created_time", FieldType::DateTime),
    ("creativeSelection", FieldType::String),
    ("dailyBudget", FieldType::Object),
    ("format", FieldType::String),
    ("id", FieldType::Integer),
    ("last_modified_time", FieldType::DateTime),
    ("locale", FieldType::Object),
    ("name", FieldType::String),
    ("objectiveType", FieldType::String),
    ("offsiteDeliveryEnabled", FieldType::Boolean),
    ("offsitePreferences", FieldType::Object),
    ("optimizationTargetType", FieldType::String),
    ("pacingStrategy", FieldType::String),
    ("runSchedule", FieldType::Object),
    ("run_schedule_start", FieldType::DateTime),
    ("servingStatuses", FieldType::StringArray),
    ("status", FieldType::String),
    ("targetingCriteria", FieldType::Object),
    ("test", FieldType::Boolean),
    ("totalBudget", FieldType::Object),
    ("type", FieldType::String),
    ("unitCost", FieldType::Object),
    ("version", FieldType::Object),
];

const CREATIVES_FIELDS: &[(&str, FieldType)] = &[
    ("account", FieldType::String),
    ("account_id", FieldType::Integer),
    ("campaign", FieldType::String),
    ("campaign_id", FieldType::Integer),
    ("content", FieldType::Object),
    ("createdAt", FieldType::Integer),
    ("createdBy", FieldType::String),
    ("created_time", FieldType::DateTime),
    ("id", FieldType::String),
    ("intendedStatus", FieldType::String),
    ("isServing", FieldType::Boolean),
    ("isTest", FieldType::Boolean),
    ("lastModifiedAt", FieldType::Integer),
    ("lastModifiedBy", FieldType::String),
    ("last_modified_time", FieldType::DateTime),
    ("servingHoldReasons", FieldType::StringArray),
];

const ENTITY_NORMALIZE: NormalizeSpec = NormalizeSpec {
    audit_stamps: true,
    urn_ids: &[],
    run_schedule: false,
    derive_day: false,
    window_filter: true,
};

const ANALYTICS_NORMALIZE: NormalizeSpec = NormalizeSpec {
    audit_stamps: false,
    urn_ids: &[],
    run_schedule: false,
    derive_day: true,
    window_filter: false,
};

/// The full stream table
pub const ALL_STREAMS: &[StreamDef] = &[
    StreamDef {
        name: "accounts",
        kind: StreamKind::Entity,
        route: Route::Fixed("adAccounts"),
        finder: Some("search"),
        params: &[("sort.field", "ID"), ("sort.order", "ASCENDING")],
        urn_params: &[],
        replication_key: Some("last_modified_time"),
        primary_keys: &["id"],
        normalize: ENTITY_NORMALIZE,
        fields: ACCOUNTS_FIELDS,
    },
    StreamDef {
        name: "account_users",
        kind: StreamKind::Entity,
        route: Route::Fixed("adAccountUsers"),
        finder: Some("accounts"),
        params: &[],
        urn_params: &[UrnParam {
            key: "accounts",
            prefix: "urn:li:sponsoredAccount:",
            source: ConfigId::Accounts,
        }],
        replication_key: Some("last_modified_time"),
        primary_keys: &["account", "user"],
        normalize: NormalizeSpec {
            urn_ids: &[ACCOUNT_URN, USER_URN],
            ..ENTITY_NORMALIZE
        },
        fields: ACCOUNT_USERS_FIELDS,
    },
    StreamDef {
        name: "video_ads",
        kind: StreamKind::Entity,
        route: Route::Fixed("adDirectSponsoredContents"),
        finder: Some("account"),
        params: &[],
        urn_params: &[
            UrnParam {
                key: "account",
                prefix: "urn:li:sponsoredAccount:",
                source: ConfigId::Accounts,
            },
            UrnParam {
                key: "owner",
                prefix: "urn:li:organization:",
                source: ConfigId::Owner,
            },
        ],
        replication_key: Some("last_modified_time"),
        primary_keys: &["contentReference"],
        normalize: NormalizeSpec {
            urn_ids: &[ACCOUNT_URN],
            ..ENTITY_NORMALIZE
        },
        fields: VIDEO_ADS_FIELDS,
    },
    StreamDef {
        name: "campaign_groups",
        kind: StreamKind::Entity,
        route: Route::AccountScoped("adCampaignGroups"),
        finder: Some("search"),
        params: &[],
        urn_params: &[],
        replication_key: Some("last_modified_time"),
        primary_keys: &["id"],
        normalize: NormalizeSpec {
            urn_ids: &[ACCOUNT_URN],
            run_schedule: true,
            ..ENTITY_NORMALIZE
        },
        fields: CAMPAIGN_GROUPS_FIELDS,
    },
    StreamDef {
        name: "campaigns",
        kind: StreamKind::Entity,
        route: Route::AccountScoped("adCampaigns"),
        finder: Some("search"),
        params: &[],
        urn_params: &[],
        replication_key: Some("last_modified_time"),
        primary_keys: &["id"],
        normalize: NormalizeSpec {
            urn_ids: &[ACCOUNT_URN, CAMPAIGN_GROUP_URN],
            run_schedule: true,
            ..ENTITY_NORMALIZE
        },
        fields: CAMPAIGNS_FIELDS,
    },
    StreamDef {
        name: "creatives",
        kind: StreamKind::Entity,
        route: Route::AccountScoped("creatives"),
        finder: Some("criteria"),
        params: &[],
        urn_params: &[],
        replication_key: Some("last_modified_time"),
        primary_keys: &["id"],
        normalize: NormalizeSpec {
            urn_ids: &[ACCOUNT_URN, CAMPAIGN_URN],
            ..ENTITY_NORMALIZE
        },
        fields: CREATIVES_FIELDS,
    },
    StreamDef {
        name: "ad_analytics_by_campaign",
        kind: StreamKind::Analytics(Pivot::Campaign),
        route: Route::Fixed("adAnalytics"),
        finder: Some("analytics"),
        params: &[("timeGranularity", "DAILY")],
        urn_params: &[UrnParam {
            key: "campaigns[0]",
            prefix: "urn:li:sponsoredCampaign:",
            source: ConfigId::Campaign,
        }],
        replication_key: Some("day"),
        primary_keys: &["campaign_id", "day"],
        normalize: ANALYTICS_NORMALIZE,
        fields: &[],
    },
    StreamDef {
        name: "ad_analytics_by_creative",
        kind: StreamKind::Analytics(Pivot::Creative),
        route: Route::Fixed("adAnalytics"),
        finder: Some("analytics"),
        params: &[("timeGranularity", "DAILY")],
        urn_params: &[UrnParam {
            key: "campaigns[0]",
            prefix: "urn:li:sponsoredCampaign:",
            source: ConfigId::Campaign,
        }],
        replication_key: Some("day"),
        primary_keys: &["creative_id", "day"],
        normalize: ANALYTICS_NORMALIZE,
        fields: &[],
    },
];

/// Look up a stream by name
pub fn find_stream(name: &str) -> Option<&'static StreamDef> {
    ALL_STREAMS.iter().find(|s| s.name == name)
}

fn config_id<'a>(config: &'a TapConfig, id: ConfigId) -> Option<&'a str> {
    match id {
        ConfigId::Accounts => config.accounts.as_deref(),
        ConfigId::Campaign => config.campaign.as_deref(),
        ConfigId::Owner => config.owner.as_deref(),
        ConfigId::Creative => config.creative.as_deref(),
    }
}

fn require_id<'a>(
    config: &'a TapConfig,
    id: ConfigId,
    stream: &str,
) -> SyncResult<&'a str> {
    config_id(config, id).ok_or_else(|| {
        SyncError::Config(format!(
            "stream '{}' requires the {:?} id to be configured",
            stream, id
        ))
    })
}

impl StreamDef {
    /// Whether every config id this stream needs is present
    pub fn enabled(&self, config: &TapConfig) -> bool {
        let route_ok = match self.route {
            Route::Fixed(_) => true,
            Route::AccountScoped(_) => config.accounts.is_some(),
        };
        route_ok
            && self
                .urn_params
                .iter()
                .all(|p| config_id(config, p.source).is_some())
    }

    fn resolve_route(&self, config: &TapConfig) -> SyncResult<String> {
        match self.route {
            Route::Fixed(path) => Ok(path.to_string()),
            Route::AccountScoped(suffix) => {
                let account = require_id(config, ConfigId::Accounts, self.name)?;
                Ok(format!("adAccounts/{}/{}", account, suffix))
            }
        }
    }

    /// Build the base page request shared by every page of this stream.
    /// Analytics streams get one request per column chunk via
    /// [`StreamDef::analytics_requests`]; this is the chunk-independent part.
    pub fn base_request(&self, config: &TapConfig) -> SyncResult<PageRequest> {
        let mut request = PageRequest::new(self.resolve_route(config)?);

        if let Some(q) = self.finder {
            request = request.param("q", q);
        }
        for (key, value) in self.params {
            request = request.param(*key, *value);
        }
        if let StreamKind::Entity = self.kind {
            if let Some(key) = self.replication_key {
                request = request.param("sort", "asc").param("order_by", key);
            }
        }
        for urn in self.urn_params {
            let id = require_id(config, urn.source, self.name)?;
            request = request.raw_param(urn.key, format!("{}{}", urn.prefix, id));
        }
        Ok(request)
    }

    /// Build one page request per column chunk for an analytics stream.
    /// All requests are identical except `fields`; that identity is what
    /// makes the rank-wise merge sound.
    pub fn analytics_requests(&self, config: &TapConfig) -> SyncResult<Vec<PageRequest>> {
        let StreamKind::Analytics(pivot) = self.kind else {
            return Err(SyncError::Config(format!(
                "stream '{}' is not an analytics stream",
                self.name
            )));
        };

        let start = config
            .start_bound()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .date_naive();
        let end = config
            .end_bound()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .date_naive();

        use chrono::Datelike;
        let base = self
            .base_request(config)?
            .param("pivot", pivot.as_str())
            .param("dateRange.start.day", start.day().to_string())
            .param("dateRange.start.month", start.month().to_string())
            .param("dateRange.start.year", start.year().to_string())
            .param("dateRange.end.day", end.day().to_string())
            .param("dateRange.end.month", end.month().to_string())
            .param("dateRange.end.year", end.year().to_string());

        Ok(columns::ANALYTICS_FIELD_CHUNKS
            .iter()
            .map(|chunk| base.clone().param("fields", columns::fields_param(chunk)))
            .collect())
    }

    /// Render the stream's JSON schema from its field table
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();

        match self.kind {
            StreamKind::Entity => {
                for (name, field_type) in self.fields {
                    properties.insert((*name).to_string(), field_type.schema());
                }
            }
            StreamKind::Analytics(pivot) => {
                properties.insert(pivot.id_field().to_string(), FieldType::Integer.schema());
                properties.insert("day".to_string(), FieldType::Date.schema());
                for metric in columns::all_metric_fields() {
                    let field_type = if metric == "dateRange" {
                        FieldType::Object
                    } else if STRING_METRICS.contains(&metric) {
                        FieldType::String
                    } else {
                        FieldType::Integer
                    };
                    properties.insert(metric.to_string(), field_type.schema());
                }
            }
        }

        json!({
            "type": "object",
            "properties": Value::Object(properties),
        })
    }
}

impl FieldType {
    fn schema(&self) -> Value {
        match self {
            Self::String => json!({"type": ["string", "null"]}),
            Self::Integer => json!({"type": ["integer", "null"]}),
            Self::Boolean => json!({"type": ["boolean", "null"]}),
            Self::DateTime => json!({"type": ["string", "null"], "format": "date-time"}),
            Self::Date => json!({"type": ["string", "null"], "format": "date"}),
            Self::Object => json!({"type": ["object", "null"]}),
            Self::StringArray => json!({"type": ["array", "null"], "items": {"type": "string"}}),
        }
    }
}

/// Render the discovery catalog: every stream with its schema and keys
pub fn discover_catalog() -> Value {
    let streams: Vec<Value> = ALL_STREAMS
        .iter()
        .map(|def| {
            json!({
                "name": def.name,
                "json_schema": def.json_schema(),
                "replication_key": def.replication_key,
                "primary_keys": def.primary_keys,
                "sync_mode": if def.replication_key.is_some() { "incremental" } else { "full_refresh" },
            })
        })
        .collect();
    json!({ "streams": streams })
}
