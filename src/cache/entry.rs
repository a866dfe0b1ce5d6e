//! Cache Entry Module
//!
//! Defines the metadata record kept for every cached payload and the
//! per-partition metadata document that maps content hashes to records.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed format of the "Time of Creation" field.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

/// One metadata document per (stage, session): content hash → record.
///
/// This map is the only source of truth for whether a hash exists.
pub type MetadataDocument = BTreeMap<String, MetadataRecord>;

// == Metadata Record ==
/// Bookkeeping for one immutable cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Creation timestamp (UTC, microsecond precision)
    #[serde(rename = "Time of Creation", with = "timestamp")]
    pub created_at: NaiveDateTime,
    /// Hash of the entry in the preceding stage, if any
    #[serde(rename = "Parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// User-facing file name (RAW entries)
    #[serde(rename = "User File", default, skip_serializing_if = "Option::is_none")]
    pub user_file: Option<String>,
    /// Inputs that went into the entry besides its parent
    #[serde(rename = "Inputs", default, skip_serializing_if = "Map::is_empty")]
    pub inputs: Map<String, Value>,
    /// Option values that produced the entry
    #[serde(rename = "Options", default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
    /// Options of earlier stages, copied forward for display
    #[serde(
        rename = "Upstream Options",
        default,
        skip_serializing_if = "Map::is_empty"
    )]
    pub upstream: Map<String, Value>,
}

impl MetadataRecord {
    // == Constructor ==
    /// Creates a record stamped with the current time.
    pub fn new(parent: Option<String>) -> Self {
        Self::created_at(parent, current_timestamp())
    }

    /// Creates a record with an explicit creation time.
    pub fn created_at(parent: Option<String>, created_at: NaiveDateTime) -> Self {
        Self {
            created_at,
            parent,
            user_file: None,
            inputs: Map::new(),
            options: Map::new(),
            upstream: Map::new(),
        }
    }

    pub fn with_user_file(mut self, name: impl Into<String>) -> Self {
        self.user_file = Some(name.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_upstream(mut self, upstream: Map<String, Value>) -> Self {
        self.upstream = upstream;
        self
    }
}

/// Current UTC time truncated to what the timestamp format can hold.
pub fn current_timestamp() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(de::Error::custom)
    }
}
