//! Response DTOs for the voice cache API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{MetadataRecord, Stage, StatsSnapshot, TIMESTAMP_FORMAT};
use crate::pipeline::{LineageEntry, UploadReceipt};

/// Response body for an upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub hash: String,
    pub file_name: String,
    /// True when identical audio was already stored
    pub cached: bool,
}

impl From<UploadReceipt> for UploadResponse {
    fn from(receipt: UploadReceipt) -> Self {
        Self {
            hash: receipt.hash,
            file_name: receipt.file_name,
            cached: receipt.cached,
        }
    }
}

/// One uploaded file in a listing
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub file_name: String,
    pub hash: String,
    pub created_at: String,
}

/// Response body for the upload listing, newest first
#[derive(Debug, Clone, Serialize)]
pub struct UploadsResponse {
    pub files: Vec<UploadedFile>,
}

impl UploadsResponse {
    /// Builds the listing from (hash, record) pairs already sorted newest first.
    pub fn new(entries: Vec<(String, MetadataRecord)>) -> Self {
        let files = entries
            .into_iter()
            .map(|(hash, record)| UploadedFile {
                file_name: record.user_file.unwrap_or_else(|| hash.clone()),
                created_at: record.created_at.format(TIMESTAMP_FORMAT).to_string(),
                hash,
            })
            .collect();
        Self { files }
    }
}

/// Response body for a finished generation
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    /// POSTPROCESSED hash of the result
    pub hash: String,
    pub stage: Stage,
    /// Where the audio can be fetched
    pub audio_url: String,
}

impl GenerateResponse {
    pub fn new(session: &str, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        Self {
            audio_url: format!("/sessions/{}/audio/{}/{}", session, Stage::Postprocessed, hash),
            stage: Stage::Postprocessed,
            hash,
        }
    }
}

/// One finished output with its ancestry
#[derive(Debug, Clone, Serialize)]
pub struct OutputSummary {
    pub hash: String,
    pub metadata: MetadataRecord,
    /// Parent entries, nearest first
    pub lineage: Vec<LineageEntry>,
}

/// Response body for the output listing, newest first
#[derive(Debug, Clone, Serialize)]
pub struct OutputsResponse {
    pub outputs: Vec<OutputSummary>,
}

/// Response body for a partition purge
#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    /// Success message
    pub message: String,
    pub session: String,
    pub stage: Stage,
}

impl PurgeResponse {
    pub fn new(session: impl Into<String>, stage: Stage) -> Self {
        let session = session.into();
        Self {
            message: format!("Purged {} cache of session '{}'", stage, session),
            session,
            stage,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of stage cache hits
    pub hits: u64,
    /// Number of stage cache misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Number of purged partitions
    pub purges: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Sessions that currently hold cache partitions
    pub sessions: usize,
}

impl StatsResponse {
    pub fn new(stats: StatsSnapshot, sessions: usize) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            purges: stats.purges,
            hit_rate: stats.hit_rate(),
            sessions,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error class, e.g. `NotFound`
    pub error: String,
    /// Human readable description
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
        }
    }
}
