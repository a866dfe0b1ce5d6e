//! API Handlers
//!
//! HTTP request handlers for each voice cache endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::boundary::HttpModelClient;
use crate::cache::{codec, store_from_config, validate_hash, Session, Stage};
use crate::config::Config;
use crate::error::{Result, VoiceCacheError};
use crate::models::{
    GenerateRequest, GenerateResponse, HealthResponse, OutputSummary, OutputsResponse,
    PurgeResponse, StatsResponse, UploadRequest, UploadResponse, UploadsResponse,
};
use crate::pipeline::{PassthroughTransforms, Pipeline};
use crate::workers::WorkerPools;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub pools: WorkerPools,
    /// When false every request uses the global partition
    pub session_isolation: bool,
}

impl AppState {
    pub fn new(pipeline: Pipeline, pools: WorkerPools, session_isolation: bool) -> Self {
        Self {
            pipeline,
            pools,
            session_isolation,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Wires the configured store to the HTTP model client.
    pub fn from_config(config: &Config) -> Self {
        let store = store_from_config(config);
        let model = HttpModelClient::new(
            config.model_host.clone(),
            Duration::from_secs(config.model_timeout),
        );
        let pipeline = Pipeline::new(store, Arc::new(model), Arc::new(PassthroughTransforms));
        Self::new(
            pipeline,
            WorkerPools::new(config.cpu_workers, config.gpu_workers),
            config.session_isolation,
        )
    }

    /// Maps the `:session` path segment to a partition.
    fn session(&self, id: &str) -> Result<Session> {
        let session = Session::parse(id)?;
        Ok(if self.session_isolation {
            session
        } else {
            Session::Global
        })
    }
}

/// Handler for POST /sessions/:session/uploads
pub async fn upload_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(VoiceCacheError::InvalidRequest(error_msg));
    }
    let session = state.session(&session_id)?;
    let clip = req.decode_clip()?;

    let receipt = state
        .pipeline
        .store_upload(&session, &req.file_name, &clip)
        .await?;
    Ok(Json(receipt.into()))
}

/// Handler for GET /sessions/:session/uploads
pub async fn list_uploads_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<UploadsResponse>> {
    let session = state.session(&session_id)?;
    let store = state.pipeline.store();

    let mut document = store.read_metadata(Stage::Raw, &session).await?;
    let entries = store
        .hashes_by_timestamp_desc(Stage::Raw, &session)
        .await?
        .into_iter()
        .filter_map(|hash| document.remove(&hash).map(|record| (hash, record)))
        .collect();
    Ok(Json(UploadsResponse::new(entries)))
}

/// Handler for POST /sessions/:session/generate
///
/// The pipeline runs on its own task. If the client goes away the handler
/// future is dropped, which cancels the job at its next checkpoint.
pub async fn generate_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let session = state.session(&session_id)?;
    req.job.validate()?;

    let lease = state.pools.acquire(req.use_gpu).await?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let pipeline = state.pipeline.clone();
    let job = req.job;
    let task_session = session.clone();
    let task = tokio::spawn(async move {
        let result = pipeline
            .generate(&task_session, &job, lease.gpu_id(), &cancel)
            .await;
        drop(lease);
        result
    });

    let hash = task
        .await
        .map_err(|e| VoiceCacheError::Internal(format!("generation task failed: {}", e)))??;
    info!("Generated {} for session {}", hash, session);
    Ok(Json(GenerateResponse::new(&session.to_string(), hash)))
}

/// Handler for GET /sessions/:session/outputs
///
/// Lists POSTPROCESSED entries newest first, each with its ancestry.
pub async fn list_outputs_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<OutputsResponse>> {
    let session = state.session(&session_id)?;
    let pipeline = &state.pipeline;

    let mut outputs = Vec::new();
    for hash in pipeline
        .store()
        .hashes_by_timestamp_desc(Stage::Postprocessed, &session)
        .await?
    {
        let mut lineage = pipeline
            .lineage(&session, Stage::Postprocessed, &hash)
            .await?
            .into_iter();
        // The first step is the entry itself; it can vanish between the two reads
        let Some(metadata) = lineage.next().and_then(|own| own.record) else {
            continue;
        };
        outputs.push(OutputSummary {
            hash,
            metadata,
            lineage: lineage.collect(),
        });
    }
    Ok(Json(OutputsResponse { outputs }))
}

/// Handler for GET /sessions/:session/audio/:stage/:hash
pub async fn audio_handler(
    State(state): State<AppState>,
    Path((session_id, stage, hash)): Path<(String, String, String)>,
) -> Result<impl IntoResponse> {
    let session = state.session(&session_id)?;
    let stage: Stage = stage.parse()?;
    validate_hash(&hash)?;

    let bytes = state
        .pipeline
        .store()
        .read_raw_bytes(stage, &session, &hash)
        .await?;
    Ok(([(header::CONTENT_TYPE, codec::PAYLOAD_MIME)], bytes))
}

/// Handler for DELETE /sessions/:session/cache/:stage
pub async fn purge_handler(
    State(state): State<AppState>,
    Path((session_id, stage)): Path<(String, String)>,
) -> Result<Json<PurgeResponse>> {
    let session = state.session(&session_id)?;
    let stage: Stage = stage.parse()?;

    state.pipeline.store().purge_partition(stage, &session).await?;
    info!("Purged {} partition of session {}", stage, session);
    Ok(Json(PurgeResponse::new(session.to_string(), stage)))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let store = state.pipeline.store();
    let sessions = store.list_sessions().await?.len();
    Ok(Json(StatsResponse::new(store.stats_snapshot(), sessions)))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
