//! Pipeline Orchestrator
//!
//! Walks one request through RAW → PREPROCESSED → OUTPUT → POSTPROCESSED.
//! Each stage derives its key from the previous stage's key, returns early on
//! a cache hit and otherwise computes, saves the payload and only then records
//! the metadata. Errors propagate unchanged; entries written by earlier stages
//! stay valid for a retry. A payload whose metadata was never written is
//! deleted again before the error is returned.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::boundary::{ModelBoundary, ModelInputs, ModelOptions, ModelRequest};
use crate::cache::{AudioClip, CacheStore, MetadataDocument, MetadataRecord, Session, Stage};
use crate::error::{Result, VoiceCacheError};
use crate::pipeline::hash_chain::{content_digest, next_hash};
use crate::pipeline::{
    AudioTransforms, GenerationJob, OptionSet, PostprocessOptions, PreprocessOptions,
};

/// Result of storing a user upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReceipt {
    pub hash: String,
    /// Name the upload is listed under, possibly with a ` (N)` suffix
    pub file_name: String,
    /// True when identical audio was already stored
    pub cached: bool,
}

/// One step of an entry's ancestry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageEntry {
    pub stage: Stage,
    pub hash: String,
    /// `None` when the entry is gone, e.g. evicted while a child survived
    pub record: Option<MetadataRecord>,
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(VoiceCacheError::Cancelled);
    }
    Ok(())
}

// == Pipeline ==
#[derive(Clone)]
pub struct Pipeline {
    store: CacheStore,
    model: Arc<dyn ModelBoundary>,
    transforms: Arc<dyn AudioTransforms>,
}

impl Pipeline {
    pub fn new(
        store: CacheStore,
        model: Arc<dyn ModelBoundary>,
        transforms: Arc<dyn AudioTransforms>,
    ) -> Self {
        Self {
            store,
            model,
            transforms,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    // == Uploads ==
    /// Stores user audio as a RAW entry keyed by the audio content.
    pub async fn store_upload(
        &self,
        session: &Session,
        file_name: &str,
        clip: &AudioClip,
    ) -> Result<UploadReceipt> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(VoiceCacheError::InvalidRequest(
                "file name cannot be empty".to_string(),
            ));
        }

        let hash = content_digest(&clip.sample_bytes());
        if let Some(existing) = self.store.metadata_entry(Stage::Raw, session, &hash).await? {
            debug!("Upload {} already cached as {}", file_name, hash);
            return Ok(UploadReceipt {
                file_name: existing.user_file.unwrap_or_else(|| file_name.to_string()),
                hash,
                cached: true,
            });
        }

        let _pending = self.store.reserve(Stage::Raw, session, &hash)?;
        self.store.save_payload(Stage::Raw, session, &hash, clip).await?;
        // The name is picked against the document as it is under the write lock
        let inserted = self
            .store
            .insert_metadata_entry_with(Stage::Raw, session, &hash, |document| {
                MetadataRecord::new(None).with_user_file(unique_file_name(document, file_name))
            })
            .await;
        let (record, created) = match inserted {
            Ok(listed) => listed,
            Err(e) => {
                self.discard_payload(Stage::Raw, session, &hash).await;
                return Err(e);
            }
        };

        let listed_name = record.user_file.unwrap_or_else(|| file_name.to_string());
        if created {
            info!("Stored upload {} as {} for session {}", listed_name, hash, session);
        }
        Ok(UploadReceipt {
            hash,
            file_name: listed_name,
            cached: !created,
        })
    }

    /// Resolves a user-facing file name to its RAW hash.
    pub async fn raw_hash_for_file(&self, session: &Session, file_name: &str) -> Result<String> {
        self.store
            .read_metadata(Stage::Raw, session)
            .await?
            .into_iter()
            .find(|(_, record)| record.user_file.as_deref() == Some(file_name))
            .map(|(hash, _)| hash)
            .ok_or_else(|| VoiceCacheError::NotFound(format!("no uploaded file named '{}'", file_name)))
    }

    // == Stages ==
    /// Preprocesses a RAW entry, reusing a cached result for identical options.
    pub async fn preprocess(
        &self,
        session: &Session,
        raw_hash: &str,
        options: &PreprocessOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        checkpoint(cancel)?;
        let hash = next_hash(Some(raw_hash), &options.hash_args());
        if self.store.is_cached(Stage::Preprocessed, session, &hash).await? {
            self.store.stats().record_hit();
            debug!("Preprocessing cache hit {}", hash);
            return Ok(hash);
        }
        self.store.stats().record_miss();

        let clip = self.read_parent(Stage::Raw, session, raw_hash).await?;
        let processed = self.transforms.preprocess(clip, options)?;
        checkpoint(cancel)?;

        let record = MetadataRecord::new(Some(raw_hash.to_string())).with_options(options.to_metadata());
        self.commit(Stage::Preprocessed, session, &hash, &processed, record).await?;
        info!("Preprocessed {} into {}", raw_hash, hash);
        Ok(hash)
    }

    /// Asks the selected model server for a fresh output.
    ///
    /// The key carries a random nonce, so every call yields a new entry even
    /// for identical inputs.
    pub async fn invoke_model(
        &self,
        session: &Session,
        preprocessed_hash: Option<&str>,
        user_text: Option<&str>,
        model: &ModelOptions,
        gpu_id: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        checkpoint(cancel)?;
        let nonce = Uuid::new_v4().simple().to_string();
        let mut args = vec![json!(user_text)];
        args.extend(model.hash_args());
        args.push(json!(nonce));
        let hash = next_hash(preprocessed_hash, &args);

        let descriptor = model.descriptor();
        let request = ModelRequest {
            inputs: ModelInputs {
                user_text: user_text.map(str::to_string),
                user_audio: preprocessed_hash.map(str::to_string),
            },
            options: model.wire_options(),
            output_file: hash.clone(),
            session_id: session.id().map(str::to_string),
            gpu_id: ModelRequest::gpu_id_value(gpu_id),
        };

        let mut inputs = Map::new();
        inputs.insert("User Text".into(), json!(user_text));
        inputs.insert("User Audio".into(), json!(preprocessed_hash));
        let record = MetadataRecord::new(preprocessed_hash.map(str::to_string))
            .with_inputs(inputs)
            .with_options(model.to_metadata());

        let _pending = self.store.reserve(Stage::Output, session, &hash)?;
        info!("Invoking {} for output {}", descriptor.id, hash);
        let produced: Result<()> = async {
            tokio::select! {
                _ = cancel.cancelled() => return Err(VoiceCacheError::Cancelled),
                result = self.model.generate(descriptor, &request) => result?,
            }
            self.verify_output(session, &hash).await?;
            // The model server wrote the payload itself; listing it enforces the bound
            self.store
                .insert_metadata_entry(Stage::Output, session, &hash, record)
                .await
        }
        .await;

        // Whatever the server managed to write before failing is not kept
        if let Err(e) = produced {
            self.discard_payload(Stage::Output, session, &hash).await;
            return Err(e);
        }
        Ok(hash)
    }

    /// Postprocesses an OUTPUT entry, reusing a cached result for identical options.
    pub async fn postprocess(
        &self,
        session: &Session,
        output_hash: &str,
        options: &PostprocessOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        checkpoint(cancel)?;
        let hash = next_hash(Some(output_hash), &options.hash_args());
        if self.store.is_cached(Stage::Postprocessed, session, &hash).await? {
            self.store.stats().record_hit();
            debug!("Postprocessing cache hit {}", hash);
            return Ok(hash);
        }
        self.store.stats().record_miss();

        let clip = self.read_parent(Stage::Output, session, output_hash).await?;
        let processed = self.transforms.postprocess(clip, options)?;
        checkpoint(cancel)?;

        let (inputs, upstream) = self.upstream_summary(session, output_hash).await?;
        let record = MetadataRecord::new(Some(output_hash.to_string()))
            .with_inputs(inputs)
            .with_options(options.to_metadata())
            .with_upstream(upstream);
        self.commit(Stage::Postprocessed, session, &hash, &processed, record).await?;
        info!("Postprocessed {} into {}", output_hash, hash);
        Ok(hash)
    }

    /// Runs a whole job and returns the POSTPROCESSED hash.
    pub async fn generate(
        &self,
        session: &Session,
        job: &GenerationJob,
        gpu_id: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        job.validate()?;

        let preprocessed = match &job.user_file {
            Some(file_name) => {
                let raw_hash = self.raw_hash_for_file(session, file_name).await?;
                Some(self.preprocess(session, &raw_hash, &job.preprocess, cancel).await?)
            }
            None => None,
        };

        let output = self
            .invoke_model(
                session,
                preprocessed.as_deref(),
                job.user_text.as_deref(),
                &job.model,
                gpu_id,
                cancel,
            )
            .await?;

        self.postprocess(session, &output, &job.postprocess, cancel).await
    }

    /// Follows parent links from an entry back towards RAW.
    ///
    /// Stops at the first entry whose metadata is gone.
    pub async fn lineage(&self, session: &Session, stage: Stage, hash: &str) -> Result<Vec<LineageEntry>> {
        let mut chain = Vec::new();
        let mut next = Some((stage, hash.to_string()));

        while let Some((stage, hash)) = next.take() {
            let record = self.store.metadata_entry(stage, session, &hash).await?;
            next = match (&record, stage.parent()) {
                (Some(r), Some(parent_stage)) => r.parent.clone().map(|p| (parent_stage, p)),
                _ => None,
            };
            chain.push(LineageEntry {
                stage,
                hash,
                record,
            });
        }
        Ok(chain)
    }

    // == Helpers ==
    /// Saves a computed payload and lists it.
    async fn commit(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
        clip: &AudioClip,
        record: MetadataRecord,
    ) -> Result<()> {
        let _pending = self.store.reserve(stage, session, hash)?;
        self.store.save_payload(stage, session, hash, clip).await?;
        if let Err(e) = self
            .store
            .insert_metadata_entry(stage, session, hash, record)
            .await
        {
            self.discard_payload(stage, session, hash).await;
            return Err(e);
        }
        Ok(())
    }

    async fn discard_payload(&self, stage: Stage, session: &Session, hash: &str) {
        if let Err(e) = self.store.discard_unlisted_payload(stage, session, hash).await {
            warn!("Could not remove unlisted {} payload {}: {}", stage, hash, e);
        }
    }

    /// Reads a parent payload, telling a plain miss apart from a metadata
    /// entry that lost its payload.
    async fn read_parent(&self, stage: Stage, session: &Session, hash: &str) -> Result<AudioClip> {
        match self.store.read_payload(stage, session, hash).await {
            Err(e) if e.is_not_found() => {
                if self.store.is_cached(stage, session, hash).await? {
                    Err(VoiceCacheError::StoreInconsistency(format!(
                        "{} entry {} is listed but its payload is missing",
                        stage, hash
                    )))
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }

    async fn verify_output(&self, session: &Session, hash: &str) -> Result<()> {
        match self.store.read_payload(Stage::Output, session, hash).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(VoiceCacheError::PostconditionFailure(hash.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Input file, text and earlier options of an OUTPUT entry, copied into
    /// POSTPROCESSED metadata so listings need no parent walk.
    async fn upstream_summary(
        &self,
        session: &Session,
        output_hash: &str,
    ) -> Result<(Map<String, Value>, Map<String, Value>)> {
        let output = self
            .store
            .metadata_entry(Stage::Output, session, output_hash)
            .await?;
        let preprocessed = match output.as_ref().and_then(|r| r.parent.as_deref()) {
            Some(hash) => self.store.metadata_entry(Stage::Preprocessed, session, hash).await?,
            None => None,
        };
        let raw = match preprocessed.as_ref().and_then(|r| r.parent.as_deref()) {
            Some(hash) => self.store.metadata_entry(Stage::Raw, session, hash).await?,
            None => None,
        };

        let mut inputs = Map::new();
        inputs.insert(
            "User File".into(),
            json!(raw.as_ref().and_then(|r| r.user_file.clone())),
        );
        inputs.insert(
            "User Text".into(),
            output
                .as_ref()
                .and_then(|r| r.inputs.get("User Text").cloned())
                .unwrap_or(Value::Null),
        );

        let mut upstream = Map::new();
        upstream.insert(
            "Preprocessing Options".into(),
            preprocessed
                .map(|r| Value::Object(r.options))
                .unwrap_or(Value::Null),
        );
        upstream.insert(
            "Processing Options".into(),
            output.map(|r| Value::Object(r.options)).unwrap_or(Value::Null),
        );
        Ok((inputs, upstream))
    }
}

/// Appends ` (N)` before the extension until the name is unused.
fn unique_file_name(raw_document: &MetadataDocument, file_name: &str) -> String {
    let taken = |name: &str| {
        raw_document
            .values()
            .any(|record| record.user_file.as_deref() == Some(name))
    };
    if !taken(file_name) {
        return file_name.to_string();
    }

    let (stem, extension) = match file_name.rfind('.') {
        Some(dot) if dot > 0 => file_name.split_at(dot),
        _ => (file_name, ""),
    };
    (2..)
        .map(|n| format!("{} ({}){}", stem, n, extension))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| file_name.to_string())
}
