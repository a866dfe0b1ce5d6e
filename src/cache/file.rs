//! Filesystem Backend
//!
//! Layout under the root directory:
//!
//! ```text
//! global/<stage>/metadata.json
//! global/<stage>/<hash>.wav
//! sessions/<session id>/<stage>/...
//! ```
//!
//! Every file is written to a temporary name and renamed into place, so a
//! reader sees either the previous or the next version of a document, never a
//! torn one. That says nothing about concurrent read-modify-write of the
//! metadata document; see `CacheStore`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::cache::backend::validate_hash;
use crate::cache::codec::PAYLOAD_EXTENSION;
use crate::cache::{CacheBackend, MetadataDocument, Session, Stage};
use crate::error::{Result, VoiceCacheError};

const METADATA_FILENAME: &str = "metadata.json";
const SESSIONS_DIR: &str = "sessions";
const GLOBAL_DIR: &str = "global";

#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session: &Session) -> PathBuf {
        match session {
            Session::Global => self.root.join(GLOBAL_DIR),
            Session::Id(id) => self.root.join(SESSIONS_DIR).join(id),
        }
    }

    fn partition_dir(&self, stage: Stage, session: &Session) -> PathBuf {
        self.session_dir(session).join(stage.as_str())
    }

    fn payload_path(&self, stage: Stage, session: &Session, hash: &str) -> Result<PathBuf> {
        validate_hash(hash)?;
        Ok(self
            .partition_dir(stage, session)
            .join(format!("{}.{}", hash, PAYLOAD_EXTENSION)))
    }
}

/// Writes `contents` next to `path` and renames it over `path`.
async fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("payload");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn ignore_missing(result: std::io::Result<()>) -> Result<()> {
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn read_metadata(&self, stage: Stage, session: &Session) -> Result<MetadataDocument> {
        let path = self.partition_dir(stage, session).join(METADATA_FILENAME);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(MetadataDocument::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_metadata(
        &self,
        stage: Stage,
        session: &Session,
        document: &MetadataDocument,
    ) -> Result<()> {
        let path = self.partition_dir(stage, session).join(METADATA_FILENAME);
        let contents = serde_json::to_vec_pretty(document)?;
        write_atomically(&path, &contents).await
    }

    async fn read_payload(&self, stage: Stage, session: &Session, hash: &str) -> Result<Vec<u8>> {
        let path = self.payload_path(stage, session, hash)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(VoiceCacheError::NotFound(format!(
                "{} payload {} in session {}",
                stage, hash, session
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_payload(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let path = self.payload_path(stage, session, hash)?;
        write_atomically(&path, &bytes).await
    }

    async fn delete_payload(&self, stage: Stage, session: &Session, hash: &str) -> Result<()> {
        let path = self.payload_path(stage, session, hash)?;
        ignore_missing(fs::remove_file(&path).await)
    }

    /// Temporary files from in-flight writes start with a dot and are skipped.
    async fn list_payloads(&self, stage: Stage, session: &Session) -> Result<Vec<String>> {
        let dir = self.partition_dir(stage, session);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{}", PAYLOAD_EXTENSION);
        let mut hashes = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(hash) = name.to_str().and_then(|n| n.strip_suffix(suffix.as_str())) {
                if validate_hash(hash).is_ok() {
                    hashes.push(hash.to_string());
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    async fn purge_partition(&self, stage: Stage, session: &Session) -> Result<()> {
        let dir = self.partition_dir(stage, session);
        debug!("Removing partition directory {}", dir.display());
        ignore_missing(fs::remove_dir_all(&dir).await)
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let dir = self.root.join(SESSIONS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            // Directories that are not valid session ids were not created by us
            if let Some(session) = entry
                .file_name()
                .to_str()
                .and_then(|name| Session::parse(name).ok())
            {
                sessions.push(session);
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    async fn remove_session(&self, session: &Session) -> Result<()> {
        match session {
            Session::Global => Ok(()),
            Session::Id(_) => ignore_missing(fs::remove_dir_all(self.session_dir(session)).await),
        }
    }

    /// Newest of the metadata timestamps and the stage directories' mtimes.
    ///
    /// The mtime covers a partition whose first payload has been written but
    /// whose metadata has not yet.
    async fn last_activity(&self, session: &Session) -> Result<Option<NaiveDateTime>> {
        let mut latest = None;
        for stage in Stage::ALL {
            let document = self.read_metadata(stage, session).await?;
            latest = latest.max(document.values().map(|r| r.created_at).max());

            match fs::metadata(self.partition_dir(stage, session)).await {
                Ok(meta) => {
                    let modified: DateTime<Utc> = meta.modified()?.into();
                    latest = latest.max(Some(modified.naive_utc()));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(latest)
    }
}
