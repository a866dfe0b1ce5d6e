//! In-Memory Backend
//!
//! Keeps each partition as a document plus a map of payloads, the shape a
//! remote document store would have. Used for tests and single-process runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::backend::validate_hash;
use crate::cache::{CacheBackend, MetadataDocument, Session, Stage};
use crate::error::{Result, VoiceCacheError};

#[derive(Debug, Default)]
struct Partition {
    metadata: MetadataDocument,
    payloads: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    partitions: Mutex<HashMap<(Stage, Session), Partition>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_partitions<T>(
        &self,
        f: impl FnOnce(&mut HashMap<(Stage, Session), Partition>) -> T,
    ) -> Result<T> {
        let mut guard = self
            .partitions
            .lock()
            .map_err(|_| VoiceCacheError::Internal("memory backend lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn read_metadata(&self, stage: Stage, session: &Session) -> Result<MetadataDocument> {
        self.with_partitions(|parts| {
            parts
                .get(&(stage, session.clone()))
                .map(|p| p.metadata.clone())
                .unwrap_or_default()
        })
    }

    async fn write_metadata(
        &self,
        stage: Stage,
        session: &Session,
        document: &MetadataDocument,
    ) -> Result<()> {
        self.with_partitions(|parts| {
            parts.entry((stage, session.clone())).or_default().metadata = document.clone();
        })
    }

    async fn read_payload(&self, stage: Stage, session: &Session, hash: &str) -> Result<Vec<u8>> {
        self.with_partitions(|parts| {
            parts
                .get(&(stage, session.clone()))
                .and_then(|p| p.payloads.get(hash).cloned())
        })?
        .ok_or_else(|| {
            VoiceCacheError::NotFound(format!("{} payload {} in session {}", stage, hash, session))
        })
    }

    async fn write_payload(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        validate_hash(hash)?;
        self.with_partitions(|parts| {
            parts
                .entry((stage, session.clone()))
                .or_default()
                .payloads
                .insert(hash.to_string(), bytes);
        })
    }

    async fn delete_payload(&self, stage: Stage, session: &Session, hash: &str) -> Result<()> {
        self.with_partitions(|parts| {
            if let Some(p) = parts.get_mut(&(stage, session.clone())) {
                p.payloads.remove(hash);
            }
        })
    }

    async fn list_payloads(&self, stage: Stage, session: &Session) -> Result<Vec<String>> {
        self.with_partitions(|parts| {
            let mut hashes: Vec<String> = parts
                .get(&(stage, session.clone()))
                .map(|p| p.payloads.keys().cloned().collect())
                .unwrap_or_default();
            hashes.sort();
            hashes
        })
    }

    async fn purge_partition(&self, stage: Stage, session: &Session) -> Result<()> {
        self.with_partitions(|parts| {
            parts.remove(&(stage, session.clone()));
        })
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.with_partitions(|parts| {
            let mut sessions: Vec<Session> = parts
                .keys()
                .filter(|(_, s)| matches!(s, Session::Id(_)))
                .map(|(_, s)| s.clone())
                .collect();
            sessions.sort();
            sessions.dedup();
            sessions
        })
    }

    async fn remove_session(&self, session: &Session) -> Result<()> {
        self.with_partitions(|parts| parts.retain(|(_, s), _| s != session))
    }
}
