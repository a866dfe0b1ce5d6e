//! Cache Backend Port
//!
//! Storage primitives the cache store is built on. Implementations only move
//! bytes and documents around; bounding, ordering and eviction policy live in
//! `CacheStore` so every backend behaves the same to callers.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::cache::{MetadataDocument, Session, Stage};
use crate::error::{Result, VoiceCacheError};

/// Longest accepted content hash.
pub const MAX_HASH_LENGTH: usize = 64;

/// Rejects hashes that could escape their partition when used as a key.
pub fn validate_hash(hash: &str) -> Result<()> {
    if hash.is_empty()
        || hash.len() > MAX_HASH_LENGTH
        || !hash.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(VoiceCacheError::InvalidRequest(format!(
            "'{}' is not a valid content hash",
            hash
        )));
    }
    Ok(())
}

#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// Returns the metadata document, or an empty one if never written.
    async fn read_metadata(&self, stage: Stage, session: &Session) -> Result<MetadataDocument>;

    /// Replaces the whole metadata document.
    async fn write_metadata(
        &self,
        stage: Stage,
        session: &Session,
        document: &MetadataDocument,
    ) -> Result<()>;

    /// Returns the encoded payload, `NotFound` if absent.
    async fn read_payload(&self, stage: Stage, session: &Session, hash: &str) -> Result<Vec<u8>>;

    /// Stores an encoded payload, replacing any previous bytes at that key.
    async fn write_payload(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
        bytes: Vec<u8>,
    ) -> Result<()>;

    /// Removes a payload. Removing a missing payload is not an error.
    async fn delete_payload(&self, stage: Stage, session: &Session, hash: &str) -> Result<()>;

    /// Hashes of every payload stored in a partition, listed or not.
    async fn list_payloads(&self, stage: Stage, session: &Session) -> Result<Vec<String>>;

    /// Removes every payload and the metadata document of a partition.
    async fn purge_partition(&self, stage: Stage, session: &Session) -> Result<()>;

    /// Every identified session that currently holds data.
    async fn list_sessions(&self) -> Result<Vec<Session>>;

    /// Drops whatever is left of a session after its partitions were purged.
    async fn remove_session(&self, session: &Session) -> Result<()>;

    /// Most recent activity recorded for a session, across all stages.
    async fn last_activity(&self, session: &Session) -> Result<Option<NaiveDateTime>> {
        let mut latest = None;
        for stage in Stage::ALL {
            let document = self.read_metadata(stage, session).await?;
            let newest = document.values().map(|record| record.created_at).max();
            latest = latest.max(newest);
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_hash() {
        assert!(validate_hash("0123456789abcdef0123").is_ok());
        assert!(validate_hash("").is_err());
        assert!(validate_hash("../metadata").is_err());
        assert!(validate_hash(&"a".repeat(MAX_HASH_LENGTH + 1)).is_err());
    }
}
