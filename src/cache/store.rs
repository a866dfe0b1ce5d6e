//! Cache Store Module
//!
//! Bounded, content-addressed storage of audio payloads and their metadata,
//! partitioned by (stage, session).
//!
//! # Consistency
//! The metadata document is read and written whole. `write_metadata` is a
//! plain overwrite: two writers that read the same document and each add an
//! entry lose one of the entries, while both payloads stay on disk. Inside one
//! process, `insert_metadata_entry` serializes writers per partition so that
//! cannot happen. Across processes sharing a backend it is best effort only.
//!
//! # Bound
//! The entry count is checked, the oldest entries evicted and the new entry
//! listed while the partition's write lock is held, so concurrent inserts
//! never push a partition past `max_entries`. Eviction deletes the victim's
//! payload before rewriting the metadata, so a concurrent reader may briefly
//! see an entry whose payload is gone.
//!
//! # Unlisted payloads
//! A payload is written before its metadata, and a model server may finish
//! writing after its caller gave up. Producers reserve the hash for as long
//! as they work on it; `sweep_unlisted` deletes payloads that are neither
//! listed nor reserved.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::codec::{self, AudioClip};
use crate::cache::{
    CacheBackend, CacheStats, MetadataDocument, MetadataRecord, Session, Stage, StatsSnapshot,
};
use crate::error::{Result, VoiceCacheError};

type PartitionKey = (Stage, Session);
type PendingKey = (Stage, Session, String);

// == Cache Store ==
/// Handle to the shared cache. Cloning is cheap; clones share state.
#[derive(Debug, Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    /// Maximum number of entries per (stage, session)
    max_entries: usize,
    /// One write lock per partition for in-process metadata inserts
    writers: Arc<StdMutex<HashMap<PartitionKey, Arc<Mutex<()>>>>>,
    /// Payloads being produced whose metadata is not written yet
    pending: Arc<StdMutex<HashSet<PendingKey>>>,
    stats: Arc<CacheStats>,
}

/// Keeps a hash out of `sweep_unlisted` until dropped.
#[derive(Debug)]
pub struct Reservation {
    pending: Arc<StdMutex<HashSet<PendingKey>>>,
    key: PendingKey,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.key);
        }
    }
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store over `backend` holding at most `max_entries` per partition.
    ///
    /// A bound of zero is raised to one: the entry being written always fits.
    pub fn new(backend: Arc<dyn CacheBackend>, max_entries: usize) -> Self {
        if max_entries == 0 {
            warn!("A bound of 0 entries per partition is not usable, using 1");
        }
        Self {
            backend,
            max_entries: max_entries.max(1),
            writers: Arc::new(StdMutex::new(HashMap::new())),
            pending: Arc::new(StdMutex::new(HashSet::new())),
            stats: Arc::new(CacheStats::new()),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // == Metadata ==
    /// Returns the partition's metadata, empty if it was never written.
    pub async fn read_metadata(&self, stage: Stage, session: &Session) -> Result<MetadataDocument> {
        self.backend.read_metadata(stage, session).await
    }

    /// Overwrites the partition's whole metadata document. Last writer wins.
    pub async fn write_metadata(
        &self,
        stage: Stage,
        session: &Session,
        document: &MetadataDocument,
    ) -> Result<()> {
        self.backend.write_metadata(stage, session, document).await
    }

    /// Lists a new entry, evicting the oldest ones first if the partition is
    /// full.
    ///
    /// An entry that is already listed is kept as it is.
    pub async fn insert_metadata_entry(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
        record: MetadataRecord,
    ) -> Result<()> {
        self.insert_metadata_entry_with(stage, session, hash, |_| record)
            .await
            .map(|_| ())
    }

    /// Like `insert_metadata_entry`, but builds the record from the document
    /// as it is under the write lock.
    ///
    /// Returns the listed record and whether this call created it. `build` is
    /// not called when the hash is already listed.
    pub async fn insert_metadata_entry_with<F>(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
        build: F,
    ) -> Result<(MetadataRecord, bool)>
    where
        F: FnOnce(&MetadataDocument) -> MetadataRecord + Send,
    {
        let lock = self.writer_lock(stage, session)?;
        let _guard = lock.lock().await;

        let mut document = self.backend.read_metadata(stage, session).await?;
        if let Some(existing) = document.get(hash) {
            debug!("{} entry {} is already listed", stage, hash);
            return Ok((existing.clone(), false));
        }

        self.evict_until_below_bound(stage, session, &mut document).await?;
        let record = build(&document);
        document.insert(hash.to_string(), record.clone());
        self.backend.write_metadata(stage, session, &document).await?;
        Ok((record, true))
    }

    /// Returns one metadata record, if present.
    pub async fn metadata_entry(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
    ) -> Result<Option<MetadataRecord>> {
        Ok(self.read_metadata(stage, session).await?.remove(hash))
    }

    /// Membership test against the metadata document only.
    pub async fn is_cached(&self, stage: Stage, session: &Session, hash: &str) -> Result<bool> {
        Ok(self
            .read_metadata(stage, session)
            .await?
            .contains_key(hash))
    }

    /// Metadata keys, most recently created first.
    ///
    /// Entries created in the same microsecond are ordered by hash so the
    /// result is stable.
    pub async fn hashes_by_timestamp_desc(
        &self,
        stage: Stage,
        session: &Session,
    ) -> Result<Vec<String>> {
        let document = self.read_metadata(stage, session).await?;
        Ok(sort_by_timestamp_desc(&document))
    }

    // == Payloads ==
    /// Reads and decodes a payload. `NotFound` if no payload exists, whatever
    /// the metadata says.
    pub async fn read_payload(&self, stage: Stage, session: &Session, hash: &str) -> Result<AudioClip> {
        let bytes = self.backend.read_payload(stage, session, hash).await?;
        codec::decode(&bytes)
    }

    /// Returns a payload's encoded bytes without decoding them.
    pub async fn read_raw_bytes(&self, stage: Stage, session: &Session, hash: &str) -> Result<Vec<u8>> {
        self.backend.read_payload(stage, session, hash).await
    }

    /// Encodes and writes a payload.
    ///
    /// The payload is not listed until the caller inserts its metadata, which
    /// is also when the bound is enforced.
    pub async fn save_payload(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
        clip: &AudioClip,
    ) -> Result<()> {
        let bytes = codec::encode(clip)?;
        self.backend.write_payload(stage, session, hash, bytes).await?;
        debug!("Saved {} payload {} for session {}", stage, hash, session);
        Ok(())
    }

    /// Deletes a payload unless its hash is listed.
    ///
    /// Used to clean up after a producer that failed before its metadata was
    /// written.
    pub async fn discard_unlisted_payload(
        &self,
        stage: Stage,
        session: &Session,
        hash: &str,
    ) -> Result<()> {
        let lock = self.writer_lock(stage, session)?;
        let _guard = lock.lock().await;
        if self.backend.read_metadata(stage, session).await?.contains_key(hash) {
            return Ok(());
        }
        self.backend.delete_payload(stage, session, hash).await?;
        debug!("Discarded unlisted {} payload {}", stage, hash);
        Ok(())
    }

    /// Evicts oldest-first from `document` until it has room for one more
    /// entry. Must be called with the partition's write lock held.
    ///
    /// Each victim's payload is deleted before the document is persisted by
    /// the caller.
    async fn evict_until_below_bound(
        &self,
        stage: Stage,
        session: &Session,
        document: &mut MetadataDocument,
    ) -> Result<()> {
        let mut by_age = sort_by_timestamp_desc(document);
        while document.len() >= self.max_entries {
            let victim = match by_age.pop() {
                Some(hash) => hash,
                None => break,
            };
            self.backend.delete_payload(stage, session, &victim).await?;
            document.remove(&victim);
            self.stats.record_eviction();
            info!("Evicted {} entry {} for session {}", stage, victim, session);
        }
        Ok(())
    }

    // == Reservations ==
    /// Marks a hash as being produced. Hold the returned guard until the
    /// entry's metadata is written or the attempt is abandoned.
    pub fn reserve(&self, stage: Stage, session: &Session, hash: &str) -> Result<Reservation> {
        let key = (stage, session.clone(), hash.to_string());
        self.pending
            .lock()
            .map_err(|_| VoiceCacheError::Internal("reservation table lock poisoned".to_string()))?
            .insert(key.clone());
        Ok(Reservation {
            pending: Arc::clone(&self.pending),
            key,
        })
    }

    fn is_reserved(&self, stage: Stage, session: &Session, hash: &str) -> Result<bool> {
        let pending = self
            .pending
            .lock()
            .map_err(|_| VoiceCacheError::Internal("reservation table lock poisoned".to_string()))?;
        Ok(pending.contains(&(stage, session.clone(), hash.to_string())))
    }

    /// Deletes every payload of a session that no metadata lists and no
    /// producer has reserved. Returns the number deleted.
    pub async fn sweep_unlisted(&self, session: &Session) -> Result<usize> {
        let mut removed = 0;
        for stage in Stage::ALL {
            let lock = self.writer_lock(stage, session)?;
            let _guard = lock.lock().await;

            let document = self.backend.read_metadata(stage, session).await?;
            for hash in self.backend.list_payloads(stage, session).await? {
                if document.contains_key(&hash) || self.is_reserved(stage, session, &hash)? {
                    continue;
                }
                self.backend.delete_payload(stage, session, &hash).await?;
                debug!("Removed unlisted {} payload {} for session {}", stage, hash, session);
                removed += 1;
            }
        }
        Ok(removed)
    }

    // == Purge ==
    /// Deletes every payload and the metadata document of one partition.
    pub async fn purge_partition(&self, stage: Stage, session: &Session) -> Result<()> {
        let lock = self.writer_lock(stage, session)?;
        let _guard = lock.lock().await;
        self.backend.purge_partition(stage, session).await?;
        self.stats.record_purge();
        info!("Purged {} partition for session {}", stage, session);
        Ok(())
    }

    /// Purges all four stages of a session and forgets the session.
    pub async fn purge_session(&self, session: &Session) -> Result<()> {
        for stage in Stage::ALL {
            self.purge_partition(stage, session).await?;
        }
        self.backend.remove_session(session).await?;
        if let Ok(mut writers) = self.writers.lock() {
            writers.retain(|(_, s), _| s != session);
        }
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.backend.list_sessions().await
    }

    pub async fn last_activity(&self, session: &Session) -> Result<Option<NaiveDateTime>> {
        self.backend.last_activity(session).await
    }

    fn writer_lock(&self, stage: Stage, session: &Session) -> Result<Arc<Mutex<()>>> {
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| VoiceCacheError::Internal("writer table lock poisoned".to_string()))?;
        Ok(writers
            .entry((stage, session.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }
}

/// Hashes of a document, newest first, ties broken by hash descending.
pub fn sort_by_timestamp_desc(document: &MetadataDocument) -> Vec<String> {
    let mut entries: Vec<(&String, &MetadataRecord)> = document.iter().collect();
    entries.sort_by(|(ha, a), (hb, b)| b.created_at.cmp(&a.created_at).then_with(|| hb.cmp(ha)));
    entries.into_iter().map(|(hash, _)| hash.clone()).collect()
}
