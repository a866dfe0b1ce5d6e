//! Cache Module
//!
//! Staged, content-addressed storage of audio payloads with bounded,
//! oldest-first eviction per (stage, session) partition.

mod backend;
pub mod codec;
mod entry;
mod file;
mod memory;
mod stage;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use backend::{validate_hash, CacheBackend, MAX_HASH_LENGTH};
pub use codec::AudioClip;
pub use entry::{current_timestamp, MetadataDocument, MetadataRecord, TIMESTAMP_FORMAT};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use stage::{Session, Stage, GLOBAL_SESSION};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{sort_by_timestamp_desc, CacheStore, Reservation};

use std::sync::Arc;

use crate::config::{BackendKind, Config};

/// Builds the store selected by the configuration.
pub fn store_from_config(config: &Config) -> CacheStore {
    let backend: Arc<dyn CacheBackend> = match config.backend {
        BackendKind::File => Arc::new(FileBackend::new(config.cache_root.clone())),
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    CacheStore::new(backend, config.max_entries)
}
