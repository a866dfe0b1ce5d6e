//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the bound and ordering guarantees of the store over
//! arbitrary insertion sequences.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::cache::{
    AudioClip, CacheStore, MemoryBackend, MetadataRecord, Session, Stage,
};

// == Helpers ==
fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Distinct hex-like hashes
fn hashes_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[0-9a-f]{20}", 1..max_len)
        .prop_map(|set| set.into_iter().collect())
}

/// Saves `hashes` in order, each one minute after the previous.
async fn fill(store: &CacheStore, session: &Session, hashes: &[String]) {
    for (i, hash) in hashes.iter().enumerate() {
        store
            .save_payload(Stage::Preprocessed, session, hash, &AudioClip::mono(vec![i as f32], 8000))
            .await
            .unwrap();
        let record = MetadataRecord::created_at(None, base_time() + Duration::minutes(i as i64));
        store
            .insert_metadata_entry(Stage::Preprocessed, session, hash, record)
            .await
            .unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // After any number of sequential inserts, the partition holds
    // min(inserted, bound) entries and they are exactly the newest ones.
    #[test]
    fn prop_bound_keeps_newest(max_entries in 1usize..6, hashes in hashes_strategy(15)) {
        runtime().block_on(async {
            let store = CacheStore::new(Arc::new(MemoryBackend::new()), max_entries);
            let session = Session::Id("prop".into());
            fill(&store, &session, &hashes).await;

            let kept = store
                .hashes_by_timestamp_desc(Stage::Preprocessed, &session)
                .await
                .unwrap();
            let expected: Vec<String> = hashes.iter().rev().take(max_entries).cloned().collect();
            prop_assert_eq!(&kept, &expected);

            // Every kept entry still has its payload; every evicted one does not
            for hash in &hashes {
                let present = store.read_payload(Stage::Preprocessed, &session, hash).await.is_ok();
                prop_assert_eq!(present, kept.contains(hash));
            }
            Ok(())
        })?;
    }

    // The listing is a permutation of the metadata keys, newest first.
    #[test]
    fn prop_listing_sorted_desc(hashes in hashes_strategy(20)) {
        runtime().block_on(async {
            let store = CacheStore::new(Arc::new(MemoryBackend::new()), 100);
            fill(&store, &Session::Global, &hashes).await;

            let listed = store
                .hashes_by_timestamp_desc(Stage::Preprocessed, &Session::Global)
                .await
                .unwrap();
            let doc = store.read_metadata(Stage::Preprocessed, &Session::Global).await.unwrap();

            let listed_set: HashSet<&String> = listed.iter().collect();
            let doc_set: HashSet<&String> = doc.keys().collect();
            prop_assert_eq!(listed_set, doc_set);
            for pair in listed.windows(2) {
                prop_assert!(doc[&pair[0]].created_at >= doc[&pair[1]].created_at);
            }
            Ok(())
        })?;
    }

    // Partitions never see each other's entries.
    #[test]
    fn prop_sessions_isolated(hashes in hashes_strategy(8)) {
        runtime().block_on(async {
            let store = CacheStore::new(Arc::new(MemoryBackend::new()), 100);
            let a = Session::Id("a".into());
            let b = Session::Id("b".into());
            fill(&store, &a, &hashes).await;

            for hash in &hashes {
                prop_assert!(store.is_cached(Stage::Preprocessed, &a, hash).await.unwrap());
                prop_assert!(!store.is_cached(Stage::Preprocessed, &b, hash).await.unwrap());
            }
            Ok(())
        })?;
    }
}
