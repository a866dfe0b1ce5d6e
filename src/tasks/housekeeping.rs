//! Session Housekeeping Task
//!
//! Background task that periodically purges the partitions of sessions that
//! have been idle for longer than the configured age, then removes payloads
//! that no metadata lists. The global partition is never purged, but it is
//! swept.

use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{current_timestamp, CacheStore, Session};
use crate::error::Result;

/// Spawns a background task that sweeps stale sessions.
///
/// The first sweep runs immediately, then once per interval. The returned
/// handle is aborted during graceful shutdown.
pub fn spawn_housekeeping_task(
    store: CacheStore,
    interval_secs: u64,
    max_age_secs: u64,
) -> JoinHandle<()> {
    let period = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting session housekeeping every {} seconds, max age {} seconds",
            interval_secs, max_age_secs
        );

        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;

            match purge_stale_sessions(&store, max_age_secs).await {
                Ok(0) => debug!("Housekeeping: no stale sessions"),
                Ok(purged) => info!("Housekeeping: purged {} stale sessions", purged),
                Err(e) => warn!("Housekeeping sweep failed: {}", e),
            }
            match sweep_unlisted_payloads(&store).await {
                Ok(0) => debug!("Housekeeping: no unlisted payloads"),
                Ok(removed) => info!("Housekeeping: removed {} unlisted payloads", removed),
                Err(e) => warn!("Unlisted payload sweep failed: {}", e),
            }
        }
    })
}

/// Purges every session whose last activity is older than `max_age_secs`.
///
/// Returns the number of sessions purged.
pub async fn purge_stale_sessions(store: &CacheStore, max_age_secs: u64) -> Result<usize> {
    let secs = i64::try_from(max_age_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    match current_timestamp().checked_sub_signed(chrono::Duration::seconds(secs)) {
        Some(cutoff) => purge_sessions_idle_since(store, cutoff).await,
        // Nothing can be older than the earliest representable time
        None => Ok(0),
    }
}

/// Deletes payloads that no metadata lists, in the global partition and
/// every session. Returns the number deleted.
pub async fn sweep_unlisted_payloads(store: &CacheStore) -> Result<usize> {
    let mut sessions = vec![Session::Global];
    sessions.extend(store.list_sessions().await?);

    let mut removed = 0;
    for session in sessions {
        match store.sweep_unlisted(&session).await {
            Ok(n) => removed += n,
            Err(e) => warn!("Could not sweep session {}: {}", session, e),
        }
    }
    Ok(removed)
}

async fn purge_sessions_idle_since(store: &CacheStore, cutoff: NaiveDateTime) -> Result<usize> {
    let mut purged = 0;
    for session in store.list_sessions().await? {
        let last_activity = match store.last_activity(&session).await {
            Ok(last) => last,
            Err(e) => {
                warn!("Could not read activity of session {}: {}", session, e);
                continue;
            }
        };

        // A session without any recorded activity is leftover state
        if last_activity.map_or(true, |last| last < cutoff) {
            match store.purge_session(&session).await {
                Ok(()) => {
                    debug!("Purged session {}", session);
                    purged += 1;
                }
                Err(e) => warn!("Could not purge session {}: {}", session, e),
            }
        }
    }
    Ok(purged)
}
