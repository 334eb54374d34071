//! Per-region sync progress.
//!
//! The tracker is the only writer of checkpoint state. Writes for one region
//! are serialized; different regions never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use crate::store::RemoteStore;
use crate::{Region, Result};

pub struct CheckpointTracker {
    store: Arc<dyn RemoteStore>,
    locks: Mutex<HashMap<Region, Arc<Mutex<()>>>>,
}

impl CheckpointTracker {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn region_lock(&self, region: Region) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(region)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` with exclusive access to `region`'s checkpoint.
    pub fn with_region<T>(&self, region: Region, f: impl FnOnce(&RegionSession<'_>) -> T) -> T {
        let lock = self.region_lock(region);
        let guard = lock.lock();
        let session = RegionSession {
            tracker: self,
            region,
            _guard: guard,
        };
        f(&session)
    }

    /// Last confirmed sync time for `region`, if it was ever synced.
    pub fn get(&self, region: Region) -> Result<Option<i64>> {
        self.store.get_checkpoint(region)
    }

    /// Advance `region` to `synced_to_ms`. Never moves a checkpoint backwards.
    pub fn advance(&self, region: Region, synced_to_ms: i64) -> Result<i64> {
        self.with_region(region, |session| session.advance(synced_to_ms))
    }

    /// Reset `region` to the start of the requested window.
    ///
    /// The next sync re-fetches from `window_start_ms`, which bounds the
    /// re-fetch to the retention window instead of full history.
    pub fn reset(&self, region: Region, window_start_ms: i64) -> Result<()> {
        self.with_region(region, |session| session.reset(window_start_ms))
    }
}

/// Checkpoint access while the region lock is held.
///
/// A sync keeps the session open from its checkpoint read to its checkpoint
/// write, so two syncs of one region cannot interleave.
pub struct RegionSession<'a> {
    tracker: &'a CheckpointTracker,
    region: Region,
    _guard: MutexGuard<'a, ()>,
}

impl RegionSession<'_> {
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn get(&self) -> Result<Option<i64>> {
        self.tracker.store.get_checkpoint(self.region)
    }

    pub fn advance(&self, synced_to_ms: i64) -> Result<i64> {
        let previous = self.get()?;
        let next = previous.map_or(synced_to_ms, |p| p.max(synced_to_ms));
        if previous != Some(next) {
            self.tracker.store.put_checkpoint(self.region, next)?;
        }
        info!(region = %self.region, ?previous, next, "checkpoint advanced");
        Ok(next)
    }

    pub fn reset(&self, window_start_ms: i64) -> Result<()> {
        self.tracker.store.put_checkpoint(self.region, window_start_ms)?;
        info!(region = %self.region, window_start_ms, "checkpoint reset to window start");
        Ok(())
    }
}
