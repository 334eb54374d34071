//! The depot facade: one entry point over store, loader, sync and checkpoints.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::cache::ResultCache;
use crate::checkpoint::CheckpointTracker;
use crate::derive::Assembler;
use crate::fetch_log::{ErrorLog, FetchError};
use crate::loader::{LoadReport, Loader};
use crate::seed::{seed_from_dir, SeedStats};
use crate::source::{LiveClient, LiveSource, ReplayClient, StoreSource};
use crate::store::{FsStore, RemoteStore};
use crate::sync::{SyncOptions, SyncOutcome, Syncer};
use crate::{Config, Error, Region, Result, Window};

/// Cache key: sorted, deduplicated regions plus the window bounds.
type LoadKey = (Vec<Region>, i64, i64);

pub struct Depot {
    config: Config,
    live: Arc<dyn LiveClient>,
    store: OnceLock<Arc<dyn RemoteStore>>,
    tracker: OnceLock<Arc<CheckpointTracker>>,
    errors: ErrorLog,
    cache: ResultCache<LoadKey, LoadReport>,
}

impl Depot {
    /// Open a depot. Fails only on configuration errors.
    ///
    /// The store handle is created on first use, not here.
    pub fn open(config: Config) -> Result<Self> {
        config.validate(&Region::ALL)?;
        let live: Arc<dyn LiveClient> = Arc::new(ReplayClient::from_config(&config));
        Ok(Self {
            cache: ResultCache::new(config.cache_ttl()),
            live,
            store: OnceLock::new(),
            tracker: OnceLock::new(),
            errors: ErrorLog::new(),
            config,
        })
    }

    /// Replace the live-source client.
    pub fn with_live_client(mut self, client: Arc<dyn LiveClient>) -> Self {
        self.live = client;
        self
    }

    /// Use `store` instead of the configured directory store.
    pub fn with_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = OnceLock::from(store);
        self.tracker = OnceLock::new();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn store(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(self.store.get_or_init(|| {
            let dir = self.config.store_dir();
            info!(store = %dir.display(), "opening store");
            Arc::new(FsStore::new(dir))
        }))
    }

    fn tracker(&self) -> Arc<CheckpointTracker> {
        Arc::clone(
            self.tracker
                .get_or_init(|| Arc::new(CheckpointTracker::new(self.store()))),
        )
    }

    fn live_source(&self) -> LiveSource {
        LiveSource::new(Arc::clone(&self.live), self.errors.clone(), self.config.call_timeout())
    }

    /// Load `regions` for `window`, served from the result cache when fresh.
    ///
    /// The error list is cleared before a load that misses the cache.
    pub fn load(&self, regions: &[Region], window: Window) -> Arc<LoadReport> {
        let mut key_regions = regions.to_vec();
        key_regions.sort();
        key_regions.dedup();
        let key = (key_regions, window.start_ms, window.end_ms);
        if let Some(report) = self.cache.get(&key) {
            info!(%window, "serving cached load");
            return report;
        }

        self.clear_errors();
        let loader = Loader::new(
            Arc::new(StoreSource::new(self.store(), self.config.call_timeout())),
            Arc::new(self.live_source()),
            self.errors.clone(),
            Assembler::new(self.config.classification_tags.iter().cloned()),
        );
        let report = loader.load(&key.0, window);
        self.cache.insert(key, report)
    }

    /// Load `regions` for the configured retention window as of now.
    pub fn load_current(&self, regions: &[Region]) -> Arc<LoadReport> {
        self.load(regions, self.config.current_window())
    }

    /// Sync `regions` from the live source into the store.
    pub fn sync(&self, regions: &[Region], window: Window, options: SyncOptions) -> Vec<SyncOutcome> {
        let syncer = Syncer::new(self.store(), self.live_source(), self.tracker(), self.config.call_timeout());
        let outcomes = syncer.sync(regions, window, options);
        if outcomes.iter().any(SyncOutcome::is_synced) {
            self.cache.invalidate();
        }
        outcomes
    }

    /// Force the next sync of each region to start at `window.start_ms`.
    ///
    /// Every region is attempted; a failed reset does not stop the others.
    pub fn refresh(&self, regions: &[Region], window: Window) -> Result<()> {
        let tracker = self.tracker();
        let failures: Vec<String> = regions
            .iter()
            .filter_map(|&region| {
                tracker
                    .reset(region, window.start_ms)
                    .err()
                    .map(|e| format!("{}: {}", region, e))
            })
            .collect();
        self.cache.invalidate();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::RegionsFailed {
                action: "checkpoint reset".to_string(),
                failures,
            })
        }
    }

    pub fn checkpoints(&self, regions: &[Region]) -> Result<BTreeMap<Region, Option<i64>>> {
        let tracker = self.tracker();
        regions
            .iter()
            .map(|&region| Ok((region, tracker.get(region)?)))
            .collect()
    }

    /// Import table dumps from `dir` into the store.
    pub fn seed(&self, dir: &Path, regions: &[Region]) -> Vec<SeedStats> {
        let stats = seed_from_dir(self.store().as_ref(), &self.tracker(), dir, regions);
        self.cache.invalidate();
        stats
    }

    /// Live-source failures recorded since the last clear.
    pub fn errors(&self) -> Vec<FetchError> {
        self.errors.snapshot()
    }

    pub fn clear_errors(&self) {
        self.errors.clear();
    }

    /// Drop every cached load result.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }
}
