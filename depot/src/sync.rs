//! Store sync: pull new live data into the remote store and advance the
//! checkpoint only once every table is written.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointTracker, RegionSession};
use crate::schema::{RawBundle, TableName};
use crate::source::{LiveSource, Pending, StoreSource};
use crate::store::RemoteStore;
use crate::{Error, Region, Result, Window};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the stored tables and the checkpoint; rewrite every table from
    /// the window start. Recovers a region whose stored objects no longer
    /// verify.
    pub rebuild: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Synced { fetched: usize, checkpoint: i64 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub region: Region,
    #[serde(flatten)]
    pub status: SyncStatus,
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self.status, SyncStatus::Synced { .. })
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            SyncStatus::Synced { fetched, checkpoint } => {
                write!(f, "{}: synced {} records, checkpoint {}", self.region, fetched, checkpoint)
            }
            SyncStatus::Failed { reason } => write!(f, "{}: failed: {}", self.region, reason),
        }
    }
}

pub struct Syncer {
    store: Arc<dyn RemoteStore>,
    reader: StoreSource,
    live: LiveSource,
    tracker: Arc<CheckpointTracker>,
    timeout: Duration,
}

impl Syncer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        live: LiveSource,
        tracker: Arc<CheckpointTracker>,
        timeout: Duration,
    ) -> Self {
        Self {
            reader: StoreSource::new(Arc::clone(&store), timeout),
            store,
            live,
            tracker,
            timeout,
        }
    }

    /// Sync every region in `regions`, concurrently. Never fails as a whole.
    pub fn sync(&self, regions: &[Region], window: Window, options: SyncOptions) -> Vec<SyncOutcome> {
        let unique: BTreeSet<Region> = regions.iter().copied().collect();
        thread::scope(|scope| {
            let handles: Vec<_> = unique
                .iter()
                .map(|&region| (region, scope.spawn(move || self.sync_region(region, window, options))))
                .collect();
            handles
                .into_iter()
                .map(|(region, handle)| {
                    let status = match handle.join() {
                        Ok(Ok((fetched, checkpoint))) => SyncStatus::Synced { fetched, checkpoint },
                        Ok(Err(e)) => {
                            warn!(%region, error = %e, "sync failed");
                            SyncStatus::Failed { reason: e.to_string() }
                        }
                        Err(_) => SyncStatus::Failed {
                            reason: "sync worker panicked".to_string(),
                        },
                    };
                    SyncOutcome { region, status }
                })
                .collect()
        })
    }

    fn sync_region(&self, region: Region, window: Window, options: SyncOptions) -> Result<(usize, i64)> {
        self.tracker
            .with_region(region, |session| self.sync_locked(session, window, options))
    }

    fn sync_locked(&self, session: &RegionSession<'_>, window: Window, options: SyncOptions) -> Result<(usize, i64)> {
        let region = session.region();

        let since = if options.rebuild {
            window.start_ms
        } else {
            session.get()?.unwrap_or(window.start_ms)
        };
        let fetch_window = window.since(since);
        info!(%region, window = %fetch_window, rebuild = options.rebuild, "sync fetching");

        let (fetched, failures) = self.live.fetch_checked(region, fetch_window);
        if let Some(first) = failures.into_iter().next() {
            return Err(Error::LiveSource {
                region,
                what: first.what,
                reason: first.message,
            });
        }
        let fetched_count = fetched.total_records();

        let mut merged = if options.rebuild {
            RawBundle::new()
        } else {
            self.reader.read_all(region)?
        };
        for table in TableName::ALL {
            let rows = &mut merged[table];
            rows.extend(fetched.table(table).iter().cloned());
            // History before the retention window is never loaded again
            rows.retain(|r| r.time_ms.map_or(true, |t| t >= window.start_ms));
            rows.sort_by_key(|r| r.time_ms);
        }

        self.put_all(region, merged)?;
        let checkpoint = session.advance(window.end_ms)?;
        info!(%region, fetched = fetched_count, checkpoint, "sync complete");
        Ok((fetched_count, checkpoint))
    }

    /// Write all six tables. Any failure fails the sync.
    ///
    /// Returns only once every write has finished, including writes that
    /// missed their deadline, so none can land after the region lock is
    /// released and overwrite a later sync.
    fn put_all(&self, region: Region, mut bundle: RawBundle) -> Result<()> {
        let pending: Vec<Pending<()>> = TableName::ALL
            .into_iter()
            .map(|table| {
                let store = Arc::clone(&self.store);
                let records = std::mem::take(&mut bundle[table]);
                Pending::spawn(format!("store put {}/{}", region, table), self.timeout, move || {
                    store.put_table(region, table, &records)
                })
            })
            .collect();

        let mut first_error = None;
        for call in pending {
            if let Err(e) = call.wait_settled() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch_log::ErrorLog;
    use crate::region::DAY_MS;
    use crate::schema::Record;
    use crate::source::testing::{FakeLive, FaultyStore};

    const T0: i64 = 1_700_006_400_000;

    fn window() -> Window {
        Window::new(T0, T0 + 10 * DAY_MS)
    }

    fn syncer(store: &Arc<FaultyStore>, live: &Arc<FakeLive>) -> Syncer {
        syncer_with_timeout(store, live, Duration::from_secs(5))
    }

    fn syncer_with_timeout(store: &Arc<FaultyStore>, live: &Arc<FakeLive>, timeout: Duration) -> Syncer {
        Syncer::new(
            store.clone(),
            LiveSource::new(live.clone(), ErrorLog::new(), timeout),
            Arc::new(CheckpointTracker::new(store.clone())),
            timeout,
        )
    }

    #[test]
    fn test_sync_appends_and_advances() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        store.seed(Region::Ind, TableName::Theft, vec![Record::at(T0 + 5 * DAY_MS, 9.0)]);
        live.serve(
            Region::Ind,
            TableName::Theft,
            vec![Record::at(T0 + 2 * DAY_MS, 1.0), Record::at(T0 + 7 * DAY_MS, 2.0)],
        );

        let outcomes = syncer(&store, &live).sync(&[Region::Ind], window(), SyncOptions::default());

        assert_eq!(
            outcomes[0].status,
            SyncStatus::Synced {
                fetched: 2,
                checkpoint: window().end_ms
            }
        );
        let times: Vec<_> = store
            .stored(Region::Ind, TableName::Theft)
            .unwrap()
            .iter()
            .filter_map(|r| r.time_ms)
            .collect();
        assert_eq!(times, vec![T0 + 2 * DAY_MS, T0 + 5 * DAY_MS, T0 + 7 * DAY_MS]);
        for table in TableName::ALL {
            assert!(store.stored(Region::Ind, table).is_some(), "{} not written", table);
        }
        assert_eq!(store.get_checkpoint(Region::Ind).unwrap(), Some(window().end_ms));
    }

    #[test]
    fn test_failed_put_keeps_checkpoint() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        store.put_checkpoint(Region::Nasa, T0).unwrap();
        store.fail_write(Region::Nasa, TableName::DataLoss);
        live.serve(Region::Nasa, TableName::Fill, vec![Record::at(T0 + DAY_MS, 4.0)]);

        let outcomes = syncer(&store, &live).sync(&[Region::Nasa], window(), SyncOptions::default());

        assert!(!outcomes[0].is_synced());
        assert_eq!(store.get_checkpoint(Region::Nasa).unwrap(), Some(T0));
    }

    #[test]
    fn test_live_failure_writes_nothing() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        live.fail_low_fuel(Region::Eu);
        live.serve(Region::Eu, TableName::Theft, vec![Record::at(T0 + DAY_MS, 4.0)]);

        let outcomes = syncer(&store, &live).sync(&[Region::Eu], window(), SyncOptions::default());

        match &outcomes[0].status {
            SyncStatus::Failed { reason } => assert!(reason.contains("low_fuel")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(store.stored(Region::Eu, TableName::Theft).is_none());
        assert_eq!(store.get_checkpoint(Region::Eu).unwrap(), None);
    }

    #[test]
    fn test_unreadable_table_is_never_overwritten() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        store.seed(Region::Fml, TableName::Fill, vec![Record::at(T0, 1.0)]);
        store.fail_read(Region::Fml, TableName::Fill);
        live.serve(Region::Fml, TableName::Fill, vec![Record::at(T0 + DAY_MS, 2.0)]);

        let outcomes = syncer(&store, &live).sync(&[Region::Fml], window(), SyncOptions::default());

        assert!(!outcomes[0].is_synced());
        assert_eq!(store.stored(Region::Fml, TableName::Fill).unwrap().len(), 1);
    }

    #[test]
    fn test_rebuild_replaces_unreadable_tables() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        store.seed(Region::Fml, TableName::Fill, vec![Record::at(T0, 1.0)]);
        store.fail_read(Region::Fml, TableName::Fill);
        live.serve(Region::Fml, TableName::Fill, vec![Record::at(T0 + DAY_MS, 2.0)]);

        let options = SyncOptions { rebuild: true };
        let outcomes = syncer(&store, &live).sync(&[Region::Fml], window(), options);

        assert!(outcomes[0].is_synced());
        let fill = store.stored(Region::Fml, TableName::Fill).unwrap();
        assert_eq!(fill.len(), 1);
        assert_eq!(fill[0].time_ms, Some(T0 + DAY_MS));
    }

    #[test]
    fn test_checkpoint_never_moves_back() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        let ahead = window().end_ms + DAY_MS;
        store.put_checkpoint(Region::Ind, ahead).unwrap();

        let outcomes = syncer(&store, &live).sync(&[Region::Ind], window(), SyncOptions::default());

        assert!(outcomes[0].is_synced());
        assert_eq!(store.get_checkpoint(Region::Ind).unwrap(), Some(ahead));
    }

    #[test]
    fn test_fetch_starts_at_checkpoint() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        store.put_checkpoint(Region::Ind, T0 + 3 * DAY_MS).unwrap();
        live.serve(
            Region::Ind,
            TableName::Theft,
            vec![Record::at(T0 + DAY_MS, 1.0), Record::at(T0 + 4 * DAY_MS, 2.0)],
        );

        let outcomes = syncer(&store, &live).sync(&[Region::Ind], window(), SyncOptions::default());

        match outcomes[0].status {
            SyncStatus::Synced { fetched, .. } => assert_eq!(fetched, 1),
            ref other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_late_write_cannot_undo_next_sync() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        let first = Record::at(T0 + DAY_MS, 1.0);
        let second = Record::at(T0 + 2 * DAY_MS, 2.0);
        store.slow_first_write(Region::Ind, TableName::Theft, Duration::from_millis(600));
        live.serve(Region::Ind, TableName::Theft, vec![first.clone()]);
        let syncer = syncer_with_timeout(&store, &live, Duration::from_millis(150));

        let outcomes = syncer.sync(&[Region::Ind], window(), SyncOptions::default());
        match &outcomes[0].status {
            SyncStatus::Failed { reason } => assert!(reason.contains("timed out after 150ms"), "{}", reason),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(store.get_checkpoint(Region::Ind).unwrap(), None);

        live.serve(Region::Ind, TableName::Theft, vec![first, second]);
        let outcomes = syncer.sync(&[Region::Ind], window(), SyncOptions::default());
        assert!(outcomes[0].is_synced());

        // Nothing from the first attempt may still be in flight
        std::thread::sleep(Duration::from_millis(700));
        let times: Vec<_> = store
            .stored(Region::Ind, TableName::Theft)
            .unwrap()
            .iter()
            .filter_map(|r| r.time_ms)
            .collect();
        assert!(times.contains(&(T0 + 2 * DAY_MS)), "later record lost: {:?}", times);
        assert_eq!(store.get_checkpoint(Region::Ind).unwrap(), Some(window().end_ms));
    }

    #[test]
    fn test_sync_drops_rows_before_window() {
        let store = Arc::new(FaultyStore::new());
        let live = Arc::new(FakeLive::new());
        store.seed(
            Region::Eu,
            TableName::Fill,
            vec![Record::at(T0 - DAY_MS, 1.0), Record::at(T0 + DAY_MS, 2.0)],
        );
        let untimed = Record {
            loss_type: Some("GPS".to_string()),
            ..Record::default()
        };
        store.seed(Region::Eu, TableName::DataLoss, vec![untimed]);

        let outcomes = syncer(&store, &live).sync(&[Region::Eu], window(), SyncOptions::default());

        assert!(outcomes[0].is_synced());
        let fill = store.stored(Region::Eu, TableName::Fill).unwrap();
        assert_eq!(fill.len(), 1);
        assert_eq!(fill[0].time_ms, Some(T0 + DAY_MS));
        assert_eq!(store.stored(Region::Eu, TableName::DataLoss).unwrap().len(), 1);
    }
}
