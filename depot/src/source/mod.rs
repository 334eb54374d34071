//! Region data sources.
//!
//! The loader picks between two interchangeable implementations of
//! [`RegionDataSource`]: the remote store (preferred) and the live API.

mod live;
mod replay;
mod timed;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::fetch_log::{ErrorLog, FetchError, Origin};
use crate::schema::{Record, RawBundle, TableName};
use crate::store::RemoteStore;
use crate::{Region, Result, Window};

pub use live::{AlertPair, Highway, LiveClient};
pub use replay::ReplayClient;
pub use timed::Pending;

/// Something that can produce a region's raw tables for a window.
pub trait RegionDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_tables(&self, region: Region, window: Window) -> Result<RawBundle>;
}

/// Reads materialized tables from the remote store.
pub struct StoreSource {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl StoreSource {
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Read all six tables of `region`, unfiltered.
    ///
    /// Reads run concurrently but every result is observed before deciding:
    /// one failed read fails the whole region. A table that was never written
    /// comes back empty.
    pub fn read_all(&self, region: Region) -> Result<RawBundle> {
        let pending: Vec<(TableName, Pending<Option<Vec<Record>>>)> = TableName::ALL
            .into_iter()
            .map(|table| {
                let store = Arc::clone(&self.store);
                let call = Pending::spawn(
                    format!("store get {}/{}", region, table),
                    self.timeout,
                    move || store.get_table(region, table),
                );
                (table, call)
            })
            .collect();

        let mut bundle = RawBundle::new();
        let mut first_error = None;
        for (table, call) in pending {
            match call.wait() {
                Ok(Some(records)) => bundle.set(table, records),
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(bundle),
        }
    }
}

impl RegionDataSource for StoreSource {
    fn name(&self) -> &'static str {
        "store"
    }

    fn fetch_tables(&self, region: Region, window: Window) -> Result<RawBundle> {
        Ok(self.read_all(region)?.filter_window(window))
    }
}

/// Fetches from the live API. Failures are logged per feed, never raised;
/// a failed feed leaves its tables empty.
pub struct LiveSource {
    client: Arc<dyn LiveClient>,
    errors: ErrorLog,
    timeout: Duration,
}

#[derive(Clone, Copy)]
enum Feed {
    Alerts(Highway),
    LowFuel,
    DataLoss,
}

impl Feed {
    const ALL: [Feed; 4] = [
        Feed::Alerts(Highway::On),
        Feed::Alerts(Highway::Off),
        Feed::LowFuel,
        Feed::DataLoss,
    ];

    fn label(&self) -> &'static str {
        match self {
            Feed::Alerts(Highway::On) => "theft/fill",
            Feed::Alerts(Highway::Off) => "theft_cev/fill_cev",
            Feed::LowFuel => "low_fuel",
            Feed::DataLoss => "data_loss",
        }
    }
}

impl LiveSource {
    pub fn new(client: Arc<dyn LiveClient>, errors: ErrorLog, timeout: Duration) -> Self {
        Self {
            client,
            errors,
            timeout,
        }
    }

    /// Fetch every feed, returning the bundle and the failures separately.
    ///
    /// Used by sync, which must know whether the fetch was complete. Nothing
    /// is written to the shared error log.
    pub fn fetch_checked(&self, region: Region, window: Window) -> (RawBundle, Vec<FetchError>) {
        let pending: Vec<(Feed, Pending<Vec<(TableName, Vec<Record>)>>)> = Feed::ALL
            .into_iter()
            .map(|feed| {
                let client = Arc::clone(&self.client);
                let what = format!("live {} {}", region, feed.label());
                let call = match feed {
                    Feed::Alerts(highway) => Pending::spawn(what, self.timeout, move || {
                        let pair = client.fetch_alerts(region, window, highway)?;
                        let (theft, fill) = match highway {
                            Highway::On => (TableName::Theft, TableName::Fill),
                            Highway::Off => (TableName::TheftCev, TableName::FillCev),
                        };
                        Ok(vec![(theft, pair.theft), (fill, pair.fill)])
                    }),
                    Feed::LowFuel => Pending::spawn(what, self.timeout, move || {
                        Ok(vec![(TableName::LowFuel, client.fetch_low_fuel(region, window)?)])
                    }),
                    Feed::DataLoss => Pending::spawn(what, self.timeout, move || {
                        Ok(vec![(TableName::DataLoss, client.fetch_data_loss(region, window)?)])
                    }),
                };
                (feed, call)
            })
            .collect();

        let mut bundle = RawBundle::new();
        let mut failures = Vec::new();
        for (feed, call) in pending {
            match call.wait() {
                Ok(tables) => {
                    for (table, records) in tables {
                        bundle.set(table, records.into_iter().map(Record::normalize).collect());
                    }
                }
                Err(e) => {
                    warn!(%region, feed = feed.label(), error = %e, "live fetch failed");
                    failures.push(FetchError::new(region, Origin::Live, feed.label(), &e));
                }
            }
        }
        (bundle, failures)
    }
}

impl RegionDataSource for LiveSource {
    fn name(&self) -> &'static str {
        "live"
    }

    fn fetch_tables(&self, region: Region, window: Window) -> Result<RawBundle> {
        let (bundle, failures) = self.fetch_checked(region, window);
        for failure in failures {
            self.errors.record(failure);
        }
        Ok(bundle)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeLive, FaultyStore};
    use super::*;

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_store_source_missing_tables_are_empty() {
        let store = Arc::new(FaultyStore::new());
        store.seed(Region::Ind, TableName::Theft, vec![Record::at(10, 1.0)]);

        let source = StoreSource::new(store.clone(), timeout());
        let bundle = source.fetch_tables(Region::Ind, Window::new(0, 100)).unwrap();
        assert_eq!(bundle[TableName::Theft].len(), 1);
        assert!(bundle[TableName::FillCev].is_empty());
        assert_eq!(store.reads.load(std::sync::atomic::Ordering::SeqCst), 6);
    }

    #[test]
    fn test_store_source_one_failure_fails_region() {
        let store = Arc::new(FaultyStore::new());
        store.seed(Region::Nasa, TableName::Theft, vec![Record::at(10, 1.0)]);
        store.fail_read(Region::Nasa, TableName::FillCev);

        let source = StoreSource::new(store.clone(), timeout());
        let err = source.fetch_tables(Region::Nasa, Window::new(0, 100)).unwrap_err();
        assert!(err.is_store_unavailable());
        // Every read was still observed before deciding
        assert_eq!(store.reads.load(std::sync::atomic::Ordering::SeqCst), 6);
    }

    #[test]
    fn test_live_source_records_failures_and_continues() {
        let live = Arc::new(FakeLive::new());
        live.serve(Region::Eu, TableName::Fill, vec![Record::at(5, 40.0)]);
        live.fail_low_fuel(Region::Eu);

        let errors = ErrorLog::new();
        let source = LiveSource::new(live.clone(), errors.clone(), timeout());
        let bundle = source.fetch_tables(Region::Eu, Window::new(0, 10)).unwrap();

        assert_eq!(bundle[TableName::Fill].len(), 1);
        assert!(bundle[TableName::LowFuel].is_empty());
        let logged = errors.snapshot();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].what, "low_fuel");
        assert_eq!(logged[0].origin, Origin::Live);
    }

    #[test]
    fn test_live_source_normalizes_records() {
        let live = Arc::new(FakeLive::new());
        let mut record = Record::at(5, 12.0);
        record.probable_variation = Some("3-9".to_string());
        live.serve(Region::Ind, TableName::Theft, vec![record]);

        let source = LiveSource::new(live, ErrorLog::new(), timeout());
        let (bundle, failures) = source.fetch_checked(Region::Ind, Window::new(0, 10));
        assert!(failures.is_empty());
        assert_eq!(bundle[TableName::Theft][0].probable_variation_max, Some(9.0));
    }
}
