//! Tiered loading: remote store first, live source as fallback.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::derive::{Assembler, DerivedBundle};
use crate::fetch_log::{ErrorLog, FetchError, Origin};
use crate::schema::RawBundle;
use crate::source::RegionDataSource;
use crate::{Region, Window};

/// A region that could not be served from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub region: Region,
    pub cause: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: store unavailable, using live source ({})", self.region, self.cause)
    }
}

/// One region's loaded data and where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct RegionLoad {
    pub origin: Origin,
    pub bundle: DerivedBundle,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub window: Window,
    pub regions: BTreeMap<Region, RegionLoad>,
    pub warnings: Vec<LoadWarning>,
    pub errors: Vec<FetchError>,
}

impl LoadReport {
    pub fn bundle(&self, region: Region) -> Option<&DerivedBundle> {
        self.regions.get(&region).map(|load| &load.bundle)
    }

    pub fn origin(&self, region: Region) -> Option<Origin> {
        self.regions.get(&region).map(|load| load.origin)
    }
}

/// Loads regions from a preferred source, falling back per region.
///
/// A region either comes entirely from the preferred source or entirely from
/// the fallback; partial store reads are never mixed with live data.
pub struct Loader {
    preferred: Arc<dyn RegionDataSource>,
    fallback: Arc<dyn RegionDataSource>,
    errors: ErrorLog,
    assembler: Assembler,
}

impl Loader {
    pub fn new(
        preferred: Arc<dyn RegionDataSource>,
        fallback: Arc<dyn RegionDataSource>,
        errors: ErrorLog,
        assembler: Assembler,
    ) -> Self {
        Self {
            preferred,
            fallback,
            errors,
            assembler,
        }
    }

    /// Load every region in `regions` for `window`. Never fails.
    pub fn load(&self, regions: &[Region], window: Window) -> LoadReport {
        let unique: BTreeSet<Region> = regions.iter().copied().collect();

        let results: Vec<(Region, RegionLoad, Option<LoadWarning>)> = thread::scope(|scope| {
            let handles: Vec<_> = unique
                .iter()
                .map(|&region| (region, scope.spawn(move || self.load_region(region, window))))
                .collect();

            handles
                .into_iter()
                .map(|(region, handle)| match handle.join() {
                    Ok((load, warning)) => (region, load, warning),
                    Err(_) => {
                        let warning = LoadWarning {
                            region,
                            cause: "region worker panicked".to_string(),
                        };
                        warn!(%region, "region worker panicked");
                        let load = RegionLoad {
                            origin: Origin::Live,
                            bundle: self.assembler.assemble(RawBundle::new()),
                        };
                        (region, load, Some(warning))
                    }
                })
                .collect()
        });

        let mut report = LoadReport {
            window,
            regions: BTreeMap::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        };
        for (region, load, warning) in results {
            report.regions.insert(region, load);
            report.warnings.extend(warning);
        }
        report.errors = self.errors.snapshot();
        report
    }

    fn load_region(&self, region: Region, window: Window) -> (RegionLoad, Option<LoadWarning>) {
        match self.preferred.fetch_tables(region, window) {
            Ok(raw) => {
                debug!(%region, records = raw.total_records(), source = self.preferred.name(), "region loaded");
                let load = RegionLoad {
                    origin: Origin::Store,
                    bundle: self.assembler.assemble(raw),
                };
                (load, None)
            }
            Err(e) => {
                warn!(%region, error = %e, "{} unavailable, falling back to {}", self.preferred.name(), self.fallback.name());
                let warning = LoadWarning {
                    region,
                    cause: e.to_string(),
                };
                let raw = match self.fallback.fetch_tables(region, window) {
                    Ok(raw) => raw.filter_window(window),
                    Err(e) => {
                        self.errors
                            .record(FetchError::new(region, Origin::Live, "all tables", &e));
                        RawBundle::new()
                    }
                };
                info!(%region, records = raw.total_records(), source = self.fallback.name(), "region loaded");
                let load = RegionLoad {
                    origin: Origin::Live,
                    bundle: self.assembler.assemble(raw),
                };
                (load, Some(warning))
            }
        }
    }
}
