//! Fuelwatch depot: region data cache and fallback sync.
//!
//! Region tables are read from a durable store when it can confirm them and
//! recomputed from the live source when it cannot. A per-region checkpoint
//! lets repeated syncs fetch only what is missing.

mod cache;
pub mod checkpoint;
pub mod config;
pub mod derive;
pub mod error;
pub mod fetch_log;
pub mod loader;
pub mod region;
pub mod schema;
pub mod seed;
mod service;
pub mod source;
pub mod store;
pub mod sync;

pub use checkpoint::CheckpointTracker;
pub use config::Config;
pub use derive::{assemble, Assembler, DerivedBundle, DerivedName};
pub use error::{Error, Result};
pub use fetch_log::{ErrorLog, FetchError, Origin};
pub use loader::{LoadReport, LoadWarning, Loader, RegionLoad};
pub use region::{Region, Unit, Window};
pub use schema::{RawBundle, Record, TableName};
pub use seed::{seed_from_dir, SeedStats};
pub use service::Depot;
pub use source::{LiveClient, RegionDataSource, ReplayClient};
pub use store::{FsStore, RemoteStore};
pub use sync::{SyncOptions, SyncOutcome, SyncStatus, Syncer};
