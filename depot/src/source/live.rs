//! Live-source client contract.

use crate::schema::Record;
use crate::{Region, Result, Window};

/// Which alert feed to read: regular vehicles or off-highway equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highway {
    On,
    Off,
}

/// Theft and refill alerts come back from one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertPair {
    pub theft: Vec<Record>,
    pub fill: Vec<Record>,
}

/// Client for the per-region telemetry API.
///
/// Implementations apply their own retries. Any `Err` is recorded by the
/// caller; it never aborts a load.
pub trait LiveClient: Send + Sync {
    fn fetch_alerts(&self, region: Region, window: Window, highway: Highway) -> Result<AlertPair>;

    fn fetch_low_fuel(&self, region: Region, window: Window) -> Result<Vec<Record>>;

    fn fetch_data_loss(&self, region: Region, window: Window) -> Result<Vec<Record>>;
}
