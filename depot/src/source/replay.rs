//! Live client that replays API dumps from disk.
//!
//! Each region's endpoint names a directory holding one JSON-lines file per
//! table (`theft.jsonl`, `fill_cev.jsonl`, ...), the same shape the API
//! returns. A missing file means the API had nothing for that feed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::live::{AlertPair, Highway, LiveClient};
use crate::schema::{parse_jsonl, Record, TableName};
use crate::{Config, Error, Region, Result, Window};

#[derive(Debug, Clone, Default)]
pub struct ReplayClient {
    dirs: BTreeMap<Region, PathBuf>,
}

impl ReplayClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured endpoints (`file://` prefixes are accepted).
    pub fn from_config(config: &Config) -> Self {
        let dirs = config
            .endpoints
            .iter()
            .map(|(region, endpoint)| {
                let path = endpoint.strip_prefix("file://").unwrap_or(endpoint);
                (*region, PathBuf::from(path))
            })
            .collect();
        Self { dirs }
    }

    pub fn with_region(mut self, region: Region, dir: impl Into<PathBuf>) -> Self {
        self.dirs.insert(region, dir.into());
        self
    }

    fn read_table(&self, region: Region, table: TableName, window: Window) -> Result<Vec<Record>> {
        let dir = self.dirs.get(&region).ok_or_else(|| Error::LiveSource {
            region,
            what: table.to_string(),
            reason: "no endpoint configured".to_string(),
        })?;
        let records = read_dump(&dir.join(table.file_name())).map_err(|reason| {
            Error::LiveSource {
                region,
                what: table.to_string(),
                reason,
            }
        })?;
        let records: Vec<Record> = records
            .into_iter()
            .filter(|r| r.time_ms.is_some_and(|t| window.contains(t)))
            .collect();
        debug!(%region, %table, rows = records.len(), "replayed live table");
        Ok(records)
    }
}

fn read_dump(path: &Path) -> std::result::Result<Vec<Record>, String> {
    match fs::read_to_string(path) {
        Ok(content) => parse_jsonl(&content).map_err(|e| e.to_string()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.to_string()),
    }
}

impl LiveClient for ReplayClient {
    fn fetch_alerts(&self, region: Region, window: Window, highway: Highway) -> Result<AlertPair> {
        let (theft, fill) = match highway {
            Highway::On => (TableName::Theft, TableName::Fill),
            Highway::Off => (TableName::TheftCev, TableName::FillCev),
        };
        Ok(AlertPair {
            theft: self.read_table(region, theft, window)?,
            fill: self.read_table(region, fill, window)?,
        })
    }

    fn fetch_low_fuel(&self, region: Region, window: Window) -> Result<Vec<Record>> {
        self.read_table(region, TableName::LowFuel, window)
    }

    fn fetch_data_loss(&self, region: Region, window: Window) -> Result<Vec<Record>> {
        self.read_table(region, TableName::DataLoss, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::to_jsonl;
    use tempfile::TempDir;

    #[test]
    fn test_replay_filters_to_window() {
        let tmp = TempDir::new().unwrap();
        let records = vec![Record::at(5, 1.0), Record::at(15, 2.0), Record::at(25, 3.0)];
        fs::write(tmp.path().join("theft.jsonl"), to_jsonl(&records).unwrap()).unwrap();

        let client = ReplayClient::new().with_region(Region::Ind, tmp.path());
        let pair = client
            .fetch_alerts(Region::Ind, Window::new(10, 20), Highway::On)
            .unwrap();
        assert_eq!(pair.theft, vec![Record::at(15, 2.0)]);
        assert!(pair.fill.is_empty());
    }

    #[test]
    fn test_replay_unconfigured_region_fails() {
        let client = ReplayClient::new();
        let err = client.fetch_low_fuel(Region::Eu, Window::new(0, 1)).unwrap_err();
        assert!(matches!(err, Error::LiveSource { region: Region::Eu, .. }));
    }

    #[test]
    fn test_replay_from_config_strips_scheme() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("data_loss.jsonl"),
            "{\"time_ms\":3,\"loss_type\":\"GPS\"}\n",
        )
        .unwrap();
        let config = Config::with_root("/unused")
            .with_endpoint(Region::Fml, format!("file://{}", tmp.path().display()));

        let client = ReplayClient::from_config(&config);
        let rows = client.fetch_data_loss(Region::Fml, Window::new(0, 10)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].loss_type.as_deref(), Some("GPS"));
    }
}
