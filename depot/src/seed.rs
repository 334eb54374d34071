//! One-off import of existing table dumps into the store.
//!
//! Layout: `<dir>/<REGION>/<table>.jsonl`. Records are normalized on parse,
//! so dumps that only carry `time` still get a `time_ms`.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::checkpoint::CheckpointTracker;
use crate::schema::{parse_jsonl, TableName};
use crate::store::RemoteStore;
use crate::Region;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedStats {
    pub region: Region,
    pub tables_written: usize,
    pub records: usize,
    /// Checkpoint after the import, if the region has one.
    pub checkpoint: Option<i64>,
    pub errors: Vec<String>,
}

/// Import dumps for each region in `regions`.
///
/// Missing files are skipped; unreadable ones and failed uploads are counted
/// in [`SeedStats::errors`]. The checkpoint moves to the newest `time_ms`
/// imported and never backwards.
pub fn seed_from_dir(
    store: &dyn RemoteStore,
    tracker: &CheckpointTracker,
    dir: &Path,
    regions: &[Region],
) -> Vec<SeedStats> {
    regions
        .iter()
        .map(|&region| seed_region(store, tracker, dir, region))
        .collect()
}

fn seed_region(store: &dyn RemoteStore, tracker: &CheckpointTracker, dir: &Path, region: Region) -> SeedStats {
    let mut stats = SeedStats {
        region,
        tables_written: 0,
        records: 0,
        checkpoint: None,
        errors: Vec::new(),
    };
    let region_dir = dir.join(region.as_str());
    let mut newest: Option<i64> = None;

    for table in TableName::ALL {
        let path = region_dir.join(table.file_name());
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(%region, path = %path.display(), error = %e, "unreadable dump");
                stats.errors.push(format!("{}: {}", path.display(), e));
                continue;
            }
        };
        let records = match parse_jsonl(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(%region, path = %path.display(), error = %e, "malformed dump");
                stats.errors.push(format!("{}: {}", path.display(), e));
                continue;
            }
        };
        if records.is_empty() {
            continue;
        }
        if let Err(e) = store.put_table(region, table, &records) {
            stats.errors.push(format!("{}/{}: {}", region, table, e));
            continue;
        }
        newest = newest.max(records.iter().filter_map(|r| r.time_ms).max());
        stats.tables_written += 1;
        stats.records += records.len();
    }

    stats.checkpoint = match newest {
        Some(ms) => match tracker.advance(region, ms) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                stats.errors.push(format!("{} checkpoint: {}", region, e));
                None
            }
        },
        None => tracker.get(region).unwrap_or_else(|e| {
            stats.errors.push(format!("{} checkpoint: {}", region, e));
            None
        }),
    };

    info!(
        %region,
        tables = stats.tables_written,
        records = stats.records,
        errors = stats.errors.len(),
        "seed finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{to_jsonl, Record};
    use crate::store::FsStore;
    use tempfile::TempDir;

    fn write_dump(dir: &Path, region: Region, table: TableName, content: &str) {
        let region_dir = dir.join(region.as_str());
        fs::create_dir_all(&region_dir).unwrap();
        fs::write(region_dir.join(table.file_name()), content).unwrap();
    }

    #[test]
    fn test_seed_uploads_and_sets_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let dumps = tmp.path().join("dumps");
        let store = Arc::new(FsStore::new(tmp.path().join("store")));
        let tracker = CheckpointTracker::new(store.clone());

        let thefts = vec![Record::at(1_700_000_000_000, 1.0), Record::at(1_700_000_500_000, 2.0)];
        write_dump(&dumps, Region::Ind, TableName::Theft, &to_jsonl(&thefts).unwrap());
        write_dump(
            &dumps,
            Region::Ind,
            TableName::Fill,
            "{\"time\":\"2023-11-14T22:13:20Z\",\"amount\":5}\n",
        );

        let stats = seed_from_dir(store.as_ref(), &tracker, &dumps, &[Region::Ind]);

        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].tables_written, 2);
        assert_eq!(stats[0].records, 3);
        assert!(stats[0].errors.is_empty());
        assert_eq!(stats[0].checkpoint, Some(1_700_000_500_000));

        let fills = store.get_table(Region::Ind, TableName::Fill).unwrap().unwrap();
        assert_eq!(fills[0].time_ms, Some(1_700_000_000_000));
        assert_eq!(store.get_table(Region::Ind, TableName::LowFuel).unwrap(), None);
    }

    #[test]
    fn test_seed_counts_malformed_dump() {
        let tmp = TempDir::new().unwrap();
        let dumps = tmp.path().join("dumps");
        let store = Arc::new(FsStore::new(tmp.path().join("store")));
        let tracker = CheckpointTracker::new(store.clone());
        write_dump(&dumps, Region::Eu, TableName::DataLoss, "{not json\n");

        let stats = seed_from_dir(store.as_ref(), &tracker, &dumps, &[Region::Eu]);

        assert_eq!(stats[0].tables_written, 0);
        assert_eq!(stats[0].errors.len(), 1);
        assert_eq!(stats[0].checkpoint, None);
    }

    #[test]
    fn test_seed_without_timestamps_keeps_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let dumps = tmp.path().join("dumps");
        let store = Arc::new(FsStore::new(tmp.path().join("store")));
        let tracker = CheckpointTracker::new(store.clone());
        tracker.advance(Region::Fml, 42).unwrap();
        write_dump(&dumps, Region::Fml, TableName::DataLoss, "{\"loss_type\":\"GPS\"}\n");

        let stats = seed_from_dir(store.as_ref(), &tracker, &dumps, &[Region::Fml]);

        assert_eq!(stats[0].tables_written, 1);
        assert_eq!(stats[0].checkpoint, Some(42));
    }
}
