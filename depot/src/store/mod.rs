//! Remote store - durable per-region tables and checkpoints.
//!
//! Layout (one namespace per region):
//!
//! ```text
//! <root>/<REGION>/theft.jsonl        six record tables, JSON lines
//! <root>/<REGION>/theft.jsonl.b3     BLAKE3 digest of the table
//! <root>/<REGION>/checkpoint.json    {"last_fetched_ms": N}
//! ```
//!
//! `get_table` distinguishes "never written" (`Ok(None)`) from "cannot
//! currently confirm" (`Err`); callers must not treat them alike.

mod atomic;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::schema::{parse_jsonl, to_jsonl, Record, TableName};
use crate::{Error, Region, Result};

/// Object name of the per-region checkpoint.
pub const CHECKPOINT_OBJECT: &str = "checkpoint.json";

/// A table and its digest are replaced by separate renames, so a reader can
/// catch one without the other. A mismatch is re-read once after this pause.
const DIGEST_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Durable store of materialized region tables.
///
/// `put_*` calls fully replace the previous object; nothing is appended.
pub trait RemoteStore: Send + Sync {
    fn get_table(&self, region: Region, table: TableName) -> Result<Option<Vec<Record>>>;

    fn put_table(&self, region: Region, table: TableName, records: &[Record]) -> Result<()>;

    fn get_checkpoint(&self, region: Region) -> Result<Option<i64>>;

    fn put_checkpoint(&self, region: Region, last_fetched_ms: i64) -> Result<()>;
}

/// On-disk form of a checkpoint object.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    last_fetched_ms: Option<i64>,
}

/// A store rooted at a directory (a mounted or synced bucket).
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Region namespace, created on demand. An empty namespace is a valid state.
    fn namespace(&self, region: Region) -> Result<PathBuf> {
        let dir = self.root.join(region.as_str());
        fs::create_dir_all(&dir).map_err(|e| unavailable(region, region.as_str(), e))?;
        Ok(dir)
    }

    fn object_path(&self, region: Region, name: &str) -> Result<PathBuf> {
        Ok(self.namespace(region)?.join(name))
    }
}

fn unavailable(region: Region, object: &str, e: io::Error) -> Error {
    Error::StoreUnavailable {
        region,
        object: object.to_string(),
        reason: e.to_string(),
    }
}

fn digest_path(table_path: &Path) -> PathBuf {
    let mut name = table_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".b3");
    table_path.with_file_name(name)
}

/// Read a file, mapping "not there" to `None`.
fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read a table and check it against its digest sidecar.
///
/// Objects imported without a digest are accepted as-is.
fn read_verified(path: &Path, region: Region, object: &str) -> Result<Option<Vec<u8>>> {
    let mut retried = false;
    loop {
        let Some(bytes) = read_optional(path).map_err(|e| unavailable(region, object, e))? else {
            return Ok(None);
        };
        let Some(expected) =
            read_optional(&digest_path(path)).map_err(|e| unavailable(region, object, e))?
        else {
            return Ok(Some(bytes));
        };
        if String::from_utf8_lossy(&expected).trim() == blake3::hash(&bytes).to_hex().as_str() {
            return Ok(Some(bytes));
        }
        if retried {
            return Err(Error::Checksum {
                object: object.to_string(),
            });
        }
        debug!(%region, object, "digest mismatch, re-reading table");
        thread::sleep(DIGEST_RETRY_DELAY);
        retried = true;
    }
}

impl RemoteStore for FsStore {
    fn get_table(&self, region: Region, table: TableName) -> Result<Option<Vec<Record>>> {
        let object = format!("{}/{}", region, table.file_name());
        let path = self.object_path(region, &table.file_name())?;

        let Some(bytes) = read_verified(&path, region, &object)? else {
            debug!(%region, %table, "table not found in store");
            return Ok(None);
        };

        let content = String::from_utf8(bytes).map_err(|e| Error::Format {
            object: object.clone(),
            reason: e.to_string(),
        })?;
        let records = parse_jsonl(&content).map_err(|e| Error::Format {
            object: object.clone(),
            reason: e.to_string(),
        })?;

        debug!(%region, %table, rows = records.len(), "read table from store");
        Ok(Some(records))
    }

    fn put_table(&self, region: Region, table: TableName, records: &[Record]) -> Result<()> {
        let object = format!("{}/{}", region, table.file_name());
        let path = self.object_path(region, &table.file_name())?;
        let content = to_jsonl(records)?;
        let digest = blake3::hash(content.as_bytes()).to_hex();

        atomic::replace_file(&path, content.as_bytes())
            .map_err(|e| unavailable(region, &object, e))?;
        atomic::replace_file(&digest_path(&path), digest.as_bytes())
            .map_err(|e| unavailable(region, &object, e))?;

        debug!(%region, %table, rows = records.len(), "wrote table to store");
        Ok(())
    }

    fn get_checkpoint(&self, region: Region) -> Result<Option<i64>> {
        let object = format!("{}/{}", region, CHECKPOINT_OBJECT);
        let path = self.object_path(region, CHECKPOINT_OBJECT)?;

        let Some(bytes) = read_optional(&path).map_err(|e| unavailable(region, &object, e))?
        else {
            return Ok(None);
        };
        let record: CheckpointRecord =
            serde_json::from_slice(&bytes).map_err(|e| Error::Format {
                object,
                reason: e.to_string(),
            })?;
        Ok(record.last_fetched_ms)
    }

    fn put_checkpoint(&self, region: Region, last_fetched_ms: i64) -> Result<()> {
        let object = format!("{}/{}", region, CHECKPOINT_OBJECT);
        let path = self.object_path(region, CHECKPOINT_OBJECT)?;
        let content = serde_json::to_vec(&CheckpointRecord {
            last_fetched_ms: Some(last_fetched_ms),
        })?;
        atomic::replace_file(&path, &content).map_err(|e| unavailable(region, &object, e))?;
        debug!(%region, last_fetched_ms, "wrote checkpoint");
        Ok(())
    }
}
