//! Collected fetch failures.
//!
//! Source-level failures never abort a load. They are appended here and the
//! caller inspects (and clears) the log around each load cycle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::Region;

/// Which side of the depot data (or a failure) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Store,
    Live,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Store => f.write_str("store"),
            Origin::Live => f.write_str("live"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchError {
    pub region: Region,
    pub origin: Origin,
    /// What was being fetched, e.g. "theft/fill" or "low_fuel".
    pub what: String,
    pub message: String,
}

impl FetchError {
    pub fn new(region: Region, origin: Origin, what: impl Into<String>, err: &crate::Error) -> Self {
        Self {
            region,
            origin,
            what: what.into(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}: {}", self.region, self.origin, self.what, self.message)
    }
}

/// Shared, append-only (until cleared) list of fetch failures.
///
/// Region workers append concurrently; clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    inner: Arc<Mutex<Vec<FetchError>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, error: FetchError) {
        self.inner.lock().push(error);
    }

    pub fn snapshot(&self) -> Vec<FetchError> {
        self.inner.lock().clone()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_concurrent_record() {
        let log = ErrorLog::new();
        std::thread::scope(|s| {
            for region in Region::ALL {
                let log = log.clone();
                s.spawn(move || {
                    for i in 0..25 {
                        let err = Error::Timeout {
                            what: format!("call {}", i),
                            after: std::time::Duration::from_secs(1),
                        };
                        log.record(FetchError::new(region, Origin::Live, "theft/fill", &err));
                    }
                });
            }
        });
        assert_eq!(log.len(), 100);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_display() {
        let err = Error::Config("bad".to_string());
        let entry = FetchError::new(Region::Nasa, Origin::Store, "fill_cev", &err);
        assert_eq!(entry.to_string(), "[NASA store] fill_cev: Configuration error: bad");
    }
}
