//! Error types for depot operations.

use std::time::Duration;

use crate::Region;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store unavailable for {region}/{object}: {reason}")]
    StoreUnavailable {
        region: Region,
        object: String,
        reason: String,
    },

    #[error("Malformed stored object {object}: {reason}")]
    Format { object: String, reason: String },

    #[error("Checksum mismatch for stored object {object}")]
    Checksum { object: String },

    #[error("Live source failed for {region} ({what}): {reason}")]
    LiveSource {
        region: Region,
        what: String,
        reason: String,
    },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    /// Some regions of a multi-region operation failed; the rest completed.
    #[error("{action} failed for {}", .failures.join("; "))]
    RegionsFailed {
        action: String,
        failures: Vec<String>,
    },
}

impl Error {
    /// Whether this error means the store cannot currently confirm its contents.
    ///
    /// Any of these on a table read sends the whole region to the live path.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable { .. }
                | Error::Format { .. }
                | Error::Checksum { .. }
                | Error::Timeout { .. }
                | Error::Io(_)
                | Error::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_trigger_fallback() {
        let err = Error::Checksum {
            object: "IND/theft.jsonl".to_string(),
        };
        assert!(err.is_store_unavailable());

        let err = Error::Timeout {
            what: "get IND/fill".to_string(),
            after: Duration::from_secs(5),
        };
        assert!(err.is_store_unavailable());
    }

    #[test]
    fn test_config_and_live_errors_are_not_store_errors() {
        assert!(!Error::Config("missing endpoint".to_string()).is_store_unavailable());

        let err = Error::LiveSource {
            region: Region::Eu,
            what: "low_fuel".to_string(),
            reason: "502".to_string(),
        };
        assert!(!err.is_store_unavailable());
        assert_eq!(err.to_string(), "Live source failed for EU (low_fuel): 502");
    }
}
