use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network trouble, server errors and rate limiting. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The request will not succeed by repeating it (not found, unauthorized, bad query).
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Timeout(_))
    }
}

impl From<octocrab::Error> for FetchError {
    fn from(error: octocrab::Error) -> Self {
        match &error {
            octocrab::Error::GitHub { source, .. } => {
                let status = source.status_code.as_u16();
                let rate_limited = source.message.to_lowercase().contains("rate limit");
                if status == 429 || status >= 500 || (status == 403 && rate_limited) {
                    FetchError::Transient(format!("GitHub responded {status}: {}", source.message))
                } else {
                    FetchError::Permanent(format!("GitHub responded {status}: {}", source.message))
                }
            }
            octocrab::Error::Serde { .. } | octocrab::Error::Json { .. } => {
                FetchError::Permanent(format!("Failed to decode GitHub response: {error}"))
            }
            _ => FetchError::Transient(error.to_string()),
        }
    }
}

/// A raw event that looks like something we track but can't be turned into a record.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("event {event_id} ({event_type}) has no {field}")]
    MissingField {
        event_id: String,
        event_type: String,
        field: &'static str,
    },
    #[error("event {event_id} ({event_type}) has a malformed payload: {reason}")]
    Payload {
        event_id: String,
        event_type: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode data for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
