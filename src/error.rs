// ⚠️ Error Taxonomy
// Load failures are fatal, I/O failures carry context, lock timeouts are retryable.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// CATALOG / INPUT LOADING
// ============================================================================

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read spreadsheet {}: {message}", .path.display())]
    Spreadsheet { path: PathBuf, message: String },

    /// Neither alias list matched a header for the named column(s)
    #[error("missing required columns {missing:?} (available: {found:?})")]
    MissingColumns {
        missing: Vec<&'static str>,
        found: Vec<String>,
    },
}

// ============================================================================
// FILE I/O
// ============================================================================

#[derive(Error, Debug)]
pub enum IoError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {waited:?} waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },
}

impl IoError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IoError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Lock contention can clear on its own; anything else is treated as permanent.
    pub fn is_retryable(&self) -> bool {
        self.is_lock_timeout()
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, IoError::LockTimeout { .. })
    }
}

// ============================================================================
// CORRECTION STORE
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error("correction log {} is malformed: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to encode correction log: {0}")]
    Encode(#[source] csv::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Io(e) => e.is_retryable(),
            _ => false,
        }
    }
}
