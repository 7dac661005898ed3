//! Error taxonomy for a run.
//!
//! [`IngestError`] aborts the whole run. [`DatasetError`] is scoped to one
//! dataset and ends up as a line in the run summary instead of unwinding.

use std::path::PathBuf;

use crate::state::StateError;
use crate::transport::TransportError;

/// Fatal, run-level failures.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The catalog could not be retrieved or decoded; nothing was processed.
    #[error("catalog unavailable at {url}: {reason}")]
    CatalogUnavailable { url: String, reason: String },

    /// An existing state file could not be read or parsed.
    #[error("failed to load state from {}: {source}", .path.display())]
    StateLoad {
        path: PathBuf,
        #[source]
        source: StateError,
    },

    /// State could not be written at the end of the run. Outputs written
    /// during the run stay on disk and are reprocessed next time.
    #[error("failed to persist state to {}: {source}", .path.display())]
    StatePersistence {
        path: PathBuf,
        #[source]
        source: StateError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl IngestError {
    pub(crate) fn catalog(url: &str, reason: impl ToString) -> Self {
        Self::CatalogUnavailable {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failures confined to a single dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("download failed: {0}")]
    Download(#[from] TransportError),

    #[error("malformed tabular payload: {0}")]
    Parse(#[from] csv::Error),

    #[error("payload has no header row")]
    MissingHeader,

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Identifier cannot be turned into a file name inside the output directory.
    #[error("identifier {0:?} is not usable as an output file name")]
    UnsafeIdentifier(String),
}

impl DatasetError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::Parse(_) | Self::MissingHeader => "parse",
            Self::Write { .. } => "write",
            Self::UnsafeIdentifier(_) => "identifier",
        }
    }
}
