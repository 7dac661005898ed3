//! Run configuration: flags with environment fallbacks and documented defaults.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::catalog::DEFAULT_CATALOG_URL;
use crate::error::IngestError;
use crate::parallel::pool::DEFAULT_WORKERS;
use crate::processor::DEFAULT_OUTPUT_DIR;
use crate::select::DEFAULT_THEME_KEYWORD;
use crate::state::DEFAULT_STATE_PATH;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub catalog_url: String,
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    pub workers: usize,
    pub theme: String,
    /// Applied to every HTTP request individually.
    pub request_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            state_file: PathBuf::from(DEFAULT_STATE_PATH),
            workers: DEFAULT_WORKERS,
            theme: DEFAULT_THEME_KEYWORD.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.catalog_url.trim().is_empty() {
            return Err(IngestError::InvalidConfig("catalog URL is empty".to_string()));
        }
        if self.workers == 0 {
            return Err(IngestError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.theme.trim().is_empty() {
            return Err(IngestError::InvalidConfig("theme keyword is empty".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(IngestError::InvalidConfig(
                "request timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Command-line surface shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Metastore endpoint listing dataset descriptors
    #[arg(
        long,
        global = true,
        env = "PROVIDER_INGEST_CATALOG_URL",
        default_value = DEFAULT_CATALOG_URL
    )]
    pub catalog_url: String,

    /// Directory receiving one CSV per processed dataset
    #[arg(
        long,
        global = true,
        env = "PROVIDER_INGEST_OUTPUT_DIR",
        default_value = DEFAULT_OUTPUT_DIR
    )]
    pub output_dir: PathBuf,

    /// JSON file recording the last processed `modified` value per dataset
    #[arg(
        long,
        global = true,
        env = "PROVIDER_INGEST_STATE_FILE",
        default_value = DEFAULT_STATE_PATH
    )]
    pub state_file: PathBuf,

    /// Concurrent dataset downloads
    #[arg(
        long,
        global = true,
        env = "PROVIDER_INGEST_WORKERS",
        default_value_t = DEFAULT_WORKERS
    )]
    pub workers: usize,

    /// Case-insensitive substring a dataset's theme must contain
    #[arg(
        long,
        global = true,
        env = "PROVIDER_INGEST_THEME",
        default_value = DEFAULT_THEME_KEYWORD
    )]
    pub theme: String,

    /// Per-request HTTP timeout in seconds
    #[arg(
        long,
        global = true,
        env = "PROVIDER_INGEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub timeout_secs: u64,
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<IngestConfig, IngestError> {
        let config = IngestConfig {
            catalog_url: self.catalog_url,
            output_dir: self.output_dir,
            state_file: self.state_file,
            workers: self.workers,
            theme: self.theme,
            request_timeout: Duration::from_secs(self.timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }
}
