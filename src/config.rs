//! Bundle configuration
//!
//! Where archives are staged, how hard they are compressed, and how remote
//! entries are fetched.

use std::path::PathBuf;
use std::time::Duration;

use crate::archive::DEFAULT_COMPRESSION_LEVEL;

/// Default limit on the size of a fetched remote entry (256 MiB)
pub const DEFAULT_MAX_FETCH_BYTES: u64 = 256 * 1024 * 1024;

/// Configuration shared by every archive operation
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// Directory under which staging directories are created
    pub staging_root: PathBuf,

    /// Deflate level for packing (0-9)
    pub compression_level: u32,

    /// TCP connect timeout for remote entries
    pub connect_timeout: Duration,

    /// Total timeout for fetching one remote entry
    pub fetch_timeout: Duration,

    /// Largest remote entry that will be read into memory
    pub max_fetch_bytes: u64,

    /// User-Agent header sent with fetches
    pub user_agent: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            staging_root: std::env::temp_dir(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            connect_timeout: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(60),
            max_fetch_bytes: DEFAULT_MAX_FETCH_BYTES,
            user_agent: format!("omex/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BundleConfig {
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = root.into();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staging_root.exists() && !self.staging_root.is_dir() {
            return Err(ConfigError::StagingRootNotDirectory(self.staging_root.clone()));
        }

        if self.compression_level > 9 {
            return Err(ConfigError::InvalidCompressionLevel(self.compression_level));
        }

        if self.fetch_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        if self.max_fetch_bytes == 0 {
            return Err(ConfigError::ZeroFetchLimit);
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Staging root is not a directory: {0}")]
    StagingRootNotDirectory(PathBuf),

    #[error("Compression level must be between 0 and 9, got {0}")]
    InvalidCompressionLevel(u32),

    #[error("Fetch timeouts must be non-zero")]
    ZeroTimeout,

    #[error("Fetch size limit must be non-zero")]
    ZeroFetchLimit,
}
