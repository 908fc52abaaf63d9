//! Cache configuration.
//!
//! Controls the on-disk thumbnail cache via the `[cache]` section of `thumbd.toml`.

use std::{path::PathBuf, time::Duration};

const DEFAULT_DIRECTORY: &str = "./cache";
const DEFAULT_PREFIX: &str = "thumbd";
const DEFAULT_SUFFIX: &str = ".cache";
const DEFAULT_CLEAN_INTERVAL_SECS: u64 = 86_400;
const DEFAULT_MAX_AGE_SECS: u64 = 86_400;
const DEFAULT_FAILURE_BACKOFF_SECS: u64 = 3_600;

/// Resolved cache settings consumed by [`super::CacheStore`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve existing entries. Writes happen regardless.
    pub enabled: bool,
    pub directory: PathBuf,
    /// Prepended to every entry, temp and marker file name.
    pub prefix: String,
    /// Appended to every entry file name; cleanup only touches files with it.
    pub suffix: String,
    /// Minimum spacing between cleanup passes. `None` disables cleanup.
    pub clean_interval: Option<Duration>,
    /// Entries older than this are removed by cleanup.
    pub max_age: Duration,
    /// How long a failure sentinel suppresses refetching.
    pub failure_backoff: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            prefix: DEFAULT_PREFIX.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
            clean_interval: Some(Duration::from_secs(DEFAULT_CLEAN_INTERVAL_SECS)),
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
            failure_backoff: Duration::from_secs(DEFAULT_FAILURE_BACKOFF_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            directory: settings.directory.clone(),
            prefix: settings.prefix.clone(),
            suffix: settings.suffix.clone(),
            clean_interval: settings.clean_interval,
            max_age: settings.max_age,
            failure_backoff: settings.failure_backoff,
        }
    }
}

impl CacheConfig {
    /// Config rooted at `directory` with default naming and timings.
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    pub(crate) fn marker_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}_cacheLastCleanTime.touch", self.prefix))
    }

    pub(crate) fn temp_prefix(&self) -> String {
        format!("{}_tmp_", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.prefix, "thumbd");
        assert_eq!(config.suffix, ".cache");
        assert_eq!(config.clean_interval, Some(Duration::from_secs(86_400)));
        assert_eq!(config.max_age, Duration::from_secs(86_400));
        assert_eq!(config.failure_backoff, Duration::from_secs(3_600));
    }

    #[test]
    fn marker_is_prefixed() {
        let config = CacheConfig::in_directory("/var/cache/thumbd");
        assert_eq!(
            config.marker_path(),
            PathBuf::from("/var/cache/thumbd/thumbd_cacheLastCleanTime.touch")
        );
        assert_eq!(config.temp_prefix(), "thumbd_tmp_");
    }
}
