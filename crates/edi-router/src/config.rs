//! Configuration management

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use edi_common::{EdiError, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::layout::{
    DEFAULT_ARCHIVE_DIR, DEFAULT_ERROR_DIR, DEFAULT_INCOMING_DIR, DEFAULT_PROCESSING_DIR,
};
use crate::ingest::pipeline::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::ingest::watcher::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_SETTLE_DELAY_MS,
    DEFAULT_WORKER_COUNT,
};
use crate::ingest::{DirectoryLayout, RetryPolicy, WatcherOptions};

// ============================================================================
// Monitor Configuration Constants
// ============================================================================

/// Default base directory holding the four managed directories.
pub const DEFAULT_BASE_DIR: &str = "./edi-data";

/// Default number of concurrent event subscribers.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 8;

/// Drop-folder monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub base_dir: PathBuf,
    pub incoming_dir: String,
    pub processing_dir: String,
    pub archive_dir: String,
    pub error_dir: String,
    pub settle_delay_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub force_polling: bool,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub resync_on_overflow: bool,
    pub recover_processing: bool,
    pub max_subscribers: usize,
}

impl MonitorConfig {
    /// Load configuration from environment (and `.env`) and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup; unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            base_dir: lookup("EDI_BASE_DIR").map(PathBuf::from).unwrap_or(defaults.base_dir),
            incoming_dir: lookup("EDI_INCOMING_DIR").unwrap_or(defaults.incoming_dir),
            processing_dir: lookup("EDI_PROCESSING_DIR").unwrap_or(defaults.processing_dir),
            archive_dir: lookup("EDI_ARCHIVE_DIR").unwrap_or(defaults.archive_dir),
            error_dir: lookup("EDI_ERROR_DIR").unwrap_or(defaults.error_dir),
            settle_delay_ms: parsed(&lookup, "EDI_SETTLE_DELAY_MS", defaults.settle_delay_ms)?,
            retry_attempts: parsed(&lookup, "EDI_RETRY_ATTEMPTS", defaults.retry_attempts)?,
            retry_delay_ms: parsed(&lookup, "EDI_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            poll_interval_ms: parsed(&lookup, "EDI_POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            force_polling: parsed(&lookup, "EDI_FORCE_POLLING", defaults.force_polling)?,
            worker_count: parsed(&lookup, "EDI_WORKER_COUNT", defaults.worker_count)?,
            queue_capacity: parsed(&lookup, "EDI_QUEUE_CAPACITY", defaults.queue_capacity)?,
            resync_on_overflow: parsed(
                &lookup,
                "EDI_RESYNC_ON_OVERFLOW",
                defaults.resync_on_overflow,
            )?,
            recover_processing: parsed(
                &lookup,
                "EDI_RECOVER_PROCESSING",
                defaults.recover_processing,
            )?,
            max_subscribers: parsed(&lookup, "EDI_MAX_SUBSCRIBERS", defaults.max_subscribers)?,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry_attempts == 0 {
            return Err(EdiError::Config("retry_attempts must be greater than 0".into()));
        }

        if self.worker_count == 0 {
            return Err(EdiError::Config("worker_count must be greater than 0".into()));
        }

        if self.queue_capacity == 0 {
            return Err(EdiError::Config("queue_capacity must be greater than 0".into()));
        }

        if self.max_subscribers == 0 {
            return Err(EdiError::Config("max_subscribers must be greater than 0".into()));
        }

        let names = [
            &self.incoming_dir,
            &self.processing_dir,
            &self.archive_dir,
            &self.error_dir,
        ];
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(EdiError::Config("Directory names cannot be empty".into()));
        }

        let distinct: HashSet<&str> = names.iter().map(|name| name.as_str()).collect();
        if distinct.len() != names.len() {
            return Err(EdiError::Config(format!(
                "Directory names must be distinct, got incoming={} processing={} archive={} errors={}",
                self.incoming_dir, self.processing_dir, self.archive_dir, self.error_dir
            )));
        }

        Ok(())
    }

    /// Same configuration rooted somewhere else
    pub fn with_base_dir(mut self, base_dir: impl AsRef<Path>) -> Self {
        self.base_dir = base_dir.as_ref().to_path_buf();
        self
    }

    pub fn layout(&self) -> DirectoryLayout {
        DirectoryLayout::with_names(
            &self.base_dir,
            &self.incoming_dir,
            &self.processing_dir,
            &self.archive_dir,
            &self.error_dir,
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            settle_delay: self.settle_delay(),
            poll_interval: self.poll_interval(),
            force_polling: self.force_polling,
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
            resync_on_overflow: self.resync_on_overflow,
            recover_processing: self.recover_processing,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            incoming_dir: DEFAULT_INCOMING_DIR.to_string(),
            processing_dir: DEFAULT_PROCESSING_DIR.to_string(),
            archive_dir: DEFAULT_ARCHIVE_DIR.to_string(),
            error_dir: DEFAULT_ERROR_DIR.to_string(),
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            force_polling: false,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            resync_on_overflow: true,
            recover_processing: true,
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| EdiError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("./edi-data"));
        assert_eq!(config.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(5000));
        assert_eq!(config.max_subscribers, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = MonitorConfig::from_lookup(lookup_from(&[
            ("EDI_BASE_DIR", "/srv/edi"),
            ("EDI_ERROR_DIR", "rejected"),
            ("EDI_RETRY_ATTEMPTS", "5"),
            ("EDI_FORCE_POLLING", "true"),
        ]))
        .unwrap();

        assert_eq!(config.layout().errors, PathBuf::from("/srv/edi/rejected"));
        assert_eq!(config.retry_attempts, 5);
        assert!(config.watcher_options().force_polling);
    }

    #[test]
    fn test_unparseable_number_is_an_error() {
        let err = MonitorConfig::from_lookup(lookup_from(&[("EDI_RETRY_DELAY_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, EdiError::InvalidValue { ref key, .. } if key == "EDI_RETRY_DELAY_MS"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = MonitorConfig {
            retry_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_directories() {
        let config = MonitorConfig {
            archive_dir: "incoming".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("distinct"));
    }

    #[test]
    fn test_validate_rejects_empty_directory_name() {
        let config = MonitorConfig {
            processing_dir: " ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
