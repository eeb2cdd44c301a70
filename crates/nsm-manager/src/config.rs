//! Configuration for the namespace manager.

use std::time::Duration;

use nsm_cells::CellPath;
use nsm_config::{from_toml_value, render_toml, require_positive, Config, ConfigError};
use serde::{Deserialize, Serialize};

/// Configuration for the namespace manager.
///
/// Everything except `log_slow_threshold` is read once at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceManagerConfig {
    /// Worker threads per thread group.
    pub threads: usize,

    /// Number of thread groups. Requests are spread over the groups by the
    /// database id of the entry they address.
    pub thread_groups: usize,

    /// Size of the separate pool for cache location requests. Zero routes
    /// them through the main queues.
    pub cache_location_threads: usize,

    /// Listing workers per thread group.
    pub list_threads: usize,

    /// Bound on every queue. Zero means unbounded.
    pub queue_max_size: usize,

    /// Entries per partial listing reply.
    pub directory_list_limit: usize,

    /// Longest time between two partial listing replies.
    #[serde(with = "duration_text")]
    pub directory_list_flush_interval: Duration,

    /// Answer queued duplicates of a completed request from its result.
    pub folding: bool,

    /// Operations slower than this are logged at warn level. Zero disables.
    #[serde(with = "duration_text")]
    pub log_slow_threshold: Duration,

    /// Cell receiving a copy of every cache location change.
    pub cache_modification_relay: Option<String>,

    /// Cell notified of every successful delete.
    pub delete_notification_relay: Option<String>,
}

impl Default for NamespaceManagerConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            thread_groups: 1,
            cache_location_threads: 0,
            list_threads: 2,
            queue_max_size: 0,
            directory_list_limit: 100,
            directory_list_flush_interval: Duration::from_secs(10),
            folding: true,
            log_slow_threshold: Duration::ZERO,
            cache_modification_relay: None,
            delete_notification_relay: None,
        }
    }
}

impl NamespaceManagerConfig {
    /// Total number of main queues.
    pub fn shard_count(&self) -> usize {
        self.threads * self.thread_groups
    }

    pub fn cache_modification_relay(&self) -> Result<Option<CellPath>, ConfigError> {
        parse_relay("cache_modification_relay", self.cache_modification_relay.as_deref())
    }

    pub fn delete_notification_relay(&self) -> Result<Option<CellPath>, ConfigError> {
        parse_relay("delete_notification_relay", self.delete_notification_relay.as_deref())
    }
}

fn parse_relay(field: &str, value: Option<&str>) -> Result<Option<CellPath>, ConfigError> {
    match value {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s.trim().parse().map(Some).map_err(|_| ConfigError::TypeMismatch {
            field: field.into(),
            expected: "a cell path such as `cell@domain`".into(),
        }),
    }
}

impl Config for NamespaceManagerConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_value(value)
    }

    fn hot_update(&mut self, other: &Self) {
        self.log_slow_threshold = other.log_slow_threshold;
    }

    fn render(&self) -> String {
        render_toml(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("threads", self.threads)?;
        require_positive("thread_groups", self.thread_groups)?;
        require_positive("list_threads", self.list_threads)?;
        require_positive("directory_list_limit", self.directory_list_limit)?;
        if self.directory_list_flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "directory_list_flush_interval must be greater than zero".into(),
            ));
        }
        self.cache_modification_relay()?;
        self.delete_notification_relay()?;
        Ok(())
    }
}

/// Durations as humantime text, e.g. `"10s"` or `"250ms"`.
pub(crate) mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
    }
}
