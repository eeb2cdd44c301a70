use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{Config, ConfigError};

/// Holds the current configuration snapshot and applies hot updates.
///
/// Readers get a cheap `Arc` snapshot; writers swap in a validated copy.
pub struct ConfigManager<T: Config> {
    config: ArcSwap<T>,
    path: Option<PathBuf>,
}

impl<T: Config> ConfigManager<T> {
    pub fn new(config: T) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            path: None,
        }
    }

    /// Parse, validate and hold the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::read(path)?;
        Ok(Self {
            config: ArcSwap::from_pointee(config),
            path: Some(path.to_path_buf()),
        })
    }

    /// Parse and validate a configuration from TOML text.
    pub fn parse(text: &str) -> Result<T, ConfigError> {
        let value: toml::Value = text.parse()?;
        let config = T::from_toml(&value)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<T, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn get(&self) -> Arc<T> {
        self.config.load_full()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the whole configuration after validating it.
    pub fn update(&self, new_config: T) -> Result<(), ConfigError> {
        new_config.validate()?;
        self.config.store(Arc::new(new_config));
        Ok(())
    }
}

impl<T: Config + Clone> ConfigManager<T> {
    /// Re-read the backing file and apply only its hot-updatable fields.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let fresh = Self::read(path)?;
        self.apply_hot_update(&fresh)?;
        tracing::info!(path = ?path, "configuration reloaded");
        Ok(())
    }

    /// Merge hot-updatable fields of `other` into the current snapshot.
    pub fn apply_hot_update(&self, other: &T) -> Result<(), ConfigError> {
        let mut current = self.snapshot();
        current.hot_update(other);
        current.validate()?;
        self.config.store(Arc::new(current));
        Ok(())
    }

    pub fn snapshot(&self) -> T {
        (*self.config.load_full()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{from_toml_value, render_toml, require_positive};
    use serde::{Deserialize, Serialize};
    use std::io::Write;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct PoolConfig {
        #[serde(default = "default_workers")]
        workers: usize,
        #[serde(default)]
        threshold_ms: u64,
    }

    fn default_workers() -> usize {
        2
    }

    impl Config for PoolConfig {
        fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
            from_toml_value(value)
        }

        fn hot_update(&mut self, other: &Self) {
            self.threshold_ms = other.threshold_ms;
        }

        fn render(&self) -> String {
            render_toml(self)
        }

        fn validate(&self) -> Result<(), ConfigError> {
            require_positive("workers", self.workers)
        }
    }

    #[test]
    fn test_parse_applies_defaults_and_validation() {
        let cfg = ConfigManager::<PoolConfig>::parse("threshold_ms = 5").unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.threshold_ms, 5);

        let err = ConfigManager::<PoolConfig>::parse("workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));

        let err = ConfigManager::<PoolConfig>::parse("workers = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_reload_only_touches_hot_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = 4\nthreshold_ms = 10").unwrap();
        let mgr = ConfigManager::<PoolConfig>::load(file.path()).unwrap();
        assert_eq!(mgr.get().workers, 4);

        let mut file2 = std::fs::File::create(file.path()).unwrap();
        writeln!(file2, "workers = 8\nthreshold_ms = 99").unwrap();
        mgr.reload().unwrap();

        let cfg = mgr.get();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.threshold_ms, 99);
    }

    #[test]
    fn test_update_rejects_invalid() {
        let mgr = ConfigManager::new(PoolConfig {
            workers: 1,
            threshold_ms: 0,
        });
        assert!(mgr
            .update(PoolConfig {
                workers: 0,
                threshold_ms: 0
            })
            .is_err());
        assert_eq!(mgr.get().workers, 1);
        assert!(mgr.get().render().contains("workers = 1"));
    }
}
