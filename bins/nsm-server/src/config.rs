use nsm_config::{from_toml_value, render_toml, Config, ConfigError};
use nsm_logging::LogConfig;
use nsm_manager::NamespaceManagerConfig;
use serde::{Deserialize, Serialize};

/// A subtree whose entries get ids from their own database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub prefix: String,
    pub id: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name the manager cell registers under.
    pub cell_name: String,
    pub domain: String,
    /// Storage class stamped on new files, as `class@hsm`.
    pub storage_class: String,
    pub databases: Vec<DatabaseConfig>,
    pub manager: NamespaceManagerConfig,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cell_name: "PnfsManager".into(),
            domain: "namespace".into(),
            storage_class: "default:none@osm".into(),
            databases: vec![DatabaseConfig {
                prefix: "/data".into(),
                id: 1,
            }],
            manager: NamespaceManagerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// `(hsm, storage class)`.
    pub fn storage_class(&self) -> Result<(&str, &str), ConfigError> {
        self.storage_class
            .rsplit_once('@')
            .map(|(class, hsm)| (hsm, class))
            .filter(|(hsm, class)| !hsm.is_empty() && !class.is_empty())
            .ok_or_else(|| ConfigError::TypeMismatch {
                field: "storage_class".into(),
                expected: "`class@hsm`".into(),
            })
    }
}

impl Config for ServerConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_value(value)
    }

    fn hot_update(&mut self, other: &Self) {
        self.manager.hot_update(&other.manager);
    }

    fn render(&self) -> String {
        render_toml(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_name.is_empty() || self.cell_name.contains('@') {
            return Err(ConfigError::Invalid(format!(
                "invalid cell name '{}'",
                self.cell_name
            )));
        }
        self.storage_class()?;
        for db in &self.databases {
            if !db.prefix.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "database prefix '{}' is not absolute",
                    db.prefix
                )));
            }
        }
        self.manager.validate()
    }
}
