//! Typed TOML configuration with validation and hot updates.

mod manager;

pub use manager::ConfigManager;

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("toml render error: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("field '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("field '{field}': value {value} out of range (min: {min:?}, max: {max:?})")]
    OutOfRange {
        field: String,
        value: String,
        min: Option<String>,
        max: Option<String>,
    },

    #[error("{0}")]
    Invalid(String),
}

/// A configuration section.
pub trait Config: Sized + Send + Sync + 'static {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError>;

    /// Copy every field that may change at runtime from `other`.
    fn hot_update(&mut self, other: &Self);

    fn render(&self) -> String;

    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Deserialize a section through serde, the usual body of [`Config::from_toml`].
pub fn from_toml_value<T: DeserializeOwned>(value: &toml::Value) -> Result<T, ConfigError> {
    Ok(value.clone().try_into()?)
}

/// Render a section through serde, the usual body of [`Config::render`].
pub fn render_toml<T: Serialize>(config: &T) -> String {
    toml::to_string_pretty(config).unwrap_or_else(|e| format!("# render failed: {}", e))
}

/// Reject zero for a count-like field.
pub fn require_positive(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            field: field.into(),
            value: "0".into(),
            min: Some("1".into()),
            max: None,
        });
    }
    Ok(())
}
