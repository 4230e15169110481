use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, OutputConfig, PrivilegeConfig};

/// Defaults applied to task listing when the caller leaves a filter unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListDefaults {
  pub limit: u32,
  pub days: u32,
}

impl Default for ListDefaults {
  fn default() -> Self {
    Self { limit: 20, days: 7 }
  }
}

/// Top-level configuration for a Convoy deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  /// SQLite connection string. When unset the CLI places the database in
  /// its data directory.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub database_url: Option<String>,
  pub output: OutputConfig,
  pub privileges: PrivilegeConfig,
  pub list: ListDefaults,
}

impl ServiceConfig {
  /// Parse a configuration from JSON.
  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(content)?)
  }

  /// Load a configuration file. A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    match std::fs::read_to_string(path) {
      Ok(content) => Self::from_json(&content),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
      Err(source) => Err(ConfigError::Io {
        path: path.display().to_string(),
        source,
      }),
    }
  }

  /// Check the values that must hold before the service starts.
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.privileges.validate()?;

    if self.list.limit == 0 {
      return Err(ConfigError::ListDefaults(
        "limit must be positive".to_string(),
      ));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::OutputSource;

  #[test]
  fn test_partial_json_fills_defaults() {
    let config = ServiceConfig::from_json(
      r#"{
        "output": { "source": "remote", "remote_port": 2080 },
        "list": { "days": 30 }
      }"#,
    )
    .unwrap();

    assert_eq!(config.output.source, OutputSource::Remote);
    assert_eq!(config.output.remote_port, 2080);
    assert_eq!(config.list.days, 30);
    assert_eq!(config.list.limit, 20);
    assert_eq!(config.privileges, PrivilegeConfig::default());
    assert!(config.database_url.is_none());
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_missing_file_is_default() {
    let config = ServiceConfig::load(Path::new("/nonexistent/convoy/config.json")).unwrap();
    assert_eq!(config, ServiceConfig::default());
  }

  #[test]
  fn test_zero_limit_rejected() {
    let config = ServiceConfig {
      list: ListDefaults { limit: 0, days: 7 },
      ..Default::default()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::ListDefaults(_))
    ));
  }
}
