use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Where captured host output is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
  /// Read the persisted task host row.
  #[default]
  Database,
  /// Ask the host that ran the script.
  Remote,
}

/// Output retrieval settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
  pub source: OutputSource,
  /// Port of the output endpoint served on every target host.
  /// Only consulted when `source` is [`OutputSource::Remote`].
  pub remote_port: u32,
  /// Upper bound for a single remote fetch.
  pub remote_timeout_ms: u64,
}

impl Default for OutputConfig {
  fn default() -> Self {
    Self {
      source: OutputSource::Database,
      remote_port: 0,
      remote_timeout_ms: 5_000,
    }
  }
}

impl OutputConfig {
  /// The remote port as a valid TCP port.
  pub fn port(&self) -> Result<u16, ConfigError> {
    match u16::try_from(self.remote_port) {
      Ok(port) if port > 0 => Ok(port),
      _ => Err(ConfigError::RemotePort(self.remote_port)),
    }
  }
}
