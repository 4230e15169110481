use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("remotePort[{0}] invalid")]
  RemotePort(u32),

  #[error("invalid privilege mapping: {0}")]
  Privileges(String),

  #[error("invalid list defaults: {0}")]
  ListDefaults(String),
}
