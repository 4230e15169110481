use convoy_auth::{DirectoryError, PermissionError};
use convoy_config::ConfigError;
use convoy_output::OutputError;
use convoy_store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`crate::TaskLifecycleService`].
#[derive(Debug, Error)]
pub enum LifecycleError {
  /// Host identifiers that do not resolve to a known resource.
  #[error("hosts invalid: {}", .hosts.join(", "))]
  InvalidTarget { hosts: Vec<String> },

  /// The principal lacks the privilege for the account on these hosts.
  #[error("no privilege: {}", .hosts.join(", "))]
  PermissionDenied {
    username: String,
    account: String,
    hosts: Vec<String>,
  },

  /// The task has no action left; it is done.
  #[error("task {0} already finished")]
  AlreadyFinished(i64),

  #[error("{0} not found")]
  NotFound(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("invalid config: {0}")]
  ConfigInvalid(String),

  #[error("{0}")]
  UpstreamUnavailable(String),

  #[error("directory error: {0}")]
  Directory(#[from] DirectoryError),

  #[error("storage error: {0}")]
  Storage(#[source] StoreError),
}

impl From<StoreError> for LifecycleError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound(what) => Self::NotFound(what),
      other => Self::Storage(other),
    }
  }
}

impl From<PermissionError> for LifecycleError {
  fn from(err: PermissionError) -> Self {
    match err {
      PermissionError::InvalidTarget { hosts } => Self::InvalidTarget { hosts },
      PermissionError::PermissionDenied {
        username,
        account,
        hosts,
      } => Self::PermissionDenied {
        username,
        account,
        hosts,
      },
      PermissionError::Directory(e) => Self::Directory(e),
    }
  }
}

impl From<OutputError> for LifecycleError {
  fn from(err: OutputError) -> Self {
    match err {
      OutputError::NotFound { task_id, host } => {
        Self::NotFound(format!("task: {}, host({})", task_id, host))
      }
      OutputError::ConfigInvalid(e) => Self::ConfigInvalid(e.to_string()),
      e @ OutputError::UpstreamUnavailable { .. } => Self::UpstreamUnavailable(e.to_string()),
      OutputError::Client(e) => Self::ConfigInvalid(e.to_string()),
      OutputError::Store(e) => e.into(),
    }
  }
}

impl From<ConfigError> for LifecycleError {
  fn from(err: ConfigError) -> Self {
    Self::ConfigInvalid(err.to_string())
  }
}
