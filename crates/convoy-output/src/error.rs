use convoy_config::ConfigError;
use convoy_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
  /// The host is not part of the task.
  #[error("task: {task_id}, host({host}) not exists")]
  NotFound { task_id: i64, host: String },

  /// Remote retrieval is selected but misconfigured.
  #[error("{0}")]
  ConfigInvalid(#[from] ConfigError),

  /// The executing host could not be reached or did not answer in time.
  #[error("output of {url} unavailable: {source}")]
  UpstreamUnavailable {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// Building the HTTP client failed.
  #[error("http client error: {0}")]
  Client(#[source] reqwest::Error),

  #[error(transparent)]
  Store(#[from] StoreError),
}
