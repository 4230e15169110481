use thiserror::Error;

/// Errors returned by a [`crate::Directory`] backend.
#[derive(Debug, Error)]
pub enum DirectoryError {
  #[error("failed to read directory file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse directory: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("directory backend error: {0}")]
  Backend(String),
}

/// Why a principal may not act on a host set.
#[derive(Debug, Error)]
pub enum PermissionError {
  /// Some host identifiers do not resolve to a known resource.
  #[error("hosts invalid: {}", .hosts.join(", "))]
  InvalidTarget { hosts: Vec<String> },

  /// Hosts resolved, but the principal lacks the required privilege on
  /// some of them.
  #[error("no privilege: {}", .hosts.join(", "))]
  PermissionDenied {
    username: String,
    account: String,
    hosts: Vec<String>,
  },

  #[error(transparent)]
  Directory(#[from] DirectoryError),
}
