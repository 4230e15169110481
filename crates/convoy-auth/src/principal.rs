use serde::{Deserialize, Serialize};

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub username: String,
  /// Unrestricted operators skip per-host privilege checks.
  #[serde(default)]
  pub rooter: bool,
}

impl Principal {
  pub fn new(username: impl Into<String>) -> Self {
    Self {
      username: username.into(),
      rooter: false,
    }
  }

  pub fn rooter(username: impl Into<String>) -> Self {
    Self {
      username: username.into(),
      rooter: true,
    }
  }

  pub fn is_rooter(&self) -> bool {
    self.rooter
  }
}
