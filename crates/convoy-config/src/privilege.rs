use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Mapping from run-as account to the privilege operation required on hosts.
///
/// Accounts listed in `root_accounts` require `root_operation`; every other
/// account requires `general_operation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
  pub root_accounts: Vec<String>,
  pub root_operation: String,
  pub general_operation: String,
}

impl Default for PrivilegeConfig {
  fn default() -> Self {
    Self {
      root_accounts: vec!["root".to_string()],
      root_operation: "task_run_use_root_account".to_string(),
      general_operation: "task_run_use_gene_account".to_string(),
    }
  }
}

impl PrivilegeConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.root_accounts.iter().all(|a| a.trim().is_empty()) {
      return Err(ConfigError::Privileges(
        "at least one root account is required".to_string(),
      ));
    }

    if self.root_operation.trim().is_empty() || self.general_operation.trim().is_empty() {
      return Err(ConfigError::Privileges(
        "operation names must not be blank".to_string(),
      ));
    }

    if self.root_operation == self.general_operation {
      return Err(ConfigError::Privileges(format!(
        "root and general accounts map to the same operation '{}'",
        self.root_operation
      )));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_is_valid() {
    assert!(PrivilegeConfig::default().validate().is_ok());
  }

  #[test]
  fn test_same_operation_rejected() {
    let config = PrivilegeConfig {
      root_operation: "run".to_string(),
      general_operation: "run".to_string(),
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Privileges(_))));
  }

  #[test]
  fn test_no_root_account_rejected() {
    let config = PrivilegeConfig {
      root_accounts: vec![" ".to_string()],
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }
}
