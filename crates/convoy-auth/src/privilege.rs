use std::collections::HashSet;

use convoy_config::{ConfigError, PrivilegeConfig};

/// Classes of run-as accounts, each requiring its own privilege operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountClass {
  Root,
  General,
}

/// Validated mapping from run-as account to required privilege operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeMap {
  root_accounts: HashSet<String>,
  root_operation: String,
  general_operation: String,
}

impl PrivilegeMap {
  pub fn from_config(config: &PrivilegeConfig) -> Result<Self, ConfigError> {
    config.validate()?;

    Ok(Self {
      root_accounts: config
        .root_accounts
        .iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect(),
      root_operation: config.root_operation.clone(),
      general_operation: config.general_operation.clone(),
    })
  }

  pub fn classify(&self, account: &str) -> AccountClass {
    if self.root_accounts.contains(account.trim()) {
      AccountClass::Root
    } else {
      AccountClass::General
    }
  }

  pub fn operation(&self, class: AccountClass) -> &str {
    match class {
      AccountClass::Root => &self.root_operation,
      AccountClass::General => &self.general_operation,
    }
  }

  /// The operation a principal needs on every host to run as `account`.
  pub fn operation_for(&self, account: &str) -> &str {
    self.operation(self.classify(account))
  }
}

impl Default for PrivilegeMap {
  fn default() -> Self {
    let config = PrivilegeConfig::default();
    Self {
      root_accounts: config.root_accounts.into_iter().collect(),
      root_operation: config.root_operation,
      general_operation: config.general_operation,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_account_mapping() {
    let map = PrivilegeMap::from_config(&PrivilegeConfig {
      root_accounts: vec!["root".to_string(), "admin".to_string()],
      root_operation: "run_root".to_string(),
      general_operation: "run_general".to_string(),
    })
    .unwrap();

    assert_eq!(map.classify("root"), AccountClass::Root);
    assert_eq!(map.operation_for("admin"), "run_root");
    assert_eq!(map.operation_for("www"), "run_general");
  }

  #[test]
  fn test_invalid_config_rejected() {
    let config = PrivilegeConfig {
      general_operation: String::new(),
      ..Default::default()
    };
    assert!(PrivilegeMap::from_config(&config).is_err());
  }
}
