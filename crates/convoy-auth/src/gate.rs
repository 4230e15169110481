use std::sync::Arc;

use tracing::error;

use crate::{Directory, PermissionError, Principal, PrivilegeMap};

/// Authorizes a principal to run scripts as an account on a set of hosts.
///
/// The check is all-or-nothing: a single unresolvable or unauthorized host
/// fails the whole request.
#[derive(Clone)]
pub struct PermissionGate {
  directory: Arc<dyn Directory>,
  privileges: PrivilegeMap,
}

impl PermissionGate {
  pub fn new(directory: Arc<dyn Directory>, privileges: PrivilegeMap) -> Self {
    Self {
      directory,
      privileges,
    }
  }

  pub fn directory(&self) -> &Arc<dyn Directory> {
    &self.directory
  }

  pub fn privileges(&self) -> &PrivilegeMap {
    &self.privileges
  }

  pub async fn check(
    &self,
    hosts: &[String],
    principal: &Principal,
    account: &str,
  ) -> Result<(), PermissionError> {
    if principal.is_rooter() {
      return Ok(());
    }

    let resolved = self.directory.resolve_hosts(hosts).await?;
    let mut unresolved: Vec<String> = hosts
      .iter()
      .filter(|h| !resolved.contains_key(*h))
      .cloned()
      .collect();

    if hosts.is_empty() || !unresolved.is_empty() {
      unresolved.sort();
      error!(
        username = %principal.username,
        run_account = %account,
        hosts = %unresolved.join(", "),
        "hosts invalid"
      );
      return Err(PermissionError::InvalidTarget { hosts: unresolved });
    }

    let operation = self.privileges.operation_for(account);
    let mut denied = self
      .directory
      .unprivileged(&principal.username, &resolved, operation)
      .await?;

    if !denied.is_empty() {
      denied.sort();
      let joined = denied.join(", ");
      error!(
        username = %principal.username,
        run_account = %account,
        operation = %operation,
        hosts = %joined,
        "no privilege"
      );
      return Err(PermissionError::PermissionDenied {
        username: principal.username.clone(),
        account: account.to_string(),
        hosts: denied,
      });
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::StaticDirectory;

  fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| h.to_string()).collect()
  }

  fn gate() -> PermissionGate {
    let privileges = PrivilegeMap::default();
    let root_op = privileges.operation_for("root").to_string();
    let general_op = privileges.operation_for("www").to_string();

    let directory = StaticDirectory::new()
      .with_host("h1", 1)
      .with_host("h2", 2)
      .with_grant("alice", &root_op, "h1")
      .with_grant("alice", &general_op, "h1")
      .with_grant("alice", &general_op, "h2");

    PermissionGate::new(Arc::new(directory), privileges)
  }

  #[tokio::test]
  async fn test_rooter_always_passes() {
    let gate = gate();
    let result = gate
      .check(&hosts(&["unknown"]), &Principal::rooter("ops"), "root")
      .await;
    assert!(result.is_ok());
  }

  #[tokio::test]
  async fn test_privileged_user_passes() {
    let gate = gate();
    let alice = Principal::new("alice");
    assert!(gate.check(&hosts(&["h1", "h2"]), &alice, "www").await.is_ok());
    assert!(gate.check(&hosts(&["h1"]), &alice, "root").await.is_ok());
  }

  #[tokio::test]
  async fn test_unresolved_host_is_invalid_target() {
    let gate = gate();
    let err = gate
      .check(&hosts(&["h1", "h9"]), &Principal::new("alice"), "www")
      .await
      .unwrap_err();

    match err {
      PermissionError::InvalidTarget { hosts } => assert_eq!(hosts, vec!["h9".to_string()]),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_denied_names_every_host() {
    let gate = gate();
    let err = gate
      .check(&hosts(&["h2", "h1"]), &Principal::new("alice"), "root")
      .await
      .unwrap_err();

    assert_eq!(err.to_string(), "no privilege: h2");
    match err {
      PermissionError::PermissionDenied {
        username,
        account,
        hosts,
      } => {
        assert_eq!(username, "alice");
        assert_eq!(account, "root");
        assert_eq!(hosts, vec!["h2".to_string()]);
      }
      other => panic!("unexpected error: {other:?}"),
    }

    let err = gate
      .check(&hosts(&["h1", "h2"]), &Principal::new("bob"), "www")
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "no privilege: h1, h2");
  }

  #[tokio::test]
  async fn test_empty_host_set_rejected() {
    let gate = gate();
    let err = gate.check(&[], &Principal::new("alice"), "www").await;
    assert!(matches!(err, Err(PermissionError::InvalidTarget { .. })));
  }
}
