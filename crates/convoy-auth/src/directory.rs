use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DirectoryError, Principal};

/// Identity and host-privilege lookups owned by an external system.
#[async_trait]
pub trait Directory: Send + Sync {
  /// Resolve host identifiers to resource ids. Unknown identifiers are
  /// absent from the result.
  async fn resolve_hosts(&self, idents: &[String]) -> Result<HashMap<String, i64>, DirectoryError>;

  /// Identifiers among `hosts` on which `username` lacks `operation`.
  async fn unprivileged(
    &self,
    username: &str,
    hosts: &HashMap<String, i64>,
    operation: &str,
  ) -> Result<Vec<String>, DirectoryError>;

  /// Look up a user by name.
  async fn find_user(&self, username: &str) -> Result<Option<Principal>, DirectoryError>;
}

/// On-disk form of a [`StaticDirectory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryFile {
  pub users: Vec<UserEntry>,
  /// Host identifier to resource id.
  pub hosts: HashMap<String, i64>,
  pub grants: Vec<GrantEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
  pub username: String,
  #[serde(default)]
  pub rooter: bool,
}

/// `username` holds `operation` on each of `hosts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantEntry {
  pub username: String,
  pub operation: String,
  pub hosts: Vec<String>,
}

/// In-memory directory.
#[derive(Debug, Default)]
pub struct StaticDirectory {
  users: HashMap<String, Principal>,
  resources: HashMap<String, i64>,
  grants: HashSet<(String, String, i64)>,
}

impl StaticDirectory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_file(file: DirectoryFile) -> Result<Self, DirectoryError> {
    let mut directory = Self::new();
    for user in file.users {
      directory.users.insert(
        user.username.clone(),
        Principal {
          username: user.username,
          rooter: user.rooter,
        },
      );
    }
    directory.resources = file.hosts;

    for grant in file.grants {
      for host in &grant.hosts {
        let id = directory.resources.get(host).copied().ok_or_else(|| {
          DirectoryError::Backend(format!(
            "grant for {} references unknown host {}",
            grant.username, host
          ))
        })?;
        directory
          .grants
          .insert((grant.username.clone(), grant.operation.clone(), id));
      }
    }

    Ok(directory)
  }

  pub fn from_json(content: &str) -> Result<Self, DirectoryError> {
    Self::from_file(serde_json::from_str(content)?)
  }

  pub fn load(path: &Path) -> Result<Self, DirectoryError> {
    let content = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json(&content)
  }

  pub fn with_user(mut self, principal: Principal) -> Self {
    self.users.insert(principal.username.clone(), principal);
    self
  }

  pub fn with_host(mut self, ident: impl Into<String>, id: i64) -> Self {
    self.resources.insert(ident.into(), id);
    self
  }

  /// Grant `operation` on an already registered host. Unknown hosts are
  /// ignored.
  pub fn with_grant(mut self, username: &str, operation: &str, ident: &str) -> Self {
    if let Some(id) = self.resources.get(ident).copied() {
      self
        .grants
        .insert((username.to_string(), operation.to_string(), id));
    }
    self
  }
}

#[async_trait]
impl Directory for StaticDirectory {
  async fn resolve_hosts(&self, idents: &[String]) -> Result<HashMap<String, i64>, DirectoryError> {
    Ok(
      idents
        .iter()
        .filter_map(|ident| self.resources.get(ident).map(|id| (ident.clone(), *id)))
        .collect(),
    )
  }

  async fn unprivileged(
    &self,
    username: &str,
    hosts: &HashMap<String, i64>,
    operation: &str,
  ) -> Result<Vec<String>, DirectoryError> {
    let mut denied: Vec<String> = hosts
      .iter()
      .filter(|(_, id)| {
        !self
          .grants
          .contains(&(username.to_string(), operation.to_string(), **id))
      })
      .map(|(ident, _)| ident.clone())
      .collect();
    denied.sort();
    Ok(denied)
  }

  async fn find_user(&self, username: &str) -> Result<Option<Principal>, DirectoryError> {
    Ok(self.users.get(username).cloned())
  }
}
