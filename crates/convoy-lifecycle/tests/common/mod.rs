//! Shared fixture for lifecycle integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use convoy_auth::{Principal, StaticDirectory};
use convoy_config::ServiceConfig;
use convoy_lifecycle::{ChannelAgent, ControlSignal, TaskForm, TaskLifecycleService};
use convoy_store::{SqliteStore, Store};
use tokio::sync::mpsc;

pub const GENERAL_OP: &str = "task_run_use_gene_account";
pub const ROOT_OP: &str = "task_run_use_root_account";

pub struct Harness {
  pub service: TaskLifecycleService<ChannelAgent>,
  pub store: Arc<dyn Store>,
  pub signals: mpsc::UnboundedReceiver<ControlSignal>,
}

impl Harness {
  /// Drain every signal received so far.
  pub fn drain(&mut self) -> Vec<ControlSignal> {
    let mut out = Vec::new();
    while let Ok(signal) = self.signals.try_recv() {
      out.push(signal);
    }
    out
  }
}

/// Hosts h1..h3 are known. alice may run general accounts on h1 and h2,
/// bob only on h1, ops is unrestricted.
pub fn directory() -> StaticDirectory {
  StaticDirectory::new()
    .with_user(Principal::new("alice"))
    .with_user(Principal::new("bob"))
    .with_user(Principal::rooter("ops"))
    .with_host("h1", 1)
    .with_host("h2", 2)
    .with_host("h3", 3)
    .with_grant("alice", GENERAL_OP, "h1")
    .with_grant("alice", GENERAL_OP, "h2")
    .with_grant("bob", GENERAL_OP, "h1")
}

pub async fn harness() -> Harness {
  harness_with(ServiceConfig::default()).await
}

pub async fn harness_with(config: ServiceConfig) -> Harness {
  let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
  let (tx, rx) = mpsc::unbounded_channel();
  let service = TaskLifecycleService::from_config(
    &config,
    Arc::clone(&store),
    Arc::new(directory()),
    ChannelAgent::new(tx),
  )
  .unwrap();

  Harness {
    service,
    store,
    signals: rx,
  }
}

pub fn alice() -> Principal {
  Principal::new("alice")
}

pub fn bob() -> Principal {
  Principal::new("bob")
}

pub fn form(hosts: &[&str]) -> TaskForm {
  TaskForm {
    title: "disk usage".to_string(),
    account: "deploy".to_string(),
    batch: 1,
    tolerance: 0,
    timeout: 30,
    script: "df -h".to_string(),
    hosts: hosts.iter().map(|h| h.to_string()).collect(),
    ..Default::default()
  }
}
