//! Alert-driven task creation.
//!
//! The monitoring system posts an event when a strategy fires. Problem
//! events run the strategy's template on the affected host on behalf of
//! whoever last edited the template. Failures are logged and returned, no
//! one else is notified.

use convoy_auth::Principal;
use convoy_store::{ActionKind, NewTask};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::agent::ExecutionAgent;
use crate::{LifecycleError, TaskLifecycleService};

/// Message returned for events that do not run a task.
pub const NOT_ALERT: &str = "not alert, no need to run task";

/// An event posted by the monitoring system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertEvent {
  pub id: i64,
  /// Strategy id.
  pub sid: i64,
  /// Strategy name.
  pub sname: String,
  pub node_path: String,
  pub nid: i64,
  pub endpoint: String,
  pub priority: i32,
  /// `alert`, `problem` or `recovery`.
  pub event_type: String,
  pub category: i32,
  pub status: u16,
  pub hashid: u64,
  pub etime: i64,
  pub value: String,
  pub info: String,
  pub last_updator: String,
  pub groups: Vec<String>,
  pub users: Vec<String>,
}

impl AlertEvent {
  pub fn is_problem(&self) -> bool {
    let event_type = self.event_type.to_lowercase();
    event_type == "alert" || event_type == "problem"
  }
}

/// Where the triggered task runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertTarget {
  /// Overrides the event endpoint when set.
  pub host: Option<String>,
  pub template_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertOutcome {
  Skipped(String),
  Created(i64),
}

impl<A: ExecutionAgent> TaskLifecycleService<A> {
  /// Run a template in response to a monitoring event.
  pub async fn handle_alert(
    &self,
    event: &AlertEvent,
    target: &AlertTarget,
  ) -> Result<AlertOutcome, LifecycleError> {
    if !event.is_problem() {
      info!(
        nid = event.nid,
        node_path = %event.node_path,
        sname = %event.sname,
        "callback: {}",
        NOT_ALERT
      );
      return Ok(AlertOutcome::Skipped(NOT_ALERT.to_string()));
    }

    match self.run_alert(event, target).await {
      Ok(task_id) => Ok(AlertOutcome::Created(task_id)),
      Err(e) => {
        error!(
          nid = event.nid,
          node_path = %event.node_path,
          sname = %event.sname,
          error = %e,
          "callback failed"
        );
        Err(e)
      }
    }
  }

  async fn run_alert(&self, event: &AlertEvent, target: &AlertTarget) -> Result<i64, LifecycleError> {
    let host = target
      .host
      .as_deref()
      .map(str::trim)
      .filter(|h| !h.is_empty())
      .unwrap_or_else(|| event.endpoint.trim());
    if host.is_empty() {
      return Err(LifecycleError::InvalidInput("host is blank".to_string()));
    }

    if target.template_id == 0 {
      return Err(LifecycleError::InvalidInput("tplid is 0".to_string()));
    }

    let template = self
      .store()
      .get_template(target.template_id)
      .await?
      .ok_or_else(|| LifecycleError::NotFound(format!("tpl[id:{}]", target.template_id)))?;

    let username = run_as(&template.last_updator, &event.last_updator);
    let user: Principal = self
      .gate()
      .directory()
      .find_user(username)
      .await?
      .ok_or_else(|| LifecycleError::NotFound(format!("user:{}", username)))?;

    let hosts = vec![host.to_string()];
    self.gate().check(&hosts, &user, &template.account).await?;

    let task = NewTask {
      title: format!("{} by {}", template.title, event.sname),
      account: template.account,
      batch: template.batch,
      tolerance: template.tolerance,
      timeout: template.timeout,
      pause: template.pause,
      script: template.script,
      args: template.args,
      creator: user.username,
    };

    let meta = self.persist(&task, &hosts, ActionKind::Start).await?;
    Ok(meta.id)
  }
}

/// The template's last updater, or the strategy's when the template has none.
fn run_as<'a>(template_updator: &'a str, event_updator: &'a str) -> &'a str {
  match template_updator.trim() {
    "" => event_updator.trim(),
    name => name,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_is_problem() {
    let mut event = AlertEvent {
      event_type: "Alert".to_string(),
      ..Default::default()
    };
    assert!(event.is_problem());

    event.event_type = "problem".to_string();
    assert!(event.is_problem());

    event.event_type = "recovery".to_string();
    assert!(!event.is_problem());
  }

  #[test]
  fn test_run_as_prefers_template() {
    assert_eq!(run_as("alice", "ops"), "alice");
    assert_eq!(run_as(" ", "ops"), "ops");
  }

  #[test]
  fn test_event_from_partial_json() {
    let event: AlertEvent =
      serde_json::from_str(r#"{"sname":"cpu","endpoint":"h1","event_type":"alert","nid":4}"#)
        .unwrap();
    assert_eq!(event.nid, 4);
    assert!(event.users.is_empty());
  }
}
