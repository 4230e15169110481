use std::collections::HashSet;
use std::fmt;

use convoy_store::{ActionKind, HostStatus, NewTask, TaskHost, TaskMeta};
use serde::{Deserialize, Serialize, Serializer};

use crate::LifecycleError;

/// Hint returned when a host is ignored while its task is paused.
pub const RESUME_HINT: &str = "you can click start to run the task";

/// A task submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskForm {
  pub title: String,
  pub account: String,
  pub batch: i64,
  pub tolerance: i64,
  pub timeout: i64,
  pub pause: String,
  pub script: String,
  pub args: String,
  /// Initial action, `start` when omitted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub action: Option<ActionKind>,
  pub hosts: Vec<String>,
}

impl TaskForm {
  /// Validate the submission and return its cleaned host list and initial
  /// action.
  pub(crate) fn validate(&self) -> Result<(Vec<String>, ActionKind), LifecycleError> {
    let hosts = clean_hosts(&self.hosts);
    if hosts.is_empty() {
      return Err(LifecycleError::InvalidInput("hosts empty".to_string()));
    }

    if self.account.trim().is_empty() {
      return Err(LifecycleError::InvalidInput("account blank".to_string()));
    }

    if self.script.trim().is_empty() {
      return Err(LifecycleError::InvalidInput("script blank".to_string()));
    }

    for (name, value) in [
      ("batch", self.batch),
      ("tolerance", self.tolerance),
      ("timeout", self.timeout),
    ] {
      if value < 0 {
        return Err(LifecycleError::InvalidInput(format!(
          "{} must not be negative",
          name
        )));
      }
    }

    let action = match self.action.unwrap_or(ActionKind::Start) {
      action @ (ActionKind::Start | ActionKind::Pause) => action,
      other => {
        return Err(LifecycleError::InvalidInput(format!(
          "initial action must be start or pause, got {}",
          other
        )));
      }
    };

    Ok((hosts, action))
  }

  pub(crate) fn to_new_task(&self, creator: &str) -> NewTask {
    NewTask {
      title: self.title.clone(),
      account: self.account.trim().to_string(),
      batch: self.batch,
      tolerance: self.tolerance,
      timeout: self.timeout,
      pause: self.pause.clone(),
      script: self.script.clone(),
      args: self.args.clone(),
      creator: creator.to_string(),
    }
  }
}

/// Trim host identifiers, drop blanks and duplicates, keep first-seen order.
pub fn clean_hosts(hosts: &[String]) -> Vec<String> {
  let mut seen = HashSet::new();
  hosts
    .iter()
    .map(|h| h.trim())
    .filter(|h| !h.is_empty())
    .filter(|h| seen.insert(h.to_string()))
    .map(str::to_string)
    .collect()
}

/// Filters for listing tasks. Unset values take the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
  pub query: Option<String>,
  /// Only tasks created by the caller.
  pub mine: bool,
  /// Lookback window in days.
  pub days: Option<u32>,
  pub limit: Option<u32>,
  pub offset: Option<u32>,
}

/// One page of tasks plus the total matching count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskPage {
  pub total: i64,
  pub list: Vec<TaskMeta>,
}

/// A task with its hosts and current action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDetail {
  pub meta: TaskMeta,
  pub hosts: Vec<TaskHost>,
  /// `None` once the task is done.
  pub action: Option<ActionKind>,
}

/// Derived task-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
  Done,
  Active(ActionKind),
}

impl fmt::Display for TaskState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Done => f.write_str("done"),
      Self::Active(action) => f.write_str(action.as_str()),
    }
  }
}

impl Serialize for TaskState {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// Operator command on a single host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
  Ignore,
  Kill,
  Redo,
}

impl HostCommand {
  /// Status the host row is forced to.
  pub fn target_status(&self) -> HostStatus {
    match self {
      Self::Ignore => HostStatus::Ignored,
      Self::Kill => HostStatus::Killed,
      Self::Redo => HostStatus::Pending,
    }
  }
}

impl std::str::FromStr for HostCommand {
  type Err = LifecycleError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "ignore" => Ok(Self::Ignore),
      "kill" => Ok(Self::Kill),
      "redo" => Ok(Self::Redo),
      other => Err(LifecycleError::InvalidInput(format!(
        "unknown host action: {}",
        other
      ))),
    }
  }
}

/// Result of a host command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hint: Option<String>,
}

/// Progress reported by the execution agent for one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostReport {
  pub task_id: i64,
  pub host: String,
  pub status: HostStatus,
  #[serde(default)]
  pub stdout: String,
  #[serde(default)]
  pub stderr: String,
}
