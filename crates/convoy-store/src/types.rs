use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Task-level control command.
///
/// The row holding it only exists while the task is active; a task with no
/// action is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ActionKind {
  Start,
  Pause,
  Cancel,
  Kill,
}

impl ActionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Start => "start",
      Self::Pause => "pause",
      Self::Cancel => "cancel",
      Self::Kill => "kill",
    }
  }
}

impl fmt::Display for ActionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ActionKind {
  type Err = UnknownValue;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "start" => Ok(Self::Start),
      "pause" => Ok(Self::Pause),
      "cancel" => Ok(Self::Cancel),
      "kill" => Ok(Self::Kill),
      _ => Err(UnknownValue {
        kind: "action",
        value: s.to_string(),
      }),
    }
  }
}

/// Status of one host within a task.
///
/// ```text
/// pending → running → success | failed | timeout
///
/// operator: any → killed, any → ignored, any → pending (redo)
/// task cancel: pending → cancelled
/// ```
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum HostStatus {
  Pending,
  Running,
  Success,
  Failed,
  Timeout,
  Killed,
  Cancelled,
  Ignored,
}

impl HostStatus {
  /// Statuses after which the execution agent no longer touches a host.
  pub const TERMINAL: [HostStatus; 6] = [
    Self::Success,
    Self::Failed,
    Self::Timeout,
    Self::Killed,
    Self::Cancelled,
    Self::Ignored,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Success => "success",
      Self::Failed => "failed",
      Self::Timeout => "timeout",
      Self::Killed => "killed",
      Self::Cancelled => "cancelled",
      Self::Ignored => "ignored",
    }
  }

  pub fn is_terminal(&self) -> bool {
    Self::TERMINAL.contains(self)
  }
}

impl fmt::Display for HostStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for HostStatus {
  type Err = UnknownValue;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(Self::Pending),
      "running" => Ok(Self::Running),
      "success" => Ok(Self::Success),
      "failed" => Ok(Self::Failed),
      "timeout" => Ok(Self::Timeout),
      "killed" => Ok(Self::Killed),
      "cancelled" => Ok(Self::Cancelled),
      "ignored" => Ok(Self::Ignored),
      _ => Err(UnknownValue {
        kind: "host status",
        value: s.to_string(),
      }),
    }
  }
}

/// A string that does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownValue {
  pub kind: &'static str,
  pub value: String,
}

/// A task as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskMeta {
  pub id: i64,
  pub title: String,
  /// Account the script runs as on every host.
  pub account: String,
  /// Hosts run at once, 0 means all.
  pub batch: i64,
  /// Failed hosts accepted before the agent stops the task.
  pub tolerance: i64,
  /// Per-host timeout in seconds.
  pub timeout: i64,
  /// Comma-separated hosts after which the agent pauses.
  pub pause: String,
  pub script: String,
  pub args: String,
  pub creator: String,
  pub created_at: DateTime<Utc>,
  /// Not a column: true when no task action row exists.
  #[sqlx(skip)]
  #[serde(default)]
  pub done: bool,
}

/// Fields of a task supplied at creation; the store assigns id and time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
  pub title: String,
  pub account: String,
  pub batch: i64,
  pub tolerance: i64,
  pub timeout: i64,
  pub pause: String,
  pub script: String,
  pub args: String,
  pub creator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskAction {
  pub id: i64,
  pub action: ActionKind,
  pub updated_at: DateTime<Utc>,
}

/// Per-host execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskHost {
  pub id: i64,
  pub host: String,
  pub status: HostStatus,
  pub stdout: String,
  pub stderr: String,
}

/// A reusable script definition, run by alert callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskTemplate {
  /// Ignored on insert.
  #[serde(default)]
  pub id: i64,
  pub title: String,
  pub account: String,
  #[serde(default)]
  pub batch: i64,
  #[serde(default)]
  pub tolerance: i64,
  #[serde(default)]
  pub timeout: i64,
  #[serde(default)]
  pub pause: String,
  pub script: String,
  #[serde(default)]
  pub args: String,
  /// User who last modified the template; alert-triggered tasks run on
  /// their behalf.
  pub last_updator: String,
}

/// Filter for listing and counting tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQuery {
  /// Restrict to tasks created by this user.
  pub creator: Option<String>,
  /// Whitespace-separated tokens, each must occur in the title.
  pub query: Option<String>,
  /// Only tasks created at or after this instant.
  pub since: DateTime<Utc>,
  pub limit: u32,
  pub offset: u32,
}
