//! Convoy Store
//!
//! This crate provides the storage trait and the SQLite implementation for
//! tasks and their control rows.
//!
//! The [`Store`] trait defines operations for:
//! - Creating a task together with its hosts and initial action
//! - Listing and counting tasks by creator, title and creation time
//! - Reading and conditionally updating the task action
//! - Updating task host rows and detecting task completion
//! - Reading script templates
//!
//! Writes that must observe "task still active" are single conditional
//! statements, so a concurrent completion can never be overwritten.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{
  ActionKind, HostStatus, NewTask, TaskAction, TaskHost, TaskMeta, TaskQuery, TaskTemplate,
  UnknownValue,
};

use std::collections::HashSet;

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for tasks, task actions, task hosts and templates.
#[async_trait]
pub trait Store: Send + Sync {
  /// Create a task, one pending host row per host and its action, atomically.
  async fn create_task(
    &self,
    task: &NewTask,
    hosts: &[String],
    action: ActionKind,
  ) -> Result<TaskMeta, StoreError>;

  /// Get a task by ID. `done` is left false.
  async fn get_task(&self, id: i64) -> Result<TaskMeta, StoreError>;

  /// Count tasks matching the filter, ignoring limit and offset.
  async fn count_tasks(&self, query: &TaskQuery) -> Result<i64, StoreError>;

  /// List a page of tasks matching the filter, newest first.
  async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskMeta>, StoreError>;

  /// Get the action of a task, `None` when the task is done.
  async fn get_action(&self, id: i64) -> Result<Option<TaskAction>, StoreError>;

  /// The subset of `ids` that still have an action row.
  async fn active_ids(&self, ids: &[i64]) -> Result<HashSet<i64>, StoreError>;

  /// Replace the action of an active task.
  ///
  /// `cancel` also moves pending hosts to cancelled and `kill` moves running
  /// hosts to killed, in the same transaction. Returns false when the task
  /// has no action row.
  async fn update_action(&self, id: i64, action: ActionKind) -> Result<bool, StoreError>;

  /// All host rows of a task, ordered by host.
  async fn list_hosts(&self, id: i64) -> Result<Vec<TaskHost>, StoreError>;

  /// One host row of a task.
  async fn get_host(&self, id: i64, host: &str) -> Result<Option<TaskHost>, StoreError>;

  /// Set a host's status, only while the task still has an action row.
  /// Returns false when nothing was written.
  async fn set_host_status(
    &self,
    id: i64,
    host: &str,
    status: HostStatus,
  ) -> Result<bool, StoreError>;

  /// Record status and captured output reported by the execution agent.
  /// Returns false when the host is not part of the task or the task is done.
  async fn report_host(
    &self,
    id: i64,
    host: &str,
    status: HostStatus,
    stdout: &str,
    stderr: &str,
  ) -> Result<bool, StoreError>;

  /// Delete the action row if every host is terminal. Returns whether the
  /// task is done afterwards.
  async fn finish_if_complete(&self, id: i64) -> Result<bool, StoreError>;

  /// Insert a template, returning its ID.
  async fn create_template(&self, template: &TaskTemplate) -> Result<i64, StoreError>;

  /// Get a template by ID.
  async fn get_template(&self, id: i64) -> Result<Option<TaskTemplate>, StoreError>;
}
