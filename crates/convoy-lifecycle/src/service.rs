//! The task lifecycle service.
//!
//! Every mutating operation follows the same order: load the task, make sure
//! it still has an action, authorize, then write. Authorization happens
//! before the first write, so a rejected command changes nothing. The write
//! itself is conditional on the action row still existing, so a task that
//! completes concurrently is never revived.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use convoy_auth::{Directory, PermissionGate, Principal, PrivilegeMap};
use convoy_config::{ListDefaults, ServiceConfig};
use convoy_output::{HostOutput, OutputEntry, OutputRetriever, Stream};
use convoy_store::{ActionKind, HostStatus, NewTask, Store, TaskHost, TaskMeta, TaskQuery};
use tracing::{info, instrument, warn};

use crate::agent::{ControlSignal, ExecutionAgent, NoopAgent};
use crate::form::{
  CommandOutcome, HostCommand, HostReport, ListFilter, RESUME_HINT, TaskDetail, TaskForm,
  TaskPage, TaskState,
};
use crate::LifecycleError;

/// Coordinates task creation, listing, operator control and completion.
///
/// Generic over `A: ExecutionAgent` so callers choose how control signals
/// reach the execution agent. Use `TaskLifecycleService::new()` to discard
/// them, or `with_agent()` to forward them.
pub struct TaskLifecycleService<A: ExecutionAgent = NoopAgent> {
  store: Arc<dyn Store>,
  gate: PermissionGate,
  output: OutputRetriever,
  list_defaults: ListDefaults,
  agent: A,
}

impl TaskLifecycleService<NoopAgent> {
  pub fn new(
    store: Arc<dyn Store>,
    gate: PermissionGate,
    output: OutputRetriever,
    list_defaults: ListDefaults,
  ) -> Self {
    Self::with_agent(store, gate, output, list_defaults, NoopAgent)
  }
}

impl<A: ExecutionAgent> TaskLifecycleService<A> {
  pub fn with_agent(
    store: Arc<dyn Store>,
    gate: PermissionGate,
    output: OutputRetriever,
    list_defaults: ListDefaults,
    agent: A,
  ) -> Self {
    Self {
      store,
      gate,
      output,
      list_defaults,
      agent,
    }
  }

  /// Build a service from a validated deployment configuration.
  pub fn from_config(
    config: &ServiceConfig,
    store: Arc<dyn Store>,
    directory: Arc<dyn Directory>,
    agent: A,
  ) -> Result<Self, LifecycleError> {
    config.validate()?;
    let privileges = PrivilegeMap::from_config(&config.privileges)?;
    let gate = PermissionGate::new(directory, privileges);
    let output = OutputRetriever::new(Arc::clone(&store), config.output.clone())?;

    Ok(Self::with_agent(
      store,
      gate,
      output,
      config.list.clone(),
      agent,
    ))
  }

  pub fn store(&self) -> &Arc<dyn Store> {
    &self.store
  }

  pub fn gate(&self) -> &PermissionGate {
    &self.gate
  }

  pub fn agent(&self) -> &A {
    &self.agent
  }

  // -------------------------------------------------------------------------
  // Creation and queries
  // -------------------------------------------------------------------------

  /// Validate, authorize and persist a new task.
  #[instrument(name = "task_create", skip(self, form, principal), fields(username = %principal.username))]
  pub async fn create(
    &self,
    form: &TaskForm,
    principal: &Principal,
  ) -> Result<TaskMeta, LifecycleError> {
    let (hosts, action) = form.validate()?;
    self.gate.check(&hosts, principal, form.account.trim()).await?;
    self
      .persist(&form.to_new_task(&principal.username), &hosts, action)
      .await
  }

  pub(crate) async fn persist(
    &self,
    task: &NewTask,
    hosts: &[String],
    action: ActionKind,
  ) -> Result<TaskMeta, LifecycleError> {
    let meta = self.store.create_task(task, hosts, action).await?;

    info!(
      task_id = meta.id,
      creator = %meta.creator,
      account = %meta.account,
      hosts = hosts.len(),
      action = %action,
      "task created"
    );

    self.agent.signal(ControlSignal::Dispatch { task_id: meta.id });
    Ok(meta)
  }

  /// A page of tasks with `done` filled in.
  pub async fn list(
    &self,
    principal: &Principal,
    filter: &ListFilter,
  ) -> Result<TaskPage, LifecycleError> {
    let days = filter.days.unwrap_or(self.list_defaults.days);
    let query = TaskQuery {
      creator: filter.mine.then(|| principal.username.clone()),
      query: filter.query.clone().filter(|q| !q.trim().is_empty()),
      since: lookback_start(days),
      limit: filter.limit.unwrap_or(self.list_defaults.limit),
      offset: filter.offset.unwrap_or(0),
    };

    let total = self.store.count_tasks(&query).await?;
    let mut list = self.store.list_tasks(&query).await?;

    let ids: Vec<i64> = list.iter().map(|t| t.id).collect();
    let active = self.store.active_ids(&ids).await?;
    for task in &mut list {
      task.done = !active.contains(&task.id);
    }

    Ok(TaskPage { total, list })
  }

  /// A task with its hosts and current action.
  pub async fn view(&self, task_id: i64) -> Result<TaskDetail, LifecycleError> {
    let mut meta = self.store.get_task(task_id).await?;
    let hosts = self.store.list_hosts(task_id).await?;
    let action = self.store.get_action(task_id).await?.map(|a| a.action);
    meta.done = action.is_none();

    Ok(TaskDetail {
      meta,
      hosts,
      action,
    })
  }

  /// `done`, or the current action.
  pub async fn current_state(&self, task_id: i64) -> Result<TaskState, LifecycleError> {
    self.store.get_task(task_id).await?;
    Ok(match self.store.get_action(task_id).await? {
      Some(action) => TaskState::Active(action.action),
      None => TaskState::Done,
    })
  }

  /// Hosts of a task grouped by status. Every host appears exactly once.
  pub async fn aggregate_status(
    &self,
    task_id: i64,
  ) -> Result<BTreeMap<HostStatus, BTreeSet<String>>, LifecycleError> {
    self.store.get_task(task_id).await?;

    let mut groups: BTreeMap<HostStatus, BTreeSet<String>> = BTreeMap::new();
    for host in self.store.list_hosts(task_id).await? {
      groups.entry(host.status).or_default().insert(host.host);
    }
    Ok(groups)
  }

  /// The full row of one host.
  pub async fn host_record(&self, task_id: i64, host: &str) -> Result<TaskHost, LifecycleError> {
    self.store.get_task(task_id).await?;
    self
      .store
      .get_host(task_id, host)
      .await?
      .ok_or_else(|| LifecycleError::NotFound(format!("task: {}, host({})", task_id, host)))
  }

  // -------------------------------------------------------------------------
  // Operator control
  // -------------------------------------------------------------------------

  /// Change the task-level action.
  #[instrument(name = "task_action", skip(self, principal), fields(username = %principal.username))]
  pub async fn set_action(
    &self,
    task_id: i64,
    principal: &Principal,
    action: ActionKind,
  ) -> Result<(), LifecycleError> {
    let meta = self.store.get_task(task_id).await?;
    self.require_active(task_id).await?;

    if meta.creator != principal.username {
      let hosts: Vec<String> = self
        .store
        .list_hosts(task_id)
        .await?
        .into_iter()
        .map(|h| h.host)
        .collect();
      self.gate.check(&hosts, principal, &meta.account).await?;
    }

    if !self.store.update_action(task_id, action).await? {
      return Err(LifecycleError::AlreadyFinished(task_id));
    }

    info!(task_id, action = %action, "task action updated");
    self.agent.signal(ControlSignal::Action { task_id, action });
    Ok(())
  }

  /// Ignore, kill or redo one host of an active task.
  #[instrument(name = "task_host", skip(self, principal), fields(username = %principal.username))]
  pub async fn host_command(
    &self,
    task_id: i64,
    principal: &Principal,
    host: &str,
    command: HostCommand,
  ) -> Result<CommandOutcome, LifecycleError> {
    let meta = self.store.get_task(task_id).await?;
    self.require_active(task_id).await?;

    if self.store.get_host(task_id, host).await?.is_none() {
      return Err(LifecycleError::NotFound(format!(
        "task: {}, host({})",
        task_id, host
      )));
    }

    if meta.creator != principal.username {
      self
        .gate
        .check(&[host.to_string()], principal, &meta.account)
        .await?;
    }

    let status = command.target_status();
    if !self.store.set_host_status(task_id, host, status).await? {
      return Err(LifecycleError::AlreadyFinished(task_id));
    }

    info!(task_id, host = %host, status = %status, "host status forced");

    let mut outcome = CommandOutcome::default();
    match command {
      HostCommand::Ignore => {
        let action = self.store.get_action(task_id).await?;
        if matches!(action, Some(a) if a.action == ActionKind::Pause) {
          outcome.hint = Some(RESUME_HINT.to_string());
        }
      }
      HostCommand::Kill => self.agent.signal(ControlSignal::Kill {
        task_id,
        host: host.to_string(),
      }),
      HostCommand::Redo => self.agent.signal(ControlSignal::Redo {
        task_id,
        host: host.to_string(),
      }),
    }

    Ok(outcome)
  }

  async fn require_active(&self, task_id: i64) -> Result<ActionKind, LifecycleError> {
    match self.store.get_action(task_id).await? {
      Some(action) => Ok(action.action),
      None => {
        warn!(task_id, "command on finished task");
        Err(LifecycleError::AlreadyFinished(task_id))
      }
    }
  }

  // -------------------------------------------------------------------------
  // Execution agent reports
  // -------------------------------------------------------------------------

  /// Record host progress from the execution agent, then detect completion.
  /// Returns whether the task is done afterwards.
  pub async fn report_host(&self, report: &HostReport) -> Result<bool, LifecycleError> {
    self.store.get_task(report.task_id).await?;
    self.require_active(report.task_id).await?;

    let written = self
      .store
      .report_host(
        report.task_id,
        &report.host,
        report.status,
        &report.stdout,
        &report.stderr,
      )
      .await?;
    if !written {
      // The task may have completed since the check above
      if self.store.get_action(report.task_id).await?.is_none() {
        return Err(LifecycleError::AlreadyFinished(report.task_id));
      }
      return Err(LifecycleError::NotFound(format!(
        "task: {}, host({})",
        report.task_id, report.host
      )));
    }

    self.complete_if_finished(report.task_id).await
  }

  /// Clear the task action once every host is terminal.
  pub async fn complete_if_finished(&self, task_id: i64) -> Result<bool, LifecycleError> {
    self.store.get_task(task_id).await?;
    let done = self.store.finish_if_complete(task_id).await?;
    if done {
      info!(task_id, "task done");
    }
    Ok(done)
  }

  // -------------------------------------------------------------------------
  // Output
  // -------------------------------------------------------------------------

  /// Output of one host from the configured source.
  pub async fn host_output(
    &self,
    task_id: i64,
    host: &str,
    stream: Stream,
  ) -> Result<HostOutput, LifecycleError> {
    self.store.get_task(task_id).await?;
    Ok(self.output.host_output(task_id, host, stream).await?)
  }

  /// Persisted output of every host, or only `host`.
  pub async fn output_entries(
    &self,
    task_id: i64,
    host: Option<&str>,
    stream: Stream,
  ) -> Result<Vec<OutputEntry>, LifecycleError> {
    self.store.get_task(task_id).await?;
    Ok(self.output.entries(task_id, host, stream).await?)
  }

  /// Persisted output of every host as plain text.
  pub async fn output_text(&self, task_id: i64, stream: Stream) -> Result<String, LifecycleError> {
    self.store.get_task(task_id).await?;
    Ok(self.output.plain_text(task_id, stream).await?)
  }
}

/// Start of a lookback window of `days`. Windows reaching before the Unix
/// epoch are clamped to it.
fn lookback_start(days: u32) -> DateTime<Utc> {
  let epoch = DateTime::<Utc>::UNIX_EPOCH;
  Duration::try_days(i64::from(days))
    .and_then(|window| Utc::now().checked_sub_signed(window))
    .map_or(epoch, |since| since.max(epoch))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_lookback_start() {
    let week = lookback_start(7);
    let expected = Utc::now() - Duration::days(7);
    assert!((expected - week).num_seconds().abs() < 5);

    assert_eq!(lookback_start(u32::MAX), DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(lookback_start(1_000_000), DateTime::<Utc>::UNIX_EPOCH);
  }
}
