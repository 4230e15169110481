//! Convoy task lifecycle.
//!
//! [`TaskLifecycleService`] owns every rule about a task once it is
//! submitted: validation, host authorization, the task-level action, per-host
//! operator commands, completion detection and alert-driven creation. Rows
//! live behind [`convoy_store::Store`]; scripts run in an external execution
//! agent reached through [`ExecutionAgent`].

mod agent;
mod callback;
mod error;
mod form;
mod service;

pub use agent::{ChannelAgent, ControlSignal, ExecutionAgent, NoopAgent};
pub use callback::{AlertEvent, AlertOutcome, AlertTarget, NOT_ALERT};
pub use error::LifecycleError;
pub use form::{
  CommandOutcome, HostCommand, HostReport, ListFilter, RESUME_HINT, TaskDetail, TaskForm,
  TaskPage, TaskState, clean_hosts,
};
pub use service::TaskLifecycleService;
