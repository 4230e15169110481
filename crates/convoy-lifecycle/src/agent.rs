//! Signals sent to the execution agent.
//!
//! The agent that runs scripts on hosts lives outside Convoy. The service
//! tells it about new tasks and out-of-band operator commands through an
//! [`ExecutionAgent`]; the agent reports results back through
//! [`TaskLifecycleService::report_host`](crate::TaskLifecycleService::report_host).

use convoy_store::ActionKind;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Commands forwarded to the execution agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlSignal {
  /// A task was created and its hosts are waiting.
  Dispatch { task_id: i64 },

  /// The task-level action changed.
  Action { task_id: i64, action: ActionKind },

  /// Terminate the in-flight run on one host.
  Kill { task_id: i64, host: String },

  /// Run the script on one host again.
  Redo { task_id: i64, host: String },
}

/// Receiver of control signals.
///
/// Called after the corresponding row change is committed. Implementations
/// must not block.
pub trait ExecutionAgent: Send + Sync {
  fn signal(&self, signal: ControlSignal);
}

/// An agent that discards all signals.
///
/// Suitable when the execution agent polls the task rows itself.
#[derive(Debug, Clone, Default)]
pub struct NoopAgent;

impl ExecutionAgent for NoopAgent {
  fn signal(&self, _signal: ControlSignal) {}
}

/// An agent that forwards signals to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelAgent {
  sender: mpsc::UnboundedSender<ControlSignal>,
}

impl ChannelAgent {
  pub fn new(sender: mpsc::UnboundedSender<ControlSignal>) -> Self {
    Self { sender }
  }
}

impl ExecutionAgent for ChannelAgent {
  fn signal(&self, signal: ControlSignal) {
    // Receiver may have been dropped
    let _ = self.sender.send(signal);
  }
}
