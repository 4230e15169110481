//! Convoy Output
//!
//! Resolves the stdout/stderr captured for a task host. Depending on
//! [`OutputConfig::source`](convoy_config::OutputConfig) the output of a
//! single host is read from the persisted task host row or fetched from
//! the host that ran the script:
//!
//! ```text
//! GET http://<host>:<remote_port>/output/<task id>/stdout.json
//! ```
//!
//! Whole-task listings and the plain-text rendering always read the
//! persisted rows.

mod error;
mod retriever;

pub use error::OutputError;
pub use retriever::{HostOutput, OutputEntry, OutputRetriever, Stream, render_plain_text};
