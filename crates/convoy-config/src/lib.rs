//! Convoy Config
//!
//! This crate contains the serializable configuration types for Convoy.
//! Every value the core needs from its deployment is modelled here and
//! injected into the component that uses it at construction time:
//!
//! - [`OutputConfig`] selects where captured stdout/stderr is read from
//! - [`PrivilegeConfig`] maps run-as accounts to the privilege operation a
//!   principal must hold on every target host
//! - [`ListDefaults`] holds the paging and lookback defaults for task listing
//!
//! Configuration is loaded from a JSON file by the CLI; a missing file
//! yields [`ServiceConfig::default`].

mod error;
mod output;
mod privilege;
mod service;

pub use error::ConfigError;
pub use output::{OutputConfig, OutputSource};
pub use privilege::PrivilegeConfig;
pub use service::{ListDefaults, ServiceConfig};
