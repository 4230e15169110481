//! Convoy Auth
//!
//! Permission checks run before any task or host state changes. The
//! [`PermissionGate`] answers one question: may this principal run scripts
//! as this account on every one of these hosts?
//!
//! Identity, host resolution and privilege grants live outside Convoy and
//! are reached through the [`Directory`] trait. [`StaticDirectory`] is an
//! in-memory implementation loaded from JSON, used by the CLI and tests.

mod directory;
mod error;
mod gate;
mod principal;
mod privilege;

pub use directory::{Directory, DirectoryFile, GrantEntry, StaticDirectory, UserEntry};
pub use error::{DirectoryError, PermissionError};
pub use gate::PermissionGate;
pub use principal::Principal;
pub use privilege::{AccountClass, PrivilegeMap};
