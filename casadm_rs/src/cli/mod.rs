//! casadm command-line front end.
//!
//! # Module Structure
//!
//! - [`command`] - declarative option, namespace and command model
//! - [`parser`] - `casadm --<command> [option...]` grammar and dispatch
//! - [`help`] - generated help output
//! - [`dispatch`] - timed handler execution and audit records
//! - [`entrypoint`] - process entry shared by the binary

pub mod command;
pub mod dispatch;
pub mod entrypoint;
pub mod help;
pub mod parser;
