//! casadm - management utility for a block-device caching engine.
//!
//! The crate is split into a generic command-line grammar engine
//! ([`cli`]), a statistics rendering pipeline ([`stats`]) and the casadm
//! command catalogue built on both ([`commands`]). Commands talk to the
//! caching engine only through [`control::ControlChannel`].

pub mod audit;
pub mod cli;
pub mod colors;
pub mod commands;
pub mod config;
pub mod control;
pub mod csv;
pub mod interrupt;
pub mod logging;
pub mod stats;
pub mod terminal;
pub mod types;

pub use types::ExitStatus;
