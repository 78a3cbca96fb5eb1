//! Command-line parser for `casadm --<command> [option...]` invocations.
//!
//! # Module Structure
//!
//! - [`core`] - the parse/validate/dispatch sequence
//! - [`helpers`] - token shape checks, argument counting, suggestions
//!
//! # Usage
//!
//! ```ignore
//! use casadm::cli::command::{App, Output};
//! use casadm::cli::parser::parse;
//!
//! let args: Vec<String> = std::env::args().collect();
//! let mut output = Output::new(&mut stdout, &mut stderr);
//! let status = parse(&app, &commands, &args, &mut ctx, &mut output);
//! std::process::exit(status.code());
//! ```

mod core;
mod helpers;

pub use core::{configure_commands, parse};
pub use helpers::{args_is, count_arg_params, is_help, is_option_shaped, suggest_similar_command};
