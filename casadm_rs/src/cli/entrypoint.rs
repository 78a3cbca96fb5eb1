//! Process entry for the `casadm` binary.
//!
//! Order matters: configuration first (it names the audit file and the
//! engine state), then logging, then the catalogue and the parser.

use std::io::{self, Write};

use anyhow::Context as _;

use super::command::{Output, validate};
use super::parser;
use crate::audit;
use crate::commands::{self, Context, info};
use crate::config::CasadmConfig;
use crate::control::SimEngine;
use crate::interrupt;
use crate::logging;
use crate::terminal::TerminalEnv;
use crate::types::ExitStatus;

#[cfg(unix)]
fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    true
}

/// Parse the process arguments and run the selected command.
pub fn run() -> anyhow::Result<ExitStatus> {
    let config = CasadmConfig::load();
    logging::init();
    audit::set_audit_file(config.audit_log.clone());
    tracing::debug!(state = %config.state_path.display(), "configuration loaded");

    let mut app = info::app();
    app.privileged = !config.root_check_enabled() || running_as_root();
    app.system_logs = config.system_logs.clone();

    let commands = commands::catalogue();
    if cfg!(debug_assertions) {
        validate(&commands).context("command catalogue is inconsistent")?;
    }

    interrupt::install();

    let engine = SimEngine::open(&config.state_path);
    let mut ctx = Context::new(Box::new(engine), TerminalEnv::from_process());
    let args: Vec<String> = std::env::args().collect();

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let status = {
        let mut output = Output::new(&mut stdout, &mut stderr);
        parser::parse(&app, &commands, &args, &mut ctx, &mut output)
    };
    stdout.flush().context("flushing standard output")?;
    Ok(status)
}
