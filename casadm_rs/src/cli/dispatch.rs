//! Timed execution of a parsed command.
//!
//! After the handler returns, the invocation is written to the audit log and,
//! on failure, a system log appended to during the run is scanned for kernel
//! messages from the cache module. That scan is a substring heuristic: any
//! new line mentioning both `CAS` and `kernel` triggers the hint.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::Level;

use super::command::{App, CommandFlags, CommandSpec, Output, ParseState};
use crate::audit;
use crate::types::ExitStatus;

/// End offset of the first readable system log, taken before the run.
struct SyslogWatch {
    path: PathBuf,
    reader: BufReader<File>,
}

impl SyslogWatch {
    fn open(candidates: &[PathBuf]) -> Option<Self> {
        candidates.iter().find_map(|path| {
            let mut file = File::open(path).ok()?;
            file.seek(SeekFrom::End(0)).ok()?;
            Some(Self {
                path: path.clone(),
                reader: BufReader::new(file),
            })
        })
    }

    /// Whether lines written since `open` mention the cache kernel module.
    fn kernel_said_anything(mut self) -> (PathBuf, bool) {
        let mut said = false;
        let mut line = Vec::new();
        loop {
            line.clear();
            match self.reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    if text.contains("CAS") && text.contains("kernel") {
                        said = true;
                    }
                }
            }
        }
        (self.path, said)
    }
}

fn syslog_hint(path: &Path) -> String {
    format!("Error occurred, please see syslog ({}) for details. ", path.display())
}

/// Run `cmd.handle`, audit the invocation and report kernel-side errors.
pub fn run_command<C>(
    app: &App,
    cmd: &CommandSpec<C>,
    args: &[String],
    ctx: &mut C,
    state: &ParseState<'_>,
    output: &mut Output<'_>,
) -> ExitStatus {
    let watch = SyslogWatch::open(&app.system_logs);
    let started = Instant::now();

    let status = (cmd.handle)(ctx, state, output);
    let elapsed = started.elapsed();
    tracing::debug!(command = cmd.name, ?status, ?elapsed, "command finished");

    if !cmd.is(CommandFlags::SKIP_AUDIT) {
        audit::record(Level::DEBUG, &audit::invocation_message(args, status, elapsed));
    }

    if status == ExitStatus::Failure
        && let Some(watch) = watch
    {
        let (path, said) = watch.kernel_said_anything();
        if said {
            output.error(syslog_hint(&path));
        }
    }

    status
}
