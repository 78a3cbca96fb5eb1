//! Audit trail of management operations.
//!
//! Records go to `tracing` on the `casadm::audit` target and, when an audit
//! file is configured, are appended to it with a timestamp. Failures never
//! reach the user.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::Level;

use crate::types::ExitStatus;

static AUDIT_FILE: Lazy<RwLock<Option<PathBuf>>> = Lazy::new(|| RwLock::new(None));

/// Direct records to `path` in addition to the tracing target.
pub fn set_audit_file(path: Option<PathBuf>) {
    if let Ok(mut slot) = AUDIT_FILE.write() {
        *slot = path;
    }
}

/// Append one audit record. Fire-and-forget.
pub fn record(level: Level, message: &str) {
    tracing::info!(target: "casadm::audit", severity = %level, "{message}");

    let path = AUDIT_FILE.read().ok().and_then(|p| p.clone());
    if let Some(path) = path
        && let Err(e) = append(&path, level, message)
    {
        tracing::debug!(error = %e, path = %path.display(), "audit append failed");
    }
}

fn append(path: &Path, level: Level, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let stamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
    writeln!(file, "{stamp} casadm[{}] {level}: {message}", std::process::id())
}

/// `Casadm invoked with: "...". Exit status is N (...). Command took S.CC s.`
pub fn invocation_message(args: &[String], status: ExitStatus, elapsed: Duration) -> String {
    let ms = elapsed.as_millis();
    format!(
        "Casadm invoked with: \"{}\". Exit status is {} ({}). Command took {}.{:02} s.",
        args.join(" "),
        status.code(),
        status.label(),
        ms / 1000,
        (ms % 1000) / 10
    )
}
