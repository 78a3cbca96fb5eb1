//! `--version` and `--help`.

use super::{Context, OUTPUT_FORMAT, catalogue, render_with};
use crate::cli::command::{App, OptionSpec, Output, ParseState};
use crate::cli::{help, parser};
use crate::control::ControlExt;
use crate::stats::{FORMATTING_FAILED, Format, Tag};
use crate::types::ExitStatus;

pub const APP_NAME: &str = "casadm";
pub const APP_TITLE: &str = "Open CAS Management Utility";
const PRODUCT: &str = "Open CAS";
const NOT_LOADED: &str = "Not Loaded";

pub const VERSION_OPTIONS: &[OptionSpec] = &[OUTPUT_FORMAT];

/// Program description shared by the entrypoint and `--help`.
pub fn app() -> App {
    App::new(APP_NAME, APP_TITLE)
}

pub fn handle_version(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let format = Format::for_output(ctx.args.output_format, true);
    render_with(ctx, output, format, FORMATTING_FAILED, |channel, w| {
        let versions = channel.module_versions().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "module versions unavailable");
            Default::default()
        });
        w.table_header(&["Name", "Version"]);
        let rows = [
            ("Cache Kernel Module", versions.cache.as_deref().unwrap_or(NOT_LOADED)),
            ("Disk Kernel Module", versions.disk.as_deref().unwrap_or(NOT_LOADED)),
            ("CLI Utility", env!("CARGO_PKG_VERSION")),
        ];
        for (name, version) in rows {
            let name = format!("{PRODUCT} {name}");
            w.row(Tag::TableRow, [name.as_str(), version]);
        }
        Ok(())
    })
}

pub fn handle_help(_: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let commands = catalogue();
    let hidden = parser::configure_commands(&commands);
    match help::print_help(&mut output.out, &app(), &commands, &hidden) {
        Ok(()) => ExitStatus::Success,
        Err(e) => {
            tracing::debug!(error = %e, "help output failed");
            ExitStatus::Failure
        }
    }
}
