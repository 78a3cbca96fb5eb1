//! `--zero-metadata`: wipe cache metadata from a device that is not in use.

use std::fs::File;

use super::Context;
use crate::cli::command::{OptionSpec, Output, ParseState};
use crate::control::{ControlExt, Request};
use crate::types::ExitStatus;

pub const ZERO_METADATA_OPTIONS: &[OptionSpec] = &[OptionSpec::new(
    'd',
    "device",
    "Path to device on which metadata would be cleared",
)
.arg("DEVICE")
.required()];

pub fn handle_zero_metadata(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let Some(device) = ctx.args.device.clone() else {
        return ExitStatus::Failure;
    };
    let shown = device.display();

    if File::open(&device).is_err() {
        output.error(format_args!("Device '{shown}' not found."));
        return ExitStatus::Failure;
    }

    let check = match ctx.channel.check_device(device.clone()) {
        Ok(check) => check,
        Err(e) => {
            output.error(e);
            return ExitStatus::Failure;
        }
    };
    if check.in_use {
        output.error(format_args!(
            "Cache device '{shown}' is already used as cache. Please stop cache to clear metadata."
        ));
        return ExitStatus::Failure;
    }
    if !check.is_cache_device {
        output.error(format_args!("Device '{shown}' does not contain OpenCAS's metadata."));
        return ExitStatus::Failure;
    }

    match ctx.channel.run(Request::ZeroMetadata { device: device.clone() }) {
        Ok(()) => {
            output.say(format_args!("OpenCAS's metadata wiped succesfully from device '{shown}'."));
            ExitStatus::Success
        }
        Err(e) => {
            tracing::debug!(error = %e, "zero metadata failed");
            output.error(format_args!("Error while wiping out metadata from device '{shown}'."));
            ExitStatus::Failure
        }
    }
}
