//! Cache instance lifecycle: start, stop, cache mode and flushing.

use std::fs::File;

use super::{
    CACHE_ID_DESC, CACHE_ID_REQUIRED, Context, DIRTY_FLUSHING_WARNING, common_option, first,
    parse_cache_mode, parse_power_of_two,
};
use crate::cli::command::{OptionSpec, Output, ParseState};
use crate::control::{
    CacheInit, CacheState, ControlError, ControlExt, ErrorCode, Request, Response, StartCache,
    first_free_cache_id,
};
use crate::interrupt::run_interruptible;
use crate::types::{CacheMode, ExitStatus};

pub const DEFAULT_LINE_SIZE_KIB: u32 = 4;
const LINE_SIZE_MIN_KIB: u64 = 4;
const LINE_SIZE_MAX_KIB: u64 = 64;

pub const START_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new('d', "cache-device", "Caching device to be used")
        .arg("DEVICE")
        .required(),
    OptionSpec::new(
        'i',
        "cache-id",
        "Identifier of cache instance <1-16384> (if not provided, the first available number will be used)",
    )
    .arg("ID"),
    OptionSpec::new(
        'l',
        "load",
        "Load cache metadata from caching device (DANGEROUS - see manual or Admin Guide for details)",
    ),
    OptionSpec::new('f', "force", "Force the creation of cache instance"),
    OptionSpec::new(
        'c',
        "cache-mode",
        "Set cache mode from available: {wt|wb|wa|pt|wi|wo} Write-Through, Write-Back, Write-Around, \
         Pass-Through, Write-Invalidate, Write-Only; without this parameter Write-Through will be set by default",
    )
    .arg("NAME"),
    OptionSpec::new(
        'x',
        "cache-line-size",
        "Set cache line size in kibibytes: {4,8,16,32,64}[KiB] (default: %d)",
    )
    .arg("NUMBER")
    .default_value(DEFAULT_LINE_SIZE_KIB as i64),
];

pub const STOP_OPTIONS: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    OptionSpec::new('n', "no-data-flush", "Do not flush dirty data (may be dangerous)"),
];

pub const SET_MODE_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new('c', "cache-mode", "Cache mode. Available cache modes: {wt|wb|wa|pt|wi|wo}")
        .arg("NAME")
        .required(),
    OptionSpec::new('i', "cache-id", CACHE_ID_DESC).arg("ID").required(),
    OptionSpec::new(
        'f',
        "flush-cache",
        "Flush all dirty data from cache before switching to new mode. \
         Option is required when switching from Write-Back or Write-Only mode",
    )
    .arg("yes|no"),
];

pub const FLUSH_OPTIONS: &[OptionSpec] = &[CACHE_ID_REQUIRED];

const INCOMPLETE_WARNING: &str = "WARNING: Cache is in incomplete state - at least one core is inactive";
const STOP_INTERRUPTED: &str = "You have interrupted stopping of cache. CAS continues\n\
     to operate normally. If you want to stop cache without fully\n\
     flushing dirty data, use '-n' option.";
const SET_MODE_INTERRUPTED: &str = "Interrupted flushing of dirty data. Software prevented switching\n\
     of cache mode. If you want to switch cache mode immediately, use\n\
     '--flush-cache no' parameter.";

pub fn start_option(ctx: &mut Context, opt: &str, args: &[String]) -> Result<(), String> {
    let value = first(args);
    match opt {
        "force" => ctx.args.force = true,
        "load" => ctx.args.load = true,
        "cache-mode" => ctx.args.cache_mode = Some(parse_cache_mode(value)?),
        "cache-line-size" => {
            let kib = parse_power_of_two(value, "cache line size", LINE_SIZE_MIN_KIB, LINE_SIZE_MAX_KIB)?;
            ctx.args.line_size_kib = kib as u32;
        }
        _ => return common_option(ctx, opt, args),
    }
    Ok(())
}

pub fn set_mode_option(ctx: &mut Context, opt: &str, args: &[String]) -> Result<(), String> {
    let value = first(args);
    match opt {
        "cache-mode" => ctx.args.cache_mode = Some(parse_cache_mode(value)?),
        "flush-cache" => {
            ctx.args.flush_cache = Some(match value {
                "yes" => true,
                "no" => false,
                _ => return Err("Error: 'yes' or 'no' required as an argument for -f option.".to_string()),
            });
        }
        _ => return common_option(ctx, opt, args),
    }
    Ok(())
}

pub fn handle_start(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let args = ctx.args.clone();
    if args.load && args.force {
        output.error("Use of 'load' and 'force' simultaneously is forbidden.");
        return ExitStatus::Failure;
    }
    let Some(device) = args.device else {
        return ExitStatus::Failure;
    };
    if let Err(e) = File::open(&device) {
        tracing::debug!(error = %e, device = %device.display(), "cache device not accessible");
        output.error(format_args!("Couldn't open cache device {}.", device.display()));
        return ExitStatus::Failure;
    }

    let init = if args.load { CacheInit::Load } else { CacheInit::New };
    let cache_id = match (args.cache_id, init) {
        (None, CacheInit::New) => ctx
            .channel
            .list()
            .ok()
            .map(|listing| first_free_cache_id(listing.caches.iter().map(|c| c.cache.id))),
        (id, _) => id,
    };

    let request = Request::StartCache(StartCache {
        cache_id,
        device: device.clone(),
        init,
        mode: args.cache_mode.unwrap_or(CacheMode::Wt),
        line_size_kib: args.line_size_kib,
        force: args.force,
    });
    let started = match ctx.channel.execute(request) {
        Ok(Response::Started { cache_id }) => cache_id,
        Ok(_) => return ExitStatus::Failure,
        Err(e) => {
            output.error(format_args!("Error inserting cache {}", cache_id.unwrap_or(0)));
            let already_cache = e.code() == Some(ErrorCode::NotOpenExc)
                && ctx
                    .channel
                    .check_device(device.clone())
                    .is_ok_and(|check| check.is_cache_device && check.in_use);
            if already_cache {
                output.error(format_args!(
                    "Cache device '{}' is already used as cache.",
                    device.display()
                ));
            } else {
                output.error(e);
            }
            return ExitStatus::Failure;
        }
    };

    match ctx.channel.cache_info(started) {
        Ok(info) => {
            if info.state.contains(CacheState::INCOMPLETE) {
                output.error(INCOMPLETE_WARNING);
            }
            output.say(format_args!("Successfully added cache instance {started}"));
            ExitStatus::Success
        }
        Err(e) => {
            tracing::debug!(error = %e, cache_id = started, "started cache vanished");
            output.error("Failed to start cache");
            ExitStatus::Failure
        }
    }
}

pub fn handle_stop(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let cache_id = ctx.cache_id();
    let request = Request::StopCache {
        cache_id,
        flush: ctx.args.flush_data,
    };
    match run_interruptible(ctx.channel.as_mut(), request, "Stopping cache") {
        Ok(_) => ExitStatus::Success,
        Err(e) if e.is_interrupted() => {
            output.error(STOP_INTERRUPTED);
            ExitStatus::Interrupted
        }
        Err(e) => {
            output.error(format_args!("Error while removing cache {cache_id}"));
            output.error(e);
            ExitStatus::Failure
        }
    }
}

pub fn handle_set_mode(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let cache_id = ctx.cache_id();
    let Some(mode) = ctx.args.cache_mode else {
        return ExitStatus::Failure;
    };
    let previous = match ctx.channel.cache_info(cache_id) {
        Ok(info) => info.mode,
        Err(e) => {
            tracing::debug!(error = %e, cache_id, "cache mode lookup failed");
            output.error("Error while retrieving cache properties.");
            return ExitStatus::Failure;
        }
    };

    let flush_required = previous.is_lazy_write() && !mode.is_lazy_write();
    let flush = match ctx.args.flush_cache {
        Some(flush) => flush,
        None if flush_required => {
            output.error("Error: Required parameter (‘--flush-cache’) was not specified.");
            return ExitStatus::Failure;
        }
        None => false,
    };

    if flush_required {
        if flush {
            output.say("CAS is currently flushing dirty data to primary storage devices.");
        } else {
            output.say(format_args!(
                "CAS is currently migrating from {} to {} mode.\n\
                 Dirty data are being flushed to primary storage device in background.\n\
                 Please find flushing progress via statistics command (‘casadm -P’).",
                previous.long_name(),
                mode.long_name()
            ));
        }
    }

    let request = Request::SetCacheMode { cache_id, mode, flush };
    match run_interruptible(ctx.channel.as_mut(), request, "Setting mode") {
        Ok(_) => ExitStatus::Success,
        Err(e) if e.is_interrupted() => {
            output.error(SET_MODE_INTERRUPTED);
            ExitStatus::Interrupted
        }
        Err(e) => {
            output.error(format_args!("Error while setting cache state for cache {cache_id}"));
            output.error(e);
            ExitStatus::Failure
        }
    }
}

pub fn handle_flush(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let request = Request::FlushCache {
        cache_id: ctx.cache_id(),
    };
    report_flush(run_interruptible(ctx.channel.as_mut(), request, "Flushing cache"), output)
}

/// Outcome of a flush started on its own.
pub(crate) fn report_flush(outcome: Result<Response, ControlError>, output: &mut Output<'_>) -> ExitStatus {
    match outcome {
        Ok(_) => ExitStatus::Success,
        Err(e) if e.is_interrupted() => {
            output.error(DIRTY_FLUSHING_WARNING);
            ExitStatus::Interrupted
        }
        Err(e) => {
            output.error(e);
            ExitStatus::Failure
        }
    }
}
