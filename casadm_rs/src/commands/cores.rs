//! Core devices: add, remove, flush and the detached core pool.

use std::fs::File;

use super::{CACHE_ID_REQUIRED, CORE_ID, CORE_ID_DESC, Context, common_option};
use super::cache::report_flush;
use crate::cli::command::{OptionSpec, Output, ParseState};
use crate::control::{ControlExt, ErrorCode, Request, Response};
use crate::interrupt::run_interruptible;
use crate::types::ExitStatus;

const CORE_DEVICE_DESC: &str = "Path to core device";
const CORE_ID_REQUIRED: OptionSpec = OptionSpec::new('j', "core-id", CORE_ID_DESC)
    .arg("ID")
    .required();

pub const ADD_OPTIONS: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    CORE_ID,
    OptionSpec::new('d', "core-device", CORE_DEVICE_DESC)
        .arg("DEVICE")
        .required(),
];

pub const REMOVE_OPTIONS: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    CORE_ID_REQUIRED,
    OptionSpec::new('f', "force", "Force remove inactive core"),
];

pub const REMOVE_DETACHED_OPTIONS: &[OptionSpec] = &[OptionSpec::new('d', "device", CORE_DEVICE_DESC)
    .arg("DEVICE")
    .required()];

pub const FLUSH_OPTIONS: &[OptionSpec] = &[CACHE_ID_REQUIRED, CORE_ID_REQUIRED];

pub fn remove_option(ctx: &mut Context, opt: &str, args: &[String]) -> Result<(), String> {
    match opt {
        "force" => {
            ctx.args.force = true;
            Ok(())
        }
        _ => common_option(ctx, opt, args),
    }
}

pub fn handle_add(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let cache_id = ctx.cache_id();
    let Some(device) = ctx.args.device.clone() else {
        return ExitStatus::Failure;
    };
    if File::open(&device).is_err() {
        output.error(format_args!("Device {} not found.", device.display()));
        return ExitStatus::Failure;
    }

    let request = Request::AddCore {
        cache_id,
        core_id: ctx.args.core_id,
        device: device.clone(),
    };
    match ctx.channel.execute(request) {
        Ok(Response::CoreAdded { core_id }) => {
            output.say(format_args!("Successfully added core {core_id} to cache instance {cache_id}"));
            ExitStatus::Success
        }
        Ok(_) => ExitStatus::Failure,
        Err(e) => {
            output.error(format_args!("Error while adding core device to cache instance {cache_id}"));
            if e.code() == Some(ErrorCode::NotOpenExc) {
                let cached = ctx.channel.list().is_ok_and(|listing| {
                    listing
                        .caches
                        .iter()
                        .flat_map(|c| c.cores.iter())
                        .any(|core| core.device == device)
                });
                if cached {
                    output.error(format_args!("Core device '{}' is already cached.", device.display()));
                } else {
                    output.error(format_args!(
                        "Failed to open '{}' device exclusively. Please close all applications \
                         accessing it or unmount the device.",
                        device.display()
                    ));
                }
            } else {
                output.error(e);
            }
            ExitStatus::Failure
        }
    }
}

pub fn handle_remove(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let cache_id = ctx.cache_id();
    let core_id = ctx.args.core_id.unwrap_or_default();
    let request = Request::RemoveCore {
        cache_id,
        core_id,
        force: ctx.args.force,
    };
    match run_interruptible(ctx.channel.as_mut(), request, "Removing core") {
        Ok(_) => ExitStatus::Success,
        Err(e) if e.is_interrupted() => {
            output.error("You have interrupted removal of core. CAS continues to operate normally.");
            ExitStatus::Interrupted
        }
        Err(e) => {
            output.error(format_args!(
                "Error while removing core device {core_id} from cache instance {cache_id}"
            ));
            output.error(e);
            ExitStatus::Failure
        }
    }
}

pub fn handle_remove_detached(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let Some(device) = ctx.args.device.clone() else {
        return ExitStatus::Failure;
    };
    match ctx.channel.execute(Request::RemoveDetached { device: device.clone() }) {
        Ok(_) => ExitStatus::Success,
        Err(e) => {
            output.error(format_args!("Error while removing device {} from core pool", device.display()));
            output.error(e);
            ExitStatus::Failure
        }
    }
}

pub fn handle_flush(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let request = Request::FlushCore {
        cache_id: ctx.cache_id(),
        core_id: ctx.args.core_id.unwrap_or_default(),
    };
    report_flush(run_interruptible(ctx.channel.as_mut(), request, "Flushing core"), output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{Rig, path};
    use crate::control::CoreState;

    #[test]
    fn add_core_assigns_next_id() {
        let rig = Rig::new();
        rig.start_cache("wt");
        rig.add_core("hdd0");
        let hdd = rig.device("hdd1", 1 << 20);
        let run = rig.run(&["-A", "-i", "1", "-d", path(&hdd)]);
        assert_eq!(run.out, "Successfully added core 1 to cache instance 1\n");

        let hdd = rig.device("hdd7", 1 << 20);
        let run = rig.run(&["--add-core", "--cache-id", "1", "--core-id", "7", "--core-device", path(&hdd)]);
        assert_eq!(run.out, "Successfully added core 7 to cache instance 1\n");
    }

    #[test]
    fn add_core_twice_is_already_cached() {
        let rig = Rig::new();
        rig.start_cache("wt");
        let hdd = rig.add_core("hdd");
        let run = rig.run(&["-A", "-i", "1", "-d", path(&hdd)]);
        assert_eq!(run.status, ExitStatus::Failure);
        assert_eq!(
            run.err,
            format!(
                "Error while adding core device to cache instance 1\nCore device '{}' is already cached.\n",
                hdd.display()
            )
        );
    }

    #[test]
    fn add_core_to_missing_cache() {
        let rig = Rig::new();
        let hdd = rig.device("hdd", 1 << 20);
        let run = rig.run(&["-A", "-i", "4", "-d", path(&hdd)]);
        assert_eq!(
            run.err,
            "Error while adding core device to cache instance 4\nCache ID does not exist\n"
        );
        let missing = rig.dir.path().join("gone");
        let run = rig.run(&["-A", "-i", "4", "-d", path(&missing)]);
        assert_eq!(run.err, format!("Device {} not found.\n", missing.display()));
    }

    #[test]
    fn remove_core_and_unknown_core() {
        let rig = Rig::new();
        rig.start_cache("wt");
        rig.add_core("hdd");
        let run = rig.run(&["-R", "-i", "1", "-j", "0"]);
        assert_eq!(run.status, ExitStatus::Success);
        assert!(rig.state().caches[&1].cores.is_empty());

        let run = rig.run(&["-R", "-i", "1", "-j", "0"]);
        assert_eq!(
            run.err,
            "Error while removing core device 0 from cache instance 1\nCore ID does not exist\n"
        );
    }

    #[test]
    fn dirty_inactive_core_needs_force() {
        let rig = Rig::new();
        rig.start_cache("wb");
        rig.add_core("hdd");
        rig.edit(|state| {
            let core = state.caches.get_mut(&1).unwrap().cores.get_mut(&0).unwrap();
            core.state = CoreState::Inactive;
            core.usage.dirty = 3;
        });
        let run = rig.run(&["-R", "-i", "1", "-j", "0"]);
        assert_eq!(run.status, ExitStatus::Failure);
        assert!(run.err.contains("please use --force option"));
        let run = rig.run(&["-R", "-i", "1", "-j", "0", "-f"]);
        assert_eq!(run.status, ExitStatus::Success);
    }

    #[test]
    fn remove_detached_needs_pool_member() {
        let rig = Rig::new();
        let hdd = rig.device("hdd", 1 << 20);
        rig.edit(|state| state.core_pool.push(hdd.clone()));
        let run = rig.run(&["--remove-detached", "-d", path(&hdd)]);
        assert_eq!(run.status, ExitStatus::Success);
        assert!(rig.state().core_pool.is_empty());

        let run = rig.run(&["--remove-detached", "-d", path(&hdd)]);
        assert_eq!(
            run.err,
            format!(
                "Error while removing device {} from core pool\nCore device not available\n",
                hdd.display()
            )
        );
    }

    #[test]
    fn flush_core_requires_core_id() {
        let rig = Rig::new();
        rig.start_cache("wb");
        rig.add_core("hdd");
        let run = rig.run(&["-E", "-i", "1"]);
        assert_eq!(run.err, "Missing required option -j/--core-id\n");
        let run = rig.run(&["-E", "-i", "1", "-j", "0"]);
        assert_eq!(run.status, ExitStatus::Success);
        let run = rig.run(&["-E", "-i", "1", "-j", "5"]);
        assert_eq!(run.err, "Core ID does not exist\n");
    }
}
