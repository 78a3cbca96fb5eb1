//! `--list-caches`: caches, their cores and the detached core pool as a tree.

use std::io::Write;

use super::{Context, OUTPUT_FORMAT, render_with};
use crate::cli::command::{OptionSpec, Output, ParseState};
use crate::control::{CacheListing, ControlExt, Listing, flush_progress};
use crate::stats::{Format, StatWriter, Tag};
use crate::types::ExitStatus;

pub const LIST_OPTIONS: &[OptionSpec] = &[OUTPUT_FORMAT];

const LIST_FORMATTING_FAILED: &str = "An error occured during list formatting.";

pub fn handle_list(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let listing = match ctx.channel.list() {
        Ok(listing) => listing,
        Err(e) => {
            tracing::debug!(error = %e, "listing failed");
            output.error("Error getting caches list");
            return ExitStatus::Failure;
        }
    };
    if listing.caches.is_empty() && listing.core_pool.is_empty() {
        output.say("No caches running");
        return ExitStatus::Success;
    }

    let format = Format::for_output(ctx.args.output_format, true);
    render_with(ctx, output, format, LIST_FORMATTING_FAILED, |_, w| {
        write_tree(&listing, w);
        Ok(())
    })
}

fn flushing(progress: f64) -> String {
    format!("Flushing ({progress:3.1} %)")
}

fn write_tree<W: Write>(listing: &Listing, w: &mut StatWriter<W>) {
    w.row(Tag::TreeHeader, ["type", "id", "disk", "status", "write policy", "device"]);

    if !listing.core_pool.is_empty() {
        w.row(Tag::TreeBranch, ["core pool", "-", "-", "-", "-", "-"]);
        for device in &listing.core_pool {
            let path = device.display().to_string();
            w.row(Tag::TreeLeaf, ["core", "-", path.as_str(), "Detached", "-", "-"]);
        }
    }

    for entry in &listing.caches {
        write_cache(entry, w);
    }
}

fn write_cache<W: Write>(entry: &CacheListing, w: &mut StatWriter<W>) {
    let cache = &entry.cache;
    let cache_progress = flush_progress(cache.dirty, cache.flushed);
    let (status, mode) = if cache_progress > 0.0 {
        (flushing(cache_progress), format!("wb->{}", cache.mode.name()))
    } else {
        (cache.state.name().to_string(), cache.mode.name().to_string())
    };
    let id = cache.id.to_string();
    let device = cache.device.display().to_string();
    w.row(Tag::TreeBranch, ["cache", id.as_str(), device.as_str(), status.as_str(), mode.as_str(), "-"]);

    for core in &entry.cores {
        let mut progress = flush_progress(core.dirty, core.flushed);
        // While the whole cache flushes, cores that are already clean are done.
        if progress == 0.0 && cache_progress > 0.0 {
            progress = if core.dirty > 0 { 0.0 } else { 100.0 };
        }
        let status = if progress > 0.0 || cache_progress > 0.0 {
            flushing(progress)
        } else {
            core.state.name().to_string()
        };
        let id = core.id.to_string();
        let path = core.device.display().to_string();
        let exported = core.exported_object();
        w.row(
            Tag::TreeLeaf,
            ["core", id.as_str(), path.as_str(), status.as_str(), "-", exported.as_str()],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{Rig, path};
    use crate::control::CoreState;

    #[test]
    fn empty_engine_has_no_caches() {
        let rig = Rig::new();
        let run = rig.run(&["-L"]);
        assert_eq!(run.status, ExitStatus::Success);
        assert_eq!(run.out, "No caches running\n");
    }

    #[test]
    fn csv_lists_cache_and_cores_positionally() {
        let rig = Rig::new();
        let ssd = rig.start_cache("wb");
        let hdd = rig.add_core("hdd");
        let run = rig.run(&["--list-caches", "--output-format", "csv"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);
        assert_eq!(
            run.out,
            format!(
                "type,id,disk,status,write policy,device\n\
                 cache,1,{},Running,wb,-\n\
                 core,0,{},Active,-,/dev/cas1-0\n",
                path(&ssd),
                path(&hdd)
            )
        );
    }

    #[test]
    fn core_pool_comes_first() {
        let rig = Rig::new();
        rig.start_cache("wt");
        let pooled = rig.device("pooled", 1 << 20);
        rig.edit(|state| state.core_pool.push(pooled.clone()));
        let run = rig.run(&["-L", "-o", "csv"]);
        let lines: Vec<&str> = run.out.lines().collect();
        assert_eq!(lines[1], "core pool,-,-,-,-,-");
        assert_eq!(lines[2], format!("core,-,{},Detached,-,-", path(&pooled)));
        assert!(lines[3].starts_with("cache,1,"));
    }

    #[test]
    fn flushing_cache_marks_clean_cores_done() {
        let rig = Rig::new();
        rig.start_cache("wb");
        rig.add_core("hdd0");
        rig.add_core("hdd1");
        rig.edit(|state| {
            let cores = &mut state.caches.get_mut(&1).unwrap().cores;
            let busy = cores.get_mut(&0).unwrap();
            busy.usage.dirty = 30;
            busy.flushed = 10;
        });
        let run = rig.run(&["-L", "-o", "csv"]);
        let lines: Vec<&str> = run.out.lines().collect();
        assert!(lines[1].ends_with(",Flushing ( 25.0 %),wb->wb,-"), "{}", lines[1]);
        assert!(lines[2].contains(",Flushing ( 25.0 %),"), "{}", lines[2]);
        assert!(lines[3].contains(",Flushing (100.0 %),"), "{}", lines[3]);
    }

    #[test]
    fn text_tree_shows_inactive_core() {
        let rig = Rig::new();
        rig.start_cache("wt");
        rig.add_core("hdd");
        rig.edit(|state| {
            state.caches.get_mut(&1).unwrap().cores.get_mut(&0).unwrap().state = CoreState::Inactive;
        });
        let run = rig.run(&["-L"]);
        let lines: Vec<&str> = run.out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("type "));
        assert!(lines[1].contains("Incomplete"));
        assert!(lines[2].starts_with("+core "));
        assert!(lines[2].contains("Inactive"));
    }
}
