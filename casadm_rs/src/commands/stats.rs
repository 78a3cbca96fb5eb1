//! `--stats` producers and `--reset-counters`.
//!
//! Producers write the intermediate stream while it is rendered on another
//! thread. Percentages are fixed-point fractions in hundredths of a percent,
//! rounded half up to one decimal when written.

use std::io::Write;

use super::{CACHE_ID_DESC, CACHE_ID_REQUIRED, Context, common_option, parse_number, render_with};
use crate::cli::command::{OptionSpec, Output, ParseState};
use crate::control::{
    CacheInfo, CacheState, ControlChannel, ControlExt, CoreInfo, Counters, ErrorCode, IO_CLASS_ID_MAX, IoClass,
    Request, Stats, Usage, flush_progress,
};
use crate::stats::{FORMATTING_FAILED, Format, StatWriter, Tag};
use crate::types::ExitStatus;

const UNIT_REQUESTS: &str = "Requests";
const UNIT_BLOCKS: &str = "4KiB Blocks";
const KIB: u64 = 1024;
const GIB: f64 = (1u64 << 30) as f64;

/// Statistics groups selected by `--filter` and `--io-class-id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsFilter(u32);

impl StatsFilter {
    pub const CONF: StatsFilter = StatsFilter(1 << 0);
    pub const USAGE: StatsFilter = StatsFilter(1 << 1);
    pub const REQ: StatsFilter = StatsFilter(1 << 2);
    pub const BLK: StatsFilter = StatsFilter(1 << 3);
    pub const ERR: StatsFilter = StatsFilter(1 << 4);
    pub const IOCLASS: StatsFilter = StatsFilter(1 << 5);
    pub const ALL: StatsFilter = StatsFilter(0x1f);
    pub const DEFAULT: StatsFilter = StatsFilter::ALL;

    const NAMES: [(&'static str, StatsFilter); 6] = [
        ("conf", StatsFilter::CONF),
        ("usage", StatsFilter::USAGE),
        ("req", StatsFilter::REQ),
        ("blk", StatsFilter::BLK),
        ("err", StatsFilter::ERR),
        ("all", StatsFilter::ALL),
    ];

    pub const fn union(self, other: StatsFilter) -> StatsFilter {
        StatsFilter(self.0 | other.0)
    }

    pub const fn has(self, other: StatsFilter) -> bool {
        self.0 & other.0 != 0
    }

    /// Comma separated filter names. Empty tokens are rejected.
    pub fn parse(spec: &str) -> Option<StatsFilter> {
        if spec.is_empty() {
            return None;
        }
        spec.split(',').try_fold(StatsFilter(0), |acc, token| {
            let (_, filter) = Self::NAMES.iter().find(|(name, _)| *name == token)?;
            Some(acc.union(*filter))
        })
    }
}

pub const STATS_OPTIONS: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    OptionSpec::new(
        'j',
        "core-id",
        "Limit display of core-specific statistics to only ones pertaining to a specific core. If this option \
         is not given, casadm will display statistics pertaining to all cores assigned to given cache instance.",
    )
    .arg("ID"),
    OptionSpec::new('d', "io-class-id", "Display per IO class statistics")
        .arg("ID")
        .optional_arg(),
    OptionSpec::new('f', "filter", "Apply filters from the following set: {all, conf, usage, req, blk, err}")
        .arg("FILTER-SPEC"),
    super::OUTPUT_FORMAT,
];

pub const RESET_COUNTERS_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new('i', "cache-id", CACHE_ID_DESC).arg("ID").required(),
    OptionSpec::new(
        'j',
        "core-id",
        "Identifier of core <0-4095> within given cache instance. If not specified, statistics are reset \
         for all cores in cache instance.",
    )
    .arg("ID"),
];

pub fn stats_option(ctx: &mut Context, opt: &str, args: &[String]) -> Result<(), String> {
    let parsed = &mut ctx.args;
    match opt {
        "io-class-id" => {
            if let Some(value) = args.first() {
                let id = parse_number(value, "IO class id", 0, u64::from(IO_CLASS_ID_MAX))?;
                parsed.io_class_id = Some(id as u8);
            }
            parsed.stats_filter = parsed.stats_filter.union(StatsFilter::IOCLASS);
        }
        "filter" => {
            let filter = args
                .first()
                .and_then(|spec| StatsFilter::parse(spec))
                .ok_or_else(|| "Invalid statistics filter".to_string())?;
            let keep = if parsed.stats_filter.has(StatsFilter::IOCLASS) {
                StatsFilter::IOCLASS
            } else {
                StatsFilter(0)
            };
            parsed.stats_filter = filter.union(keep);
        }
        _ => return common_option(ctx, opt, args),
    }
    Ok(())
}

pub fn handle_stats(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let request = StatsRequest {
        cache_id: ctx.cache_id(),
        core_id: ctx.args.core_id,
        io_class_id: ctx.args.io_class_id,
        filter: ctx.args.stats_filter,
    };
    let format = Format::for_output(ctx.args.output_format, false);
    render_with(ctx, output, format, FORMATTING_FAILED, |channel, w| request.produce(channel, w))
}

pub fn handle_reset_counters(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let request = Request::ResetCounters {
        cache_id: ctx.cache_id(),
        core_id: ctx.args.core_id,
    };
    match ctx.channel.run(request) {
        Ok(()) => ExitStatus::Success,
        Err(e) => {
            output.error("Error encountered while reseting counters");
            output.error(e);
            ExitStatus::Failure
        }
    }
}

// ============================================================================
// Producers
// ============================================================================

struct StatsRequest {
    cache_id: u16,
    core_id: Option<u16>,
    io_class_id: Option<u8>,
    filter: StatsFilter,
}

impl StatsRequest {
    fn produce<W: Write>(&self, channel: &mut dyn ControlChannel, w: &mut StatWriter<W>) -> Result<(), String> {
        let cache_id = self.cache_id;
        let cache = channel
            .cache_info(cache_id)
            .map_err(|_| format!("Cache Id {cache_id} not running"))?;

        if let Some(core_id) = self.core_id
            && !cache.core_ids.contains(&core_id)
        {
            return Err("No such core device in cache.".to_string());
        }

        if self.filter.has(StatsFilter::IOCLASS) {
            self.io_classes(channel, w)
        } else if let Some(core_id) = self.core_id {
            self.core(channel, core_id, w)
        } else {
            self.cache(channel, &cache, w)
        }
    }

    fn cache<W: Write>(
        &self,
        channel: &mut dyn ControlChannel,
        cache: &CacheInfo,
        w: &mut StatWriter<W>,
    ) -> Result<(), String> {
        let stats = channel.stats(self.cache_id, None, None).map_err(|e| e.to_string())?;
        let filter = self.filter;

        w.record();
        if filter.has(StatsFilter::CONF) {
            cache_conf(cache, w);
        }
        if filter.has(StatsFilter::USAGE) {
            usage_table(&stats, true, w);
            if cache.state.contains(CacheState::INCOMPLETE) {
                inactive_usage_table(cache, &stats, w);
            }
        }
        counter_tables(&stats.counters, filter, true, w);
        Ok(())
    }

    fn core<W: Write>(&self, channel: &mut dyn ControlChannel, core_id: u16, w: &mut StatWriter<W>) -> Result<(), String> {
        let failed = |e: crate::control::ControlError| format!("Error while retrieving stats for core {core_id}\n{e}");
        let core = channel.core_info(self.cache_id, core_id).map_err(failed)?;
        let stats = channel.stats(self.cache_id, Some(core_id), None).map_err(failed)?;

        w.record();
        if self.filter.has(StatsFilter::CONF) {
            core_conf(&core, w);
        }
        if self.filter.has(StatsFilter::USAGE) {
            usage_table(&stats, true, w);
        }
        counter_tables(&stats.counters, self.filter, false, w);
        Ok(())
    }

    fn io_classes<W: Write>(&self, channel: &mut dyn ControlChannel, w: &mut StatWriter<W>) -> Result<(), String> {
        if let Some(class_id) = self.io_class_id {
            let class = channel.io_class(self.cache_id, class_id).map_err(|e| match e.code() {
                Some(ErrorCode::IoClassNotExist) => format!("IO class {class_id} is not configured."),
                _ => e.to_string(),
            })?;
            return self.io_class(channel, &class, w);
        }

        for class_id in 0..=IO_CLASS_ID_MAX {
            let class = match channel.io_class(self.cache_id, class_id) {
                Ok(class) => class,
                Err(e) if e.code() == Some(ErrorCode::IoClassNotExist) => continue,
                Err(e) => return Err(e.to_string()),
            };
            self.io_class(channel, &class, w)?;
        }
        Ok(())
    }

    fn io_class<W: Write>(
        &self,
        channel: &mut dyn ControlChannel,
        class: &IoClass,
        w: &mut StatWriter<W>,
    ) -> Result<(), String> {
        let stats = channel
            .stats(self.cache_id, self.core_id, Some(class.id))
            .map_err(|e| e.to_string())?;
        let filter = self.filter;
        let whole_cache = self.core_id.is_none();

        w.record();
        if filter.has(StatsFilter::CONF) {
            io_class_conf(class, w);
        }
        if filter.has(StatsFilter::USAGE) {
            usage_table(&stats, false, w);
        }
        if filter.has(StatsFilter::REQ) {
            request_table(&stats.counters, w);
        }
        if filter.has(StatsFilter::BLK) {
            block_table(&stats.counters, whole_cache, w);
        }
        Ok(())
    }
}

// ============================================================================
// Blocks of the stream
// ============================================================================

/// `numerator / denominator` in hundredths of a percent.
fn fraction(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    (u128::from(numerator) * 10_000 / u128::from(denominator)) as u64
}

/// Percent with one decimal, rounding the second decimal half up.
fn percent(fraction: u64) -> f64 {
    ((fraction + 5) / 10) as f64 / 10.0
}

fn value_row<W: Write>(w: &mut StatWriter<W>, tag: Tag, title: &str, value: u64, of: u64, unit: &str) {
    w.value_percent(tag, title, value, percent(fraction(value, of)), unit);
}

fn gib(blocks: u64) -> String {
    format!("{:.2}", (blocks * 4 * KIB) as f64 / GIB)
}

/// Human readable memory size, switching units at 1024.
fn footprint(bytes: u64) -> (f64, &'static str) {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = UNITS[0];
    for (i, name) in UNITS.iter().enumerate() {
        unit = name;
        if value < 1024.0 || i == UNITS.len() - 1 {
            break;
        }
        value /= 1024.0;
    }
    (value, unit)
}

fn dirty_for<W: Write>(w: &mut StatWriter<W>, seconds: u64) {
    let described = if seconds == 0 {
        "Cache clean".to_string()
    } else {
        let parts = [
            (seconds / 86_400, "d"),
            (seconds % 86_400 / 3600, "h"),
            (seconds % 3600 / 60, "m"),
            (seconds % 60, "s"),
        ];
        parts
            .iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, unit)| format!("{n} [{unit}]"))
            .collect::<Vec<_>>()
            .join(" ")
    };
    w.kv("Dirty for", [seconds.to_string(), "[s]".to_string(), described]);
}

fn cache_conf<W: Write>(cache: &CacheInfo, w: &mut StatWriter<W>) {
    let blocks = cache.size_in_blocks();
    w.kv("Cache Id", [cache.id.to_string()]);
    w.kv("Cache Size", [blocks.to_string(), format!("[{UNIT_BLOCKS}]"), gib(blocks), "[GiB]".to_string()]);
    w.kv("Cache Device", [cache.device.display().to_string()]);
    w.kv("Core Devices", [cache.core_ids.len().to_string()]);
    w.kv("Inactive Core Devices", [cache.inactive_cores.to_string()]);
    w.kv("Write Policy", [cache.mode.name()]);
    w.kv("Cleaning Policy", [cache.cleaning.name()]);
    w.kv("Promotion Policy", [cache.promotion.name()]);
    w.kv("Cache line size", [cache.line_size_kib.to_string(), "[KiB]".to_string()]);
    let (value, unit) = footprint(cache.metadata_footprint);
    w.kv("Metadata Memory Footprint", [format!("{value:.1}"), format!("[{unit}]")]);
    dirty_for(w, cache.dirty_for);

    let progress = flush_progress(cache.dirty, cache.flushed);
    if progress > 0.0 {
        w.kv("Status", [format!("Flushing ({progress:3.1} %)")]);
    } else {
        w.kv("Status", [cache.state.name()]);
    }
}

fn core_conf<W: Write>(core: &CoreInfo, w: &mut StatWriter<W>) {
    let blocks = core.size_bytes / KIB / 4;
    w.kv("Core Id", [core.id.to_string()]);
    w.kv("Core Device", [core.device.display().to_string()]);
    w.kv("Exported Object", [core.exported_object()]);
    w.kv("Core Size", [blocks.to_string(), format!("[{UNIT_BLOCKS}]"), gib(blocks), "[GiB]".to_string()]);
    dirty_for(w, core.dirty_for);
    w.kv("Status", [core.state.name()]);
    w.kv(
        "Seq cutoff threshold",
        [(u64::from(core.seq_cutoff_threshold) / KIB).to_string(), "[KiB]".to_string()],
    );
    w.kv("Seq cutoff policy", [core.seq_cutoff_policy.name()]);
}

fn io_class_conf<W: Write>(class: &IoClass, w: &mut StatWriter<W>) {
    w.kv("IO class ID", [class.id.to_string()]);
    w.kv("IO class name", [class.name.as_str()]);
    match class.priority {
        Some(priority) => w.kv("Eviction priority", [priority.to_string()]),
        None => w.kv("Eviction priority", ["Pinned"]),
    }
    w.kv("Max size", [format!("{}%", class.max_percent)]);
}

fn percent_header<W: Write>(w: &mut StatWriter<W>, title: &str) {
    w.table_header(&[title, "Count", "%", "[Units]"]);
}

fn usage_table<W: Write>(stats: &Stats, with_free: bool, w: &mut StatWriter<W>) {
    let Usage { occupancy, clean, dirty } = stats.usage;
    percent_header(w, "Usage statistics");
    value_row(w, Tag::TableRow, "Occupancy", occupancy, stats.size, UNIT_BLOCKS);
    if with_free {
        let free = stats.size.saturating_sub(occupancy);
        value_row(w, Tag::TableRow, "Free", free, stats.size, UNIT_BLOCKS);
    }
    value_row(w, Tag::TableRow, "Clean", clean, occupancy, UNIT_BLOCKS);
    value_row(w, Tag::TableRow, "Dirty", dirty, occupancy, UNIT_BLOCKS);
}

fn inactive_usage_table<W: Write>(cache: &CacheInfo, stats: &Stats, w: &mut StatWriter<W>) {
    let Usage { occupancy, clean, dirty } = cache.inactive;
    percent_header(w, "Inactive usage statistics");
    value_row(w, Tag::TableRow, "Inactive Occupancy", occupancy, stats.size, UNIT_BLOCKS);
    value_row(w, Tag::TableRow, "Inactive Clean", clean, occupancy, UNIT_BLOCKS);
    value_row(w, Tag::TableRow, "Inactive Dirty", dirty, occupancy, UNIT_BLOCKS);
}

fn counter_tables<W: Write>(counters: &Counters, filter: StatsFilter, whole_cache: bool, w: &mut StatWriter<W>) {
    if filter.has(StatsFilter::REQ) {
        request_table(counters, w);
    }
    if filter.has(StatsFilter::BLK) {
        block_table(counters, whole_cache, w);
    }
    if filter.has(StatsFilter::ERR) {
        error_table(counters, w);
    }
}

fn request_table<W: Write>(c: &Counters, w: &mut StatWriter<W>) {
    let read_total = c.read_hits + c.read_partial_misses + c.read_full_misses;
    let write_total = c.write_hits + c.write_partial_misses + c.write_full_misses;
    let serviced = read_total + write_total;
    let total = serviced + c.read_pass_through + c.write_pass_through;

    percent_header(w, "Request statistics");
    let rows = [
        (Tag::TableSection, "Read hits", c.read_hits),
        (Tag::TableRow, "Read partial misses", c.read_partial_misses),
        (Tag::TableRow, "Read full misses", c.read_full_misses),
        (Tag::TableRow, "Read total", read_total),
        (Tag::TableSection, "Write hits", c.write_hits),
        (Tag::TableRow, "Write partial misses", c.write_partial_misses),
        (Tag::TableRow, "Write full misses", c.write_full_misses),
        (Tag::TableRow, "Write total", write_total),
        (Tag::TableSection, "Pass-Through reads", c.read_pass_through),
        (Tag::TableRow, "Pass-Through writes", c.write_pass_through),
        (Tag::TableRow, "Serviced requests", serviced),
        (Tag::TableSection, "Total requests", total),
    ];
    for (tag, title, value) in rows {
        value_row(w, tag, title, value, total, UNIT_REQUESTS);
    }
}

fn block_table<W: Write>(c: &Counters, whole_cache: bool, w: &mut StatWriter<W>) {
    // Figures summed over several cores are marked as plural.
    let postfix = if whole_cache { "(s)" } else { "" };
    let core_total = c.core_reads + c.core_writes;
    let cache_total = c.cache_reads + c.cache_writes;
    let exported_total = c.exported_reads + c.exported_writes;

    percent_header(w, "Block statistics");
    let rows = [
        (Tag::TableSection, format!("Reads from core{postfix}"), c.core_reads, core_total),
        (Tag::TableRow, format!("Writes to core{postfix}"), c.core_writes, core_total),
        (Tag::TableRow, format!("Total to/from core{postfix}"), core_total, core_total),
        (Tag::TableSection, "Reads from cache".to_string(), c.cache_reads, cache_total),
        (Tag::TableRow, "Writes to cache".to_string(), c.cache_writes, cache_total),
        (Tag::TableRow, "Total to/from cache".to_string(), cache_total, cache_total),
        (
            Tag::TableSection,
            format!("Reads from exported object{postfix}"),
            c.exported_reads,
            exported_total,
        ),
        (
            Tag::TableRow,
            format!("Writes to exported object{postfix}"),
            c.exported_writes,
            exported_total,
        ),
        (
            Tag::TableRow,
            format!("Total to/from exported object{postfix}"),
            exported_total,
            exported_total,
        ),
    ];
    for (tag, title, value, of) in rows {
        value_row(w, tag, &title, value, of, UNIT_BLOCKS);
    }
}

fn error_table<W: Write>(c: &Counters, w: &mut StatWriter<W>) {
    let cache_total = c.cache_read_errors + c.cache_write_errors;
    let core_total = c.core_read_errors + c.core_write_errors;
    let total = cache_total + core_total;

    percent_header(w, "Error statistics");
    let rows = [
        (Tag::TableSection, "Cache read errors", c.cache_read_errors),
        (Tag::TableRow, "Cache write errors", c.cache_write_errors),
        (Tag::TableRow, "Cache total errors", cache_total),
        (Tag::TableSection, "Core read errors", c.core_read_errors),
        (Tag::TableRow, "Core write errors", c.core_write_errors),
        (Tag::TableRow, "Core total errors", core_total),
        (Tag::TableSection, "Total errors", total),
    ];
    for (tag, title, value) in rows {
        value_row(w, tag, title, value, total, UNIT_REQUESTS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Rig;

    #[test]
    fn filter_names_combine() {
        assert_eq!(StatsFilter::parse("all"), Some(StatsFilter::ALL));
        assert_eq!(
            StatsFilter::parse("conf,usage"),
            Some(StatsFilter::CONF.union(StatsFilter::USAGE))
        );
        assert_eq!(StatsFilter::parse(""), None);
        assert_eq!(StatsFilter::parse("conf,"), None);
        assert_eq!(StatsFilter::parse(",conf"), None);
        assert_eq!(StatsFilter::parse("conf,,err"), None);
        assert_eq!(StatsFilter::parse("usage,bogus"), None);
        assert!(!StatsFilter::DEFAULT.has(StatsFilter::IOCLASS));
    }

    #[test]
    fn percentages_round_half_up() {
        assert_eq!(fraction(180, 1551), 1160);
        assert_eq!(percent(1164), 11.6);
        assert_eq!(percent(1165), 11.7);
        assert_eq!(percent(fraction(1, 3)), 33.3);
        assert_eq!(percent(fraction(2, 3)), 66.7);
        assert_eq!(fraction(5, 0), 0);
    }

    #[test]
    fn memory_footprint_picks_unit() {
        assert_eq!(footprint(512), (512.0, "B"));
        assert_eq!(footprint(1 << 20), (1.0, "MiB"));
        assert_eq!(footprint(1536), (1.5, "KiB"));
    }

    #[test]
    fn dirty_for_is_spelled_out() {
        let mut w = StatWriter::new(Vec::new());
        dirty_for(&mut w, 90_061);
        dirty_for(&mut w, 0);
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(
            out,
            "KV_PAIR,Dirty for,90061,[s],1 [d] 1 [h] 1 [m] 1 [s]\nKV_PAIR,Dirty for,0,[s],Cache clean\n"
        );
    }

    #[test]
    fn request_table_uses_total_as_denominator() {
        let counters = Counters {
            read_hits: 180,
            read_full_misses: 20,
            write_hits: 100,
            write_pass_through: 100,
            ..Counters::default()
        };
        let mut w = StatWriter::new(Vec::new());
        request_table(&counters, &mut w);
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert!(out.starts_with("TABLE_HEADER,Request statistics,Count,%,[Units]\n"));
        assert!(out.contains("TABLE_SECTION,Read hits,180,45.0,[Requests]\n"));
        assert!(out.contains("TABLE_ROW,Serviced requests,300,75.0,[Requests]\n"));
        assert!(out.contains("TABLE_SECTION,Total requests,400,100.0,[Requests]\n"));
    }

    #[test]
    fn usage_as_pivoted_csv() {
        let rig = Rig::new();
        rig.start_cache("wb");
        rig.add_core("hdd");
        rig.edit(|state| {
            let core = state.caches.get_mut(&1).unwrap().cores.get_mut(&0).unwrap();
            core.usage = Usage { occupancy: 4096, clean: 1024, dirty: 3072 };
        });
        let run = rig.run(&["-P", "-i", "1", "-f", "usage", "-o", "csv"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);
        assert_eq!(
            run.out,
            "Occupancy [4KiB Blocks],Occupancy [%],Free [4KiB Blocks],Free [%],\
             Clean [4KiB Blocks],Clean [%],Dirty [4KiB Blocks],Dirty [%]\n\
             4096,25.0,12288,75.0,1024,25.0,3072,75.0\n"
        );
    }

    #[test]
    fn cache_conf_as_text() {
        let rig = Rig::new();
        let ssd = rig.start_cache("wt");
        let run = rig.run(&["--stats", "--cache-id", "1", "--filter", "conf"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);
        assert!(run.out.contains(&format!("Cache Device               {}\n", ssd.display())), "{}", run.out);
        assert!(run.out.contains("Cache Size                 16384 [4KiB Blocks] / 0.06 [GiB]\n"), "{}", run.out);
        assert!(run.out.contains("Write Policy               wt\n"), "{}", run.out);
        assert!(run.out.contains("Status                     Running\n"), "{}", run.out);
        assert!(!run.out.contains("Usage statistics"));
    }

    #[test]
    fn core_stats_need_a_known_core() {
        let rig = Rig::new();
        rig.start_cache("wt");
        rig.add_core("hdd");
        let run = rig.run(&["-P", "-i", "1", "-j", "3"]);
        assert_eq!(run.status, ExitStatus::Failure);
        assert_eq!(run.err, "No such core device in cache.\n");

        let run = rig.run(&["-P", "-i", "1", "-j", "0", "-f", "conf", "-o", "csv"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);
        let mut lines = run.out.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Core Id,Core Device,Exported Object,Core Size [4KiB Blocks]"), "{header}");
        assert!(lines.next().unwrap().contains(",/dev/cas1-0,4096,"));
    }

    #[test]
    fn missing_cache_is_reported() {
        let rig = Rig::new();
        let run = rig.run(&["-P", "-i", "7"]);
        assert_eq!(run.status, ExitStatus::Failure);
        assert_eq!(run.err, "Cache Id 7 not running\n");
        assert!(run.out.is_empty());
    }

    #[test]
    fn io_class_stats() {
        let rig = Rig::new();
        rig.start_cache("wt");
        let run = rig.run(&["-P", "-i", "1", "-d", "-f", "conf", "-o", "csv"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);
        assert_eq!(
            run.out,
            "IO class ID,IO class name,Eviction priority,Max size\n0,unclassified,255,100%\n"
        );

        let run = rig.run(&["-P", "-i", "1", "-d", "5"]);
        assert_eq!(run.err, "IO class 5 is not configured.\n");
    }

    #[test]
    fn filter_keeps_io_class_selection() {
        let rig = Rig::new();
        rig.start_cache("wt");
        let run = rig.run(&["-P", "-i", "1", "-d", "0", "-f", "conf", "-o", "csv"]);
        assert!(run.out.starts_with("IO class ID,"), "{}", run.out);
        let run = rig.run(&["-P", "-i", "1", "-f", "nope"]);
        assert_eq!(run.err, "Invalid statistics filter\nError during options handling\n");
    }

    #[test]
    fn reset_counters_clears_core_counters() {
        let rig = Rig::new();
        rig.start_cache("wt");
        rig.add_core("hdd");
        rig.edit(|state| {
            let core = state.caches.get_mut(&1).unwrap().cores.get_mut(&0).unwrap();
            core.counters.read_hits = 10;
        });
        let run = rig.run(&["-Z", "-i", "1", "-j", "0"]);
        assert_eq!(run.status, ExitStatus::Success);
        assert_eq!(rig.state().caches[&1].cores[&0].counters, Counters::default());

        let run = rig.run(&["-Z", "-i", "2"]);
        assert_eq!(run.err, "Error encountered while reseting counters\nCache ID does not exist\n");
    }
}
