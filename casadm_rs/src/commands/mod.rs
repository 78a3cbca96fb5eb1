//! The casadm command catalogue.
//!
//! Every submodule owns the option tables and handlers of a group of
//! commands. Option handlers validate and store values in [`Args`]; command
//! handlers turn those into control requests and print the outcome.
//!
//! # Module Structure
//!
//! - [`cache`] - start, stop, cache mode and cache flush
//! - [`cores`] - core devices and the core pool
//! - [`params`] - `--set-param` / `--get-param` namespaces
//! - [`stats`] - statistics producers and counter reset
//! - [`list`] - cache and core tree
//! - [`io_class`] - IO class configuration files and listing
//! - [`info`] - version and help
//! - [`metadata`] - metadata wiping

pub mod cache;
pub mod cores;
pub mod info;
pub mod io_class;
pub mod list;
pub mod metadata;
pub mod params;
pub mod stats;

use std::path::PathBuf;

use crate::cli::command::{CommandSpec, OptionSpec, Output};
use crate::control::{CACHE_ID_MAX, CACHE_ID_MIN, CORE_ID_MAX, ControlChannel};
use crate::stats::{self as render, Format, StatWriter, pipe::PipeWriter};
use crate::terminal::TerminalEnv;
use crate::types::{CacheMode, ExitStatus, OutputFormat};

use self::io_class::IoClassAction;
use self::params::ParamSetting;
use self::stats::StatsFilter;

pub const CACHE_ID_DESC: &str = "Identifier of cache instance <1-16384>";
pub const CORE_ID_DESC: &str = "Identifier of core <0-4095> within given cache instance";
pub const OUTPUT_FORMAT_DESC: &str = "Output format: {table|csv}";

/// Longest device path accepted, including the terminator slot.
pub const MAX_DEVICE_PATH: usize = 4096;

pub(crate) const CACHE_ID_REQUIRED: OptionSpec = OptionSpec::new('i', "cache-id", CACHE_ID_DESC)
    .arg("ID")
    .required();
pub(crate) const CORE_ID: OptionSpec = OptionSpec::new('j', "core-id", CORE_ID_DESC).arg("ID");
pub(crate) const OUTPUT_FORMAT: OptionSpec =
    OptionSpec::new('o', "output-format", OUTPUT_FORMAT_DESC).arg("FORMAT");

/// Printed when a user interrupts a flush that was started on its own.
pub const DIRTY_FLUSHING_WARNING: &str = "You have interrupted flushing of cache dirty data. CAS continues to operate\n\
     normally and dirty data that remains on cache device will be flushed by cleaning thread.";

/// Values accumulated from the options of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub cache_id: Option<u16>,
    pub core_id: Option<u16>,
    /// `--cache-device`, `--core-device` or `--device`.
    pub device: Option<PathBuf>,
    pub cache_mode: Option<CacheMode>,
    pub line_size_kib: u32,
    pub force: bool,
    pub load: bool,
    /// Cleared by `--no-data-flush`.
    pub flush_data: bool,
    /// `--flush-cache yes|no`; `None` when not given.
    pub flush_cache: Option<bool>,
    pub output_format: OutputFormat,
    pub stats_filter: StatsFilter,
    pub io_class_id: Option<u8>,
    pub file: Option<String>,
    pub params: Vec<ParamSetting>,
    pub io_class_action: Option<IoClassAction>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            cache_id: None,
            core_id: None,
            device: None,
            cache_mode: None,
            line_size_kib: cache::DEFAULT_LINE_SIZE_KIB,
            force: false,
            load: false,
            flush_data: true,
            flush_cache: None,
            output_format: OutputFormat::Table,
            stats_filter: StatsFilter::DEFAULT,
            io_class_id: None,
            file: None,
            params: Vec::new(),
            io_class_action: None,
        }
    }
}

/// Mutable state shared by option and command handlers of one invocation.
pub struct Context {
    pub channel: Box<dyn ControlChannel>,
    pub env: TerminalEnv,
    pub args: Args,
}

impl Context {
    pub fn new(channel: Box<dyn ControlChannel>, env: TerminalEnv) -> Self {
        Self {
            channel,
            env,
            args: Args::default(),
        }
    }

    /// Cache id of a command that declares `--cache-id` as required.
    pub(crate) fn cache_id(&self) -> u16 {
        self.args.cache_id.unwrap_or(CACHE_ID_MIN)
    }
}

/// All commands, in the order `--help` lists them.
pub fn catalogue() -> Vec<CommandSpec<Context>> {
    vec![
        CommandSpec::new("start-cache", "Start new cache instance or load using metadata", cache::handle_start)
            .short('S')
            .options(cache::START_OPTIONS, cache::start_option)
            .privileged(),
        CommandSpec::new("stop-cache", "Stop cache instance", cache::handle_stop)
            .short('T')
            .options(cache::STOP_OPTIONS, common_option)
            .privileged(),
        CommandSpec::new("set-param", "Set various runtime parameters", params::handle_set)
            .short('X')
            .long_desc("Set various runtime parameters")
            .namespace(&params::SET_PARAM_NAMESPACE, params::set_option)
            .privileged(),
        CommandSpec::new("get-param", "Get various runtime parameters", params::handle_get)
            .short('G')
            .long_desc("Get various runtime parameters")
            .namespace(&params::GET_PARAM_NAMESPACE, params::get_option)
            .privileged(),
        CommandSpec::new("set-cache-mode", "Set cache mode", cache::handle_set_mode)
            .short('Q')
            .options(cache::SET_MODE_OPTIONS, cache::set_mode_option)
            .privileged(),
        CommandSpec::new("add-core", "Add core device to cache instance", cores::handle_add)
            .short('A')
            .options(cores::ADD_OPTIONS, common_option)
            .privileged(),
        CommandSpec::new("remove-core", "Remove core device from cache instance", cores::handle_remove)
            .short('R')
            .options(cores::REMOVE_OPTIONS, cores::remove_option)
            .privileged(),
        CommandSpec::new("remove-detached", "Remove core device from core pool", cores::handle_remove_detached)
            .options(cores::REMOVE_DETACHED_OPTIONS, common_option)
            .privileged(),
        CommandSpec::new("list-caches", "List all cache instances and core devices", list::handle_list)
            .short('L')
            .options(list::LIST_OPTIONS, common_option)
            .privileged(),
        CommandSpec::new("stats", "Print statistics for cache instance", stats::handle_stats)
            .short('P')
            .options(stats::STATS_OPTIONS, stats::stats_option)
            .privileged(),
        CommandSpec::new(
            "reset-counters",
            "Reset cache statistics for core device within cache instance",
            stats::handle_reset_counters,
        )
        .short('Z')
        .options(stats::RESET_COUNTERS_OPTIONS, common_option)
        .privileged(),
        CommandSpec::new(
            "flush-cache",
            "Flush all dirty data from the caching device to core devices",
            cache::handle_flush,
        )
        .short('F')
        .options(cache::FLUSH_OPTIONS, common_option)
        .privileged(),
        CommandSpec::new(
            "flush-core",
            "Flush dirty data of a given core from the caching device to this core device",
            cores::handle_flush,
        )
        .short('E')
        .options(cores::FLUSH_OPTIONS, common_option)
        .privileged(),
        CommandSpec::new("io-class", "Manage IO classes", io_class::handle_io_class)
            .short('C')
            .options(io_class::IO_CLASS_OPTIONS, io_class::io_class_option)
            .help(io_class::print_help)
            .privileged(),
        CommandSpec::new("version", "Print Open CAS version", info::handle_version)
            .short('V')
            .options(info::VERSION_OPTIONS, common_option)
            .skip_audit(),
        CommandSpec::new("help", "Print help", info::handle_help).short('H'),
        CommandSpec::new("zero-metadata", "Clear metadata from caching device", metadata::handle_zero_metadata)
            .options(metadata::ZERO_METADATA_OPTIONS, common_option)
            .privileged(),
    ]
}

// ============================================================================
// Shared option handling
// ============================================================================

/// First argument of an option, or an empty string for optional ones.
pub(crate) fn first(args: &[String]) -> &str {
    args.first().map(String::as_str).unwrap_or("")
}

/// Options shared by most commands. Unknown names are rejected silently.
pub fn common_option(ctx: &mut Context, opt: &str, args: &[String]) -> Result<(), String> {
    let value = first(args);
    let parsed = &mut ctx.args;
    match opt {
        "cache-id" => parsed.cache_id = Some(parse_cache_id(value)?),
        "core-id" => parsed.core_id = Some(parse_core_id(value)?),
        "cache-device" | "core-device" | "device" => parsed.device = Some(parse_device(value)?),
        "no-data-flush" => parsed.flush_data = false,
        "output-format" => parsed.output_format = parse_output_format(value)?,
        _ => return Err(String::new()),
    }
    Ok(())
}

/// Unsigned decimal integer within `min..=max`; `what` names the value in
/// the error message.
pub fn parse_number(value: &str, what: &str, min: u64, max: u64) -> Result<u64, String> {
    let number = if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse::<u64>().ok()
    } else {
        None
    };
    let Some(number) = number else {
        return Err(format!("Invalid {what}, must be a correct unsigned decimal integer."));
    };
    if number < min || number > max {
        return Err(format!("Invalid {what}, must be in the range {min}-{max}."));
    }
    Ok(number)
}

/// [`parse_number`] that also requires a power of two.
pub fn parse_power_of_two(value: &str, what: &str, min: u64, max: u64) -> Result<u64, String> {
    let number = parse_number(value, what, min, max)?;
    if !number.is_power_of_two() {
        return Err(format!("Invalid {what}, must be a power of 2."));
    }
    Ok(number)
}

pub fn parse_cache_id(value: &str) -> Result<u16, String> {
    parse_number(value, "cache id", u64::from(CACHE_ID_MIN), u64::from(CACHE_ID_MAX)).map(|n| n as u16)
}

pub fn parse_core_id(value: &str) -> Result<u16, String> {
    parse_number(value, "core id", 0, u64::from(CORE_ID_MAX)).map(|n| n as u16)
}

pub fn parse_device(value: &str) -> Result<PathBuf, String> {
    if value.len() >= MAX_DEVICE_PATH {
        return Err(format!("Illegal device {value}"));
    }
    Ok(PathBuf::from(value))
}

pub fn parse_output_format(value: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(value).ok_or_else(|| "Invalid output format".to_string())
}

pub fn parse_cache_mode(value: &str) -> Result<CacheMode, String> {
    CacheMode::parse(value).ok_or_else(|| "Invalid cache mode".to_string())
}

// ============================================================================
// Rendering
// ============================================================================

/// Run `producer` against the control channel while its stream is rendered
/// to the output. A producer error is printed as is; a render error prints
/// `render_failure`. Either one fails the command.
pub(crate) fn render_with<F>(
    ctx: &mut Context,
    output: &mut Output<'_>,
    format: Format,
    render_failure: &str,
    producer: F,
) -> ExitStatus
where
    F: FnOnce(&mut dyn ControlChannel, &mut StatWriter<PipeWriter>) -> Result<(), String>,
{
    let Context { channel, env, .. } = ctx;
    let (produced, rendered) = render::render_concurrently(format, env, &mut output.out, |w| {
        producer(channel.as_mut(), w)
    });

    let mut ok = true;
    if let Err(message) = produced {
        if !message.is_empty() {
            output.error(message);
        }
        ok = false;
    }
    if rendered.is_err() {
        output.error(render_failure);
        ok = false;
    }
    ExitStatus::from(ok)
}
