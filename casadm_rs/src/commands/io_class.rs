//! `--io-class`: load IO class configuration files and list configured classes.
//!
//! The command has two sub-commands selected by its first option, plus an
//! undocumented `--print-config` that dumps a configuration file as a
//! lettered grid. Each regular option carries a group mask naming the
//! sub-commands it belongs to, plus [`REQUIRED`] when those sub-commands
//! cannot run without it. Sub-command `i` owns mask bit `1 << i`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;

use super::{CACHE_ID_DESC, Context, MAX_DEVICE_PATH, OUTPUT_FORMAT, common_option, first, parse_number, render_with};
use crate::cli::command::{App, CommandSpec, OptionFlags, OptionSpec, Output, ParseState};
use crate::cli::help;
use crate::control::{
    ControlExt, ErrorCode, IO_CLASS_ID_MAX, IO_CLASS_NAME_MAX, IO_CLASS_PRIO_HIGHEST, IO_CLASS_PRIO_LOWEST,
    IoClass, Request,
};
use crate::csv::{self, CsvError, CsvReader};
use crate::stats::{Format, Tag};
use crate::types::{ExitStatus, OutputFormat};

const LOAD_CONFIG: u32 = 1 << 0;
const LIST: u32 = 1 << 1;
const PRINT_CONFIG: u32 = 1 << 2;
const REQUIRED: u32 = 1 << 7;

pub const IO_CLASS_OPTIONS: &[OptionSpec] = &[
    OptionSpec::new('C', "load-config", "Loads configuration for IO classes").subcommand(),
    OptionSpec::new('L', "list", "Lists currently configured IO classes").subcommand(),
    OptionSpec::new('P', "print-config", "Prints configuration file as a grid")
        .subcommand()
        .hidden(),
    OptionSpec::new('i', "cache-id", CACHE_ID_DESC)
        .arg("ID")
        .group(LOAD_CONFIG | LIST | REQUIRED),
    OptionSpec::new('f', "file", "Configuration file containing IO class definition")
        .arg("FILE")
        .group(LOAD_CONFIG | PRINT_CONFIG | REQUIRED),
    OUTPUT_FORMAT.group(LIST),
];

/// Sub-command chosen by the first option of `--io-class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoClassAction {
    Load,
    List,
    Print,
}

impl IoClassAction {
    fn mask(self) -> u32 {
        match self {
            IoClassAction::Load => LOAD_CONFIG,
            IoClassAction::List => LIST,
            IoClassAction::Print => PRINT_CONFIG,
        }
    }
}

/// Column order of configuration files and of the listing.
const COLUMNS: [&str; 4] = ["IO class id", "IO class name", "Eviction priority", "Occupancy"];
const COL_ID: usize = 0;
const COL_NAME: usize = 1;
const COL_PRIO: usize = 2;
const COL_OCCUPANCY: usize = 3;

const HEADER_HINT: &str = "Failed to parse I/O classes configuration file header. It is either malformed or missing.\n\
     Please consult Admin Guide to check how columns in configuration file should be named.";

pub fn io_class_option(ctx: &mut Context, opt: &str, args: &[String]) -> Result<(), String> {
    match opt {
        "load-config" | "list" | "print-config" => {
            // Only the first option may pick the sub-command.
            if ctx.args.io_class_action.is_none() {
                ctx.args.io_class_action = Some(match opt {
                    "list" => IoClassAction::List,
                    "print-config" => IoClassAction::Print,
                    _ => IoClassAction::Load,
                });
            }
            Ok(())
        }
        "file" => {
            let path = first(args);
            validate_path(path)?;
            ctx.args.file = Some(path.to_string());
            Ok(())
        }
        _ => common_option(ctx, opt, args),
    }
}

fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Empty path".into());
    }
    if path.len() >= MAX_DEVICE_PATH {
        return Err("File path too long".into());
    }
    Ok(())
}

fn subcommand_usage() -> String {
    IO_CLASS_OPTIONS
        .iter()
        .filter(|o| o.is(OptionFlags::SUBCOMMAND) && !o.is(OptionFlags::HIDDEN))
        .map(|o| format!("--{}", o.long))
        .collect::<Vec<_>>()
        .join("|")
}

/// Options supplied outside the chosen sub-command, and required ones
/// that are absent. Returns the messages to print.
fn misplaced_options(state: &ParseState<'_>, action: IoClassAction) -> Vec<String> {
    let mask = action.mask();
    IO_CLASS_OPTIONS
        .iter()
        .filter(|o| !o.is(OptionFlags::SUBCOMMAND))
        .filter_map(|o| {
            if state.is_supplied(o.long) {
                (!o.in_group(mask)).then(|| format!("Option '{}' is not allowed", o.bracket_name()))
            } else {
                (o.in_group(mask) && o.in_group(REQUIRED))
                    .then(|| format!("Option '{}' is missing", o.bracket_name()))
            }
        })
        .collect()
}

pub fn handle_io_class(ctx: &mut Context, state: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let Some(action) = ctx.args.io_class_action else {
        output.error(format_args!(
            "Invalid or missing first sub-command parameter Expected one of the: {{{}}}",
            subcommand_usage()
        ));
        return ExitStatus::Failure;
    };
    let problems = misplaced_options(state, action);
    if !problems.is_empty() {
        for problem in problems {
            output.error(problem);
        }
        return ExitStatus::Failure;
    }

    match action {
        IoClassAction::Load => load_config(ctx, output),
        IoClassAction::List => list_classes(ctx, output),
        IoClassAction::Print => print_config(ctx, output),
    }
}

// ============================================================================
// Configuration files
// ============================================================================

#[derive(Debug, Error)]
pub enum IoClassFileError {
    #[error("Empty IO Classes configuration file supplied.")]
    Empty,
    #[error("I/O error occured while reading IO Classes configuration file supplied.")]
    Read(#[source] CsvError),
    #[error("Cannot parse configuration file - unknown column \"{0}\".")]
    UnknownColumn(String),
    #[error("Cannot parse configuration file - missing column \"{0}\".")]
    MissingColumn(&'static str),
    /// A field failed validation; `detail` explains why when known.
    #[error("Cannot parse configuration file - error in line {line} in column {position} ({column}).")]
    Field {
        line: usize,
        position: usize,
        column: &'static str,
        detail: Option<String>,
    },
    #[error("Cannot parse configuration file - error in line {line}.")]
    Line { line: usize },
    #[error("Empty configuration file")]
    NoClasses,
}

impl IoClassFileError {
    fn is_header(&self) -> bool {
        matches!(self, IoClassFileError::UnknownColumn(_) | IoClassFileError::MissingColumn(_))
    }
}

/// Positions of the known columns within the file's header.
fn parse_header(columns: &[String]) -> Result<[usize; 4], IoClassFileError> {
    let mut positions = [None; 4];
    for (i, name) in columns.iter().enumerate() {
        let known = COLUMNS
            .iter()
            .position(|c| *c == name.as_str())
            .ok_or_else(|| IoClassFileError::UnknownColumn(name.clone()))?;
        positions[known] = Some(i);
    }
    let mut resolved = [0; 4];
    for (slot, (position, name)) in resolved.iter_mut().zip(positions.iter().zip(COLUMNS)) {
        *slot = position.ok_or(IoClassFileError::MissingColumn(name))?;
    }
    Ok(resolved)
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() >= IO_CLASS_NAME_MAX {
        return Err("Empty or too long IO class name".into());
    }
    if name.bytes().any(|b| b == b',' || b == b'"' || !(32..=126).contains(&b)) {
        return Err("Only characters allowed in IO class name are low ascii characters, \
                    excluding control characters, comma and quotation mark."
            .into());
    }
    Ok(())
}

/// Occupancy written as `0.xx` or `1.00`; returns percent of the cache.
fn parse_occupancy(value: &str) -> Result<u32, Option<String>> {
    let (whole, fraction) = value.split_once('.').ok_or(None)?;
    if !matches!(whole, "0" | "1") {
        return Err(None);
    }
    if fraction.is_empty() || fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Some("Invalid occupancy, must be a fraction with at most two decimal places.".into()));
    }
    let mut hundredths: u32 = fraction.parse().map_err(|_| None)?;
    if fraction.len() == 1 {
        hundredths *= 10;
    }
    let percent = if whole == "1" { 100 + hundredths } else { hundredths };
    if percent > 100 {
        return Err(Some("Invalid occupancy, must be in the range 0.00-1.00.".into()));
    }
    Ok(percent)
}

struct LineParser<'a> {
    positions: [usize; 4],
    cache_blocks: u64,
    classes: &'a BTreeMap<u8, IoClass>,
}

impl LineParser<'_> {
    /// Validate one data row; failures name the offending column.
    fn parse(&self, row: &[String]) -> Result<IoClass, (usize, Option<String>)> {
        let field = |col: usize| row.get(self.positions[col]).map(String::as_str).ok_or((col, None));
        let (id, name, prio, occupancy) = (field(COL_ID)?, field(COL_NAME)?, field(COL_PRIO)?, field(COL_OCCUPANCY)?);

        if id.is_empty() {
            return Err((COL_ID, None));
        }
        let id = parse_number(id, "id", 0, u64::from(IO_CLASS_ID_MAX)).map_err(|e| (COL_ID, Some(e)))? as u8;
        if self.classes.contains_key(&id) {
            return Err((COL_ID, Some(format!("Double configuration for IO class id {id}"))));
        }

        validate_name(name).map_err(|e| (COL_NAME, Some(e)))?;

        let priority = if prio.is_empty() {
            None
        } else {
            let prio = parse_number(
                prio,
                "prio",
                u64::from(IO_CLASS_PRIO_HIGHEST),
                u64::from(IO_CLASS_PRIO_LOWEST),
            )
            .map_err(|e| (COL_PRIO, Some(e)))?;
            Some(prio as u8)
        };

        if occupancy.is_empty() {
            return Err((COL_OCCUPANCY, None));
        }
        let max_percent = parse_occupancy(occupancy).map_err(|e| (COL_OCCUPANCY, e))?;

        Ok(IoClass {
            id,
            name: name.to_string(),
            priority,
            max_percent,
            max_size: u64::from(max_percent) * self.cache_blocks / 100,
        })
    }
}

/// Read a configuration file for a cache of `cache_blocks` 4KiB blocks.
pub fn read_config<R: BufRead>(
    mut csv: CsvReader<R>,
    cache_blocks: u64,
) -> Result<Vec<IoClass>, IoClassFileError> {
    if !csv.read_record().map_err(IoClassFileError::Read)? {
        return Err(IoClassFileError::Empty);
    }
    let positions = parse_header(csv.columns())?;

    let mut classes = BTreeMap::new();
    let mut line = 1;
    loop {
        line += 1;
        match csv.read_record() {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                tracing::debug!(line, error = %e, "io class file read failed");
                return Err(IoClassFileError::Line { line });
            }
        }
        if csv.column_count() != COLUMNS.len() {
            if csv.is_empty_line() {
                continue;
            }
            return Err(IoClassFileError::Line { line });
        }

        let parser = LineParser {
            positions,
            cache_blocks,
            classes: &classes,
        };
        match parser.parse(csv.columns()) {
            Ok(class) => {
                classes.insert(class.id, class);
            }
            Err((col, detail)) => {
                return Err(IoClassFileError::Field {
                    line,
                    position: positions[col] + 1,
                    column: COLUMNS[col],
                    detail,
                });
            }
        }
    }

    if classes.is_empty() {
        return Err(IoClassFileError::NoClasses);
    }
    Ok(classes.into_values().collect())
}

fn report_file_error(e: &IoClassFileError, output: &mut Output<'_>) {
    if let IoClassFileError::Field { detail: Some(detail), .. } = e {
        output.error(detail);
    }
    output.error(e);
    if e.is_header() {
        output.error(HEADER_HINT);
    }
}

fn load_config(ctx: &mut Context, output: &mut Output<'_>) -> ExitStatus {
    let cache_id = ctx.cache_id();
    let file = ctx.args.file.clone().unwrap_or_default();

    let cache = match ctx.channel.cache_info(cache_id) {
        Ok(cache) => cache,
        Err(e) => {
            output.error(e);
            return ExitStatus::Failure;
        }
    };
    let cache_blocks = cache.size_in_blocks();

    let parsed = if file == "-" {
        read_config(CsvReader::new(io::stdin().lock()), cache_blocks)
    } else {
        match CsvReader::open(Path::new(&file)) {
            Ok(csv) => read_config(csv, cache_blocks),
            Err(e) => {
                tracing::debug!(file = %file, error = %e, "cannot open io class file");
                output.error(format_args!("Cannot open configuration file {file}"));
                return ExitStatus::Failure;
            }
        }
    };
    let classes = match parsed {
        Ok(classes) => classes,
        Err(e) => {
            report_file_error(&e, output);
            return ExitStatus::Failure;
        }
    };

    tracing::debug!(cache_id, count = classes.len(), "configuring io classes");
    match ctx.channel.run(Request::ConfigureIoClasses { cache_id, classes }) {
        Ok(()) => ExitStatus::Success,
        Err(e) if e.code() == Some(ErrorCode::IoClassNotExist) => ExitStatus::Success,
        Err(e) => {
            output.error(e);
            ExitStatus::Failure
        }
    }
}

// ============================================================================
// Listing
// ============================================================================

fn list_classes(ctx: &mut Context, output: &mut Output<'_>) -> ExitStatus {
    let cache_id = ctx.cache_id();
    if let Err(e) = ctx.channel.cache_info(cache_id) {
        output.error(e);
        return ExitStatus::Failure;
    }

    let csv = ctx.args.output_format == OutputFormat::Csv;
    let format = Format::for_output(ctx.args.output_format, true);
    render_with(ctx, output, format, crate::stats::FORMATTING_FAILED, |channel, w| {
        w.table_header(&COLUMNS);
        for class_id in 0..=IO_CLASS_ID_MAX {
            let class = match channel.io_class(cache_id, class_id) {
                Ok(class) => class,
                Err(e) if e.code() == Some(ErrorCode::IoClassNotExist) => continue,
                Err(e) => return Err(e.to_string()),
            };
            let priority = match class.priority {
                Some(p) => p.to_string(),
                None if csv => String::new(),
                None => "Pinned".to_string(),
            };
            let id = class.id.to_string();
            let size = class.max_size.to_string();
            w.row(Tag::TableRow, [id.as_str(), class.name.as_str(), priority.as_str(), size.as_str()]);
        }
        Ok(())
    })
}

// ============================================================================
// Help
// ============================================================================

fn print_config(ctx: &Context, output: &mut Output<'_>) -> ExitStatus {
    let file = ctx.args.file.as_deref().unwrap_or_default();
    let printed = if file == "-" {
        csv::pretty_print(io::stdin().lock(), &mut output.out)
    } else {
        match File::open(file) {
            Ok(f) => csv::pretty_print(BufReader::new(f), &mut output.out),
            Err(e) => {
                tracing::debug!(file = %file, error = %e, "cannot open io class file");
                output.error(format_args!("Cannot open configuration file {file}"));
                return ExitStatus::Failure;
            }
        }
    };
    match printed {
        Ok(()) => ExitStatus::Success,
        Err(e) => {
            output.error(e);
            ExitStatus::Failure
        }
    }
}

/// Usage of each sub-command followed by the options it accepts.
pub fn print_help(app: &App, cmd: &CommandSpec<Context>, w: &mut dyn Write) -> io::Result<()> {
    let options = cmd.body.options().unwrap_or(&[]);
    writeln!(w, "Usage: {} --{} {{{}}}\n", app.name, cmd.name, subcommand_usage())?;
    help::write_command_header(w, cmd)?;

    let subcommands = options.iter().filter(|o| o.is(OptionFlags::SUBCOMMAND)).enumerate();
    for (i, sub) in subcommands.filter(|(_, o)| !o.is(OptionFlags::HIDDEN)) {
        let mask = 1 << i;
        writeln!(w)?;
        writeln!(w, "{}:", sub.desc)?;
        write!(w, "Usage: {} --{} --{} ", app.name, cmd.name, sub.long)?;

        let accepted = options.iter().filter(|o| o.in_group(mask)).count();
        let required = |o: &OptionSpec| o.in_group(mask) && o.in_group(REQUIRED);
        help::write_options_usage(w, options, " ", required)?;
        if options.iter().filter(|o| required(o)).count() != accepted {
            write!(w, " [option...]")?;
        }
        writeln!(w, "\nOptions that are valid with {} are:", sub.bracket_name())?;
        help::write_options(w, options, |o| o.in_group(mask))?;
        writeln!(w)?;
    }
    Ok(())
}
