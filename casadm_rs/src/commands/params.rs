//! Runtime parameters behind the `--set-param` and `--get-param` namespaces.

use super::{CACHE_ID_REQUIRED, CORE_ID, CORE_ID_DESC, Context, OUTPUT_FORMAT, common_option, first, parse_number, render_with};
use crate::cli::command::{NamespaceEntry, NamespaceSpec, OptionSpec, Output, ParseState};
use crate::control::{
    CacheParam, CleaningPolicy, ControlError, ControlExt, CoreParam, ErrorCode, ParamValue, PromotionPolicy,
    Request, SeqCutoffPolicy,
};
use crate::stats::{FORMATTING_FAILED, Format, Tag};
use crate::types::{CacheMode, ExitStatus};

const KIB: u32 = 1024;
const SEQ_CUTOFF_THRESHOLD_MAX_KIB: u64 = 4_194_181;

const SET_FAILED: &str = "Setting runtime parameter failed!";
const GET_FAILED: &str = "Getting runtime parameter failed!";
const PASS_THROUGH_WARNING: &str = "Changing parameters for core in Pass-Through mode. New values will be saved \
     but will not be effective until switching to another cache mode.";

/// One parameter change requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSetting {
    Cache(CacheParam, ParamValue),
    Core(CoreParam, ParamValue),
}

const CORE_ID_REQUIRED: OptionSpec = OptionSpec::new('j', "core-id", CORE_ID_DESC).arg("ID").required();

const SEQ_CUTOFF_SET: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    CORE_ID,
    OptionSpec::new('t', "threshold", "Sequential cutoff activation threshold [KiB]").arg("KiB"),
    OptionSpec::new('p', "policy", "Sequential cutoff policy. Available policies: {always|full|never}").arg("POLICY"),
];

const CLEANING_SET: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    OptionSpec::new('p', "policy", "Cleaning policy type. Available policy types: {nop|alru|acp}").arg("POLICY"),
];

const PROMOTION_SET: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    OptionSpec::new('p', "policy", "Promotion policy type. Available policy types: {always|nhit}").arg("POLICY"),
];

const NHIT_THRESHOLD: (i64, i64, i64) = (2, 1000, 3);
const NHIT_TRIGGER: (i64, i64, i64) = (0, 100, 80);

const PROMOTION_NHIT_SET: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    OptionSpec::new(
        't',
        "threshold",
        "Number of requests for given core line after which NHIT policy allows insertion into cache \
         <%d-%d> (default: %d)",
    )
    .arg("NUMBER")
    .range(NHIT_THRESHOLD.0, NHIT_THRESHOLD.1)
    .default_value(NHIT_THRESHOLD.2),
    OptionSpec::new(
        'o',
        "trigger",
        "Cache occupancy value over which NHIT promotion is active <%d-%d>[%] (default: %d%)",
    )
    .arg("NUMBER")
    .range(NHIT_TRIGGER.0, NHIT_TRIGGER.1)
    .default_value(NHIT_TRIGGER.2),
];

const ALRU_WAKE_UP: (i64, i64, i64) = (0, 3600, 20);
const ALRU_STALENESS: (i64, i64, i64) = (1, 3600, 120);
const ALRU_BUFFERS: (i64, i64, i64) = (1, 10000, 100);
const ALRU_ACTIVITY: (i64, i64, i64) = (0, 1_000_000, 10000);

const CLEANING_ALRU_SET: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    OptionSpec::new(
        'w',
        "wake-up",
        "Period of time between awakenings of flushing thread <%d-%d>[s] (default: %d s)",
    )
    .arg("NUMBER")
    .range(ALRU_WAKE_UP.0, ALRU_WAKE_UP.1)
    .default_value(ALRU_WAKE_UP.2),
    OptionSpec::new(
        's',
        "staleness-time",
        "Time that has to pass from the last write operation before a dirty cache block can be scheduled \
         to be flushed <%d-%d>[s] (default: %d s)",
    )
    .arg("NUMBER")
    .range(ALRU_STALENESS.0, ALRU_STALENESS.1)
    .default_value(ALRU_STALENESS.2),
    OptionSpec::new(
        'b',
        "flush-max-buffers",
        "Number of dirty cache blocks to be flushed in one cleaning cycle <%d-%d> (default: %d)",
    )
    .arg("NUMBER")
    .range(ALRU_BUFFERS.0, ALRU_BUFFERS.1)
    .default_value(ALRU_BUFFERS.2),
    OptionSpec::new(
        't',
        "activity-threshold",
        "Cache idle time before flushing thread can start <%d-%d>[ms] (default: %d ms)",
    )
    .arg("NUMBER")
    .range(ALRU_ACTIVITY.0, ALRU_ACTIVITY.1)
    .default_value(ALRU_ACTIVITY.2),
];

const ACP_WAKE_UP: (i64, i64, i64) = (0, 10000, 10);
const ACP_BUFFERS: (i64, i64, i64) = (1, 10000, 128);

const CLEANING_ACP_SET: &[OptionSpec] = &[
    CACHE_ID_REQUIRED,
    OptionSpec::new(
        'w',
        "wake-up",
        "Time between ACP cleaning thread iterations <%d-%d>[ms] (default: %d ms)",
    )
    .arg("NUMBER")
    .range(ACP_WAKE_UP.0, ACP_WAKE_UP.1)
    .default_value(ACP_WAKE_UP.2),
    OptionSpec::new(
        'b',
        "flush-max-buffers",
        "Number of cache lines flushed in single ACP cleaning thread iteration <%d-%d> (default: %d)",
    )
    .arg("NUMBER")
    .range(ACP_BUFFERS.0, ACP_BUFFERS.1)
    .default_value(ACP_BUFFERS.2),
];

pub static SET_PARAM_NAMESPACE: NamespaceSpec = NamespaceSpec {
    short: Some('n'),
    long: "name",
    entries: &[
        NamespaceEntry { name: "seq-cutoff", desc: "Sequential cutoff parameters", options: SEQ_CUTOFF_SET },
        NamespaceEntry { name: "cleaning", desc: "Cleaning policy parameters", options: CLEANING_SET },
        NamespaceEntry { name: "promotion", desc: "Promotion policy parameters", options: PROMOTION_SET },
        NamespaceEntry {
            name: "promotion-nhit",
            desc: "Promotion policy NHIT parameters",
            options: PROMOTION_NHIT_SET,
        },
        NamespaceEntry {
            name: "cleaning-alru",
            desc: "Cleaning policy ALRU parameters",
            options: CLEANING_ALRU_SET,
        },
        NamespaceEntry {
            name: "cleaning-acp",
            desc: "Cleaning policy ACP parameters",
            options: CLEANING_ACP_SET,
        },
    ],
};

const CORE_GET: &[OptionSpec] = &[CACHE_ID_REQUIRED, CORE_ID_REQUIRED, OUTPUT_FORMAT];
const CACHE_GET: &[OptionSpec] = &[CACHE_ID_REQUIRED, OUTPUT_FORMAT];

pub static GET_PARAM_NAMESPACE: NamespaceSpec = NamespaceSpec {
    short: Some('n'),
    long: "name",
    entries: &[
        NamespaceEntry { name: "seq-cutoff", desc: "Sequential cutoff parameters", options: CORE_GET },
        NamespaceEntry { name: "cleaning", desc: "Cleaning policy parameters", options: CACHE_GET },
        NamespaceEntry { name: "cleaning-alru", desc: "Cleaning policy ALRU parameters", options: CACHE_GET },
        NamespaceEntry { name: "cleaning-acp", desc: "Cleaning policy ACP parameters", options: CACHE_GET },
        NamespaceEntry { name: "promotion", desc: "Promotion policy parameters", options: CACHE_GET },
        NamespaceEntry { name: "promotion-nhit", desc: "Promotion policy NHIT parameters", options: CACHE_GET },
    ],
};

// ============================================================================
// --set-param
// ============================================================================

fn policy<T>(parse: fn(&str) -> Option<T>, value: &str) -> Result<T, String> {
    parse(value).ok_or_else(|| "Error: Invalid policy name.".to_string())
}

fn number(value: &str, what: &str, (min, max, _): (i64, i64, i64)) -> Result<ParamValue, String> {
    let n = parse_number(value, what, min as u64, max as u64)?;
    Ok(ParamValue::Number(n as u32))
}

fn setting(entry: &str, opt: &str, value: &str) -> Result<ParamSetting, String> {
    use ParamSetting::{Cache, Core};
    let setting = match (entry, opt) {
        ("seq-cutoff", "threshold") => {
            let kib = parse_number(value, "sequential cutoff threshold", 1, SEQ_CUTOFF_THRESHOLD_MAX_KIB)?;
            Core(CoreParam::SeqCutoffThreshold, ParamValue::Number(kib as u32 * KIB))
        }
        ("seq-cutoff", "policy") => Core(
            CoreParam::SeqCutoffPolicy,
            ParamValue::SeqCutoff(policy(SeqCutoffPolicy::parse, value)?),
        ),
        ("cleaning", "policy") => Cache(
            CacheParam::CleaningPolicy,
            ParamValue::Cleaning(policy(CleaningPolicy::parse, value)?),
        ),
        ("promotion", "policy") => Cache(
            CacheParam::PromotionPolicy,
            ParamValue::Promotion(policy(PromotionPolicy::parse, value)?),
        ),
        ("promotion-nhit", "threshold") => Cache(CacheParam::NhitThreshold, number(value, "threshold", NHIT_THRESHOLD)?),
        ("promotion-nhit", "trigger") => Cache(CacheParam::NhitTrigger, number(value, "trigger", NHIT_TRIGGER)?),
        ("cleaning-alru", "wake-up") => Cache(CacheParam::AlruWakeUp, number(value, "wake-up time", ALRU_WAKE_UP)?),
        ("cleaning-alru", "staleness-time") => Cache(
            CacheParam::AlruStalenessTime,
            number(value, "staleness time", ALRU_STALENESS)?,
        ),
        ("cleaning-alru", "flush-max-buffers") => Cache(
            CacheParam::AlruFlushMaxBuffers,
            number(value, "flush max buffers", ALRU_BUFFERS)?,
        ),
        ("cleaning-alru", "activity-threshold") => Cache(
            CacheParam::AlruActivityThreshold,
            number(value, "activity threshold", ALRU_ACTIVITY)?,
        ),
        ("cleaning-acp", "wake-up") => Cache(CacheParam::AcpWakeUp, number(value, "wake-up time", ACP_WAKE_UP)?),
        ("cleaning-acp", "flush-max-buffers") => Cache(
            CacheParam::AcpFlushMaxBuffers,
            number(value, "flush max buffers", ACP_BUFFERS)?,
        ),
        _ => return Err(String::new()),
    };
    Ok(setting)
}

pub fn set_option(ctx: &mut Context, entry: &str, opt: &str, args: &[String]) -> Result<(), String> {
    match opt {
        "cache-id" | "core-id" => common_option(ctx, opt, args),
        _ => {
            let setting = setting(entry, opt, first(args))?;
            ctx.args.params.push(setting);
            Ok(())
        }
    }
}

pub fn handle_set(ctx: &mut Context, _: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let settings = std::mem::take(&mut ctx.args.params);
    if settings.is_empty() {
        output.error("Error: No parameters specified!");
        return ExitStatus::Failure;
    }
    let cache_id = ctx.cache_id();

    let applied = apply_settings(ctx, cache_id, &settings, output);
    if let Err(e) = applied {
        output.error(e);
        output.error(SET_FAILED);
        return ExitStatus::Failure;
    }
    ExitStatus::Success
}

fn apply_settings(
    ctx: &mut Context,
    cache_id: u16,
    settings: &[ParamSetting],
    output: &mut Output<'_>,
) -> Result<(), ControlError> {
    let cache = ctx.channel.cache_info(cache_id)?;
    if cache.mode == CacheMode::Pt {
        output.error(PASS_THROUGH_WARNING);
    }
    // Without --core-id a core parameter goes to every core of the cache.
    let cores = match ctx.args.core_id {
        Some(core_id) => vec![core_id],
        None => cache.core_ids.clone(),
    };

    for &setting in settings {
        match setting {
            ParamSetting::Cache(param, value) => {
                ctx.channel.run(Request::SetCacheParam { cache_id, param, value })?;
            }
            ParamSetting::Core(param, value) => {
                for &core_id in &cores {
                    ctx.channel.run(Request::SetCoreParam { cache_id, core_id, param, value })?;
                }
            }
        }
        tracing::debug!(cache_id, ?setting, "runtime parameter set");
    }
    Ok(())
}

// ============================================================================
// --get-param
// ============================================================================

enum Selection {
    Core(&'static [CoreParam]),
    Cache(&'static [CacheParam]),
}

fn selection(entry: &str) -> Option<Selection> {
    let selection = match entry {
        "seq-cutoff" => Selection::Core(&[CoreParam::SeqCutoffThreshold, CoreParam::SeqCutoffPolicy]),
        "cleaning" => Selection::Cache(&[CacheParam::CleaningPolicy]),
        "cleaning-alru" => Selection::Cache(&[
            CacheParam::AlruWakeUp,
            CacheParam::AlruStalenessTime,
            CacheParam::AlruFlushMaxBuffers,
            CacheParam::AlruActivityThreshold,
        ]),
        "cleaning-acp" => Selection::Cache(&[CacheParam::AcpWakeUp, CacheParam::AcpFlushMaxBuffers]),
        "promotion" => Selection::Cache(&[CacheParam::PromotionPolicy]),
        "promotion-nhit" => Selection::Cache(&[CacheParam::NhitThreshold, CacheParam::NhitTrigger]),
        _ => return None,
    };
    Some(selection)
}

fn cache_param_label(param: CacheParam) -> &'static str {
    match param {
        CacheParam::CleaningPolicy => "Cleaning policy type",
        CacheParam::AlruWakeUp => "Wake up time [s]",
        CacheParam::AlruStalenessTime => "Stale buffer time [s]",
        CacheParam::AlruFlushMaxBuffers | CacheParam::AcpFlushMaxBuffers => "Flush max buffers",
        CacheParam::AlruActivityThreshold => "Activity threshold [ms]",
        CacheParam::AcpWakeUp => "Wake up time [ms]",
        CacheParam::PromotionPolicy => "Promotion policy type",
        CacheParam::NhitThreshold => "Insertion threshold",
        CacheParam::NhitTrigger => "Policy trigger [%]",
    }
}

fn core_param_label(param: CoreParam) -> &'static str {
    match param {
        CoreParam::SeqCutoffThreshold => "Sequential cutoff threshold [KiB]",
        CoreParam::SeqCutoffPolicy => "Sequential cutoff policy",
    }
}

fn display_value(value: ParamValue) -> String {
    match value {
        ParamValue::Number(n) => n.to_string(),
        ParamValue::Cleaning(p) => p.name().to_string(),
        ParamValue::Promotion(p) => p.name().to_string(),
        ParamValue::SeqCutoff(p) => p.name().to_string(),
    }
}

pub fn get_option(ctx: &mut Context, _entry: &str, opt: &str, args: &[String]) -> Result<(), String> {
    match opt {
        "cache-id" | "core-id" | "output-format" => common_option(ctx, opt, args),
        _ => Err(String::new()),
    }
}

pub fn handle_get(ctx: &mut Context, state: &ParseState<'_>, output: &mut Output<'_>) -> ExitStatus {
    let Some(selection) = state.entry().and_then(selection) else {
        return ExitStatus::Failure;
    };
    let cache_id = ctx.cache_id();
    let core_id = ctx.args.core_id.unwrap_or_default();

    let rows = match collect_rows(ctx, cache_id, core_id, &selection) {
        Ok(rows) => rows,
        Err(e) => {
            match e.code() {
                Some(ErrorCode::CacheNotExist) => output.error(format_args!("Cache id {cache_id} not running")),
                Some(ErrorCode::CoreNotExist | ErrorCode::CoreNotAvail) if matches!(selection, Selection::Core(_)) => {
                    output.error(format_args!("Core id {core_id} not available"))
                }
                _ => output.error("Can't get parameters"),
            }
            output.error(GET_FAILED);
            return ExitStatus::Failure;
        }
    };

    let format = Format::for_output(ctx.args.output_format, true);
    let status = render_with(ctx, output, format, FORMATTING_FAILED, |_, w| {
        w.table_header(&["Parameter name", "Value"]);
        for (label, value) in &rows {
            w.row(Tag::TableRow, [*label, value.as_str()]);
        }
        Ok(())
    });
    if !status.is_success() {
        output.error(GET_FAILED);
    }
    status
}

fn collect_rows(
    ctx: &mut Context,
    cache_id: u16,
    core_id: u16,
    selection: &Selection,
) -> Result<Vec<(&'static str, String)>, ControlError> {
    let channel = ctx.channel.as_mut();
    match selection {
        Selection::Core(params) => params
            .iter()
            .map(|&param| {
                let value = match channel.core_param(cache_id, core_id, param)? {
                    ParamValue::Number(bytes) if param == CoreParam::SeqCutoffThreshold => {
                        ParamValue::Number(bytes / KIB)
                    }
                    value => value,
                };
                Ok((core_param_label(param), display_value(value)))
            })
            .collect(),
        Selection::Cache(params) => params
            .iter()
            .map(|&param| Ok((cache_param_label(param), display_value(channel.cache_param(cache_id, param)?))))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::help::describe;
    use crate::commands::testing::Rig;

    #[test]
    fn ranged_descriptions_expand() {
        let wake_up = CLEANING_ALRU_SET.iter().find(|o| o.long == "wake-up").unwrap();
        assert_eq!(
            describe(wake_up),
            "Period of time between awakenings of flushing thread <0-3600>[s] (default: 20 s)"
        );
        let trigger = PROMOTION_NHIT_SET.iter().find(|o| o.long == "trigger").unwrap();
        assert_eq!(
            describe(trigger),
            "Cache occupancy value over which NHIT promotion is active <0-100>[%] (default: 80%)"
        );
    }

    #[test]
    fn settings_validate_values() {
        assert_eq!(
            setting("seq-cutoff", "threshold", "4"),
            Ok(ParamSetting::Core(CoreParam::SeqCutoffThreshold, ParamValue::Number(4096)))
        );
        assert_eq!(
            setting("seq-cutoff", "threshold", "4194182"),
            Err("Invalid sequential cutoff threshold, must be in the range 1-4194181.".into())
        );
        assert_eq!(setting("cleaning", "policy", "lru"), Err("Error: Invalid policy name.".into()));
        assert_eq!(
            setting("cleaning-alru", "staleness-time", "0"),
            Err("Invalid staleness time, must be in the range 1-3600.".into())
        );
        assert_eq!(
            setting("promotion-nhit", "trigger", "80"),
            Ok(ParamSetting::Cache(CacheParam::NhitTrigger, ParamValue::Number(80)))
        );
        assert_eq!(setting("promotion", "threshold", "3"), Err(String::new()));
    }

    #[test]
    fn set_then_get_cleaning_policy() {
        let rig = Rig::new();
        rig.start_cache("wt");
        let run = rig.run(&["-X", "-n", "cleaning", "-i", "1", "-p", "acp"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);

        let run = rig.run(&["-G", "-n", "cleaning", "-i", "1", "-o", "csv"]);
        assert_eq!(run.out, "Parameter name,Value\nCleaning policy type,acp\n");
    }

    #[test]
    fn get_alru_defaults_as_table() {
        let rig = Rig::new();
        rig.start_cache("wb");
        let run = rig.run(&["--get-param", "--name", "cleaning-alru", "--cache-id", "1"]);
        assert_eq!(run.status, ExitStatus::Success);
        assert!(run.out.contains("| Parameter name "), "{}", run.out);
        assert!(run.out.contains("| Wake up time [s] "), "{}", run.out);
        assert!(run.out.contains("| Stale buffer time [s] "), "{}", run.out);
        assert!(run.out.contains("10000 |"), "{}", run.out);
    }

    #[test]
    fn plain_output_shows_the_tagged_stream() {
        let rig = Rig::new();
        rig.start_cache("wb");
        let run = rig.run(&["-G", "-n", "cleaning", "-i", "1", "-o", "plain"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);
        assert!(run.out.starts_with("TABLE_HEADER,Parameter name,Value\n"), "{}", run.out);
        assert!(run.out.contains("TABLE_ROW,Cleaning policy type,"), "{}", run.out);
    }

    #[test]
    fn seq_cutoff_applies_to_all_cores() {
        let rig = Rig::new();
        rig.start_cache("wt");
        rig.add_core("hdd0");
        rig.add_core("hdd1");
        let run = rig.run(&["-X", "-n", "seq-cutoff", "-i", "1", "-t", "64", "-p", "never"]);
        assert_eq!(run.status, ExitStatus::Success, "{}", run.err);

        for core in ["0", "1"] {
            let run = rig.run(&["-G", "-n", "seq-cutoff", "-i", "1", "-j", core, "-o", "csv"]);
            assert_eq!(
                run.out,
                "Parameter name,Value\nSequential cutoff threshold [KiB],64\nSequential cutoff policy,never\n"
            );
        }
    }

    #[test]
    fn set_without_values_is_rejected() {
        let rig = Rig::new();
        rig.start_cache("wt");
        let run = rig.run(&["-X", "-n", "cleaning-alru", "-i", "1"]);
        assert_eq!(run.status, ExitStatus::Failure);
        assert_eq!(run.err, "Error: No parameters specified!\n");
    }

    #[test]
    fn pass_through_warns_but_applies() {
        let rig = Rig::new();
        rig.start_cache("pt");
        let run = rig.run(&["-X", "-n", "promotion", "-i", "1", "-p", "nhit"]);
        assert_eq!(run.status, ExitStatus::Success);
        assert_eq!(run.err, format!("{PASS_THROUGH_WARNING}\n"));
        let run = rig.run(&["-G", "-n", "promotion", "-i", "1", "-o", "csv"]);
        assert_eq!(run.out, "Parameter name,Value\nPromotion policy type,nhit\n");
    }

    #[test]
    fn missing_cache_and_core_are_named() {
        let rig = Rig::new();
        let run = rig.run(&["-G", "-n", "cleaning", "-i", "3"]);
        assert_eq!(run.err, "Cache id 3 not running\nGetting runtime parameter failed!\n");
        assert!(run.out.is_empty());

        rig.start_cache("wt");
        let run = rig.run(&["-G", "-n", "seq-cutoff", "-i", "1", "-j", "9"]);
        assert_eq!(run.err, "Core id 9 not available\nGetting runtime parameter failed!\n");

        let run = rig.run(&["-X", "-n", "cleaning", "-i", "2", "-p", "nop"]);
        assert_eq!(run.err, "Cache ID does not exist\nSetting runtime parameter failed!\n");
    }

    #[test]
    fn get_seq_cutoff_requires_core() {
        let rig = Rig::new();
        rig.start_cache("wt");
        let run = rig.run(&["-G", "-n", "seq-cutoff", "-i", "1"]);
        assert_eq!(run.err, "Missing required option -j/--core-id\n");
    }
}
