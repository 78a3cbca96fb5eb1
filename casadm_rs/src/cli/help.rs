//! Help output generated from the command model.
//!
//! Layout is fixed-width so that the listings line up the way the manual
//! shows them: a three-space indent, a four-column short name, then the
//! padded long form and its description.

use std::io::{self, Write};

use super::command::{App, CommandSpec, NamespaceSpec, OptionFlags, OptionSpec, bracket_name};

pub const PADDING: &str = "   ";
const SUPPORT_PAGE: &str = "<https://open-cas.github.io>";
/// Longest rendered `--long <ARG>` column before truncation.
const MAX_OPT_HELP_LEN: usize = 29;

/// Replace `%d` placeholders with range and default values, in that order.
pub fn describe(opt: &OptionSpec) -> String {
    let mut values = Vec::with_capacity(3);
    if opt.is(OptionFlags::RANGE) {
        values.extend([opt.min, opt.max]);
    }
    if opt.is(OptionFlags::DEFAULT) {
        values.push(opt.default);
    }
    if values.is_empty() {
        return opt.desc.to_string();
    }
    substitute(opt.desc, &values)
}

fn substitute(template: &str, values: &[i64]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut values = values.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("%d") {
        out.push_str(&rest[..pos]);
        match values.next() {
            Some(v) => out.push_str(&v.to_string()),
            None => out.push_str("%d"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

fn short_label(short: Option<char>) -> String {
    short.map(|c| format!("-{c}")).unwrap_or_default()
}

fn arg_usage(opt: &OptionSpec) -> Option<String> {
    opt.arg.map(|label| {
        if opt.is(OptionFlags::OPTIONAL_ARG) {
            format!("[<{label}>]")
        } else {
            format!("<{label}>")
        }
    })
}

/// One option line of an options table.
pub fn write_option_line(w: &mut dyn Write, opt: &OptionSpec) -> io::Result<()> {
    let desc = describe(opt);
    let short = short_label(opt.short);
    match arg_usage(opt) {
        Some(arg) => {
            let mut usage = format!("--{} {arg}", opt.long);
            if usage.len() > MAX_OPT_HELP_LEN {
                usage.truncate(MAX_OPT_HELP_LEN);
            }
            writeln!(w, "{PADDING}{short:<4}{usage:<32}{desc}")
        }
        None => writeln!(w, "{PADDING}{short:<4}--{:<30}{desc}", opt.long),
    }
}

/// Every visible option accepted by `filter`.
pub fn write_options<F>(w: &mut dyn Write, options: &[OptionSpec], filter: F) -> io::Result<()>
where
    F: Fn(&OptionSpec) -> bool,
{
    for opt in options.iter().filter(|o| !o.is(OptionFlags::HIDDEN) && filter(o)) {
        write_option_line(w, opt)?;
    }
    Ok(())
}

/// `--long <ARG>` for each option accepted by `filter`, joined by `separator`.
pub fn write_options_usage<F>(
    w: &mut dyn Write,
    options: &[OptionSpec],
    separator: &str,
    filter: F,
) -> io::Result<()>
where
    F: Fn(&OptionSpec) -> bool,
{
    let parts: Vec<String> = options
        .iter()
        .filter(|o| filter(o))
        .map(|o| match o.arg {
            Some(label) => format!("--{} <{label}>", o.long),
            None => format!("--{}", o.long),
        })
        .collect();
    write!(w, "{}", parts.join(separator))
}

pub fn write_command_header<C>(w: &mut dyn Write, cmd: &CommandSpec<C>) -> io::Result<()> {
    writeln!(w, "{PADDING}{}\n", cmd.long_desc.unwrap_or(cmd.desc))
}

/// Full listing of visible commands. `hidden[i]` hides `commands[i]`.
pub fn print_help<C>(
    w: &mut dyn Write,
    app: &App,
    commands: &[CommandSpec<C>],
    hidden: &[bool],
) -> io::Result<()> {
    writeln!(w, "{}\n", app.title)?;
    writeln!(w, "Usage: {} {}", app.name, app.info)?;
    writeln!(w, "\nAvailable commands:")?;
    for (i, cmd) in commands.iter().enumerate() {
        if hidden.get(i).copied().unwrap_or(false) {
            continue;
        }
        writeln!(w, "{PADDING}{:<4}--{:<25}{}", cmd.short_label(), cmd.name, cmd.desc)?;
    }
    if let Some(first) = commands.first() {
        writeln!(
            w,
            "\nFor detailed help on the above commands use --help after the command.\ne.g.\n{PADDING}{} --{} --help",
            app.name, first.name
        )?;
    }
    match app.man {
        Some(man) => writeln!(
            w,
            "For more information, please refer to manual, Admin Guide (man {man})\nor go to support page {SUPPORT_PAGE}."
        ),
        None => writeln!(
            w,
            "For more information, please refer to manual, Admin Guide\nor go to support page {SUPPORT_PAGE}."
        ),
    }
}

fn print_namespace_help<C>(
    w: &mut dyn Write,
    app: &App,
    cmd: &CommandSpec<C>,
    ns: &NamespaceSpec,
) -> io::Result<()> {
    writeln!(w, "Usage: {} --{} --{} <NAME>\n", app.name, cmd.name, ns.long)?;
    write_command_header(w, cmd)?;

    let command_name = cmd.bracket_name();
    let option_name = bracket_name(ns.long, ns.short);

    writeln!(w, "Valid values of NAME are:")?;
    for entry in ns.entries {
        writeln!(w, "{PADDING}{} - {}", entry.name, entry.desc)?;
    }
    writeln!(w)?;

    for (i, entry) in ns.entries.iter().enumerate() {
        writeln!(
            w,
            "Options that are valid with {command_name} {option_name} {} are:",
            entry.name
        )?;
        write_options(w, entry.options, |_| true)?;
        if i + 1 < ns.entries.len() {
            writeln!(w)?;
        }
    }
    Ok(())
}

/// Help for one command: its custom printer, namespace help, or the
/// generated usage line and options table.
pub fn print_command_help<C>(w: &mut dyn Write, app: &App, cmd: &CommandSpec<C>) -> io::Result<()> {
    if let Some(printer) = cmd.help {
        return printer(app, cmd, w);
    }
    if let Some(ns) = cmd.body.namespace() {
        return print_namespace_help(w, app, cmd, ns);
    }

    write!(w, "Usage: {} --{}", app.name, cmd.name)?;
    let options = cmd.body.options().unwrap_or(&[]);
    let visible: Vec<&OptionSpec> = options.iter().filter(|o| !o.is(OptionFlags::HIDDEN)).collect();
    if cmd.body.options().is_some() {
        let mut all_required = true;
        for opt in &visible {
            if opt.is(OptionFlags::REQUIRED) {
                write!(w, " --{}", opt.long)?;
                if let Some(arg) = arg_usage(opt) {
                    write!(w, " {arg}")?;
                }
            } else {
                all_required = false;
            }
        }
        if !all_required {
            write!(w, " [option...]")?;
        }
    }
    writeln!(w, "\n")?;

    write_command_header(w, cmd)?;

    if !visible.is_empty() {
        writeln!(w, "Options that are valid with {} are:", cmd.bracket_name())?;
        write_options(w, options, |_| true)?;
    }
    Ok(())
}
