//! Argument parser and dispatcher.
//!
//! Validation happens in a fixed order: command, configure pass, per-command
//! help, privilege, namespace, required/duplicate scan, then the token walk
//! that hands every option's arguments to the command's handler. The first
//! failure prints one diagnostic and ends the invocation.

use super::helpers::{
    args_is, count_arg_params, find_option, is_help, is_option_shaped, suggest_similar_command,
};
use crate::cli::command::{
    App, Arity, CommandBody, CommandFlags, CommandSpec, NamespaceHandler, OptionFlags, OptionHandler,
    OptionSpec, Output, ParseState,
};
use crate::cli::{dispatch, help};
use crate::types::ExitStatus;

/// First token of the option list for flat commands.
const FIRST_OPTION: usize = 2;
/// First token of the option list for namespaced commands.
const FIRST_NS_OPTION: usize = 4;

fn print_info(app: &App, output: &mut Output<'_>) {
    output.say(format_args!("Try `{} --help | -H' for more information.", app.name));
}

fn fail(app: &App, output: &mut Output<'_>, message: impl std::fmt::Display) -> ExitStatus {
    output.error(message);
    print_info(app, output);
    ExitStatus::Failure
}

/// Hidden flags for this invocation: static `HIDDEN` plus commands whose
/// configure probe reports them unusable.
pub fn configure_commands<C>(commands: &[CommandSpec<C>]) -> Vec<bool> {
    commands
        .iter()
        .map(|cmd| {
            let infeasible = cmd.configure.is_some_and(|probe| !probe(cmd));
            if infeasible {
                tracing::debug!(command = cmd.name, "hidden by configure probe");
            }
            cmd.is(CommandFlags::HIDDEN) || infeasible
        })
        .collect()
}

enum Handler<C> {
    Flat(OptionHandler<C>),
    Namespace(NamespaceHandler<C>, &'static str),
}

/// Parse `args` (program name first) against `commands` and run the
/// selected command.
pub fn parse<C>(
    app: &App,
    commands: &[CommandSpec<C>],
    args: &[String],
    ctx: &mut C,
    output: &mut Output<'_>,
) -> ExitStatus {
    let Some(cmd_name) = args.get(1) else {
        return fail(app, output, "No command given.");
    };

    if !is_option_shaped(cmd_name) {
        return fail(app, output, format_args!("Unrecognized command {cmd_name}"));
    }

    let Some(cmd) = commands.iter().find(|c| c.matches(cmd_name)) else {
        let hidden = configure_commands(commands);
        if is_help(cmd_name) {
            if let Err(e) = help::print_help(&mut output.out, app, commands, &hidden) {
                tracing::debug!(error = %e, "help output failed");
            }
            return ExitStatus::Success;
        }
        output.error(format_args!("Unrecognized command {cmd_name}"));
        if let Some(name) = suggest_similar_command(cmd_name, commands, &hidden) {
            output.error(format_args!("Did you mean '--{name}'?"));
        }
        print_info(app, output);
        return ExitStatus::Failure;
    };
    tracing::debug!(command = cmd.name, "command resolved");

    let hidden = configure_commands(commands);
    let cmd_hidden = commands
        .iter()
        .position(|c| std::ptr::eq(c, cmd))
        .and_then(|i| hidden.get(i).copied())
        .unwrap_or(false);

    if args.len() > FIRST_OPTION && args[FIRST_OPTION..].iter().any(|a| is_help(a)) {
        if !cmd_hidden && let Err(e) = help::print_command_help(&mut output.out, app, cmd) {
            tracing::debug!(error = %e, "help output failed");
        }
        return ExitStatus::Success;
    }

    if cmd.is(CommandFlags::PRIVILEGED) && !app.privileged {
        output.error("Must be run as root.");
        return ExitStatus::Failure;
    }

    let (options, handler, first_opt) = match &cmd.body {
        CommandBody::Options { options, handler } => (*options, Handler::Flat(*handler), FIRST_OPTION),
        CommandBody::Namespace { namespace, handler } => {
            if args.len() < 3 {
                return fail(app, output, "Missing namespace option.");
            }
            if args.len() < 4 {
                return fail(app, output, "Missing namespace name.");
            }
            if !args_is(&args[2], namespace.long, namespace.short) {
                return fail(app, output, "Unrecognized option.");
            }
            let Some(entry) = namespace.entry(&args[3]) else {
                return fail(app, output, "Unrecognized namespace entry.");
            };
            (entry.options, Handler::Namespace(*handler, entry.name), FIRST_NS_OPTION)
        }
        CommandBody::Bare => {
            let state = ParseState::empty();
            return dispatch::run_command(app, cmd, args, ctx, &state, output);
        }
    };

    let tokens = args.get(first_opt..).unwrap_or(&[]);
    if let Err(message) = check_occurrences(options, tokens) {
        return fail(app, output, message);
    }

    let mut state = ParseState::new(options);
    if let Handler::Namespace(_, entry) = &handler {
        state = state.with_entry(*entry);
    }

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if !is_option_shaped(token) {
            return fail(app, output, format_args!("Invalid format {token}"));
        }
        let Some((index, opt)) = find_option(options, token) else {
            return fail(app, output, format_args!("Unrecognized option {token}"));
        };

        let params = match collect_params(opt, token, &tokens[i + 1..]) {
            Ok(params) => params,
            Err(message) => return fail(app, output, message),
        };
        i += 1 + params.len();

        let handled = match &handler {
            Handler::Flat(handle) => handle(ctx, opt.long, params),
            Handler::Namespace(handle, entry) => handle(ctx, entry, opt.long, params),
        };
        if let Err(message) = handled {
            if !message.is_empty() {
                output.error(message);
            }
            return fail(app, output, "Error during options handling");
        }
        state.mark(index);
    }

    dispatch::run_command(app, cmd, args, ctx, &state, output)
}

/// Every required option appears once; no option appears twice.
fn check_occurrences(options: &[OptionSpec], tokens: &[String]) -> Result<(), String> {
    for opt in options {
        let count = tokens
            .iter()
            .filter(|t| args_is(t, opt.long, opt.short))
            .count();
        if opt.is(OptionFlags::REQUIRED) && count == 0 {
            return Err(format!("Missing required option {}", opt.slash_name()));
        }
        if count > 1 {
            return Err(format!("Option supplied more than once {}", opt.slash_name()));
        }
    }
    Ok(())
}

/// Arguments following `token` that belong to `opt`.
fn collect_params<'t>(opt: &OptionSpec, token: &str, rest: &'t [String]) -> Result<&'t [String], String> {
    if opt.arg.is_none() {
        return Ok(&[]);
    }
    let count = count_arg_params(rest);
    let optional = opt.is(OptionFlags::OPTIONAL_ARG);
    if count == 0 && !optional {
        return Err(format!("Missing required argument in {token}"));
    }
    let arity_ok = match opt.arity {
        Arity::Unspecified => true,
        Arity::None => count == 0,
        Arity::Fixed(n) => count == n || (count == 0 && optional),
    };
    if !arity_ok {
        return Err(format!("Invalid number of arguments for {token}"));
    }
    Ok(&rest[..count])
}
