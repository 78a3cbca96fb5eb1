//! Declarative option, namespace and command descriptors.
//!
//! Option tables are `const` data built with the `const fn` builders on
//! [`OptionSpec`]. Commands are assembled at startup and generic over the
//! context type their handlers mutate.

use std::fmt;
use std::io::{self, Write};

use super::parsed::ParseState;
use crate::types::ExitStatus;

/// Upper bound on options declared by a single namespace entry.
pub const MAX_NAMESPACE_OPTIONS: usize = 32;

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr;)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $($(#[$fmeta])* pub const $flag: Self = Self(1 << $bit);)*

            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut set = f.debug_set();
                $(if self.contains(Self::$flag) {
                    set.entry(&stringify!($flag));
                })*
                set.finish()
            }
        }
    };
}

flag_set! {
    /// Per-option flag bits.
    OptionFlags {
        REQUIRED = 0;
        HIDDEN = 1;
        /// `min`/`max` are substituted into the description.
        RANGE = 2;
        /// `default` is substituted into the description.
        DEFAULT = 3;
        /// The argument list may be empty.
        OPTIONAL_ARG = 4;
        /// Marks an option that selects a sub-command.
        SUBCOMMAND = 5;
    }
}

flag_set! {
    /// Per-command flag bits.
    CommandFlags {
        PRIVILEGED = 0;
        HIDDEN = 1;
        /// Do not write the invocation to the audit log.
        SKIP_AUDIT = 2;
    }
}

/// Number of arguments an option expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    Fixed(usize),
    /// Any number of arguments, including none.
    Unspecified,
}

/// Static description of one option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub short: Option<char>,
    pub long: &'static str,
    /// Description; may contain `%d` placeholders for range and default.
    pub desc: &'static str,
    /// Argument label shown in help, e.g. `ID`.
    pub arg: Option<&'static str>,
    pub arity: Arity,
    pub flags: OptionFlags,
    pub min: i64,
    pub max: i64,
    pub default: i64,
    /// Caller-defined grouping mask; never changed at runtime.
    pub group: u32,
}

impl OptionSpec {
    pub const fn new(short: char, long: &'static str, desc: &'static str) -> Self {
        Self {
            short: Some(short),
            ..Self::long_only(long, desc)
        }
    }

    pub const fn long_only(long: &'static str, desc: &'static str) -> Self {
        Self {
            short: None,
            long,
            desc,
            arg: None,
            arity: Arity::None,
            flags: OptionFlags::NONE,
            min: 0,
            max: 0,
            default: 0,
            group: 0,
        }
    }

    /// Expect exactly one argument labelled `label`.
    pub const fn arg(self, label: &'static str) -> Self {
        self.args(label, Arity::Fixed(1))
    }

    pub const fn args(mut self, label: &'static str, arity: Arity) -> Self {
        self.arg = Some(label);
        self.arity = arity;
        self
    }

    pub const fn required(self) -> Self {
        self.flag(OptionFlags::REQUIRED)
    }

    pub const fn hidden(self) -> Self {
        self.flag(OptionFlags::HIDDEN)
    }

    pub const fn optional_arg(self) -> Self {
        self.flag(OptionFlags::OPTIONAL_ARG)
    }

    pub const fn subcommand(self) -> Self {
        self.flag(OptionFlags::SUBCOMMAND)
    }

    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.min = min;
        self.max = max;
        self.flag(OptionFlags::RANGE)
    }

    pub const fn default_value(mut self, value: i64) -> Self {
        self.default = value;
        self.flag(OptionFlags::DEFAULT)
    }

    pub const fn group(mut self, mask: u32) -> Self {
        self.group = mask;
        self
    }

    const fn flag(mut self, flag: OptionFlags) -> Self {
        self.flags = self.flags.union(flag);
        self
    }

    pub fn is(&self, flag: OptionFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn in_group(&self, mask: u32) -> bool {
        self.group & mask != 0
    }

    /// `-d/--cache-device`, or `--name` without a short form.
    pub fn slash_name(&self) -> String {
        match self.short {
            Some(c) => format!("-{c}/--{}", self.long),
            None => format!("--{}", self.long),
        }
    }

    /// `--cache-device (-d)`, or `--name` without a short form.
    pub fn bracket_name(&self) -> String {
        bracket_name(self.long, self.short)
    }
}

pub(crate) fn bracket_name(long: &str, short: Option<char>) -> String {
    match short {
        Some(c) => format!("--{long} (-{c})"),
        None => format!("--{long}"),
    }
}

/// Named option sub-group of a namespaced command.
#[derive(Debug, Clone, Copy)]
pub struct NamespaceEntry {
    pub name: &'static str,
    pub desc: &'static str,
    pub options: &'static [OptionSpec],
}

/// Second-level dispatch key of a command, e.g. `--name seq-cutoff`.
#[derive(Debug, Clone, Copy)]
pub struct NamespaceSpec {
    pub short: Option<char>,
    pub long: &'static str,
    pub entries: &'static [NamespaceEntry],
}

impl NamespaceSpec {
    pub fn entry(&self, name: &str) -> Option<&NamespaceEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Error and output streams handed to command handlers.
pub struct Output<'a> {
    pub out: &'a mut (dyn Write + Send),
    pub err: &'a mut (dyn Write + Send),
}

impl<'a> Output<'a> {
    pub fn new(out: &'a mut (dyn Write + Send), err: &'a mut (dyn Write + Send)) -> Self {
        Self { out, err }
    }

    /// Print one line to the output stream. Write failures are ignored.
    pub fn say(&mut self, line: impl fmt::Display) {
        let _ = writeln!(self.out, "{line}");
    }

    /// Print one line to the error stream. Write failures are ignored.
    pub fn error(&mut self, line: impl fmt::Display) {
        let _ = writeln!(self.err, "{line}");
    }
}

/// Validates and stores the arguments of one flat option.
pub type OptionHandler<C> = fn(&mut C, &str, &[String]) -> Result<(), String>;
/// Validates and stores the arguments of one option of a namespace entry.
pub type NamespaceHandler<C> = fn(&mut C, &str, &str, &[String]) -> Result<(), String>;
/// Runs the command once every option was accepted.
pub type CommandHandler<C> = fn(&mut C, &ParseState<'_>, &mut Output<'_>) -> ExitStatus;
/// Replaces the generated help of a command.
pub type HelpPrinter<C> = fn(&App, &CommandSpec<C>, &mut dyn Write) -> io::Result<()>;
/// Returns `false` when the command cannot run in this environment.
pub type Configure<C> = fn(&CommandSpec<C>) -> bool;

/// Either a flat option set, a namespace, or nothing.
pub enum CommandBody<C> {
    Options {
        options: &'static [OptionSpec],
        handler: OptionHandler<C>,
    },
    Namespace {
        namespace: &'static NamespaceSpec,
        handler: NamespaceHandler<C>,
    },
    Bare,
}

impl<C> CommandBody<C> {
    pub fn options(&self) -> Option<&'static [OptionSpec]> {
        match self {
            CommandBody::Options { options, .. } => Some(options),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<&'static NamespaceSpec> {
        match self {
            CommandBody::Namespace { namespace, .. } => Some(namespace),
            _ => None,
        }
    }
}

/// One top-level command such as `--start-cache`.
pub struct CommandSpec<C> {
    pub name: &'static str,
    pub short: Option<char>,
    pub desc: &'static str,
    pub long_desc: Option<&'static str>,
    pub body: CommandBody<C>,
    pub handle: CommandHandler<C>,
    pub flags: CommandFlags,
    pub help: Option<HelpPrinter<C>>,
    pub configure: Option<Configure<C>>,
}

impl<C> CommandSpec<C> {
    pub fn new(name: &'static str, desc: &'static str, handle: CommandHandler<C>) -> Self {
        Self {
            name,
            short: None,
            desc,
            long_desc: None,
            body: CommandBody::Bare,
            handle,
            flags: CommandFlags::NONE,
            help: None,
            configure: None,
        }
    }

    pub fn short(mut self, c: char) -> Self {
        self.short = Some(c);
        self
    }

    pub fn long_desc(mut self, desc: &'static str) -> Self {
        self.long_desc = Some(desc);
        self
    }

    pub fn options(mut self, options: &'static [OptionSpec], handler: OptionHandler<C>) -> Self {
        self.body = CommandBody::Options { options, handler };
        self
    }

    pub fn namespace(mut self, namespace: &'static NamespaceSpec, handler: NamespaceHandler<C>) -> Self {
        self.body = CommandBody::Namespace { namespace, handler };
        self
    }

    pub fn privileged(mut self) -> Self {
        self.flags = self.flags.union(CommandFlags::PRIVILEGED);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.flags = self.flags.union(CommandFlags::HIDDEN);
        self
    }

    pub fn skip_audit(mut self) -> Self {
        self.flags = self.flags.union(CommandFlags::SKIP_AUDIT);
        self
    }

    pub fn help(mut self, printer: HelpPrinter<C>) -> Self {
        self.help = Some(printer);
        self
    }

    pub fn configure(mut self, probe: Configure<C>) -> Self {
        self.configure = Some(probe);
        self
    }

    pub fn is(&self, flag: CommandFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Whether `token` names this command (`-S` or `--start-cache`).
    pub fn matches(&self, token: &str) -> bool {
        crate::cli::parser::args_is(token, self.name, self.short)
    }

    /// `-S` or an empty string.
    pub fn short_label(&self) -> String {
        self.short.map(|c| format!("-{c}")).unwrap_or_default()
    }

    pub fn bracket_name(&self) -> String {
        bracket_name(self.name, self.short)
    }
}

/// Program-level values used by help output and the dispatcher.
#[derive(Debug, Clone)]
pub struct App {
    pub name: &'static str,
    /// Trailing part of the short usage line.
    pub info: &'static str,
    pub title: &'static str,
    /// Manual page, when one is installed.
    pub man: Option<&'static str>,
    /// Whether the invoking identity may run privileged commands.
    pub privileged: bool,
    /// System logs probed for kernel messages after a failure.
    pub system_logs: Vec<std::path::PathBuf>,
}

impl App {
    pub fn new(name: &'static str, title: &'static str) -> Self {
        Self {
            name,
            info: "<command> [option...]",
            title,
            man: Some(name),
            privileged: true,
            system_logs: Vec::new(),
        }
    }
}
