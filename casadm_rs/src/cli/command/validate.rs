//! Consistency checks over a command catalogue.

use std::collections::HashSet;

use thiserror::Error;

use super::types::{CommandBody, CommandSpec, MAX_NAMESPACE_OPTIONS, OptionSpec};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("command `{0}` is declared more than once")]
    DuplicateCommand(String),
    #[error("short name -{short} is used by more than one command")]
    DuplicateCommandShort { short: char },
    #[error("option `--{long}` is declared twice in `{owner}`")]
    DuplicateLong { owner: String, long: String },
    #[error("short option -{short} is declared twice in `{owner}`")]
    DuplicateShort { owner: String, short: char },
    #[error("`{owner}` declares an option without a long name")]
    EmptyLong { owner: String },
    #[error("namespace entry `{owner}` declares {count} options (limit {MAX_NAMESPACE_OPTIONS})")]
    TooManyOptions { owner: String, count: usize },
}

fn check_options(owner: &str, options: &[OptionSpec]) -> Result<(), ModelError> {
    let mut longs = HashSet::new();
    let mut shorts = HashSet::new();
    for opt in options {
        if opt.long.is_empty() {
            return Err(ModelError::EmptyLong { owner: owner.to_string() });
        }
        if !longs.insert(opt.long) {
            return Err(ModelError::DuplicateLong {
                owner: owner.to_string(),
                long: opt.long.to_string(),
            });
        }
        if let Some(short) = opt.short
            && !shorts.insert(short)
        {
            return Err(ModelError::DuplicateShort {
                owner: owner.to_string(),
                short,
            });
        }
    }
    Ok(())
}

/// Verify the uniqueness and capacity rules every catalogue must satisfy.
pub fn validate<C>(commands: &[CommandSpec<C>]) -> Result<(), ModelError> {
    let mut names = HashSet::new();
    let mut shorts = HashSet::new();
    for cmd in commands {
        if !names.insert(cmd.name) {
            return Err(ModelError::DuplicateCommand(cmd.name.to_string()));
        }
        if let Some(short) = cmd.short
            && !shorts.insert(short)
        {
            return Err(ModelError::DuplicateCommandShort { short });
        }
        match &cmd.body {
            CommandBody::Options { options, .. } => check_options(cmd.name, options)?,
            CommandBody::Namespace { namespace, .. } => {
                for entry in namespace.entries {
                    let owner = format!("{} {}", cmd.name, entry.name);
                    if entry.options.len() > MAX_NAMESPACE_OPTIONS {
                        return Err(ModelError::TooManyOptions {
                            owner,
                            count: entry.options.len(),
                        });
                    }
                    check_options(&owner, entry.options)?;
                }
            }
            CommandBody::Bare => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::command::{NamespaceEntry, NamespaceSpec, Output, ParseState};
    use crate::types::ExitStatus;

    fn noop(_: &mut (), _: &ParseState<'_>, _: &mut Output<'_>) -> ExitStatus {
        ExitStatus::Success
    }

    fn accept(_: &mut (), _: &str, _: &[String]) -> Result<(), String> {
        Ok(())
    }

    fn accept_ns(_: &mut (), _: &str, _: &str, _: &[String]) -> Result<(), String> {
        Ok(())
    }

    const CLASHING: &[OptionSpec] = &[
        OptionSpec::new('d', "cache-device", ""),
        OptionSpec::new('d', "device", ""),
    ];

    const TOO_MANY: &[OptionSpec] = &[OptionSpec::long_only("x", ""); MAX_NAMESPACE_OPTIONS + 1];

    static CROWDED: NamespaceSpec = NamespaceSpec {
        short: Some('n'),
        long: "name",
        entries: &[NamespaceEntry {
            name: "crowded",
            desc: "",
            options: TOO_MANY,
        }],
    };

    #[test]
    fn accepts_consistent_catalogue() {
        let commands = vec![
            CommandSpec::new("start-cache", "", noop).short('S'),
            CommandSpec::new("help", "", noop).short('H'),
        ];
        assert_eq!(validate(&commands), Ok(()));
    }

    #[test]
    fn rejects_duplicate_short_options() {
        let commands = vec![CommandSpec::new("start-cache", "", noop).options(CLASHING, accept)];
        assert_eq!(
            validate(&commands),
            Err(ModelError::DuplicateShort {
                owner: "start-cache".into(),
                short: 'd'
            })
        );
    }

    #[test]
    fn rejects_duplicate_commands() {
        let commands = vec![
            CommandSpec::new("stats", "", noop),
            CommandSpec::new("stats", "", noop),
        ];
        assert!(matches!(validate(&commands), Err(ModelError::DuplicateCommand(_))));
    }

    #[test]
    fn rejects_overfull_namespace_entry() {
        let commands = vec![CommandSpec::new("set-param", "", noop).namespace(&CROWDED, accept_ns)];
        assert!(matches!(
            validate(&commands),
            Err(ModelError::TooManyOptions { count: 33, .. })
        ));
    }
}
