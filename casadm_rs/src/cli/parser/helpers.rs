//! Token shape checks and command suggestions.

use strsim::levenshtein;

use crate::cli::command::{CommandFlags, CommandSpec, OptionSpec};

/// Whether `token` has the shape of an option: `-X` with a single ASCII
/// letter, or `--` followed by an ASCII letter.
pub fn is_option_shaped(token: &str) -> bool {
    let bytes = token.as_bytes();
    match bytes {
        [b'-', c] => c.is_ascii_alphabetic(),
        [b'-', b'-', c, ..] => c.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Exact match of `token` against `--long` or `-short`. No abbreviations.
pub fn args_is(token: &str, long: &str, short: Option<char>) -> bool {
    if let Some(rest) = token.strip_prefix("--") {
        return rest == long;
    }
    match (token.strip_prefix('-'), short) {
        (Some(rest), Some(c)) => {
            let mut chars = rest.chars();
            chars.next() == Some(c) && chars.next().is_none()
        }
        _ => false,
    }
}

pub fn is_help(token: &str) -> bool {
    args_is(token, "help", Some('H'))
}

/// Number of tokens at the start of `tokens` that are arguments rather
/// than the next option. A lone `-` is an argument (stdin).
pub fn count_arg_params(tokens: &[String]) -> usize {
    tokens
        .iter()
        .position(|t| {
            let mut chars = t.chars();
            chars.next() == Some('-') && chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '-')
        })
        .unwrap_or(tokens.len())
}

pub fn find_option<'m>(options: &'m [OptionSpec], token: &str) -> Option<(usize, &'m OptionSpec)> {
    options
        .iter()
        .enumerate()
        .find(|(_, opt)| args_is(token, opt.long, opt.short))
}

/// Suggest a visible command whose long name is close to `input`.
/// `hidden[i]` hides `commands[i]` for this invocation.
/// Returns Some(name) if a close match is found (distance <= 2).
pub fn suggest_similar_command<C>(
    input: &str,
    commands: &[CommandSpec<C>],
    hidden: &[bool],
) -> Option<&'static str> {
    let input = input.trim_start_matches('-').to_lowercase();
    if input.is_empty() {
        return None;
    }
    let mut best: Option<(&'static str, usize)> = None;
    let visible = commands
        .iter()
        .enumerate()
        .filter(|(i, c)| !c.is(CommandFlags::HIDDEN) && !hidden.get(*i).copied().unwrap_or(false))
        .map(|(_, c)| c);
    for cmd in visible {
        let distance = levenshtein(&input, cmd.name);
        if distance <= 2 && best.is_none_or(|(_, d)| distance < d) {
            best = Some((cmd.name, distance));
        }
    }
    best.map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn option_shapes() {
        assert!(is_option_shaped("-S"));
        assert!(is_option_shaped("--start-cache"));
        assert!(!is_option_shaped("-"));
        assert!(!is_option_shaped("-SS"));
        assert!(!is_option_shaped("-1"));
        assert!(!is_option_shaped("--1"));
        assert!(!is_option_shaped("/dev/sdb"));
        assert!(!is_option_shaped(""));
    }

    #[test]
    fn exact_matches_only() {
        assert!(args_is("-d", "cache-device", Some('d')));
        assert!(args_is("--cache-device", "cache-device", Some('d')));
        assert!(!args_is("--cache", "cache-device", Some('d')));
        assert!(!args_is("-dx", "cache-device", Some('d')));
        assert!(!args_is("-d", "device", None));
        assert!(!args_is("cache-device", "cache-device", None));
    }

    #[test]
    fn help_tokens() {
        assert!(is_help("-H"));
        assert!(is_help("--help"));
        assert!(!is_help("-h"));
    }

    #[test]
    fn counts_arguments_until_next_option() {
        assert_eq!(count_arg_params(&tokens(&["/dev/sdb", "-i", "1"])), 1);
        assert_eq!(count_arg_params(&tokens(&["a", "b"])), 2);
        assert_eq!(count_arg_params(&tokens(&["-", "--force"])), 1);
        assert_eq!(count_arg_params(&tokens(&["-5"])), 1);
        assert_eq!(count_arg_params(&tokens(&["--force"])), 0);
        assert_eq!(count_arg_params(&[]), 0);
    }
}
