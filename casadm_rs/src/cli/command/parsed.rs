//! ParseState - runtime record of which options an invocation supplied.

use super::types::OptionSpec;

/// Options seen while parsing one invocation.
///
/// Kept apart from the static [`OptionSpec`] tables so that repeated
/// invocations (tests, in particular) never observe each other.
#[derive(Debug, Clone)]
pub struct ParseState<'m> {
    options: &'m [OptionSpec],
    supplied: Vec<bool>,
    entry: Option<&'m str>,
}

impl<'m> ParseState<'m> {
    pub fn new(options: &'m [OptionSpec]) -> Self {
        Self {
            options,
            supplied: vec![false; options.len()],
            entry: None,
        }
    }

    /// State for a command without options.
    pub fn empty() -> Self {
        Self::new(&[])
    }

    pub(crate) fn with_entry(mut self, entry: &'m str) -> Self {
        self.entry = Some(entry);
        self
    }

    pub(crate) fn mark(&mut self, index: usize) {
        if let Some(slot) = self.supplied.get_mut(index) {
            *slot = true;
        }
    }

    pub fn options(&self) -> &'m [OptionSpec] {
        self.options
    }

    /// Namespace entry selected by the invocation, if any.
    pub fn entry(&self) -> Option<&'m str> {
        self.entry
    }

    pub fn is_supplied(&self, long: &str) -> bool {
        self.options
            .iter()
            .zip(&self.supplied)
            .any(|(opt, &seen)| seen && opt.long == long)
    }

    /// Supplied options in declaration order.
    pub fn supplied(&self) -> impl Iterator<Item = &'m OptionSpec> + '_ {
        self.options
            .iter()
            .zip(&self.supplied)
            .filter_map(|(opt, &seen)| seen.then_some(opt))
    }

    pub fn none_supplied(&self) -> bool {
        !self.supplied.iter().any(|&s| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTS: &[OptionSpec] = &[
        OptionSpec::new('i', "cache-id", ""),
        OptionSpec::new('f', "file", ""),
    ];

    #[test]
    fn tracks_supplied_options() {
        let mut state = ParseState::new(OPTS);
        assert!(state.none_supplied());
        state.mark(1);
        assert!(state.is_supplied("file"));
        assert!(!state.is_supplied("cache-id"));
        let names: Vec<_> = state.supplied().map(|o| o.long).collect();
        assert_eq!(names, ["file"]);
    }

    #[test]
    fn fresh_state_per_invocation() {
        let mut first = ParseState::new(OPTS);
        first.mark(0);
        let second = ParseState::new(OPTS);
        assert!(second.none_supplied());
    }

    #[test]
    fn out_of_range_mark_is_ignored() {
        let mut state = ParseState::new(OPTS);
        state.mark(7);
        assert!(state.none_supplied());
    }
}
