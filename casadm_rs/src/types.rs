//! Shared value types used across the CLI, renderers and control channel.

use std::fmt;

/// Process exit status of a casadm invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
    /// The user interrupted a long operation; the cache is still consistent.
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::Interrupted => 2,
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }

    pub fn label(self) -> &'static str {
        match self {
            ExitStatus::Success => "success",
            _ => "failure",
        }
    }
}

impl From<bool> for ExitStatus {
    fn from(ok: bool) -> Self {
        if ok {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }
}

/// Value accepted by `--output-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    /// Undocumented: the intermediate statistics stream as produced.
    Plain,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "table" => Some(OutputFormat::Table),
            "csv" => Some(OutputFormat::Csv),
            "plain" => Some(OutputFormat::Plain),
            _ => None,
        }
    }
}

/// Color mode for terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Decide from `TERM` and whether stdout is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

/// Caching mode of a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    Wt,
    Wb,
    Wa,
    Pt,
    Wi,
    Wo,
}

impl CacheMode {
    pub const ALL: [CacheMode; 6] = [
        CacheMode::Wt,
        CacheMode::Wb,
        CacheMode::Wa,
        CacheMode::Pt,
        CacheMode::Wi,
        CacheMode::Wo,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            CacheMode::Wt => "wt",
            CacheMode::Wb => "wb",
            CacheMode::Wa => "wa",
            CacheMode::Pt => "pt",
            CacheMode::Wi => "wi",
            CacheMode::Wo => "wo",
        }
    }

    pub fn long_name(self) -> &'static str {
        match self {
            CacheMode::Wt => "Write-Through",
            CacheMode::Wb => "Write-Back",
            CacheMode::Wa => "Write-Around",
            CacheMode::Pt => "Pass-Through",
            CacheMode::Wi => "Write-Invalidate",
            CacheMode::Wo => "Write-Only",
        }
    }

    /// Modes that may leave dirty data on the cache device.
    pub fn is_lazy_write(self) -> bool {
        matches!(self, CacheMode::Wb | CacheMode::Wo)
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
        assert_eq!(ExitStatus::Interrupted.code(), 2);
        assert_eq!(ExitStatus::Interrupted.label(), "failure");
    }

    #[test]
    fn parses_cache_modes() {
        assert_eq!(CacheMode::parse("wb"), Some(CacheMode::Wb));
        assert_eq!(CacheMode::parse("WB"), None);
        assert!(CacheMode::Wo.is_lazy_write());
        assert!(!CacheMode::Pt.is_lazy_write());
        assert_eq!(CacheMode::Wi.long_name(), "Write-Invalidate");
    }

    #[test]
    fn parses_output_format() {
        assert_eq!(OutputFormat::parse("csv"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::parse("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::parse("plain"), Some(OutputFormat::Plain));
        assert_eq!(OutputFormat::parse("json"), None);
    }
}
