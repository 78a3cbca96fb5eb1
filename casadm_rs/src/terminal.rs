//! Renderer environment: terminal type, locale, width and overrides.
//!
//! Everything the text renderer needs to know about its destination is
//! captured once in a [`TerminalEnv`], so renders never consult process
//! globals and repeated renders with the same snapshot are identical.

use std::io::IsTerminal;

use crate::colors::{self, Painter};
use crate::types::ColorMode;

/// Width used when `CASADM_NO_LINE_BREAK` is set.
pub const NO_WRAP_WIDTH: usize = 4096;
/// Width used when neither the terminal nor `COLUMNS` report one.
pub const DEFAULT_WIDTH: usize = 80;

/// Snapshot of the environment relevant to rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalEnv {
    /// `TERM`
    pub term: Option<String>,
    /// `LANG`
    pub lang: Option<String>,
    /// `CASADM_COLORS` set to a non-empty value.
    pub force_colors: bool,
    /// `NO_COLOR` set to a non-empty value.
    pub no_color: bool,
    /// `CASADM_NO_LINE_BREAK` present.
    pub no_line_break: bool,
    /// `COLUMNS`
    pub columns: Option<String>,
    /// Width reported by the terminal itself.
    pub window_width: Option<usize>,
    /// Whether stdout is a terminal.
    pub is_tty: bool,
}

impl TerminalEnv {
    /// Capture the environment of the running process.
    pub fn from_process() -> Self {
        let term = console::Term::stdout();
        Self {
            term: std::env::var("TERM").ok(),
            lang: std::env::var("LANG").ok(),
            force_colors: std::env::var("CASADM_COLORS").is_ok_and(|v| !v.is_empty()),
            no_color: std::env::var("NO_COLOR").is_ok_and(|v| !v.is_empty()),
            no_line_break: std::env::var_os("CASADM_NO_LINE_BREAK").is_some(),
            columns: std::env::var("COLUMNS").ok(),
            window_width: term.size_checked().map(|(_rows, cols)| cols as usize),
            is_tty: std::io::stdout().is_terminal(),
        }
    }

    /// A plain environment: no terminal, 80 columns, no decorations.
    pub fn plain(width: usize) -> Self {
        Self {
            window_width: Some(width),
            ..Self::default()
        }
    }

    /// `TERM` names a terminal that understands DEC attribute sequences.
    pub fn dec_terminal(&self) -> bool {
        self.term
            .as_deref()
            .is_some_and(|t| t.starts_with("xterm") || t == "screen")
    }

    pub fn utf8_locale(&self) -> bool {
        self.lang
            .as_deref()
            .is_some_and(|l| l.to_ascii_uppercase().contains("UTF-8"))
    }

    /// `CASADM_COLORS` wins over `NO_COLOR`.
    pub fn color_mode(&self) -> ColorMode {
        if self.force_colors {
            ColorMode::Always
        } else if self.no_color {
            ColorMode::Never
        } else {
            ColorMode::Auto
        }
    }

    pub fn painter(&self) -> Painter {
        Painter::new(colors::is_enabled(
            self.color_mode(),
            self.dec_terminal(),
            self.is_tty,
        ))
    }

    /// Unicode box drawing needs a DEC terminal with a UTF-8 locale that is
    /// either a real TTY or explicitly forced.
    pub fn unicode_boxes(&self) -> bool {
        self.dec_terminal() && self.utf8_locale() && (self.is_tty || self.force_colors)
    }

    /// Width available for wrapping key/value blocks and tables.
    pub fn screen_width(&self) -> usize {
        if self.no_line_break {
            return NO_WRAP_WIDTH;
        }
        if let Some(width) = self.window_width.filter(|w| *w > 0) {
            return width;
        }
        self.columns
            .as_deref()
            .and_then(|c| c.trim().parse::<usize>().ok())
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_WIDTH)
    }
}
