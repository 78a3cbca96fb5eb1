//! VT100 attribute codes and the painter used by the text renderer.
//!
//! Attributes are emitted as separate `SET_ATTR` sequences so that a
//! color and the bright attribute can be stacked on a single cell.

use crate::types::ColorMode;

// ============================================================================
// VT100 Attribute Codes
// ============================================================================

pub const RESET: &str = "\x1b[0m";
pub const BRIGHT: &str = "\x1b[1m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const MAGENTA: &str = "\x1b[35m";
pub const CYAN: &str = "\x1b[36m";

// ============================================================================
// Color State
// ============================================================================

/// Determines if attributes should be emitted for the given mode.
///
/// `Auto` requires both a DEC-capable terminal type and a real TTY.
pub fn is_enabled(mode: ColorMode, dec_terminal: bool, is_tty: bool) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => dec_terminal && is_tty,
    }
}

/// Emits attribute sequences, or nothing when disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn attr(&self, code: &'static str) -> &'static str {
        if self.enabled { code } else { "" }
    }

    pub fn reset(&self) -> &'static str {
        self.attr(RESET)
    }

    /// First column, headers, freeform text - BRIGHT
    pub fn bright(&self) -> &'static str {
        self.attr(BRIGHT)
    }

    /// Numeric cells - YELLOW
    pub fn number(&self) -> &'static str {
        self.attr(YELLOW)
    }

    /// Bracketed units - CYAN
    pub fn unit(&self) -> &'static str {
        self.attr(CYAN)
    }

    /// Device paths - MAGENTA
    pub fn path(&self) -> &'static str {
        self.attr(MAGENTA)
    }

    /// Paths on tree branches - BLUE
    pub fn branch(&self) -> &'static str {
        self.attr(BLUE)
    }

    /// Status words in the tree view.
    pub fn status(&self, word: &str) -> String {
        let codes: &[&str] = match word {
            "Active" | "Running" | "Stopping" => &[GREEN],
            "Inactive" | "Detached" => &[RED, BRIGHT],
            "Incomplete" => &[YELLOW, BRIGHT],
            _ => &[],
        };
        codes.iter().map(|code| self.attr(code)).collect()
    }
}
