//! Human readable renderer: bordered tables, device trees and key/value
//! blocks.
//!
//! Rows are buffered in a [`Grid`] until a boundary tag arrives; only then
//! are column widths known and the block printed. Tables wider than the
//! screen get their widest columns shrunk and over-long cells broken at
//! `/`, `-` or space into continuation segments stored at column
//! `j + n * num_cols` of the same row.

use std::io::{self, Write};

use super::table::Grid;
use super::{RenderError, Renderer, Tag};
use crate::colors::Painter;
use crate::terminal::TerminalEnv;

/// Spaces between a key and its first value.
const KV_GAP: usize = 2;

struct BoxChars {
    outer_horiz: char,
    outer_right: char,
    outer_left: char,
    outer_vert: char,
    outer_x: char,
    outer_lt: char,
    outer_lb: char,
    outer_rt: char,
    outer_rb: char,
    inner_horiz: char,
    inner_right: char,
    inner_left: char,
    inner_top: char,
    inner_bottom: char,
    inner_vert: char,
    inner_x: char,
    leaf: char,
    leaf_last: char,
}

static UNICODE_BOXES: BoxChars = BoxChars {
    outer_horiz: '\u{2550}',
    outer_right: '\u{2563}',
    outer_left: '\u{2560}',
    outer_vert: '\u{2551}',
    outer_x: '\u{256a}',
    outer_lt: '\u{2554}',
    outer_lb: '\u{255a}',
    outer_rt: '\u{2557}',
    outer_rb: '\u{255d}',
    inner_horiz: '\u{2500}',
    inner_right: '\u{2562}',
    inner_left: '\u{255f}',
    inner_top: '\u{2564}',
    inner_bottom: '\u{2567}',
    inner_vert: '\u{2502}',
    inner_x: '\u{253c}',
    leaf: '\u{251c}',
    leaf_last: '\u{2514}',
};

static ASCII_BOXES: BoxChars = BoxChars {
    outer_horiz: '=',
    outer_right: '+',
    outer_left: '+',
    outer_vert: '|',
    outer_x: '+',
    outer_lt: '+',
    outer_lb: '+',
    outer_rt: '+',
    outer_rb: '+',
    inner_horiz: '-',
    inner_right: '+',
    inner_left: '+',
    inner_top: '+',
    inner_bottom: '+',
    inner_vert: '|',
    inner_x: '+',
    leaf: '+',
    leaf_last: '+',
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Rule {
    Top,
    AfterHeader,
    Internal,
    Bottom,
}

fn display_len(s: &str) -> usize {
    s.chars().count()
}

/// Digits with at most one inner `.` and an optional trailing `%`.
fn is_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    let mut dots = 0;
    for (i, &c) in bytes.iter().enumerate() {
        match c {
            b'0'..=b'9' => {}
            b'.' => {
                if dots > 0 || i == 0 {
                    return false;
                }
                dots += 1;
            }
            b'%' => {
                if i + 1 != bytes.len() || i == 0 || bytes[i - 1] == b'.' {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

fn is_unit_cell(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('[') && s.ends_with(']')
}

/// Drop unit brackets from one segment of a unit cell.
fn strip_unit(segment: &str, first_segment: bool) -> &str {
    let s = if first_segment {
        segment.strip_prefix('[').unwrap_or(segment)
    } else {
        segment
    };
    s.strip_suffix(']').unwrap_or(s)
}

fn looks_numeric_value(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit())
        && s.ends_with(|c: char| c.is_ascii_digit() || c == '%')
}

pub struct TextRenderer<W: Write> {
    out: W,
    grid: Grid,
    row_types: Vec<Tag>,
    col_w: Vec<usize>,
    num_cols: usize,
    boxes: &'static BoxChars,
    painter: Painter,
    screen_width: usize,
    /// Cursor column while printing key/value blocks.
    col_ptr: usize,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W, env: &TerminalEnv) -> Self {
        Self {
            out,
            grid: Grid::new(),
            row_types: Vec::new(),
            col_w: Vec::new(),
            num_cols: 0,
            boxes: if env.unicode_boxes() {
                &UNICODE_BOXES
            } else {
                &ASCII_BOXES
            },
            painter: env.painter(),
            screen_width: env.screen_width(),
            col_ptr: 0,
        }
    }

    fn spaces(&mut self, n: usize) -> io::Result<()> {
        write!(self.out, "{:n$}", "")
    }

    fn put(&mut self, c: char) -> io::Result<()> {
        write!(self.out, "{c}")
    }

    fn attr(&mut self, code: &str) -> io::Result<()> {
        self.out.write_all(code.as_bytes())
    }

    fn entire_cell(&self, row: usize, col: usize) -> String {
        (col % self.num_cols..self.grid.width())
            .step_by(self.num_cols)
            .map(|k| self.grid.get(row, k))
            .collect()
    }

    fn set_column_widths(&mut self) {
        let nc = self.num_cols;
        self.col_w = vec![0; nc];
        if nc == 0 {
            return;
        }
        for i in 0..self.grid.height() {
            for j in 0..self.grid.width() {
                let cell = self.grid.get(i, j);
                let mut len = display_len(cell);
                if is_unit_cell(cell) {
                    len -= 2;
                }
                let slot = &mut self.col_w[j % nc];
                *slot = (*slot).max(len);
            }
        }
    }

    /// Shrink columns to fit the screen, then break cells that no longer
    /// fit into continuation segments.
    fn adjust_column_widths(&mut self, cell_margin: usize, table_margin: usize) -> Result<(), RenderError> {
        let w = self.num_cols;
        if w == 0 {
            return Ok(());
        }
        let table_width: usize = self.col_w.iter().sum();
        let margins = (w - 1) * cell_margin + table_margin * 2;
        if table_width + margins <= self.screen_width {
            return Ok(());
        }

        let avg_width = table_width / w;
        let mut excess = table_width + margins - self.screen_width;
        let mut above_avg = self.col_w.iter().filter(|cw| **cw > avg_width).count();
        for width in self.col_w.iter_mut() {
            if *width > avg_width {
                let reduce_by = excess / above_avg;
                *width = width.saturating_sub(reduce_by);
                above_avg -= 1;
                excess -= reduce_by;
            }
        }

        for i in 0..self.grid.height() {
            for j in 0..w {
                let chars: Vec<char> = self.grid.get(i, j).chars().collect();
                let limit = self.col_w[j];
                let mut cuts = vec![0];
                let mut last = 0;
                let mut breakpoint = 0;
                for (k, c) in chars.iter().enumerate() {
                    if matches!(c, '/' | ' ' | '-') {
                        breakpoint = k;
                    }
                    if k - last >= limit && breakpoint > last {
                        cuts.push(breakpoint);
                        last = breakpoint;
                    }
                }
                if cuts.len() == 1 {
                    continue;
                }
                cuts.push(chars.len());
                for (n, bounds) in cuts.windows(2).enumerate() {
                    let segment: String = chars[bounds[0]..bounds[1]].iter().collect();
                    self.grid.set(i, j + w * n, segment)?;
                }
            }
        }

        let width = self.grid.width().div_ceil(w) * w;
        self.grid.set_width(width);
        self.set_column_widths();
        Ok(())
    }

    fn rule(&mut self, rule: Rule) -> io::Result<()> {
        let b = self.boxes;
        for c in 0..self.num_cols {
            let junction = match (c, rule) {
                (0, Rule::Top) => b.outer_lt,
                (0, Rule::AfterHeader) => b.outer_left,
                (0, Rule::Internal) => b.inner_left,
                (0, Rule::Bottom) => b.outer_lb,
                (_, Rule::Top) => b.inner_top,
                (_, Rule::AfterHeader) => b.outer_x,
                (_, Rule::Internal) => b.inner_x,
                (_, Rule::Bottom) => b.inner_bottom,
            };
            self.put(junction)?;
            let horiz = if rule == Rule::Internal {
                b.inner_horiz
            } else {
                b.outer_horiz
            };
            let line: String = std::iter::repeat_n(horiz, self.col_w[c] + 2).collect();
            self.out.write_all(line.as_bytes())?;
        }
        let end = match rule {
            Rule::Top => b.outer_rt,
            Rule::AfterHeader => b.outer_right,
            Rule::Internal => b.inner_right,
            Rule::Bottom => b.outer_rb,
        };
        self.put(end)?;
        self.put('\n')
    }

    fn finish_table(&mut self) -> io::Result<()> {
        let nc = self.num_cols;
        let w = self.grid.width();
        let h = self.grid.height();
        let p = self.painter;

        self.rule(Rule::Top)?;
        for i in 0..h {
            let row_type = self.row_types[i];
            for j in 0..w {
                let col = j % nc;
                let col_w = self.col_w[col];
                let cell = self.entire_cell(i, j);
                let segment = self.grid.get(i, j).to_string();
                let mut text = segment.as_str();
                let mut half_space = 0;

                let vert = if col == 0 {
                    self.boxes.outer_vert
                } else {
                    self.boxes.inner_vert
                };
                self.put(vert)?;

                let numeric = is_number(&cell);
                if numeric {
                    self.spaces(col_w.saturating_sub(display_len(text)))?;
                    self.attr(p.number())?;
                } else if col == 0 {
                    self.attr(p.bright())?;
                } else if row_type == Tag::TableHeader {
                    if is_unit_cell(&cell) {
                        text = strip_unit(text, j < nc);
                    }
                    half_space = col_w.saturating_sub(display_len(text)) / 2;
                    self.spaces(half_space)?;
                    self.attr(p.bright())?;
                } else if is_unit_cell(&cell) {
                    self.attr(p.unit())?;
                    text = strip_unit(text, j < nc);
                }

                write!(self.out, " {text} ")?;
                if !numeric {
                    self.spaces(col_w.saturating_sub(display_len(text) + half_space))?;
                }
                self.attr(p.reset())?;

                if col == nc - 1 || j == w - 1 {
                    self.put(self.boxes.outer_vert)?;
                    self.put('\n')?;
                    if !self.grid.has_content_from(i, j + 1) {
                        break;
                    }
                }
            }

            if row_type == Tag::TableHeader {
                self.rule(Rule::AfterHeader)?;
            } else if i + 1 < h && self.row_types[i + 1] == Tag::TableSection {
                self.rule(Rule::Internal)?;
            }
        }
        self.rule(Rule::Bottom)
    }

    fn finish_tree(&mut self) -> io::Result<()> {
        let nc = self.num_cols;
        let w = self.grid.width();
        let h = self.grid.height();
        let p = self.painter;

        for i in 0..h {
            let row_type = self.row_types[i];
            for j in 0..w {
                let col = j % nc;
                let on_path = self.grid.get(i, col).starts_with('/');
                let cell = self.grid.get(i, j).to_string();
                let mut cell_len = display_len(&cell);

                if j == 0 && row_type == Tag::TreeLeaf {
                    let last_leaf = i + 1 == h || self.row_types[i + 1] == Tag::TreeBranch;
                    let glyph = if last_leaf {
                        self.boxes.leaf_last
                    } else {
                        self.boxes.leaf
                    };
                    self.put(glyph)?;
                    cell_len += 1;
                }
                if j == 0 || row_type != Tag::TreeLeaf {
                    self.attr(p.bright())?;
                }
                if j == 3 {
                    self.attr(&p.status(&cell))?;
                }
                if is_number(&cell) {
                    self.attr(p.number())?;
                }
                if on_path {
                    let code = if row_type == Tag::TreeBranch {
                        p.branch()
                    } else {
                        p.path()
                    };
                    self.attr(code)?;
                }

                self.out.write_all(cell.as_bytes())?;
                if col != nc - 1 {
                    self.spaces((self.col_w[col] + 3).saturating_sub(cell_len))?;
                }
                self.attr(p.reset())?;

                if col == nc - 1 || j == w - 1 {
                    self.put('\n')?;
                    if !self.grid.has_content_from(i, j + 1) {
                        break;
                    }
                }
                if col == nc - 1 && j != w - 1 {
                    let prefix = if i + 1 == h { ' ' } else { self.boxes.inner_vert };
                    self.put(prefix)?;
                }
            }
        }
        Ok(())
    }

    fn kv_indent(&self) -> usize {
        self.col_w.first().copied().unwrap_or(0) + KV_GAP
    }

    fn print_spaces_wrapping(&mut self, n: usize) -> io::Result<()> {
        if self.col_ptr + n > self.screen_width {
            self.put('\n')?;
            self.col_ptr = self.kv_indent();
            self.spaces(self.col_ptr)
        } else {
            self.col_ptr += n;
            self.spaces(n)
        }
    }

    /// Print `word` after `gap` spaces, or on a fresh indented line when
    /// the pair would overflow. The gap is dropped at a line break.
    fn print_word(&mut self, gap: usize, word: &str, words_in_line: &mut usize) -> io::Result<()> {
        let len = display_len(word);
        if self.col_ptr + gap + len > self.screen_width && *words_in_line > 0 {
            self.put('\n')?;
            self.col_ptr = self.kv_indent();
            self.spaces(self.col_ptr)?;
            *words_in_line = 0;
        } else {
            self.col_ptr += gap;
            self.spaces(gap)?;
        }
        self.col_ptr += len;
        *words_in_line += 1;
        self.out.write_all(word.as_bytes())
    }

    /// Print `cell`, moving to a fresh indented line between words when it
    /// would overflow the screen. Words are never split.
    fn print_cell_wrapping(&mut self, cell: &str) -> io::Result<()> {
        let len = display_len(cell);
        if self.col_ptr + len <= self.screen_width {
            self.col_ptr += len;
            return self.out.write_all(cell.as_bytes());
        }
        let mut words_in_line = 0;
        for (n, word) in cell.split(' ').enumerate() {
            self.print_word(usize::from(n > 0), word, &mut words_in_line)?;
        }
        Ok(())
    }

    fn finish_kvs(&mut self) -> io::Result<()> {
        let p = self.painter;
        for i in 0..self.grid.height() {
            self.col_ptr = 0;
            for j in 0..self.num_cols {
                let cell = self.grid.get(i, j).to_string();
                if j > 0 && cell.is_empty() {
                    continue;
                }
                match j {
                    0 => self.attr(p.bright())?,
                    1 => self.print_spaces_wrapping(KV_GAP)?,
                    _ if cell.starts_with('[') => {
                        self.print_spaces_wrapping(1)?;
                        self.attr(p.unit())?;
                    }
                    _ => self.print_cell_wrapping(" / ")?,
                }

                if looks_numeric_value(&cell) {
                    self.attr(p.number())?;
                } else if cell.starts_with('/') {
                    self.attr(p.path())?;
                }
                self.print_cell_wrapping(&cell)?;
                if j == 0 {
                    let pad = self.col_w[0].saturating_sub(display_len(&cell));
                    self.print_spaces_wrapping(pad)?;
                }
                self.attr(p.reset())?;
            }
            self.put('\n')?;
        }
        Ok(())
    }

    /// Print the buffered block and start a new one.
    fn finish_structured_data(&mut self) -> Result<(), RenderError> {
        self.num_cols = self.grid.width();
        self.set_column_widths();

        if self.num_cols > 0 {
            match self.row_types.first() {
                Some(Tag::KvPair) => self.finish_kvs()?,
                Some(Tag::TableHeader | Tag::TableRow | Tag::TableSection) => {
                    self.adjust_column_widths(3, 4)?;
                    self.finish_table()?;
                }
                Some(Tag::TreeHeader | Tag::TreeBranch | Tag::TreeLeaf) => {
                    self.adjust_column_widths(3, 0)?;
                    self.finish_tree()?;
                }
                _ => {}
            }
        }

        self.out.flush()?;
        self.grid.reset();
        self.row_types.clear();
        Ok(())
    }

    fn starts_new_block(&self, tag: Tag) -> bool {
        let Some(&first) = self.row_types.first() else {
            return false;
        };
        match tag {
            Tag::TableHeader | Tag::TreeHeader => true,
            Tag::KvPair => first != Tag::KvPair,
            _ => first == Tag::KvPair,
        }
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn process_row(&mut self, tag: Tag, fields: &[String]) -> Result<(), RenderError> {
        match tag {
            Tag::Freeform => {
                if !self.grid.is_empty() {
                    self.finish_structured_data()?;
                }
                let p = self.painter;
                self.attr(p.bright())?;
                for field in fields {
                    self.out.write_all(field.as_bytes())?;
                }
                self.attr(p.reset())?;
                self.put('\n')?;
            }
            Tag::DataSet | Tag::Record => {
                if !self.grid.is_empty() {
                    self.finish_structured_data()?;
                    self.put('\n')?;
                }
            }
            _ => {
                if self.starts_new_block(tag) {
                    self.finish_structured_data()?;
                    self.put('\n')?;
                }
                self.grid.push_row(fields)?;
                self.row_types.push(tag);
            }
        }
        Ok(())
    }

    fn end_input(&mut self) -> Result<(), RenderError> {
        if !self.grid.is_empty() {
            self.finish_structured_data()?;
        }
        self.out.flush()?;
        Ok(())
    }
}
