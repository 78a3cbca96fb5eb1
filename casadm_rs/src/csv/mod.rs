//! CSV micro-parser.
//!
//! Reads one line at a time and splits it into columns. Used for IO class
//! configuration files and for decoding the intermediate statistics stream.
//!
//! - Separator is configurable (default `,`).
//! - Double quotes protect separators and whitespace; `""` inside quotes is a
//!   literal quote. Anything after a closing quote up to the next separator
//!   is ignored.
//! - Unquoted leading and trailing whitespace is trimmed.
//! - An optional comment character truncates the rest of the line.
//! - An empty line yields exactly one empty column.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;

/// Initial capacity of the line buffer; grows by doubling.
pub const INITIAL_LINE_CAPACITY: usize = 20;
/// Longest accepted line, excluding the newline.
pub const MAX_LINE_LENGTH: usize = 8192;
/// Most columns accepted in one line.
pub const MAX_COLUMNS: usize = 100;

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("I/O error while reading CSV input: {0}")]
    Io(#[from] io::Error),
    #[error("line exceeds {limit} characters")]
    LineTooLong { limit: usize },
    #[error("line has more than {limit} columns")]
    TooManyColumns { limit: usize },
}

/// Line-oriented CSV reader over any buffered source.
pub struct CsvReader<R> {
    reader: R,
    line: Vec<u8>,
    columns: Vec<String>,
    separator: u8,
    comment: Option<u8>,
    eof: bool,
}

impl CsvReader<BufReader<File>> {
    /// Open a file on disk.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> CsvReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(INITIAL_LINE_CAPACITY),
            columns: Vec::with_capacity(2),
            separator: b',',
            comment: None,
            eof: false,
        }
    }

    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Treat `marker` outside quotes as the start of a comment.
    pub fn with_comment(mut self, marker: u8) -> Self {
        self.comment = Some(marker);
        self
    }

    /// Read and tokenize the next line.
    ///
    /// Returns `Ok(false)` at end of input.
    pub fn read_record(&mut self) -> Result<bool, CsvError> {
        if !self.read_line()? {
            return Ok(false);
        }
        self.tokenize()?;
        Ok(true)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(String::as_str)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// No columns, or a single empty one.
    pub fn is_empty_line(&self) -> bool {
        match self.columns.as_slice() {
            [] => true,
            [only] => only.is_empty(),
            _ => false,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    fn read_line(&mut self) -> Result<bool, CsvError> {
        let reader = &mut self.reader;
        let line = &mut self.line;
        line.clear();
        if self.eof {
            return Ok(false);
        }

        loop {
            let available = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if available.is_empty() {
                self.eof = true;
                return Ok(!line.is_empty());
            }

            let newline = available.iter().position(|b| *b == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            let needed = line.len() + chunk.len();
            if needed > MAX_LINE_LENGTH {
                return Err(CsvError::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                });
            }
            if needed > line.capacity() {
                let mut capacity = line.capacity().max(INITIAL_LINE_CAPACITY);
                while capacity < needed {
                    capacity *= 2;
                }
                line.reserve_exact(capacity - line.len());
            }
            line.extend_from_slice(chunk);

            let consumed = newline.map_or(chunk.len(), |pos| pos + 1);
            reader.consume(consumed);
            if newline.is_some() {
                return Ok(true);
            }
        }
    }

    fn tokenize(&mut self) -> Result<(), CsvError> {
        let text = String::from_utf8_lossy(&self.line).into_owned();
        let separator = self.separator as char;
        let comment = self.comment.map(|c| c as char);

        self.columns.clear();
        let mut field = Field::default();
        let mut quoted = false;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            if quoted {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push_quoted('"');
                    } else {
                        quoted = false;
                        field.closed = true;
                    }
                } else {
                    field.push_quoted(c);
                }
                continue;
            }

            if c == separator {
                if self.columns.len() + 1 >= MAX_COLUMNS {
                    return Err(CsvError::TooManyColumns { limit: MAX_COLUMNS });
                }
                self.columns.push(std::mem::take(&mut field).finish());
            } else if c == '"' {
                quoted = true;
                field.open_quote();
            } else if Some(c) == comment {
                break;
            } else if c.is_whitespace() {
                field.push_space(c);
            } else {
                field.push_plain(c);
            }
        }

        self.columns.push(field.finish());
        Ok(())
    }
}

/// Accumulator for a single column.
#[derive(Default)]
struct Field {
    value: String,
    pending_space: String,
    /// A closing quote was seen; the rest of the column is ignored.
    closed: bool,
}

impl Field {
    fn open_quote(&mut self) {
        if !self.closed {
            self.value.clear();
            self.pending_space.clear();
        }
    }

    fn push_quoted(&mut self, c: char) {
        if !self.closed {
            self.value.push(c);
        }
    }

    fn push_plain(&mut self, c: char) {
        if self.closed {
            return;
        }
        if !self.value.is_empty() {
            self.value.push_str(&self.pending_space);
        }
        self.pending_space.clear();
        self.value.push(c);
    }

    fn push_space(&mut self, c: char) {
        if !self.closed && !self.value.is_empty() {
            self.pending_space.push(c);
        }
    }

    fn finish(self) -> String {
        self.value
    }
}

/// Print CSV input as a lettered grid, e.g. for inspecting configuration files.
pub fn pretty_print<R: BufRead, W: Write>(input: R, out: &mut W) -> Result<(), CsvError> {
    const MIN_COLUMN_WIDTH: usize = 5;

    let mut reader = CsvReader::new(input);
    let mut rows = Vec::new();
    while reader.read_record()? {
        rows.push(reader.columns().to_vec());
    }

    let num_cols = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let mut widths = vec![MIN_COLUMN_WIDTH; num_cols];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    write!(out, "     | ")?;
    for (i, width) in widths.iter().enumerate() {
        let before = width / 2;
        let letter = char::from(b'A' + (i % 26) as u8);
        write!(
            out,
            "{}{}{} | ",
            " ".repeat(before),
            letter,
            " ".repeat(width - before - 1)
        )?;
    }
    write!(out, "\n-----|-")?;
    for width in &widths {
        write!(out, "{}-|-", "-".repeat(*width))?;
    }
    writeln!(out)?;

    for (n, row) in rows.iter().enumerate() {
        write!(out, "{:4} | ", n + 1)?;
        for (i, width) in widths.iter().enumerate() {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            write!(out, "{cell:<width$} | ")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_lines(input: &str) -> Vec<Vec<String>> {
        let mut reader = CsvReader::new(input.as_bytes());
        let mut out = Vec::new();
        while reader.read_record().expect("valid csv") {
            out.push(reader.columns().to_vec());
        }
        out
    }

    #[test]
    fn splits_and_trims_unquoted_fields() {
        let rows = parse_lines("KV_PAIR, Cache Id ,  1\n");
        assert_eq!(rows, vec![vec!["KV_PAIR", "Cache Id", "1"]]);
    }

    #[test]
    fn quoted_fields_keep_separators_and_spaces() {
        let rows = parse_lines("a,\" x, y \",\"say \"\"hi\"\"\"\n");
        assert_eq!(rows[0], vec!["a", " x, y ", "say \"hi\""]);
    }

    #[test]
    fn text_after_closing_quote_is_ignored() {
        let rows = parse_lines("\"abc\"def,g\n");
        assert_eq!(rows[0], vec!["abc", "g"]);
    }

    #[test]
    fn empty_line_has_one_empty_column() {
        let mut reader = CsvReader::new("\n   \nx\n".as_bytes());
        assert!(reader.read_record().unwrap());
        assert_eq!(reader.column_count(), 1);
        assert!(reader.is_empty_line());
        assert!(reader.read_record().unwrap());
        assert!(reader.is_empty_line());
        assert!(reader.read_record().unwrap());
        assert!(!reader.is_empty_line());
        assert!(!reader.read_record().unwrap());
        assert!(reader.is_eof());
    }

    #[test]
    fn trailing_separator_yields_empty_column() {
        let rows = parse_lines("DATA_SET,\n");
        assert_eq!(rows[0], vec!["DATA_SET", ""]);
    }

    #[test]
    fn last_line_without_newline_is_read() {
        let rows = parse_lines("a,b\nc,d");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["c", "d"]);
    }

    #[test]
    fn comment_truncates_line() {
        let mut reader = CsvReader::new("a,b # note\n\"#x\",y\n".as_bytes()).with_comment(b'#');
        assert!(reader.read_record().unwrap());
        assert_eq!(reader.columns(), ["a", "b"]);
        assert!(reader.read_record().unwrap());
        assert_eq!(reader.columns(), ["#x", "y"]);
    }

    #[test]
    fn custom_separator() {
        let mut reader = CsvReader::new("a;b,c\n".as_bytes()).with_separator(b';');
        assert!(reader.read_record().unwrap());
        assert_eq!(reader.columns(), ["a", "b,c"]);
    }

    #[test]
    fn long_lines_grow_the_buffer() {
        let field = "x".repeat(500);
        let rows = parse_lines(&format!("{field},{field}\n"));
        assert_eq!(rows[0][1].len(), 500);
    }

    #[test]
    fn rejects_overlong_line() {
        let input = "y".repeat(MAX_LINE_LENGTH + 1);
        let mut reader = CsvReader::new(input.as_bytes());
        assert!(matches!(
            reader.read_record(),
            Err(CsvError::LineTooLong { .. })
        ));
    }

    #[test]
    fn rejects_too_many_columns() {
        let input = ",".repeat(MAX_COLUMNS);
        let mut reader = CsvReader::new(input.as_bytes());
        assert!(matches!(
            reader.read_record(),
            Err(CsvError::TooManyColumns { .. })
        ));

        let input = ",".repeat(MAX_COLUMNS - 1);
        let mut reader = CsvReader::new(input.as_bytes());
        assert!(reader.read_record().unwrap());
        assert_eq!(reader.column_count(), MAX_COLUMNS);
    }

    #[test]
    fn pretty_prints_lettered_grid() {
        let mut out = Vec::new();
        pretty_print("id,name\n1,unclassified\n".as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "     |   A   |       B      | ");
        assert_eq!(lines[1], "-----|-------|--------------|-");
        assert_eq!(lines[2], "   1 | id    | name         | ");
        assert_eq!(lines[3], "   2 | 1     | unclassified | ");
    }
}
