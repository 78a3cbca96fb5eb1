//! Producer side of the intermediate statistics stream.

use std::io::{self, Write};

use super::{Tag, quote_field};

/// Writes tagged lines into a byte sink.
///
/// Write errors are remembered rather than returned: a producer keeps
/// collecting even if the consumer has already given up, and the render
/// result is what reports the failure.
pub struct StatWriter<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> StatWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, error: None }
    }

    /// Write `tag` followed by `fields`, quoting where needed.
    pub fn row<I, S>(&mut self, tag: Tag, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut line = String::from(tag.name());
        for field in fields {
            line.push(',');
            line.push_str(&quote_field(field.as_ref()));
        }
        self.raw_line(&line);
    }

    pub fn data_set(&mut self, title: &str) {
        self.row(Tag::DataSet, [title]);
    }

    pub fn record(&mut self) {
        self.row(Tag::Record, [""]);
    }

    pub fn kv<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: Vec<String> = values.into_iter().map(|v| v.as_ref().to_string()).collect();
        self.row(Tag::KvPair, std::iter::once(key.to_string()).chain(values));
    }

    pub fn table_header(&mut self, columns: &[&str]) {
        self.row(Tag::TableHeader, columns);
    }

    /// Row of a `value, percent, [unit]` table.
    pub fn value_percent(&mut self, tag: Tag, title: &str, value: u64, percent: f64, unit: &str) {
        let value = value.to_string();
        let percent = format!("{percent:.1}");
        let unit = format!("[{unit}]");
        self.row(tag, [title, value.as_str(), percent.as_str(), unit.as_str()]);
    }

    pub fn freeform(&mut self, text: &str) {
        self.row(Tag::Freeform, [text]);
    }

    /// Write a pre-formatted line verbatim.
    pub fn raw_line(&mut self, line: &str) {
        if self.error.is_some() {
            return;
        }
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        if let Err(e) = self.out.write_all(buf.as_bytes()) {
            self.error = Some(e);
        }
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
