//! Renderer interface and selection by output format.

use std::io::Write;

use super::csv_view::CsvRenderer;
use super::raw_csv::RawCsvRenderer;
use super::text::TextRenderer;
use super::{RenderError, Tag};
use crate::terminal::TerminalEnv;
use crate::types::OutputFormat;

/// Destination format of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Aligned tables, trees and key/value blocks.
    Text,
    /// Pivoted CSV with synthesized headers.
    Csv,
    /// Positional CSV without header synthesis.
    RawCsv,
    /// The intermediate stream itself.
    Plain,
}

impl Format {
    /// Pick the format for an `--output-format` value. Commands whose
    /// consumers already know the column layout use raw CSV.
    pub fn for_output(output: OutputFormat, raw: bool) -> Self {
        match (output, raw) {
            (OutputFormat::Table, _) => Format::Text,
            (OutputFormat::Csv, false) => Format::Csv,
            (OutputFormat::Csv, true) => Format::RawCsv,
            (OutputFormat::Plain, _) => Format::Plain,
        }
    }
}

/// A consumer of parsed stream rows.
///
/// Construction is the renderer's constructor and destruction its `Drop`.
/// `process_row` sees rows strictly in order and must not assume the final
/// size of the table it is building.
pub trait Renderer {
    fn process_row(&mut self, tag: Tag, fields: &[String]) -> Result<(), RenderError>;

    /// Flush whatever is still buffered.
    fn end_input(&mut self) -> Result<(), RenderError>;
}

/// Build the renderer for `format`. `Plain` is handled before parsing and
/// falls back to raw CSV here.
pub fn renderer<'a, W: Write + 'a>(
    format: Format,
    out: &'a mut W,
    env: &TerminalEnv,
) -> Box<dyn Renderer + 'a> {
    match format {
        Format::Text => Box::new(TextRenderer::new(out, env)),
        Format::Csv => Box::new(CsvRenderer::new(out)),
        Format::RawCsv | Format::Plain => Box::new(RawCsvRenderer::new(out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_mapping() {
        assert_eq!(Format::for_output(OutputFormat::Table, true), Format::Text);
        assert_eq!(Format::for_output(OutputFormat::Csv, false), Format::Csv);
        assert_eq!(Format::for_output(OutputFormat::Csv, true), Format::RawCsv);
        assert_eq!(Format::for_output(OutputFormat::Plain, false), Format::Plain);
    }

    #[test]
    fn renderers_share_one_interface() {
        let env = TerminalEnv::plain(80);
        for format in [Format::Text, Format::Csv, Format::RawCsv] {
            let mut out = Vec::new();
            {
                let mut r = renderer(format, &mut out, &env);
                r.process_row(Tag::Record, &[]).unwrap();
                r.process_row(Tag::KvPair, &["Status".into(), "Running".into()])
                    .unwrap();
                r.end_input().unwrap();
            }
            let text = String::from_utf8(out).unwrap();
            assert!(text.contains("Running"), "{format:?}: {text:?}");
        }
    }
}
