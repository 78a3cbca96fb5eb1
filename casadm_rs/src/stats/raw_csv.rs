//! Positional CSV passthrough for machine consumers.

use std::io::Write;

use super::{RenderError, Renderer, Tag, quote_field};

pub struct RawCsvRenderer<W: Write> {
    out: W,
}

impl<W: Write> RawCsvRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Renderer for RawCsvRenderer<W> {
    fn process_row(&mut self, tag: Tag, fields: &[String]) -> Result<(), RenderError> {
        if tag.is_structural() {
            return Ok(());
        }
        let line: Vec<_> = fields.iter().map(|f| quote_field(f)).collect();
        writeln!(self.out, "{}", line.join(","))?;
        Ok(())
    }

    fn end_input(&mut self) -> Result<(), RenderError> {
        self.out.flush()?;
        Ok(())
    }
}
