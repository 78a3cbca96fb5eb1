//! Pivoting CSV renderer.
//!
//! Every record becomes one CSV data line. Headers are synthesized from row
//! titles and their unit siblings while the first record of a data set is
//! processed; its values are held back and replayed under the header once
//! the record is complete. Later records stream straight through.

use std::io::Write;

use super::{RenderError, Renderer, Tag, quote_field};

fn is_unit(s: &str) -> bool {
    s.starts_with('[')
}

pub struct CsvRenderer<W: Write> {
    out: W,
    data_set: usize,
    record: usize,
    column: usize,
    /// Values of the first record, written after its header.
    pending: Vec<String>,
    /// Column titles of the current table; index 0 is the value column.
    titles: Vec<String>,
}

impl<W: Write> CsvRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            data_set: 0,
            record: 0,
            column: 0,
            pending: Vec::new(),
            titles: Vec::new(),
        }
    }

    fn is_first_record(&self) -> bool {
        self.record == 1
    }

    /// Data rows before any `RECORD` belong to an implicit first record.
    fn ensure_record(&mut self) {
        if self.record == 0 {
            self.column = 0;
            self.record = 1;
        }
    }

    fn output_column(&mut self, value: &str) -> Result<(), RenderError> {
        if self.column > 0 {
            self.out.write_all(b",")?;
        }
        self.out.write_all(quote_field(value).as_bytes())?;
        self.column += 1;
        Ok(())
    }

    fn output_header(&mut self, title: &str, unit: Option<&str>) -> Result<(), RenderError> {
        match unit.filter(|u| !u.is_empty()) {
            Some(unit) if is_unit(unit) => self.output_column(&format!("{title} {unit}")),
            Some(unit) => self.output_column(&format!("{title} [{unit}]")),
            None => self.output_column(title),
        }
    }

    fn output_data(&mut self, value: &str) -> Result<(), RenderError> {
        if self.is_first_record() {
            self.pending.push(value.to_string());
            Ok(())
        } else {
            self.output_column(value)
        }
    }

    fn finish_record(&mut self) -> Result<(), RenderError> {
        if self.column > 0 {
            self.out.write_all(b"\n")?;
        }
        if self.is_first_record() {
            self.column = 0;
            for value in std::mem::take(&mut self.pending) {
                self.output_column(&value)?;
            }
            if self.column > 0 {
                self.out.write_all(b"\n")?;
            }
        }
        self.column = 0;
        self.out.flush()?;
        Ok(())
    }

    fn kv_pair(&mut self, fields: &[String]) -> Result<(), RenderError> {
        let Some((title, rest)) = fields.split_first() else {
            return Ok(());
        };
        // Values interleaved with their units.
        for pair in rest.chunks(2) {
            if self.is_first_record() {
                self.output_header(title, pair.get(1).map(String::as_str))?;
            }
            self.output_data(&pair[0])?;
        }
        Ok(())
    }

    fn table_row(&mut self, fields: &[String]) -> Result<(), RenderError> {
        let Some((title, _)) = fields.split_first() else {
            return Ok(());
        };
        let unit = fields
            .last()
            .filter(|f| fields.len() > 1 && is_unit(f))
            .cloned();
        let data_end = if unit.is_some() { fields.len() - 1 } else { fields.len() };
        let title_is_unit = |titles: &[String], i: usize| titles.get(i - 1).is_some_and(|t| is_unit(t));

        // A row without values gets no column.
        if data_end < 2 {
            return Ok(());
        }
        if self.is_first_record() {
            self.output_header(title, unit.as_deref())?;
            for i in 2..data_end {
                if !title_is_unit(&self.titles, i) {
                    let column_title = self.titles.get(i - 1).cloned();
                    self.output_header(title, column_title.as_deref())?;
                }
            }
        }
        for i in 1..data_end {
            if !title_is_unit(&self.titles, i) {
                self.output_data(&fields[i])?;
            }
        }
        Ok(())
    }
}

impl<W: Write> Renderer for CsvRenderer<W> {
    fn process_row(&mut self, tag: Tag, fields: &[String]) -> Result<(), RenderError> {
        match tag {
            Tag::DataSet => {
                if self.record > 0 {
                    self.finish_record()?;
                }
                self.titles.clear();
                self.pending.clear();
                if self.data_set > 0 {
                    self.out.write_all(b"\n")?;
                }
                if let Some(title) = fields.first().filter(|t| !t.is_empty()) {
                    writeln!(self.out, "{title}")?;
                }
                self.record = 0;
                self.data_set += 1;
            }
            Tag::Record => {
                if self.record > 0 {
                    self.finish_record()?;
                }
                self.column = 0;
                self.record += 1;
            }
            Tag::KvPair => {
                self.ensure_record();
                self.kv_pair(fields)?;
            }
            Tag::TableHeader => {
                // The count column is implicit; its title is not needed.
                self.titles = std::iter::once(String::new())
                    .chain(fields.iter().skip(2).cloned())
                    .collect();
            }
            Tag::TableRow | Tag::TableSection => {
                self.ensure_record();
                self.table_row(fields)?;
            }
            Tag::Freeform | Tag::TreeHeader | Tag::TreeBranch | Tag::TreeLeaf => {}
        }
        Ok(())
    }

    fn end_input(&mut self) -> Result<(), RenderError> {
        self.finish_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::format_output;
    use crate::stats::view::Format;
    use crate::terminal::TerminalEnv;

    fn csv(input: &str) -> String {
        let mut out = Vec::new();
        format_output(input.as_bytes(), &mut out, Format::Csv, &TerminalEnv::plain(80)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn kv_units_become_headers() {
        let out = csv("RECORD,\nKV_PAIR,Cache Size,1024,[4KiB Blocks],0.00,[GiB]\nKV_PAIR,Status,Running\n");
        assert_eq!(
            out,
            "Cache Size [4KiB Blocks],Cache Size [GiB],Status\n1024,0.00,Running\n"
        );
    }

    #[test]
    fn first_table_row_synthesizes_header() {
        let out = csv("TABLE_HEADER,\"Stat\",\"Count\",\"%\"\nTABLE_ROW,\"Widgets\",42,\"[units]\"\n");
        assert_eq!(out, "Widgets [units]\n42\n");
    }

    #[test]
    fn later_records_reuse_header() {
        let out = csv(concat!(
            "RECORD,\n",
            "TABLE_HEADER,Stat,Count,%\n",
            "TABLE_ROW,Widgets,42,[units]\n",
            "RECORD,\n",
            "TABLE_ROW,Widgets,43,[units]\n",
        ));
        assert_eq!(out, "Widgets [units]\n42\n43\n");
    }

    #[test]
    fn percent_tables_pivot_into_pairs() {
        let out = csv(concat!(
            "RECORD,\n",
            "TABLE_HEADER,Request statistics,Count,%,[Units]\n",
            "TABLE_SECTION,Read hits,180,11.6,[Requests]\n",
            "TABLE_ROW,Read total,1551,100.0,[Requests]\n",
        ));
        assert_eq!(
            out,
            "Read hits [Requests],Read hits [%],Read total [Requests],Read total [%]\n180,11.6,1551,100.0\n"
        );
    }

    #[test]
    fn data_sets_are_separated_and_titled() {
        let out = csv(concat!(
            "DATA_SET,Caches\n",
            "RECORD,\n",
            "KV_PAIR,Cache Id,1\n",
            "RECORD,\n",
            "KV_PAIR,Cache Id,2\n",
            "DATA_SET,Cores\n",
            "RECORD,\n",
            "KV_PAIR,Core Id,0\n",
        ));
        assert_eq!(out, "Caches\nCache Id\n1\n2\n\nCores\nCore Id\n0\n");
    }

    #[test]
    fn rows_without_values_add_no_column() {
        let out = csv(concat!(
            "RECORD,\n",
            "TABLE_HEADER,Stat,Count\n",
            "TABLE_ROW,Widgets,[u]\n",
            "TABLE_ROW,Gadgets,5\n",
            "RECORD,\n",
            "TABLE_ROW,Widgets,[u]\n",
            "TABLE_ROW,Gadgets,6\n",
        ));
        assert_eq!(out, "Gadgets\n5\n6\n");
    }

    #[test]
    fn headers_with_separator_are_quoted() {
        let out = csv("RECORD,\nKV_PAIR,\"Size, total\",5\n");
        assert_eq!(out, "\"Size, total\"\n5\n");
    }
}
