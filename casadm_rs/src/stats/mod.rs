//! Statistics rendering pipeline.
//!
//! Statistics are produced as an intermediate stream of tagged CSV lines
//! (see [`Tag`]) and rendered by a [`Renderer`] chosen by output format.
//!
//! # Module Structure
//!
//! - [`tag`] - stream tags
//! - [`writer`] - producer side ([`StatWriter`])
//! - [`pipe`] - in-process byte channel between producer and consumer
//! - [`view`] - [`Renderer`] trait and renderer selection
//! - [`text`] - aligned tables, trees and key/value blocks
//! - [`csv_view`] - pivoting CSV renderer
//! - [`raw_csv`] - positional CSV passthrough
//! - [`table`] - growable grid used by the text renderer
//!
//! # Usage
//!
//! ```ignore
//! use casadm::stats::{self, Format, Tag};
//!
//! let (produced, rendered) = stats::render_concurrently(Format::Text, &env, &mut out, |w| {
//!     w.record();
//!     w.row(Tag::KvPair, ["Cache Id", "1"]);
//! });
//! ```

pub mod csv_view;
pub mod pipe;
pub mod raw_csv;
pub mod table;
pub mod tag;
pub mod text;
pub mod view;
pub mod writer;

use std::borrow::Cow;
use std::io::{self, BufRead, BufReader, Write};
use std::thread;

use thiserror::Error;

use crate::csv::{CsvError, CsvReader};
use crate::terminal::TerminalEnv;

pub use tag::Tag;
pub use view::{Format, Renderer};
pub use writer::StatWriter;

/// Message printed once when a render pass fails.
pub const FORMATTING_FAILED: &str = "An error occured during statistics formatting.";

/// Lines buffered in the pipe before the producer blocks.
const PIPE_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Unrecognized tag: {0}")]
    UnrecognizedTag(String),
    #[error("Failed to process row starting with: {tag}")]
    Row {
        tag: String,
        #[source]
        source: Box<RenderError>,
    },
    #[error("cell of {len} bytes exceeds the {limit} byte limit", limit = table::MAX_CELL_LEN)]
    CellTooLong { len: usize },
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error("failed to write statistics: {0}")]
    Io(#[from] io::Error),
    #[error("statistics formatting thread terminated unexpectedly")]
    ConsumerPanicked,
}

/// Quote a field when the CSV micro-parser would otherwise alter it.
pub fn quote_field(field: &str) -> Cow<'_, str> {
    let needs_quotes = field.contains(',')
        || field.contains('"')
        || field.starts_with(char::is_whitespace)
        || field.ends_with(char::is_whitespace);
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Render an intermediate stream read from `input` into `out`.
///
/// Processing stops at the first bad row, but `end_input` is always called
/// so that already-buffered output is flushed.
pub fn format_output<R: BufRead, W: Write>(
    mut input: R,
    out: &mut W,
    format: Format,
    env: &TerminalEnv,
) -> Result<(), RenderError> {
    if format == Format::Plain {
        io::copy(&mut input, out)?;
        out.flush()?;
        return Ok(());
    }

    let mut renderer = view::renderer(format, out, env);
    let mut reader = CsvReader::new(input);
    let mut outcome = Ok(());

    loop {
        match reader.read_record() {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                outcome = Err(e.into());
                break;
            }
        }
        let Some((first, fields)) = reader.columns().split_first() else {
            continue;
        };
        let tag = match first.parse::<Tag>() {
            Ok(tag) => tag,
            Err(_) => {
                outcome = Err(RenderError::UnrecognizedTag(first.clone()));
                break;
            }
        };
        if let Err(e) = renderer.process_row(tag, fields) {
            outcome = Err(RenderError::Row {
                tag: first.clone(),
                source: Box::new(e),
            });
            break;
        }
    }

    let finished = renderer.end_input();
    outcome.and(finished)
}

/// Run `producer` on the calling thread while a scoped consumer thread
/// renders what it writes.
///
/// The consumer's result is only inspected after the producer returns and
/// the pipe is closed; a failed render never interrupts collection.
pub fn render_concurrently<W, T, F>(
    format: Format,
    env: &TerminalEnv,
    out: &mut W,
    producer: F,
) -> (T, Result<(), RenderError>)
where
    W: Write + Send,
    F: FnOnce(&mut StatWriter<pipe::PipeWriter>) -> T,
{
    let (tx, rx) = pipe::pipe(PIPE_CAPACITY);
    thread::scope(|scope| {
        let consumer = scope.spawn(move || format_output(BufReader::new(rx), out, format, env));

        let mut writer = StatWriter::new(tx);
        let produced = producer(&mut writer);
        drop(writer);

        let rendered = consumer
            .join()
            .unwrap_or(Err(RenderError::ConsumerPanicked));
        if let Err(e) = &rendered {
            tracing::debug!(error = %e, "statistics render failed");
        }
        (produced, rendered)
    })
}
