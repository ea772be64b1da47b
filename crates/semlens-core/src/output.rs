//! Report serialization as JSON or JSON Lines.
//!
//! JSON Lines are streamed as each report arrives. JSON output of more than
//! one report is collected and written as one array by [`OutputWriter::finish`].

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// Machine-readable output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// A JSON object, or an array when several reports are written
    Json,
    /// One JSON object per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Writes serialized reports to any `Write` sink.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    pending: Vec<serde_json::Value>,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// `pretty` only affects JSON; JSON Lines are always compact.
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            pending: Vec::new(),
            items_written: 0,
        }
    }

    /// Write one item immediately as a standalone document.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::Json if self.pretty => {
                serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?
            }
            _ => serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?,
        }
        writeln!(self.writer)?;
        self.items_written += 1;
        Ok(())
    }

    /// Add one item to a stream of results.
    ///
    /// JSON Lines are written right away; JSON items wait for [`finish`](Self::finish).
    pub fn push<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match self.format {
            OutputFormat::JsonLines => {
                self.write(item)?;
                self.writer.flush()
            }
            OutputFormat::Json => {
                let value = serde_json::to_value(item).map_err(io::Error::other)?;
                self.pending.push(value);
                Ok(())
            }
        }
    }

    /// Write any collected JSON items as one array and flush.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.format == OutputFormat::Json {
            let items = std::mem::take(&mut self.pending);
            let count = items.len();
            if self.pretty {
                serde_json::to_writer_pretty(&mut self.writer, &items).map_err(io::Error::other)?;
            } else {
                serde_json::to_writer(&mut self.writer, &items).map_err(io::Error::other)?;
            }
            writeln!(self.writer)?;
            self.items_written += count;
        }
        self.writer.flush()
    }

    /// Number of items written so far.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
