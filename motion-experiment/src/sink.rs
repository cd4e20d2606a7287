use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use motion_core::{RECORD_COLUMNS, TrialRecord};

use crate::io::{RecordSink, SinkError};

/// Comma-separated trial stream. The header goes out with the first record
/// and every record is flushed as soon as it is written.
#[derive(Debug)]
pub struct CsvSink<W: Write> {
    writer: W,
    header_written: bool,
    closed: bool,
}

impl CsvSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line<'a>(&mut self, cells: impl IntoIterator<Item = &'a str>) -> Result<(), SinkError> {
        let line = cells
            .into_iter()
            .map(escape)
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.writer, "{line}")?;
        Ok(())
    }
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if !self.header_written {
            self.write_line(RECORD_COLUMNS)?;
            self.header_written = true;
        }
        let row = record.to_row();
        self.write_line(row.iter().map(String::as_str))?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if !self.closed {
            self.writer.flush()?;
            self.closed = true;
        }
        Ok(())
    }
}

/// One JSON object per line; missing fields are `null`.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    closed: bool,
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if !self.closed {
            self.writer.flush()?;
            self.closed = true;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<TrialRecord>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        Ok(())
    }
}
