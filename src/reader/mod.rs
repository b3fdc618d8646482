//! Row sources: streams of raw string fields for one logical table

mod csv_reader;
mod file_set;

pub use csv_reader::{CsvReader, ReaderOptions, Tokenizer};
pub use file_set::FileSetLines;

use std::io::BufRead;

use crate::error::Result;

/// A table-shaped stream of rows.
///
/// `next` after end-of-stream keeps returning `false`, and `close` may be
/// called any number of times.
pub trait RowSource {
    /// Advance to the next row. Returns `false` at end of input.
    fn next(&mut self) -> Result<bool>;

    /// Fields of the current row, 0-based. Missing trailing fields are `None`.
    fn current_fields(&self) -> Vec<Option<&str>>;

    fn column_names(&self) -> &[String];

    fn column_sizes(&self) -> &[usize];

    fn table_alias(&self) -> Option<&str>;

    fn close(&mut self);
}

/// Physical line input beneath a [`CsvReader`].
pub trait LineSource {
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Extra fields that belong to the most recently read line, such as the
    /// file-name parts of a multi-file table.
    fn tail_fields(&self) -> &[String] {
        &[]
    }
}

/// Lines of a single buffered stream, without their line terminators.
pub struct BufLines<R> {
    reader: Option<R>,
}

impl<R: BufRead> BufLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

pub(crate) fn read_trimmed_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Some(line))
}

impl<R: BufRead> LineSource for BufLines<R> {
    fn read_line(&mut self) -> Result<Option<String>> {
        let line = match self.reader.as_mut() {
            Some(reader) => read_trimmed_line(reader)?,
            None => None,
        };
        if line.is_none() {
            // release the handle as soon as input is exhausted
            self.reader = None;
        }
        Ok(line)
    }
}

/// In-memory rows. A query without FROM runs against `ListReader::single_empty_row()`.
#[derive(Debug, Clone, Default)]
pub struct ListReader {
    column_names: Vec<String>,
    column_sizes: Vec<usize>,
    rows: Vec<Vec<Option<String>>>,
    position: usize,
    alias: Option<String>,
}

impl ListReader {
    pub fn new(column_names: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let column_sizes = vec![crate::types::DEFAULT_COLUMN_SIZE; column_names.len()];
        Self {
            column_names,
            column_sizes,
            rows,
            position: 0,
            alias: None,
        }
    }

    /// Zero columns, exactly one row.
    pub fn single_empty_row() -> Self {
        Self::new(Vec::new(), vec![Vec::new()])
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl RowSource for ListReader {
    fn next(&mut self) -> Result<bool> {
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn current_fields(&self) -> Vec<Option<&str>> {
        match self.position.checked_sub(1).and_then(|i| self.rows.get(i)) {
            Some(row) => row.iter().map(|f| f.as_deref()).collect(),
            None => Vec::new(),
        }
    }

    fn column_names(&self) -> &[String] {
        &self.column_names
    }

    fn column_sizes(&self) -> &[usize] {
        &self.column_sizes
    }

    fn table_alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    fn close(&mut self) {
        self.rows.clear();
        self.position = 0;
    }
}
