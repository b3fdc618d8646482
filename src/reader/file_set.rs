//! Multi-file ("indexed") tables
//!
//! Every file named `<table><tail pattern><extension>` in a directory
//! contributes rows to one logical table. Capture groups of the tail pattern
//! are exposed per line as extra fields.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use super::{read_trimmed_line, LineSource};
use crate::error::{CsvError, Result};

pub struct FileSetLines {
    pending: VecDeque<(PathBuf, Vec<String>)>,
    current: Option<BufReader<File>>,
    current_tail: Vec<String>,
    /// Lines skipped at the top of every file after the first
    repeat_skip: usize,
    opened_any: bool,
}

impl FileSetLines {
    /// Collect the files of `table` in `dir`, sorted by name.
    pub fn open(
        dir: &Path,
        table: &str,
        tail_pattern: &str,
        extension: &str,
        repeat_skip: usize,
    ) -> Result<Self> {
        let pattern = format!(
            "^{}{}{}$",
            regex::escape(table),
            tail_pattern,
            regex::escape(extension)
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| CsvError::Config(format!("Invalid file tail pattern: {}", e)))?;

        let mut matches = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(caps) = regex.captures(&name) {
                let parts: Vec<String> = caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                matches.push((entry.path(), parts));
            }
        }
        matches.sort_by(|a, b| a.0.cmp(&b.0));

        if matches.is_empty() {
            return Err(CsvError::FileNotFound(dir.join(format!("{}{}", table, extension))));
        }
        debug!(table, files = matches.len(), "opened indexed table");

        Ok(Self {
            pending: matches.into(),
            current: None,
            current_tail: Vec::new(),
            repeat_skip,
            opened_any: false,
        })
    }

    fn advance_file(&mut self) -> Result<bool> {
        let (path, tail) = match self.pending.pop_front() {
            Some(next) => next,
            None => return Ok(false),
        };
        let mut reader = BufReader::new(File::open(&path)?);
        if self.opened_any {
            for _ in 0..self.repeat_skip {
                if read_trimmed_line(&mut reader)?.is_none() {
                    break;
                }
            }
        }
        self.opened_any = true;
        self.current = Some(reader);
        self.current_tail = tail;
        Ok(true)
    }
}

impl LineSource for FileSetLines {
    fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                if let Some(line) = read_trimmed_line(reader)? {
                    return Ok(Some(line));
                }
                self.current = None;
            }
            if !self.advance_file()? {
                return Ok(None);
            }
        }
    }

    fn tail_fields(&self) -> &[String] {
        &self.current_tail
    }
}
