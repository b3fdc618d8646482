//! Table and connection configuration
//!
//! One `CsvConfig` describes how every table in a directory is read: the
//! delimiter and quoting rules, header handling, declared column types and
//! the date/time formats used by the type converter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{CsvError, Result};
use crate::types::{ColumnType, Converter};

/// 引号转义风格
///
/// - Sql: a doubled quote inside a quoted field is one literal quote
/// - C: a backslash escapes the next character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuoteStyle {
    #[default]
    Sql,
    C,
}

impl QuoteStyle {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SQL" => Ok(QuoteStyle::Sql),
            "C" => Ok(QuoteStyle::C),
            other => Err(CsvError::Config(format!("Unknown quote style: {}", other))),
        }
    }
}

/// Reader configuration shared by all tables of a database directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// File name extension appended to table names（默认 `.csv`）
    pub extension: String,

    pub separator: char,

    pub quote_char: char,

    pub quote_style: QuoteStyle,

    /// Explicit header line used instead of the file's first line
    pub headerline: Option<String>,

    /// Per-table header lines, keyed by table name
    pub table_headerlines: HashMap<String, String>,

    /// The files have no header line; columns are named COLUMN1..COLUMNn
    pub suppress_headers: bool,

    pub trim_headers: bool,

    /// Blank header cells are renamed COLUMNn instead of failing
    pub defective_headers: bool,

    /// Comma-separated declared types, e.g. `"Int,String,Date"`
    pub column_types: String,

    pub table_column_types: HashMap<String, String>,

    /// Lines starting with this character are skipped before the header
    pub comment_char: Option<char>,

    /// Physical lines skipped before the header
    pub skip_leading_lines: usize,

    /// Data lines skipped right after the header
    pub skip_leading_data_lines: usize,

    /// Skip lines that fail to tokenize or have the wrong field count
    pub ignore_unparseable_lines: bool,

    /// Fixed-width column ranges such as `"1-5,6,7-10"` (1-based, inclusive)
    pub fixed_widths: Option<String>,

    /// 多文件表: one logical table backed by several files
    pub indexed_files: bool,

    /// Regex matched after the table name; its groups become pseudo-columns
    pub file_tail_pattern: Option<String>,

    /// Comma-separated names for the `file_tail_pattern` groups
    pub file_tail_parts: Option<String>,

    /// Put file-name pseudo-columns before the data columns
    pub file_tail_prepend: bool,

    pub date_format: String,

    pub time_format: String,

    pub timestamp_format: String,

    /// `UTC`, `GMT` or a fixed offset like `+02:00`
    pub time_zone: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            extension: ".csv".to_string(),
            separator: ',',
            quote_char: '"',
            quote_style: QuoteStyle::Sql,
            headerline: None,
            table_headerlines: HashMap::new(),
            suppress_headers: false,
            trim_headers: true,
            defective_headers: false,
            column_types: "String".to_string(),
            table_column_types: HashMap::new(),
            comment_char: None,
            skip_leading_lines: 0,
            skip_leading_data_lines: 0,
            ignore_unparseable_lines: false,
            fixed_widths: None,
            indexed_files: false,
            file_tail_pattern: None,
            file_tail_parts: None,
            file_tail_prepend: false,
            date_format: "YYYY-MM-DD".to_string(),
            time_format: "HH:mm:ss".to_string(),
            timestamp_format: "YYYY-MM-DD HH:mm:ss".to_string(),
            time_zone: "UTC".to_string(),
        }
    }
}

fn lookup<'a>(map: &'a HashMap<String, String>, table: &str) -> Option<&'a String> {
    map.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(table))
        .map(|(_, v)| v)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(CsvError::Config(format!("Invalid value for {}: {}", key, value))),
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| CsvError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn parse_char(key: &str, value: &str) -> Result<char> {
    let unescaped = match value {
        "\\t" => "\t",
        other => other,
    };
    let mut chars = unescaped.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(CsvError::Config(format!(
            "{} must be a single character: {:?}",
            key, value
        ))),
    }
}

impl CsvConfig {
    /// 测试配置: defaults, kept as a named preset for unit tests
    pub fn for_testing() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CsvError::Config(e.to_string()))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_quote_style(mut self, style: QuoteStyle) -> Self {
        self.quote_style = style;
        self
    }

    pub fn with_suppress_headers(mut self, suppress: bool) -> Self {
        self.suppress_headers = suppress;
        self
    }

    pub fn with_headerline(mut self, headerline: impl Into<String>) -> Self {
        self.headerline = Some(headerline.into());
        self
    }

    pub fn with_column_types(mut self, types: impl Into<String>) -> Self {
        self.column_types = types.into();
        self
    }

    pub fn with_table_column_types(mut self, table: impl Into<String>, types: impl Into<String>) -> Self {
        self.table_column_types.insert(table.into(), types.into());
        self
    }

    pub fn with_fixed_widths(mut self, widths: impl Into<String>) -> Self {
        self.fixed_widths = Some(widths.into());
        self
    }

    pub fn with_comment_char(mut self, c: char) -> Self {
        self.comment_char = Some(c);
        self
    }

    pub fn with_indexed_files(mut self, tail_pattern: impl Into<String>, tail_parts: impl Into<String>) -> Self {
        self.indexed_files = true;
        self.file_tail_pattern = Some(tail_pattern.into());
        self.file_tail_parts = Some(tail_parts.into());
        self
    }

    /// Set one option by its property name (`separator`, `suppressHeaders`,
    /// `columnTypes.TABLE`, ...).
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(table) = key.strip_prefix("columnTypes.") {
            self.table_column_types.insert(table.to_string(), value.to_string());
            return Ok(());
        }
        if let Some(table) = key.strip_prefix("headerline.") {
            self.table_headerlines.insert(table.to_string(), value.to_string());
            return Ok(());
        }

        match key {
            "fileExtension" | "extension" => self.extension = value.to_string(),
            "separator" => self.separator = parse_char(key, value)?,
            "quotechar" | "quoteChar" => self.quote_char = parse_char(key, value)?,
            "quoteStyle" => self.quote_style = QuoteStyle::parse(value)?,
            "headerline" => self.headerline = Some(value.to_string()),
            "suppressHeaders" => self.suppress_headers = parse_flag(key, value)?,
            "trimHeaders" => self.trim_headers = parse_flag(key, value)?,
            "defectiveHeaders" => self.defective_headers = parse_flag(key, value)?,
            "columnTypes" => self.column_types = value.to_string(),
            "commentChar" => {
                self.comment_char = if value.is_empty() {
                    None
                } else {
                    Some(parse_char(key, value)?)
                }
            }
            "skipLeadingLines" => self.skip_leading_lines = parse_count(key, value)?,
            "skipLeadingDataLines" => self.skip_leading_data_lines = parse_count(key, value)?,
            "ignoreNonParseableLines" | "ignoreUnparseableLines" => {
                self.ignore_unparseable_lines = parse_flag(key, value)?
            }
            "fixedWidths" => self.fixed_widths = Some(value.to_string()),
            "indexedFiles" => self.indexed_files = parse_flag(key, value)?,
            "fileTailPattern" => self.file_tail_pattern = Some(value.to_string()),
            "fileTailParts" => self.file_tail_parts = Some(value.to_string()),
            "fileTailPrepend" => self.file_tail_prepend = parse_flag(key, value)?,
            "dateFormat" => self.date_format = value.to_string(),
            "timeFormat" => self.time_format = value.to_string(),
            "timestampFormat" => self.timestamp_format = value.to_string(),
            "timeZoneName" => self.time_zone = value.to_string(),
            _ => return Err(CsvError::Config(format!("Unknown property: {}", key))),
        }
        Ok(())
    }

    /// Header line for a table: the per-table entry wins over the global one.
    pub fn headerline_for(&self, table: &str) -> Option<&str> {
        lookup(&self.table_headerlines, table)
            .or(self.headerline.as_ref())
            .map(String::as_str)
    }

    /// Declared type list for a table.
    pub fn column_types_for(&self, table: &str) -> Result<Vec<ColumnType>> {
        let list = lookup(&self.table_column_types, table).unwrap_or(&self.column_types);
        ColumnType::parse_list(list)
    }

    /// Fixed-width ranges converted to 0-based inclusive `(start, end)` pairs.
    pub fn fixed_width_columns(&self) -> Result<Option<Vec<(usize, usize)>>> {
        let spec = match &self.fixed_widths {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Ok(None),
        };

        let invalid = |part: &str| CsvError::Config(format!("Invalid fixed width range: {}", part));
        let mut ranges = Vec::new();
        for part in spec.split(',') {
            let (begin, end) = match part.split_once('-') {
                Some((b, e)) => (b.trim(), e.trim()),
                None => (part.trim(), part.trim()),
            };
            let begin: usize = begin.parse().map_err(|_| invalid(part))?;
            let end: usize = end.parse().map_err(|_| invalid(part))?;
            if begin == 0 || end < begin {
                return Err(invalid(part));
            }
            ranges.push((begin - 1, end - 1));
        }
        Ok(Some(ranges))
    }

    /// Names of the pseudo-columns built from file-name pattern groups.
    pub fn file_tail_names(&self) -> Vec<String> {
        self.file_tail_parts
            .as_deref()
            .map(|parts| {
                parts
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn converter(&self) -> Result<Converter> {
        Converter::new(
            &self.date_format,
            &self.time_format,
            &self.timestamp_format,
            &self.time_zone,
        )
    }

    /// Check options that can only fail at use time, so errors surface early.
    pub fn validate(&self) -> Result<()> {
        if self.separator == self.quote_char {
            return Err(CsvError::Config(
                "separator and quote character must differ".to_string(),
            ));
        }
        ColumnType::parse_list(&self.column_types)?;
        for types in self.table_column_types.values() {
            ColumnType::parse_list(types)?;
        }
        self.fixed_width_columns()?;
        self.converter()?;
        if self.indexed_files && self.file_tail_pattern.is_none() {
            return Err(CsvError::Config(
                "indexed_files requires file_tail_pattern".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-statement execution options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of rows returned; 0 means no cap
    pub max_rows: usize,
    /// Build a fully scrollable cursor
    pub scrollable: bool,
}

impl QueryOptions {
    pub fn scrollable() -> Self {
        Self {
            max_rows: 0,
            scrollable: true,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }
}
