//! Error types for the csvquery engine

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CsvError>;

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot open data file '{}'", .0.display())]
    FileNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    // SQL text and query validation errors
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid column name: {0}")]
    UnknownColumn(String),

    #[error("Invalid {clause} column: {value}")]
    InvalidOrdinal { clause: &'static str, value: String },

    #[error("Invalid HAVING column: {0}")]
    InvalidHavingColumn(String),

    #[error("Invalid {clause} column: {expr}")]
    InvalidGroupOrOrder { clause: &'static str, expr: String },

    #[error("Column not included in GROUP BY: {0}")]
    ColumnNotGrouped(String),

    #[error("Query columns cannot be combined with aggregate functions")]
    MixedAggregation,

    #[error("Aggregate functions not allowed in WHERE clause")]
    AggregateInWhere,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    // Data errors found while scanning
    #[error("Expecting {separator} in position {position}. Line={line}")]
    MalformedQuote {
        separator: char,
        position: usize,
        line: String,
    },

    #[error("EOF reached inside quoted mode")]
    UnterminatedQuote,

    #[error("Table contains duplicate column names: {0}")]
    DuplicateColumn(String),

    #[error("Invalid number '{value}' for {type_name}")]
    NumberFormat { value: String, type_name: &'static str },

    #[error("Type error: {0}")]
    TypeConversion(String),

    #[error("Division by zero")]
    DivisionByZero,

    // Cursor usage errors
    #[error("Operation not supported on a forward-only cursor: {0}")]
    UnsupportedNavigation(&'static str),

    #[error("No current row")]
    NoCurrentRow,

    #[error("Invalid column index: {0}")]
    ColumnIndex(usize),

    #[error("Result set is closed")]
    Closed,
}

impl CsvError {
    /// True for malformed-line errors that `ignore_unparseable_lines` may skip.
    pub fn is_line_error(&self) -> bool {
        matches!(
            self,
            CsvError::MalformedQuote { .. } | CsvError::UnterminatedQuote
        )
    }
}
