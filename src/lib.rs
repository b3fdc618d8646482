//! csvquery - read-only SQL over CSV and fixed-width files
//!
//! 把一个目录当作数据库: every `<table><extension>` file is a table and
//! SELECT statements run directly over the text.
//!
//! ## 核心特性
//! - SELECT / DISTINCT / WHERE / GROUP BY / HAVING / ORDER BY / LIMIT / OFFSET
//! - COUNT, SUM, AVG, MIN, MAX and the scalar functions LOWER, UPPER, ROUND
//! - Declared column types with configurable date, time and timestamp formats
//! - Multi-file tables whose file-name parts become columns
//!
//! ## 架构
//! - 读取层: line sources + tokenizer (delimited or fixed-width) behind `RowSource`
//! - 类型层: `Value`, `ColumnType` and the `Converter`
//! - 查询层: lexer, parser, planner, evaluator and a streaming/materializing cursor

pub mod config;
pub mod types;
pub mod reader;
pub mod sql;

mod error;
mod api;

pub use config::{CsvConfig, QueryOptions, QuoteStyle};
pub use error::{CsvError, Result};

// 主要对外 API
pub use api::CsvDatabase;
pub use sql::{parse_sql, ColumnMetadata, Cursor, ResultMetadata};
pub use types::{ColumnType, Value};
