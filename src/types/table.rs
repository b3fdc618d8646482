/// Column descriptors and the declared-type vocabulary
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CsvError, Result};

/// Display width used when a column has no fixed-width range
pub const DEFAULT_COLUMN_SIZE: usize = 20;

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    String,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    BigDecimal,
    Date,
    Time,
    Timestamp,
    Blob,
    Clob,
}

impl ColumnType {
    /// Parse a type name, case-insensitively. `Integer` is accepted for `Int`.
    pub fn parse(name: &str) -> Result<Self> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "string" | "varchar" => ColumnType::String,
            "boolean" => ColumnType::Boolean,
            "byte" => ColumnType::Byte,
            "short" => ColumnType::Short,
            "int" | "integer" => ColumnType::Int,
            "long" => ColumnType::Long,
            "float" => ColumnType::Float,
            "double" => ColumnType::Double,
            "bigdecimal" => ColumnType::BigDecimal,
            "date" => ColumnType::Date,
            "time" => ColumnType::Time,
            "timestamp" => ColumnType::Timestamp,
            "blob" => ColumnType::Blob,
            "clob" => ColumnType::Clob,
            other => {
                return Err(CsvError::Config(format!("Unknown column type: {}", other)));
            }
        };
        Ok(ty)
    }

    /// Parse a comma-separated type list such as `"Int,String,Date"`.
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::String => "String",
            ColumnType::Boolean => "Boolean",
            ColumnType::Byte => "Byte",
            ColumnType::Short => "Short",
            ColumnType::Int => "Int",
            ColumnType::Long => "Long",
            ColumnType::Float => "Float",
            ColumnType::Double => "Double",
            ColumnType::BigDecimal => "BigDecimal",
            ColumnType::Date => "Date",
            ColumnType::Time => "Time",
            ColumnType::Timestamp => "Timestamp",
            ColumnType::Blob => "Blob",
            ColumnType::Clob => "Clob",
        }
    }

    /// Assign one declared type per column.
    ///
    /// A single type applies to every column; otherwise the list must cover
    /// each column exactly.
    pub fn assign(types: &[ColumnType], column_count: usize) -> Result<Vec<ColumnType>> {
        match types.len() {
            0 => Ok(vec![ColumnType::String; column_count]),
            1 => Ok(vec![types[0]; column_count]),
            n if n == column_count => Ok(types.to_vec()),
            n => Err(CsvError::Config(format!(
                "Invalid column types: {} types declared for {} columns",
                n, column_count
            ))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name as declared in the header
    pub name: String,
    /// Declared type
    pub col_type: ColumnType,
    /// Display size in characters
    pub size: usize,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, col_type: ColumnType, size: usize) -> Self {
        Self {
            name: name.into(),
            col_type,
            size,
        }
    }
}
