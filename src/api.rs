//! csvquery Public API
//!
//! 只读 SQL 查询引擎: a directory of CSV or fixed-width files is a database,
//! each file is a table.
//!
//! # 核心特性
//! - **SQL 引擎**: SELECT with WHERE, GROUP BY, HAVING, ORDER BY, LIMIT/OFFSET and DISTINCT
//! - **类型转换**: declared column types, configurable date/time formats
//! - **多文件表**: one logical table over several files matched by name
//! - **游标**: forward-only streaming or fully scrollable results

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{CsvConfig, QueryOptions};
use crate::error::{CsvError, Result};
use crate::reader::{CsvReader, FileSetLines, ListReader, ReaderOptions, RowSource};
use crate::sql::{parse_sql, Cursor};
use crate::types::{ColumnType, Converter};

/// csvquery 数据库实例
///
/// # 快速开始
///
/// ```no_run
/// use csvquery::{CsvConfig, CsvDatabase};
///
/// let config = CsvConfig::default().with_column_types("Int,String,Date");
/// let db = CsvDatabase::open("data", config)?;
///
/// // reads data/people.csv
/// let mut cursor = db.query("SELECT name, born FROM people WHERE id > 10 ORDER BY born")?;
/// while cursor.next()? {
///     println!("{:?} {:?}", cursor.get_string(1)?, cursor.get_date_by_name("born")?);
/// }
/// # Ok::<(), csvquery::CsvError>(())
/// ```
pub struct CsvDatabase {
    dir: PathBuf,
    config: CsvConfig,
    converter: Arc<Converter>,
}

impl CsvDatabase {
    /// Open a directory of table files. The configuration is validated here
    /// so that bad options fail before the first query.
    pub fn open<P: AsRef<Path>>(dir: P, config: CsvConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(CsvError::FileNotFound(dir));
        }
        let converter = Arc::new(config.converter()?);
        info!(dir = %dir.display(), extension = %config.extension, "opened csv database");
        Ok(Self {
            dir,
            config,
            converter,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &CsvConfig {
        &self.config
    }

    /// Run a SELECT with a forward-only cursor and no row cap.
    pub fn query(&self, sql: &str) -> Result<Cursor> {
        self.query_with(sql, QueryOptions::default())
    }

    /// Run a SELECT.
    ///
    /// The table file is opened and its header read before the statement is
    /// validated, so a missing file fails here rather than on `next()`.
    pub fn query_with(&self, sql: &str, options: QueryOptions) -> Result<Cursor> {
        info!(sql, scrollable = options.scrollable, max_rows = options.max_rows, "query");
        let stmt = parse_sql(sql)?;

        let (source, types): (Box<dyn RowSource>, Vec<ColumnType>) = match &stmt.from {
            Some(table) => {
                let reader = self.open_table(&table.name, table.alias.as_deref())?;
                let types = self.table_types(&table.name, &reader)?;
                (Box::new(reader), types)
            }
            None => (Box::new(ListReader::single_empty_row()), Vec::new()),
        };

        Cursor::new(
            stmt,
            source,
            types,
            self.converter.clone(),
            options,
            !self.config.indexed_files,
        )
    }

    /// Resolve a table name to its reader. Without an alias the table name
    /// itself qualifies columns.
    fn open_table(&self, table: &str, alias: Option<&str>) -> Result<CsvReader> {
        let options = ReaderOptions::from_config(&self.config, table)?;
        let alias = Some(alias.unwrap_or(table).to_string());

        if self.config.indexed_files {
            let pattern = self.config.file_tail_pattern.as_deref().ok_or_else(|| {
                CsvError::Config("indexed_files requires file_tail_pattern".to_string())
            })?;
            // later files repeat the header and the skipped data lines
            let header_lines = usize::from(!self.config.suppress_headers);
            let repeat_skip = header_lines + self.config.skip_leading_data_lines;
            let lines = FileSetLines::open(
                &self.dir,
                table,
                pattern,
                &self.config.extension,
                repeat_skip,
            )?;
            info!(table, "opening indexed table");
            CsvReader::new(Box::new(lines), options, alias)
        } else {
            let path = self.dir.join(format!("{}{}", table, self.config.extension));
            info!(table, path = %path.display(), "opening table");
            CsvReader::from_path(path, options, alias)
        }
    }

    /// Declared types for the text columns; file-name pseudo-columns are text.
    fn table_types(&self, table: &str, reader: &CsvReader) -> Result<Vec<ColumnType>> {
        let declared = self.config.column_types_for(table)?;
        let data = ColumnType::assign(&declared, reader.data_column_count())?;
        let tail_count = reader.column_names().len().saturating_sub(data.len());
        let tail = vec![ColumnType::String; tail_count];

        Ok(if self.config.file_tail_prepend {
            tail.into_iter().chain(data).collect()
        } else {
            data.into_iter().chain(tail).collect()
        })
    }
}
