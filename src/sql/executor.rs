/// Query executor - the cursor that drives a row source through a query plan
use ahash::{AHashMap, AHashSet};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use super::aggregate::Accumulator;
use super::ast::SelectStmt;
use super::evaluator::ExprEvaluator;
use super::metadata::ResultMetadata;
use super::plan::{ExecutionPlan, MaterializeReason, QueryPlan, TableScope};
use super::row_converter::{RowConverter, RowEnv};
use crate::config::QueryOptions;
use crate::error::{CsvError, Result};
use crate::reader::RowSource;
use crate::types::{ColumnType, Converter, Value};

/// A source row that passed WHERE
struct QualifiedRow {
    env: RowEnv,
    /// `env` plus the projection aliases other clauses refer to
    overlay: Option<RowEnv>,
}

impl QualifiedRow {
    fn filter_env(&self) -> &RowEnv {
        self.overlay.as_ref().unwrap_or(&self.env)
    }
}

/// Output row with its precomputed ORDER BY keys
struct SortRow {
    keys: Vec<Value>,
    output: Vec<Value>,
}

/// Result cursor of one SELECT.
///
/// Streaming cursors hold only the current row. Materialized cursors build
/// their whole result during construction; position 0 is before the first
/// row and `len + 1` after the last.
pub struct Cursor {
    source: Option<Box<dyn RowSource>>,
    converter: RowConverter,
    evaluator: ExprEvaluator,
    plan: QueryPlan,
    options: QueryOptions,
    metadata: ResultMetadata,
    buffer: Vec<Vec<Value>>,
    position: usize,
    /// Current row of a streaming cursor
    current: Option<Vec<Value>>,
    /// DISTINCT tuples already returned
    seen: AHashSet<Vec<Value>>,
    /// Rows returned so far by a streaming cursor
    emitted: usize,
    finished: bool,
    closed: bool,
    was_null: bool,
}

impl Cursor {
    /// Validate `stmt` against the source's columns and prepare the result.
    ///
    /// `types` declares one type per source column. Grouped, aggregated,
    /// ordered and scrollable queries read their whole input here.
    pub fn new(
        stmt: SelectStmt,
        source: Box<dyn RowSource>,
        types: Vec<ColumnType>,
        converter: Arc<Converter>,
        options: QueryOptions,
        check_columns: bool,
    ) -> Result<Self> {
        let column_names = source.column_names().to_vec();
        let alias = source.table_alias().map(str::to_string);
        let scope = TableScope {
            columns: &column_names,
            alias: alias.as_deref(),
            has_table: stmt.from.is_some(),
            check_columns,
        };
        let plan = QueryPlan::build(stmt, &scope, options.scrollable)?;
        debug!(execution = ?plan.execution, columns = plan.projection.len(), "query plan");

        let row_converter = RowConverter::new(&*source, types, converter.clone());
        let evaluator = ExprEvaluator::new(converter);
        let metadata = ResultMetadata::infer(
            &plan.projection,
            &row_converter,
            source.column_sizes(),
            &evaluator,
        );

        let mut cursor = Self {
            source: Some(source),
            converter: row_converter,
            evaluator,
            plan,
            options,
            metadata,
            buffer: Vec::new(),
            position: 0,
            current: None,
            seen: AHashSet::new(),
            emitted: 0,
            finished: false,
            closed: false,
            was_null: false,
        };

        let execution = cursor.plan.execution;
        match execution {
            ExecutionPlan::Stream => cursor.skip_offset()?,
            ExecutionPlan::Materialize(reason) => cursor.materialize(reason)?,
        }
        Ok(cursor)
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn column_count(&self) -> usize {
        self.plan.projection.len()
    }

    pub fn execution_plan(&self) -> ExecutionPlan {
        self.plan.execution
    }

    fn is_buffered(&self) -> bool {
        matches!(self.plan.execution, ExecutionPlan::Materialize(_))
    }

    // ------------------------------------------------------------------
    // Reading the source
    // ------------------------------------------------------------------

    /// Next source row that satisfies WHERE, or `None` at end of input.
    ///
    /// Aliases are evaluated only for rows that pass WHERE, except the ones
    /// WHERE itself refers to.
    fn next_qualifying(&mut self) -> Result<Option<QualifiedRow>> {
        loop {
            let source = match self.source.as_mut() {
                Some(source) => source,
                None => return Ok(None),
            };
            if !source.next()? {
                return Ok(None);
            }
            let env = self.converter.convert(&source.current_fields())?;

            let mut bound = self.bind_aliases(self.plan.where_alias_refs.iter().copied(), &env)?;
            if let Some(condition) = &self.plan.where_clause {
                let passed = if bound.is_empty() {
                    self.evaluator.is_true(condition, &env)?
                } else {
                    let where_env = env.overlay(bound.iter().map(|(a, v)| (*a, v.clone())));
                    self.evaluator.is_true(condition, &where_env)?
                };
                if !passed {
                    continue;
                }
            }

            let rest = self
                .plan
                .alias_refs
                .iter()
                .copied()
                .filter(|i| !self.plan.where_alias_refs.contains(i));
            bound.extend(self.bind_aliases(rest, &env)?);
            let overlay = (!bound.is_empty()).then(|| env.overlay(bound));
            return Ok(Some(QualifiedRow { env, overlay }));
        }
    }

    /// Values of the given projection aliases on one source row. Aggregates
    /// have no per-row value and bind as NULL without being evaluated.
    fn bind_aliases(
        &self,
        indices: impl Iterator<Item = usize>,
        env: &RowEnv,
    ) -> Result<Vec<(&str, Value)>> {
        let mut bound = Vec::new();
        for i in indices {
            let column = &self.plan.projection[i];
            let value = if column.expr.contains_aggregate() {
                Value::Null
            } else {
                self.evaluator.eval(&column.expr, env)?
            };
            bound.push((column.alias.as_str(), value));
        }
        Ok(bound)
    }

    fn project(&self, env: &RowEnv) -> Result<Vec<Value>> {
        self.plan
            .projection
            .iter()
            .map(|column| self.evaluator.eval(&column.expr, env))
            .collect()
    }

    fn sort_keys(&self, env: &RowEnv) -> Result<Vec<Value>> {
        self.plan
            .order_by
            .iter()
            .map(|item| self.evaluator.eval(&item.expr, env))
            .collect()
    }

    /// `env` with the referenced projection aliases bound to `output`.
    fn projected_env(&self, env: &RowEnv, output: &[Value]) -> Option<RowEnv> {
        if self.plan.alias_refs.is_empty() {
            return None;
        }
        Some(env.overlay(self.plan.alias_refs.iter().map(|&i| {
            (self.plan.projection[i].alias.as_str(), output[i].clone())
        })))
    }

    /// HAVING and duplicate suppression for rows that are not grouped.
    /// Insertion into the DISTINCT set is the acceptance test.
    fn accept(&mut self, row: &QualifiedRow, output: &[Value]) -> Result<bool> {
        if let Some(having) = &self.plan.having {
            if !self.evaluator.is_true(having, row.filter_env())? {
                return Ok(false);
            }
        }
        let key = match &self.plan.distinct_keys {
            Some(keys) => Some(
                keys.iter()
                    .map(|e| self.evaluator.eval(e, row.filter_env()))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None if self.plan.distinct => Some(output.to_vec()),
            None => None,
        };
        Ok(match key {
            Some(key) => self.seen.insert(key),
            None => true,
        })
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    fn fetch_stream_row(&mut self) -> Result<Option<Vec<Value>>> {
        while let Some(row) = self.next_qualifying()? {
            let output = self.project(&row.env)?;
            if self.accept(&row, &output)? {
                return Ok(Some(output));
            }
        }
        Ok(None)
    }

    /// OFFSET without buffering: discard the first qualifying rows.
    fn skip_offset(&mut self) -> Result<()> {
        for _ in 0..self.plan.offset {
            if self.fetch_stream_row()?.is_none() {
                self.finish_stream();
                break;
            }
        }
        Ok(())
    }

    /// The smaller of the caller's row cap and the query's LIMIT.
    fn row_cap(&self) -> Option<usize> {
        let max_rows = (self.options.max_rows > 0).then_some(self.options.max_rows);
        match (max_rows, self.plan.limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn finish_stream(&mut self) {
        self.finished = true;
        self.current = None;
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }

    // ------------------------------------------------------------------
    // Materialization
    // ------------------------------------------------------------------

    fn materialize(&mut self, reason: MaterializeReason) -> Result<()> {
        let mut rows = match reason {
            MaterializeReason::Grouped => self.build_groups()?,
            MaterializeReason::Aggregated => self.build_aggregate()?,
            MaterializeReason::Ordered | MaterializeReason::Scrollable => self.build_rows()?,
        };

        if !self.plan.order_by.is_empty() {
            let ascending: Vec<bool> = self.plan.order_by.iter().map(|o| o.asc).collect();
            rows.sort_by(|a, b| compare_keys(&a.keys, &b.keys, &ascending));
        }

        let total = rows.len();
        let start = self.plan.offset.min(total);
        let mut end = match self.plan.limit {
            Some(limit) => start.saturating_add(limit).min(total),
            None => total,
        };
        // the row cap counts from the first row, OFFSET included
        if self.options.max_rows > 0 {
            end = end.min(self.options.max_rows).max(start);
        }
        self.buffer = rows
            .into_iter()
            .skip(start)
            .take(end - start)
            .map(|row| row.output)
            .collect();

        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.finished = true;
        debug!(?reason, qualifying = total, rows = self.buffer.len(), "materialized result");
        Ok(())
    }

    fn build_rows(&mut self) -> Result<Vec<SortRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_qualifying()? {
            let output = self.project(&row.env)?;
            if !self.accept(&row, &output)? {
                continue;
            }
            let keys = self.sort_keys(row.filter_env())?;
            rows.push(SortRow { keys, output });
        }
        Ok(rows)
    }

    /// One output row per distinct key, in first-seen order. Each group is
    /// represented by its first member row plus all members for aggregates.
    fn build_groups(&mut self) -> Result<Vec<SortRow>> {
        let group_by = self.plan.group_by.clone().unwrap_or_default();
        let mut index: AHashMap<Vec<Value>, usize> = AHashMap::new();
        let mut groups: Vec<Vec<RowEnv>> = Vec::new();

        while let Some(row) = self.next_qualifying()? {
            let key = group_by
                .iter()
                .map(|e| self.evaluator.eval(e, row.filter_env()))
                .collect::<Result<Vec<_>>>()?;
            match index.get(&key) {
                Some(&i) => groups[i].push(row.env),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![row.env]);
                }
            }
        }
        debug!(groups = groups.len(), "grouped rows");

        let mut rows = Vec::with_capacity(groups.len());
        for members in groups {
            let first = members.first().cloned().unwrap_or_default();
            let group_env = first.with_group(Arc::new(members));
            let output = self.project(&group_env)?;
            let projected = self.projected_env(&group_env, &output);
            let env = projected.as_ref().unwrap_or(&group_env);

            if let Some(having) = &self.plan.having {
                if !self.evaluator.is_true(having, env)? {
                    continue;
                }
            }
            if self.plan.distinct && !self.seen.insert(output.clone()) {
                continue;
            }
            let keys = self.sort_keys(env)?;
            rows.push(SortRow { keys, output });
        }
        Ok(rows)
    }

    /// Aggregates without GROUP BY: feed every qualifying row into the
    /// accumulators, then produce a single row from the totals.
    fn build_aggregate(&mut self) -> Result<Vec<SortRow>> {
        let calls = self.plan.aggregates.clone();
        let mut accumulators: Vec<Accumulator> = calls.iter().map(Accumulator::new).collect();

        let mut count = 0usize;
        while let Some(row) = self.next_qualifying()? {
            for (call, acc) in calls.iter().zip(accumulators.iter_mut()) {
                self.evaluator.accumulate(call, acc, &row.env)?;
            }
            count += 1;
        }
        debug!(rows = count, aggregates = calls.len(), "aggregated rows");

        let mut totals = vec![Value::Null; calls.len()];
        for (call, acc) in calls.iter().zip(&accumulators) {
            if let Some(slot) = totals.get_mut(call.slot) {
                *slot = acc.finish();
            }
        }

        let env = RowEnv::new().with_totals(Arc::new(totals));
        let output = self.project(&env)?;
        let projected = self.projected_env(&env, &output);
        let env = projected.as_ref().unwrap_or(&env);

        if let Some(having) = &self.plan.having {
            if !self.evaluator.is_true(having, env)? {
                return Ok(Vec::new());
            }
        }
        let keys = self.sort_keys(env)?;
        Ok(vec![SortRow { keys, output }])
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(CsvError::Closed)
        } else {
            Ok(())
        }
    }

    fn require_scrollable(&self, operation: &'static str) -> Result<()> {
        self.ensure_open()?;
        if self.options.scrollable {
            Ok(())
        } else {
            Err(CsvError::UnsupportedNavigation(operation))
        }
    }

    fn on_row(&self) -> bool {
        (1..=self.buffer.len()).contains(&self.position)
    }

    /// Advance to the next row. Returns `false` once past the last row.
    pub fn next(&mut self) -> Result<bool> {
        self.ensure_open()?;

        if self.is_buffered() {
            if self.position <= self.buffer.len() {
                self.position += 1;
            }
            return Ok(self.on_row());
        }

        if self.finished {
            return Ok(false);
        }
        if self.row_cap().map_or(false, |cap| self.emitted >= cap) {
            self.finish_stream();
            return Ok(false);
        }
        match self.fetch_stream_row()? {
            Some(row) => {
                self.current = Some(row);
                self.emitted += 1;
                Ok(true)
            }
            None => {
                self.finish_stream();
                Ok(false)
            }
        }
    }

    pub fn previous(&mut self) -> Result<bool> {
        self.require_scrollable("previous")?;
        if self.position > 0 {
            self.position -= 1;
        }
        Ok(self.on_row())
    }

    pub fn first(&mut self) -> Result<bool> {
        self.require_scrollable("first")?;
        self.absolute(1)
    }

    pub fn last(&mut self) -> Result<bool> {
        self.require_scrollable("last")?;
        self.absolute(-1)
    }

    /// Move to a 1-based row; negative rows count back from the end, so
    /// `-1` is the last row. Out-of-range targets clamp to before-first or
    /// after-last.
    pub fn absolute(&mut self, row: i64) -> Result<bool> {
        self.require_scrollable("absolute")?;
        let after_last = self.buffer.len() as i64 + 1;
        let target = match row.cmp(&0) {
            Ordering::Greater => row.min(after_last),
            Ordering::Less => (after_last + row).max(0),
            Ordering::Equal => 0,
        };
        self.position = target as usize;
        Ok(self.on_row())
    }

    pub fn relative(&mut self, rows: i64) -> Result<bool> {
        self.require_scrollable("relative")?;
        let after_last = self.buffer.len() as i64 + 1;
        let target = (self.position as i64).saturating_add(rows).clamp(0, after_last);
        self.position = target as usize;
        Ok(self.on_row())
    }

    pub fn before_first(&mut self) -> Result<()> {
        self.require_scrollable("before_first")?;
        self.position = 0;
        Ok(())
    }

    pub fn after_last(&mut self) -> Result<()> {
        self.require_scrollable("after_last")?;
        self.position = self.buffer.len() + 1;
        Ok(())
    }

    pub fn is_before_first(&self) -> Result<bool> {
        self.ensure_open()?;
        if self.is_buffered() {
            Ok(!self.buffer.is_empty() && self.position == 0)
        } else {
            Ok(self.emitted == 0 && !self.finished)
        }
    }

    pub fn is_after_last(&self) -> Result<bool> {
        self.ensure_open()?;
        if self.is_buffered() {
            Ok(!self.buffer.is_empty() && self.position > self.buffer.len())
        } else {
            Ok(self.emitted > 0 && self.finished)
        }
    }

    pub fn is_first(&self) -> Result<bool> {
        self.ensure_open()?;
        if self.is_buffered() {
            Ok(self.position == 1 && !self.buffer.is_empty())
        } else {
            Ok(self.emitted == 1 && self.current.is_some())
        }
    }

    /// Only known for materialized results; a stream cannot look ahead.
    pub fn is_last(&self) -> Result<bool> {
        self.ensure_open()?;
        if !self.is_buffered() {
            return Err(CsvError::UnsupportedNavigation("is_last"));
        }
        Ok(!self.buffer.is_empty() && self.position == self.buffer.len())
    }

    /// Current 1-based row number, or 0 when not on a row.
    pub fn row(&self) -> usize {
        if self.is_buffered() {
            if self.on_row() {
                self.position
            } else {
                0
            }
        } else if self.current.is_some() {
            self.emitted
        } else {
            0
        }
    }

    /// Release the source and any buffered rows. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        self.buffer = Vec::new();
        self.seen = AHashSet::new();
        self.current = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ------------------------------------------------------------------
    // Column access
    // ------------------------------------------------------------------

    fn current_row(&self) -> Result<&[Value]> {
        self.ensure_open()?;
        if self.is_buffered() {
            if self.on_row() {
                Ok(&self.buffer[self.position - 1])
            } else {
                Err(CsvError::NoCurrentRow)
            }
        } else {
            self.current.as_deref().ok_or(CsvError::NoCurrentRow)
        }
    }

    /// Values of the current row.
    pub fn current_values(&self) -> Result<&[Value]> {
        self.current_row()
    }

    /// 1-based index of an output column, matched case-insensitively by
    /// label and then by underlying column name.
    pub fn find_column(&self, name: &str) -> Result<usize> {
        let columns = &self.metadata.columns;
        columns
            .iter()
            .position(|c| c.label.eq_ignore_ascii_case(name))
            .or_else(|| columns.iter().position(|c| c.name.eq_ignore_ascii_case(name)))
            .map(|i| i + 1)
            .ok_or_else(|| CsvError::UnknownColumn(name.to_string()))
    }

    /// Whether the last value read was SQL NULL.
    pub fn was_null(&self) -> bool {
        self.was_null
    }

    pub fn get_value(&mut self, index: usize) -> Result<Value> {
        let row = self.current_row()?;
        let value = index
            .checked_sub(1)
            .and_then(|i| row.get(i))
            .cloned()
            .ok_or(CsvError::ColumnIndex(index))?;
        self.was_null = value.is_null();
        Ok(value)
    }

    pub fn get_string(&mut self, index: usize) -> Result<Option<String>> {
        let value = self.get_value(index)?;
        Ok((!value.is_null()).then(|| value.to_string()))
    }

    pub fn get_bool(&mut self, index: usize) -> Result<bool> {
        let value = self.get_value(index)?;
        Ok(self.evaluator.converter().to_bool(&value)?.unwrap_or(false))
    }

    fn get_integer(&mut self, index: usize, type_name: &'static str) -> Result<i64> {
        let value = self.get_value(index)?;
        Ok(self
            .evaluator
            .converter()
            .to_i64(&value, type_name)?
            .unwrap_or(0))
    }

    pub fn get_i8(&mut self, index: usize) -> Result<i8> {
        narrow(self.get_integer(index, "Byte")?, "Byte")
    }

    pub fn get_i16(&mut self, index: usize) -> Result<i16> {
        narrow(self.get_integer(index, "Short")?, "Short")
    }

    pub fn get_i32(&mut self, index: usize) -> Result<i32> {
        narrow(self.get_integer(index, "Int")?, "Int")
    }

    pub fn get_i64(&mut self, index: usize) -> Result<i64> {
        self.get_integer(index, "Long")
    }

    pub fn get_f32(&mut self, index: usize) -> Result<f32> {
        Ok(self.get_f64(index)? as f32)
    }

    pub fn get_f64(&mut self, index: usize) -> Result<f64> {
        let value = self.get_value(index)?;
        Ok(self.evaluator.converter().to_f64(&value)?.unwrap_or(0.0))
    }

    pub fn get_decimal(&mut self, index: usize) -> Result<Option<Decimal>> {
        let value = self.get_value(index)?;
        self.evaluator.converter().to_decimal(&value)
    }

    /// Raw bytes of a Blob, or the UTF-8 text of any other value.
    pub fn get_bytes(&mut self, index: usize) -> Result<Option<Vec<u8>>> {
        Ok(match self.get_value(index)? {
            Value::Null => None,
            Value::Bytes(bytes) => Some(bytes),
            other => Some(other.to_string().into_bytes()),
        })
    }

    pub fn get_date(&mut self, index: usize) -> Result<Option<NaiveDate>> {
        let value = self.get_value(index)?;
        self.evaluator.converter().to_date(&value)
    }

    pub fn get_time(&mut self, index: usize) -> Result<Option<NaiveTime>> {
        let value = self.get_value(index)?;
        self.evaluator.converter().to_time(&value)
    }

    pub fn get_timestamp(&mut self, index: usize) -> Result<Option<NaiveDateTime>> {
        let value = self.get_value(index)?;
        self.evaluator.converter().to_timestamp(&value)
    }

    /// Drain the remaining rows.
    pub fn collect_rows(&mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while self.next()? {
            rows.push(self.current_row()?.to_vec());
        }
        Ok(rows)
    }
}

macro_rules! by_name {
    ($($by_name:ident => $by_index:ident -> $ty:ty),* $(,)?) => {
        impl Cursor {
            $(
                pub fn $by_name(&mut self, column: &str) -> Result<$ty> {
                    let index = self.find_column(column)?;
                    self.$by_index(index)
                }
            )*
        }
    };
}

by_name! {
    get_value_by_name => get_value -> Value,
    get_string_by_name => get_string -> Option<String>,
    get_bool_by_name => get_bool -> bool,
    get_i8_by_name => get_i8 -> i8,
    get_i16_by_name => get_i16 -> i16,
    get_i32_by_name => get_i32 -> i32,
    get_i64_by_name => get_i64 -> i64,
    get_f32_by_name => get_f32 -> f32,
    get_f64_by_name => get_f64 -> f64,
    get_decimal_by_name => get_decimal -> Option<Decimal>,
    get_bytes_by_name => get_bytes -> Option<Vec<u8>>,
    get_date_by_name => get_date -> Option<NaiveDate>,
    get_time_by_name => get_time -> Option<NaiveTime>,
    get_timestamp_by_name => get_timestamp -> Option<NaiveDateTime>,
}

fn narrow<T: TryFrom<i64>>(value: i64, type_name: &'static str) -> Result<T> {
    T::try_from(value).map_err(|_| CsvError::NumberFormat {
        value: value.to_string(),
        type_name,
    })
}

/// ORDER BY comparator: nulls sort first ascending, and a descending key
/// reverses the whole comparison.
fn compare_keys(a: &[Value], b: &[Value], ascending: &[bool]) -> Ordering {
    for ((x, y), asc) in a.iter().zip(b).zip(ascending) {
        let ord = x.total_cmp(y);
        let ord = if *asc { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{CsvReader, ListReader, ReaderOptions};
    use crate::sql::lexer::Lexer;
    use crate::sql::parser::Parser;

    fn parse(sql: &str) -> SelectStmt {
        let tokens = Lexer::new(sql).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn open_with(csv: &str, types: &str, sql: &str, options: QueryOptions) -> Result<Cursor> {
        let input = std::io::Cursor::new(csv.as_bytes().to_vec());
        let reader = CsvReader::from_reader(input, ReaderOptions::default(), Some("T".to_string()))?;
        let types = ColumnType::assign(&ColumnType::parse_list(types)?, reader.column_names().len())?;
        Cursor::new(
            parse(sql),
            Box::new(reader),
            types,
            Arc::new(Converter::default()),
            options,
            true,
        )
    }

    fn open(csv: &str, types: &str, sql: &str) -> Cursor {
        open_with(csv, types, sql, QueryOptions::default()).unwrap()
    }

    fn query(csv: &str, types: &str, sql: &str) -> Vec<Vec<Value>> {
        open(csv, types, sql).collect_rows().unwrap()
    }

    /// Re-run `sql` over rows produced by an earlier query.
    fn requery(names: &[&str], rows: &[Vec<Value>], sql: &str) -> Vec<Vec<Value>> {
        let rows: Vec<Vec<Option<String>>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| (!v.is_null()).then(|| v.to_string()))
                    .collect()
            })
            .collect();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let reader = ListReader::new(names, rows).with_alias("T");
        let types = vec![ColumnType::String; reader.column_names().len()];
        let mut cursor = Cursor::new(
            parse(sql),
            Box::new(reader),
            types,
            Arc::new(Converter::default()),
            QueryOptions::default(),
            true,
        )
        .unwrap();
        cursor.collect_rows().unwrap()
    }

    const ABC: &str = "A,B\n1,x\n2,y\n1,z\n";
    const NUMBERS: &str = "N,TAG\n3,c\n1,a\n2,b\n5,\n4,b\n";

    fn ints(values: &[i32]) -> Vec<Vec<Value>> {
        values.iter().map(|v| vec![Value::Int(*v)]).collect()
    }

    #[test]
    fn test_group_by_first_seen_order() {
        let rows = query(ABC, "Int,String", "SELECT A, COUNT(*) FROM T GROUP BY A");
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(1), Value::Long(2)],
                vec![Value::Int(2), Value::Long(1)],
            ]
        );
    }

    #[test]
    fn test_order_by_desc_limit() {
        let csv = "N\n3\n1\n2\n";
        assert_eq!(query(csv, "Int", "SELECT N FROM T ORDER BY N DESC LIMIT 2"), ints(&[3, 2]));
        assert_eq!(query(csv, "Int", "SELECT N FROM T ORDER BY 1"), ints(&[1, 2, 3]));
        assert_eq!(
            query(csv, "Int", "SELECT N FROM T ORDER BY N LIMIT 2 OFFSET 1"),
            ints(&[2, 3])
        );
    }

    #[test]
    fn test_where_like() {
        let csv = "S\nabc\nac\nabx\n";
        let rows = query(csv, "String", "SELECT S FROM T WHERE S LIKE 'a%c'");
        assert_eq!(
            rows,
            vec![vec![Value::Text("abc".into())], vec![Value::Text("ac".into())]]
        );
    }

    #[test]
    fn test_is_null_and_complement() {
        let nulls = query(NUMBERS, "Int,String", "SELECT N FROM T WHERE TAG IS NULL");
        assert_eq!(nulls, ints(&[5]));
        let others = query(NUMBERS, "Int,String", "SELECT N FROM T WHERE NOT (TAG IS NULL)");
        assert_eq!(others, ints(&[3, 1, 2, 4]));
        assert_eq!(nulls.len() + others.len(), 5);
    }

    #[test]
    fn test_distinct_subset_and_idempotent() {
        let all = query(NUMBERS, "Int,String", "SELECT TAG FROM T");
        let distinct = query(NUMBERS, "Int,String", "SELECT DISTINCT TAG FROM T");
        assert_eq!(distinct.len(), 4);
        for row in &distinct {
            assert!(all.contains(row));
        }
        let unique: AHashSet<Vec<Value>> = distinct.iter().cloned().collect();
        assert_eq!(unique.len(), distinct.len());

        let again = requery(&["TAG"], &distinct, "SELECT DISTINCT TAG FROM T");
        let as_text: Vec<Vec<Value>> = distinct
            .iter()
            .map(|r| r.iter().map(|v| if v.is_null() { Value::Null } else { Value::Text(v.to_string()) }).collect())
            .collect();
        assert_eq!(again, as_text);
    }

    #[test]
    fn test_group_counts_partition_rows() {
        let groups = query(
            NUMBERS,
            "Int,String",
            "SELECT TAG, COUNT(*) FROM T WHERE N > 1 GROUP BY TAG",
        );
        let total: i64 = groups
            .iter()
            .map(|row| match row[1] {
                Value::Long(n) => n,
                _ => panic!("COUNT must be Long"),
            })
            .sum();
        let qualifying = query(NUMBERS, "Int,String", "SELECT N FROM T WHERE N > 1");
        assert_eq!(total as usize, qualifying.len());
    }

    #[test]
    fn test_order_by_reapplication_is_stable() {
        let sorted = query(NUMBERS, "Int,String", "SELECT TAG, N FROM T ORDER BY TAG");
        let resorted = requery(&["TAG", "N"], &sorted, "SELECT TAG, N FROM T ORDER BY TAG");
        let firsts: Vec<String> = sorted.iter().map(|r| r[1].to_string()).collect();
        let again: Vec<String> = resorted.iter().map(|r| r[1].to_string()).collect();
        assert_eq!(firsts, again);
        // null sorts first ascending
        assert_eq!(sorted[0][0], Value::Null);
    }

    #[test]
    fn test_nulls_sort_last_descending() {
        let rows = query(NUMBERS, "Int,String", "SELECT TAG FROM T ORDER BY TAG DESC");
        assert_eq!(rows.last().unwrap()[0], Value::Null);
        assert_eq!(rows[0][0], Value::Text("c".into()));
    }

    #[test]
    fn test_streaming_offset_limit_and_max_rows() {
        let mut cursor = open(NUMBERS, "Int,String", "SELECT N FROM T LIMIT 2 OFFSET 1");
        assert_eq!(cursor.execution_plan(), ExecutionPlan::Stream);
        assert_eq!(cursor.collect_rows().unwrap(), ints(&[1, 2]));

        let mut cursor = open_with(
            NUMBERS,
            "Int,String",
            "SELECT N FROM T OFFSET 1",
            QueryOptions::default().with_max_rows(3),
        )
        .unwrap();
        assert_eq!(cursor.collect_rows().unwrap(), ints(&[1, 2, 5]));

        let mut cursor = open_with(
            NUMBERS,
            "Int,String",
            "SELECT N FROM T ORDER BY N LIMIT 4",
            QueryOptions::default().with_max_rows(2),
        )
        .unwrap();
        assert_eq!(cursor.collect_rows().unwrap(), ints(&[1, 2]));

        // buffered results count the cap from the first sorted row
        let mut cursor = open_with(
            NUMBERS,
            "Int,String",
            "SELECT N FROM T ORDER BY N OFFSET 1",
            QueryOptions::default().with_max_rows(2),
        )
        .unwrap();
        assert_eq!(cursor.collect_rows().unwrap(), ints(&[2]));

        let mut cursor = open_with(
            NUMBERS,
            "Int,String",
            "SELECT N FROM T ORDER BY N LIMIT 2 OFFSET 3",
            QueryOptions::default().with_max_rows(2),
        )
        .unwrap();
        assert!(cursor.collect_rows().unwrap().is_empty());

        assert!(query(NUMBERS, "Int,String", "SELECT N FROM T OFFSET 10").is_empty());
        assert!(query(NUMBERS, "Int,String", "SELECT N FROM T LIMIT 0").is_empty());
    }

    #[test]
    fn test_aggregate_only() {
        let rows = query(
            NUMBERS,
            "Int,String",
            "SELECT COUNT(*), SUM(N), MIN(TAG), AVG(N) FROM T WHERE N > 1",
        );
        assert_eq!(
            rows,
            vec![vec![
                Value::Long(4),
                Value::Long(14),
                Value::Text("b".into()),
                Value::Double(3.5),
            ]]
        );

        let empty = query(NUMBERS, "Int,String", "SELECT COUNT(*), SUM(N) FROM T WHERE N > 100");
        assert_eq!(empty, vec![vec![Value::Long(0), Value::Null]]);

        assert!(query(NUMBERS, "Int,String", "SELECT COUNT(*) FROM T LIMIT 0").is_empty());
        assert!(query(NUMBERS, "Int,String", "SELECT COUNT(*) FROM T OFFSET 1").is_empty());
    }

    #[test]
    fn test_group_by_having_and_order() {
        let rows = query(
            NUMBERS,
            "Int,String",
            "SELECT TAG, COUNT(*) AS cnt, SUM(N) FROM T GROUP BY TAG HAVING COUNT(*) > 1 ORDER BY cnt DESC",
        );
        assert_eq!(
            rows,
            vec![vec![Value::Text("b".into()), Value::Long(2), Value::Long(6)]]
        );

        let rows = query(
            NUMBERS,
            "Int,String",
            "SELECT TAG, MAX(N) AS top FROM T GROUP BY TAG ORDER BY top LIMIT 2 OFFSET 1",
        );
        assert_eq!(
            rows,
            vec![
                vec![Value::Text("c".into()), Value::Int(3)],
                vec![Value::Text("b".into()), Value::Int(4)],
            ]
        );
    }

    #[test]
    fn test_group_by_without_aggregates() {
        let rows = query(ABC, "Int,String", "SELECT A FROM T GROUP BY A");
        assert_eq!(rows, ints(&[1, 2]));
        let rows = query(ABC, "Int,String", "SELECT A FROM T GROUP BY A HAVING A > 1");
        assert_eq!(rows, ints(&[2]));
        let rows = query(ABC, "Int,String", "SELECT A FROM T GROUP BY A ORDER BY A DESC");
        assert_eq!(rows, ints(&[2, 1]));
    }

    #[test]
    fn test_alias_in_where_and_expressions() {
        let rows = query(
            NUMBERS,
            "Int,String",
            "SELECT N * 10 AS big, UPPER(TAG) FROM T WHERE big >= 30 ORDER BY big",
        );
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(30), Value::Text("C".into())],
                vec![Value::Int(40), Value::Text("B".into())],
                vec![Value::Int(50), Value::Null],
            ]
        );
    }

    #[test]
    fn test_alias_not_evaluated_for_filtered_rows() {
        let csv = "A,B\n0,x\n2,y\n5,z\n";
        let rows = query(csv, "Int,String", "SELECT 10 / A AS r FROM T WHERE A <> 0 ORDER BY r");
        assert_eq!(rows, ints(&[2, 5]));

        let rows = query(csv, "Int,String", "SELECT 10 / A AS r, B FROM T WHERE B <> 'x' ORDER BY r DESC");
        assert_eq!(
            rows,
            vec![
                vec![Value::Int(5), Value::Text("y".into())],
                vec![Value::Int(2), Value::Text("z".into())],
            ]
        );

        // an alias WHERE needs is still evaluated on every row
        let result = open_with(
            csv,
            "Int,String",
            "SELECT 10 / A AS r FROM T WHERE r > 1 ORDER BY r",
            QueryOptions::default(),
        );
        assert!(matches!(result, Err(CsvError::DivisionByZero)));
    }

    #[test]
    fn test_select_star_and_qualified() {
        let rows = query(ABC, "Int,String", "SELECT * FROM T WHERE T.B = 'y'");
        assert_eq!(rows, vec![vec![Value::Int(2), Value::Text("y".into())]]);
        let cursor = open(ABC, "Int,String", "SELECT t.* FROM T");
        let labels: Vec<&str> = cursor.metadata().columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B"]);
    }

    #[test]
    fn test_constant_query_without_table() {
        let reader = ListReader::single_empty_row();
        let mut cursor = Cursor::new(
            parse("SELECT 1 + 2 AS three, 'x'"),
            Box::new(reader),
            Vec::new(),
            Arc::new(Converter::default()),
            QueryOptions::default(),
            true,
        )
        .unwrap();
        assert_eq!(
            cursor.collect_rows().unwrap(),
            vec![vec![Value::Int(3), Value::Text("x".into())]]
        );
    }

    #[test]
    fn test_scrollable_navigation() {
        let mut cursor = open_with(
            NUMBERS,
            "Int,String",
            "SELECT N FROM T",
            QueryOptions::scrollable(),
        )
        .unwrap();
        assert!(cursor.is_before_first().unwrap());
        assert!(cursor.last().unwrap());
        let last = cursor.get_i32(1).unwrap();
        assert!(cursor.is_last().unwrap());
        assert!(cursor.absolute(-1).unwrap());
        assert_eq!(cursor.get_i32(1).unwrap(), last);
        assert_eq!(cursor.row(), 5);

        assert!(cursor.first().unwrap());
        assert!(cursor.is_first().unwrap());
        assert_eq!(cursor.get_i32(1).unwrap(), 3);
        assert!(!cursor.previous().unwrap());
        assert!(cursor.is_before_first().unwrap());
        assert!(cursor.relative(2).unwrap());
        assert_eq!(cursor.get_i32(1).unwrap(), 1);

        assert!(!cursor.absolute(100).unwrap());
        assert!(cursor.is_after_last().unwrap());
        assert!(!cursor.next().unwrap());
        assert!(cursor.previous().unwrap());
        assert_eq!(cursor.row(), 5);

        assert!(!cursor.absolute(-100).unwrap());
        assert_eq!(cursor.row(), 0);
        assert!(matches!(cursor.get_value(1), Err(CsvError::NoCurrentRow)));

        cursor.after_last().unwrap();
        assert!(!cursor.relative(1).unwrap());
        cursor.before_first().unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_i32(1).unwrap(), 3);
    }

    #[test]
    fn test_forward_only_rejects_navigation() {
        let mut cursor = open(NUMBERS, "Int,String", "SELECT N FROM T ORDER BY N");
        assert!(matches!(cursor.previous(), Err(CsvError::UnsupportedNavigation(_))));
        assert!(matches!(cursor.absolute(1), Err(CsvError::UnsupportedNavigation(_))));
        assert!(matches!(cursor.first(), Err(CsvError::UnsupportedNavigation(_))));
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_i32(1).unwrap(), 1);

        let mut stream = open(NUMBERS, "Int,String", "SELECT N FROM T");
        assert!(matches!(stream.last(), Err(CsvError::UnsupportedNavigation(_))));
        assert!(matches!(stream.is_last(), Err(CsvError::UnsupportedNavigation(_))));
    }

    #[test]
    fn test_accessors() {
        let csv = "ID,NAME,BORN,SCORE\n1,Ann,2001-02-03,1.5\n,Bob,,\n";
        let mut cursor = open(csv, "Int,String,Date,Double", "SELECT * FROM T");
        assert!(matches!(cursor.get_value(1), Err(CsvError::NoCurrentRow)));

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_i64_by_name("id").unwrap(), 1);
        assert_eq!(cursor.get_string(2).unwrap().as_deref(), Some("Ann"));
        assert_eq!(
            cursor.get_date_by_name("born").unwrap(),
            NaiveDate::from_ymd_opt(2001, 2, 3)
        );
        assert_eq!(cursor.get_f64(4).unwrap(), 1.5);
        assert_eq!(cursor.get_bytes(2).unwrap(), Some(b"Ann".to_vec()));
        assert!(!cursor.was_null());
        assert!(matches!(cursor.get_value(9), Err(CsvError::ColumnIndex(9))));
        assert!(matches!(cursor.get_value(0), Err(CsvError::ColumnIndex(0))));
        assert!(matches!(cursor.find_column("nope"), Err(CsvError::UnknownColumn(_))));

        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get_i32(1).unwrap(), 0);
        assert!(cursor.was_null());
        assert_eq!(cursor.get_f32(4).unwrap(), 0.0);
        assert_eq!(cursor.get_date(3).unwrap(), None);
        assert_eq!(cursor.get_string(3).unwrap(), None);
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut cursor = open(ABC, "Int,String", "SELECT A FROM T");
        assert!(cursor.next().unwrap());
        cursor.close();
        cursor.close();
        assert!(cursor.is_closed());
        assert!(matches!(cursor.next(), Err(CsvError::Closed)));
        assert!(matches!(cursor.get_value(1), Err(CsvError::Closed)));
    }

    #[test]
    fn test_validation_happens_before_reading() {
        // the bad value in row 2 would fail a scan; validation fails first
        let csv = "A,B\n1,x\nbad,y\n";
        let result = open_with(csv, "Int,String", "SELECT C FROM T", QueryOptions::default());
        assert!(matches!(result, Err(CsvError::UnknownColumn(_))));

        let result = open_with(csv, "Int,String", "SELECT A FROM T ORDER BY A", QueryOptions::default());
        assert!(matches!(result, Err(CsvError::NumberFormat { .. })));

        let mut cursor = open(csv, "Int,String", "SELECT A FROM T");
        assert!(cursor.next().unwrap());
        assert!(matches!(cursor.next(), Err(CsvError::NumberFormat { .. })));
    }

    #[test]
    fn test_metadata() {
        let cursor = open(
            ABC,
            "Int,String",
            "SELECT A, B AS label, COUNT(*) FROM T GROUP BY A, B",
        );
        let meta = cursor.metadata();
        assert_eq!(meta.column_count(), 3);
        assert_eq!(meta.columns[0].type_name, "Int");
        assert_eq!(meta.columns[1].label, "label");
        assert_eq!(meta.columns[1].name, "B");
        assert_eq!(meta.columns[2].type_name, "Long");
        assert_eq!(cursor.column_count(), 3);
    }

    #[test]
    fn test_compare_keys() {
        let a = vec![Value::Null, Value::Int(1)];
        let b = vec![Value::Int(0), Value::Int(1)];
        assert_eq!(compare_keys(&a, &b, &[true, true]), Ordering::Less);
        assert_eq!(compare_keys(&a, &b, &[false, true]), Ordering::Greater);
        assert_eq!(compare_keys(&a, &a, &[true, false]), Ordering::Equal);
    }
}
