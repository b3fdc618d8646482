/// Query validation, rewriting and execution-mode selection
use ahash::AHashSet;

use super::ast::*;
use crate::error::{CsvError, Result};
use crate::types::Value;

/// Why a query has to be buffered before its first row is returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeReason {
    Grouped,
    Aggregated,
    Ordered,
    Scrollable,
}

/// Decided once per query; every cursor operation dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPlan {
    /// Rows are read, filtered and returned one at a time
    Stream,
    Materialize(MaterializeReason),
}

/// Columns visible to a query.
#[derive(Debug, Clone, Copy)]
pub struct TableScope<'a> {
    /// Column names as declared by the table
    pub columns: &'a [String],
    /// Qualifier accepted in `alias.column` references
    pub alias: Option<&'a str>,
    /// False for queries without FROM
    pub has_table: bool,
    /// Column existence can only be checked when the header is known up front
    pub check_columns: bool,
}

/// A validated SELECT, ready to execute.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// Output columns with `*` expanded
    pub projection: Vec<SelectColumn>,
    pub distinct: bool,
    pub where_clause: Option<Expr>,
    /// Grouping expressions of a GROUP BY with aggregates
    pub group_by: Option<Vec<Expr>>,
    /// Grouping expressions of a GROUP BY without aggregates, which runs as
    /// a DISTINCT on these keys
    pub distinct_keys: Option<Vec<Expr>>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    /// Every aggregate call, indexed by its slot
    pub aggregates: Vec<AggregateCall>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Projections whose aliases other clauses refer to
    pub alias_refs: Vec<usize>,
    /// The part of `alias_refs` that WHERE itself needs
    pub where_alias_refs: Vec<usize>,
    pub execution: ExecutionPlan,
}

impl QueryPlan {
    /// Validate and rewrite `stmt`. Fails before any row is read.
    pub fn build(stmt: SelectStmt, scope: &TableScope<'_>, scrollable: bool) -> Result<Self> {
        let mut projection = expand_projection(stmt.columns, scope)?;

        let mut group_by = match stmt.group_by {
            Some(exprs) => Some(
                exprs
                    .into_iter()
                    .map(|e| resolve_ordinal(e, &projection, "GROUP BY"))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };

        let mut order_by = Vec::new();
        for item in stmt.order_by.unwrap_or_default() {
            let is_ordinal = ordinal(&item.expr).is_some();
            let expr = resolve_ordinal(item.expr, &projection, "ORDER BY")?;
            if !is_ordinal && expr.used_columns().is_empty() && !expr.contains_aggregate() {
                return Err(CsvError::InvalidGroupOrOrder {
                    clause: "ORDER BY",
                    expr: expr.to_string(),
                });
            }
            order_by.push(OrderByExpr { expr, asc: item.asc });
        }

        let where_clause = stmt.where_clause;
        let mut having = stmt.having;

        if where_clause.as_ref().map_or(false, Expr::contains_aggregate) {
            return Err(CsvError::AggregateInWhere);
        }
        for expr in group_by.iter().flatten() {
            if expr.contains_aggregate() {
                return Err(CsvError::InvalidGroupOrOrder {
                    clause: "GROUP BY",
                    expr: expr.to_string(),
                });
            }
        }

        let mut next_slot = 0;
        for column in &mut projection {
            column.expr.number_aggregates(&mut next_slot);
        }
        if let Some(expr) = having.as_mut() {
            expr.number_aggregates(&mut next_slot);
        }
        for item in &mut order_by {
            item.expr.number_aggregates(&mut next_slot);
        }

        let aggregates: Vec<AggregateCall> = projection
            .iter()
            .map(|c| &c.expr)
            .chain(having.iter())
            .chain(order_by.iter().map(|o| &o.expr))
            .flat_map(|e| e.aggregate_functions().into_iter().cloned().collect::<Vec<_>>())
            .collect();

        if group_by.is_none()
            && !aggregates.is_empty()
            && projection.iter().any(|c| !c.expr.used_columns().is_empty())
        {
            return Err(CsvError::MixedAggregation);
        }

        let aliases: AHashSet<String> = projection.iter().map(|c| c.alias.to_uppercase()).collect();

        if scope.check_columns {
            check_columns(scope, &aliases, &projection, &where_clause, &group_by, &having, &order_by)?;
        }

        if let Some(exprs) = &group_by {
            check_group_by(scope, &aliases, exprs, &projection, &having, &order_by)?;
        }

        // GROUP BY without aggregates only removes duplicate keys
        let mut distinct_keys = None;
        if aggregates.is_empty() {
            distinct_keys = group_by.take();
        }

        let mut referenced = Vec::new();
        for expr in where_clause
            .iter()
            .chain(group_by.iter().flatten())
            .chain(distinct_keys.iter().flatten())
            .chain(having.iter())
            .chain(order_by.iter().map(|o| &o.expr))
        {
            referenced.extend(expr.used_columns());
        }
        let alias_refs = projection
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                let alias = c.alias.to_uppercase();
                let is_plain_column =
                    matches!(&c.expr, Expr::Column(name) if name.to_uppercase() == alias);
                !is_plain_column && referenced.contains(&alias)
            })
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let where_columns = where_clause
            .as_ref()
            .map(|e| e.used_columns())
            .unwrap_or_default();
        let where_alias_refs = alias_refs
            .iter()
            .copied()
            .filter(|&i| where_columns.contains(&projection[i].alias.to_uppercase()))
            .collect();

        let execution = if group_by.is_some() {
            ExecutionPlan::Materialize(MaterializeReason::Grouped)
        } else if !aggregates.is_empty() {
            ExecutionPlan::Materialize(MaterializeReason::Aggregated)
        } else if !order_by.is_empty() {
            ExecutionPlan::Materialize(MaterializeReason::Ordered)
        } else if scrollable {
            ExecutionPlan::Materialize(MaterializeReason::Scrollable)
        } else {
            ExecutionPlan::Stream
        };

        Ok(Self {
            projection,
            distinct: stmt.distinct,
            where_clause,
            group_by,
            distinct_keys,
            having,
            order_by,
            aggregates,
            limit: stmt.limit,
            offset: stmt.offset.unwrap_or(0),
            alias_refs,
            where_alias_refs,
            execution,
        })
    }
}

/// Replace `*` and `alias.*` by one projection per table column.
fn expand_projection(columns: Vec<SelectColumn>, scope: &TableScope<'_>) -> Result<Vec<SelectColumn>> {
    let mut out = Vec::with_capacity(columns.len());
    for column in columns {
        if let Expr::Asterisk(qualifier) = &column.expr {
            if !scope.has_table {
                return Err(CsvError::UnknownColumn(column.expr.to_string()));
            }
            if let Some(q) = qualifier {
                let matches_alias = scope.alias.map_or(false, |a| a.eq_ignore_ascii_case(q));
                if !matches_alias {
                    return Err(CsvError::UnknownColumn(column.expr.to_string()));
                }
            }
            for name in scope.columns {
                let expr = match qualifier {
                    Some(q) => Expr::Column(format!("{}.{}", q, name)),
                    None => Expr::Column(name.clone()),
                };
                out.push(SelectColumn {
                    alias: name.clone(),
                    expr,
                });
            }
            continue;
        }
        out.push(column);
    }
    Ok(out)
}

/// Integer literal used as a 1-based projection reference.
fn ordinal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(v @ (Value::Int(_) | Value::Long(_))) => v.as_i64(),
        _ => None,
    }
}

fn resolve_ordinal(expr: Expr, projection: &[SelectColumn], clause: &'static str) -> Result<Expr> {
    match ordinal(&expr) {
        Some(n) if n >= 1 && (n as usize) <= projection.len() => {
            Ok(projection[n as usize - 1].expr.clone())
        }
        Some(n) => Err(CsvError::InvalidOrdinal {
            clause,
            value: n.to_string(),
        }),
        None => Ok(expr),
    }
}

/// Every referenced column must exist. Clauses other than the projection
/// may also name projection aliases.
fn check_columns(
    scope: &TableScope<'_>,
    aliases: &AHashSet<String>,
    projection: &[SelectColumn],
    where_clause: &Option<Expr>,
    group_by: &Option<Vec<Expr>>,
    having: &Option<Expr>,
    order_by: &[OrderByExpr],
) -> Result<()> {
    let mut known: AHashSet<String> = AHashSet::new();
    for name in scope.columns {
        let upper = name.to_uppercase();
        if let Some(alias) = scope.alias {
            known.insert(format!("{}.{}", alias.to_uppercase(), upper));
        }
        known.insert(upper);
    }

    let referenced = |expr: &Expr| {
        let mut names = expr.used_columns();
        names.extend(expr.aggregate_columns());
        names
    };

    for column in projection {
        if let Some(name) = referenced(&column.expr).into_iter().find(|n| !known.contains(n)) {
            return Err(CsvError::UnknownColumn(name));
        }
    }

    let others = where_clause
        .iter()
        .chain(group_by.iter().flatten())
        .chain(having.iter())
        .chain(order_by.iter().map(|o| &o.expr));
    for expr in others {
        if let Some(name) = referenced(expr)
            .into_iter()
            .find(|n| !known.contains(n) && !aliases.contains(n))
        {
            return Err(CsvError::UnknownColumn(name));
        }
    }
    Ok(())
}

/// GROUP BY rules: each key names a column, every column outside aggregates
/// is grouped, and HAVING only names grouped columns or projections.
fn check_group_by(
    scope: &TableScope<'_>,
    aliases: &AHashSet<String>,
    group_by: &[Expr],
    projection: &[SelectColumn],
    having: &Option<Expr>,
    order_by: &[OrderByExpr],
) -> Result<()> {
    let mut group_columns: Vec<String> = Vec::new();
    for expr in group_by {
        let used = expr.used_columns();
        if used.is_empty() {
            return Err(CsvError::InvalidGroupOrOrder {
                clause: "GROUP BY",
                expr: expr.to_string(),
            });
        }
        for name in used {
            // grouping by an alias groups by the columns behind it
            if let Some(column) = projection.iter().find(|c| c.alias.to_uppercase() == name) {
                group_columns.extend(column.expr.used_columns());
            }
            group_columns.push(name);
        }
    }

    let grouped = |name: &str| is_grouped(name, &group_columns, scope.alias);

    for column in projection {
        if let Some(name) = column.expr.used_columns().into_iter().find(|n| !grouped(n)) {
            return Err(CsvError::ColumnNotGrouped(name));
        }
    }
    for item in order_by {
        if let Some(name) = item
            .expr
            .used_columns()
            .into_iter()
            .find(|n| !grouped(n) && !aliases.contains(n))
        {
            return Err(CsvError::ColumnNotGrouped(name));
        }
    }
    if let Some(expr) = having {
        if let Some(name) = expr
            .used_columns()
            .into_iter()
            .find(|n| !grouped(n) && !aliases.contains(n))
        {
            return Err(CsvError::InvalidHavingColumn(name));
        }
    }
    Ok(())
}

/// `T.A` and `A` count as the same column when `T` is the table alias.
fn is_grouped(name: &str, group_columns: &[String], alias: Option<&str>) -> bool {
    if group_columns.iter().any(|g| g == name) {
        return true;
    }
    let prefix = match alias {
        Some(alias) => format!("{}.", alias.to_uppercase()),
        None => return false,
    };
    match name.strip_prefix(prefix.as_str()) {
        Some(bare) => group_columns.iter().any(|g| g == bare),
        None => {
            let qualified = format!("{}{}", prefix, name);
            group_columns.iter().any(|g| *g == qualified)
        }
    }
}
