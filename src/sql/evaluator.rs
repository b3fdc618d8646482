/// Expression evaluator - evaluates expressions against row environments
use chrono::Duration;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::aggregate::Accumulator;
use super::ast::{AggregateCall, BinaryOperator, Expr, ScalarFunction, UnaryOperator};
use super::row_converter::RowEnv;
use crate::error::{CsvError, Result};
use crate::types::{days_between, Converter, NumericRank, Value};

/// Compiled LIKE patterns kept per evaluator
const PATTERN_CACHE_SIZE: usize = 256;

/// ⚡ Compiled LIKE pattern for fast matching
#[derive(Debug)]
enum CompiledPattern {
    /// Exact match: "abc" (no wildcards)
    Exact(String),
    /// Prefix match: "abc%"
    Prefix(String),
    /// Suffix match: "%abc"
    Suffix(String),
    /// Contains match: "%abc%"
    Contains(String),
    /// Anything else, as an anchored regular expression
    Regex(Regex),
}

impl CompiledPattern {
    /// `%` matches any run of characters, `_` exactly one; everything else
    /// is literal.
    fn compile(pattern: &str) -> Result<Self> {
        let has_any_char = pattern.contains('_');

        // Fast path: no wildcards
        if !pattern.contains('%') && !has_any_char {
            return Ok(CompiledPattern::Exact(pattern.to_string()));
        }

        if !has_any_char {
            let inner = pattern.trim_matches('%');
            if !inner.contains('%') {
                let leading = pattern.starts_with('%');
                let trailing = pattern.ends_with('%');
                match (leading, trailing) {
                    (false, true) => return Ok(CompiledPattern::Prefix(inner.to_string())),
                    (true, false) => return Ok(CompiledPattern::Suffix(inner.to_string())),
                    (true, true) => return Ok(CompiledPattern::Contains(inner.to_string())),
                    (false, false) => {}
                }
            }
        }

        let mut regex = String::from("(?s)^");
        for c in pattern.chars() {
            match c {
                '%' => regex.push_str(".*"),
                '_' => regex.push('.'),
                c => regex.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
            }
        }
        regex.push('$');
        Regex::new(&regex)
            .map(CompiledPattern::Regex)
            .map_err(|e| CsvError::InvalidArgument(format!("Invalid LIKE pattern '{}': {}", pattern, e)))
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            CompiledPattern::Exact(pattern) => text == pattern,
            CompiledPattern::Prefix(prefix) => text.starts_with(prefix.as_str()),
            CompiledPattern::Suffix(suffix) => text.ends_with(suffix.as_str()),
            CompiledPattern::Contains(substring) => text.contains(substring.as_str()),
            CompiledPattern::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Tree-walking interpreter with SQL three-valued logic.
///
/// Comparisons and arithmetic with a null operand yield null; `AND`/`OR`
/// follow the SQL truth tables, so `NULL AND FALSE` is false.
pub struct ExprEvaluator {
    converter: Arc<Converter>,
    /// ⚡ Pattern cache: pattern string -> compiled pattern
    pattern_cache: Mutex<LruCache<String, Arc<CompiledPattern>>>,
}

impl ExprEvaluator {
    pub fn new(converter: Arc<Converter>) -> Self {
        let capacity = NonZeroUsize::new(PATTERN_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            converter,
            pattern_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn converter(&self) -> &Arc<Converter> {
        &self.converter
    }

    /// Evaluate an expression against a row. Unknown columns read as null.
    pub fn eval(&self, expr: &Expr, env: &RowEnv) -> Result<Value> {
        match expr {
            Expr::Column(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),

            Expr::Literal(val) => Ok(val.clone()),

            Expr::Asterisk(_) => Err(CsvError::InvalidArgument(
                "'*' can only be used as a projection".to_string(),
            )),

            Expr::CurrentDate => Ok(Value::Date(self.converter.current_date())),

            Expr::BinaryOp { left, op: BinaryOperator::And, right } => {
                let l = self.truth(left, env)?;
                if l == Some(false) {
                    return Ok(Value::Bool(false));
                }
                let r = self.truth(right, env)?;
                Ok(truth_value(match (l, r) {
                    (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }))
            }

            Expr::BinaryOp { left, op: BinaryOperator::Or, right } => {
                let l = self.truth(left, env)?;
                if l == Some(true) {
                    return Ok(Value::Bool(true));
                }
                let r = self.truth(right, env)?;
                Ok(truth_value(match (l, r) {
                    (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }))
            }

            Expr::BinaryOp { left, op, right } => {
                let left_val = self.eval(left, env)?;
                let right_val = self.eval(right, env)?;
                self.eval_binary_op(*op, left_val, right_val)
            }

            Expr::UnaryOp { op: UnaryOperator::Not, expr } => {
                Ok(truth_value(self.truth(expr, env)?.map(|b| !b)))
            }

            Expr::UnaryOp { op, expr } => {
                let val = self.eval(expr, env)?;
                self.eval_sign(*op, val)
            }

            Expr::Between { expr, low, high, negated } => {
                let val = self.eval(expr, env)?;
                let low_val = self.eval(low, env)?;
                let high_val = self.eval(high, env)?;

                let above = self.compare(&val, &low_val).map(|o| o != Ordering::Less);
                let below = self.compare(&val, &high_val).map(|o| o != Ordering::Greater);
                let in_range = match (above, below) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                Ok(truth_value(in_range.map(|b| b != *negated)))
            }

            Expr::Like { expr, pattern, negated } => {
                let val = self.eval(expr, env)?;
                let pattern_val = self.eval(pattern, env)?;
                if val.is_null() || pattern_val.is_null() {
                    return Ok(Value::Null);
                }

                let matches = self.like_match_cached(&val.to_string(), &pattern_val.to_string())?;
                Ok(Value::Bool(matches != *negated))
            }

            Expr::IsNull { expr, negated } => {
                let val = self.eval(expr, env)?;
                Ok(Value::Bool(val.is_null() != *negated))
            }

            Expr::Function { func, args } => self.eval_function(*func, args, env),

            Expr::Aggregate(call) => self.eval_aggregate(call, env),
        }
    }

    /// WHERE/HAVING semantics: only a true result passes; false and null do not.
    pub fn is_true(&self, expr: &Expr, env: &RowEnv) -> Result<bool> {
        Ok(self.truth(expr, env)? == Some(true))
    }

    /// Feed one row into the accumulator of an aggregate call.
    pub fn accumulate(&self, call: &AggregateCall, acc: &mut Accumulator, env: &RowEnv) -> Result<()> {
        let value = match &call.arg {
            Some(arg) => Some(self.eval(arg, env)?),
            None => None,
        };
        acc.update(value)
    }

    /// Aggregates finalize over the member rows of a group, or read the
    /// totals of an aggregate-only query. Anywhere else they are null.
    fn eval_aggregate(&self, call: &AggregateCall, env: &RowEnv) -> Result<Value> {
        if let Some(members) = env.group() {
            let mut acc = Accumulator::new(call);
            for member in members {
                self.accumulate(call, &mut acc, member)?;
            }
            return Ok(acc.finish());
        }
        if let Some(totals) = env.totals() {
            return Ok(totals.get(call.slot).cloned().unwrap_or(Value::Null));
        }
        Ok(Value::Null)
    }

    fn truth(&self, expr: &Expr, env: &RowEnv) -> Result<Option<bool>> {
        let value = self.eval(expr, env)?;
        self.converter.to_bool(&value)
    }

    /// SQL comparison of two values; `None` when either side is null.
    ///
    /// Text compared with a typed value is first read as that type; values
    /// that still do not compare fall back to their text forms.
    pub fn compare(&self, left: &Value, right: &Value) -> Option<Ordering> {
        if left.is_null() || right.is_null() {
            return None;
        }
        if let Some(ord) = left.sql_cmp(right) {
            return Some(ord);
        }
        let coerced = match (left, right) {
            (Value::Text(text), other) => self
                .converter
                .coerce_text(text, other)
                .and_then(|v| v.sql_cmp(other)),
            (other, Value::Text(text)) => self
                .converter
                .coerce_text(text, other)
                .and_then(|v| other.sql_cmp(&v)),
            _ => None,
        };
        Some(coerced.unwrap_or_else(|| left.to_string().cmp(&right.to_string())))
    }

    fn eval_binary_op(&self, op: BinaryOperator, left: Value, right: Value) -> Result<Value> {
        if op.is_comparison() {
            let ord = match self.compare(&left, &right) {
                Some(ord) => ord,
                None => return Ok(Value::Null),
            };
            let result = match op {
                BinaryOperator::Eq => ord == Ordering::Equal,
                BinaryOperator::Ne => ord != Ordering::Equal,
                BinaryOperator::Lt => ord == Ordering::Less,
                BinaryOperator::Gt => ord == Ordering::Greater,
                BinaryOperator::Le => ord != Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }

        if left.is_null() || right.is_null() {
            return Ok(Value::Null);
        }

        match (op, &left, &right) {
            (BinaryOperator::Add, Value::Date(d), n) | (BinaryOperator::Add, n, Value::Date(d))
                if n.as_i64().is_some() =>
            {
                return add_days(*d, n.as_i64().unwrap_or_default());
            }
            (BinaryOperator::Sub, Value::Date(d), n) if n.as_i64().is_some() => {
                return add_days(*d, -n.as_i64().unwrap_or_default());
            }
            (BinaryOperator::Sub, Value::Date(a), Value::Date(b)) => {
                return Ok(Value::Long(days_between(*a, *b)));
            }
            (BinaryOperator::Add, Value::Text(_), _) | (BinaryOperator::Add, _, Value::Text(_)) => {
                return Ok(Value::Text(format!("{}{}", left, right)));
            }
            _ => {}
        }

        let left = self.numeric_operand(left)?;
        let right = self.numeric_operand(right)?;
        let (Some(left_rank), Some(right_rank)) = (left.numeric_rank(), right.numeric_rank()) else {
            return Err(CsvError::TypeConversion(format!(
                "Arithmetic on '{}' and '{}'",
                left, right
            )));
        };
        let rank = left_rank.max(right_rank);

        match rank {
            NumericRank::Int | NumericRank::Long => {
                let (a, b) = (left.as_i64().unwrap_or_default(), right.as_i64().unwrap_or_default());
                match integer_op(op, a, b)? {
                    Some(v) if rank == NumericRank::Int => Ok(i32::try_from(v)
                        .map(Value::Int)
                        .unwrap_or(Value::Long(v))),
                    Some(v) => Ok(Value::Long(v)),
                    None => Ok(Value::Double(float_op(op, a as f64, b as f64))),
                }
            }
            NumericRank::Double => Ok(Value::Double(float_op(
                op,
                left.as_f64().unwrap_or_default(),
                right.as_f64().unwrap_or_default(),
            ))),
            NumericRank::Decimal => decimal_op(
                op,
                left.as_decimal().unwrap_or_default(),
                right.as_decimal().unwrap_or_default(),
            ),
        }
    }

    /// Arithmetic operand: numbers pass through, text is parsed.
    fn numeric_operand(&self, value: Value) -> Result<Value> {
        match value {
            v if v.is_numeric() => Ok(v),
            Value::Text(text) => self
                .converter
                .coerce_text(&text, &Value::Long(0))
                .ok_or(CsvError::NumberFormat {
                    value: text,
                    type_name: "Double",
                }),
            other => Err(CsvError::TypeConversion(format!(
                "Arithmetic on {} value '{}'",
                other.type_name(),
                other
            ))),
        }
    }

    fn eval_sign(&self, op: UnaryOperator, val: Value) -> Result<Value> {
        if val.is_null() {
            return Ok(Value::Null);
        }
        let val = self.numeric_operand(val)?;
        if op == UnaryOperator::Plus {
            return Ok(val);
        }
        let negated = match val {
            Value::Byte(v) => Value::Int(-(v as i32)),
            Value::Short(v) => Value::Int(-(v as i32)),
            Value::Int(v) => v.checked_neg().map(Value::Int).unwrap_or(Value::Long(-(v as i64))),
            Value::Long(v) => v.checked_neg().map(Value::Long).unwrap_or(Value::Double(-(v as f64))),
            Value::Float(v) => Value::Float(-v),
            Value::Double(v) => Value::Double(-v),
            Value::Decimal(v) => Value::Decimal(-v),
            other => other,
        };
        Ok(negated)
    }

    fn eval_function(&self, func: ScalarFunction, args: &[Expr], env: &RowEnv) -> Result<Value> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, env)?);
        }
        let first = values.first().cloned().unwrap_or(Value::Null);

        match func {
            ScalarFunction::Lower | ScalarFunction::Upper => {
                if first.is_null() {
                    return Ok(Value::Null);
                }
                let text = first.to_string();
                Ok(Value::Text(if func == ScalarFunction::Lower {
                    text.to_lowercase()
                } else {
                    text.to_uppercase()
                }))
            }
            ScalarFunction::Round => {
                let digits = match values.get(1) {
                    None => 0,
                    Some(v) => match self.converter.to_i64(v, "Int")? {
                        Some(d) => d,
                        None => return Ok(Value::Null),
                    },
                };
                self.round(first, digits)
            }
        }
    }

    /// ROUND half away from zero. Integers are unchanged for non-negative
    /// `digits`; whole-number results of floating point input become Long.
    fn round(&self, value: Value, digits: i64) -> Result<Value> {
        let digits = digits.clamp(-18, 18);
        let value = match value {
            Value::Null => return Ok(Value::Null),
            Value::Text(_) => self.numeric_operand(value)?,
            other => other,
        };

        match value {
            Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) if digits >= 0 => Ok(value),
            Value::Decimal(d) if digits >= 0 => Ok(Value::Decimal(
                d.round_dp_with_strategy(digits as u32, RoundingStrategy::MidpointAwayFromZero),
            )),
            other => {
                let x = other.as_f64().ok_or_else(|| {
                    CsvError::TypeConversion(format!(
                        "ROUND of {} value '{}'",
                        other.type_name(),
                        other
                    ))
                })?;
                let factor = 10f64.powi(digits as i32);
                let rounded = (x.abs() * factor + 0.5).floor() / factor * x.signum();
                if digits <= 0 && rounded.abs() < i64::MAX as f64 {
                    Ok(Value::Long(rounded as i64))
                } else {
                    Ok(Value::Double(rounded))
                }
            }
        }
    }

    /// ⚡ LIKE matching through the compiled-pattern cache
    fn like_match_cached(&self, text: &str, pattern: &str) -> Result<bool> {
        if let Some(compiled) = self.pattern_cache.lock().get(pattern).cloned() {
            return Ok(compiled.matches(text));
        }

        let compiled = Arc::new(CompiledPattern::compile(pattern)?);
        let result = compiled.matches(text);
        self.pattern_cache.lock().put(pattern.to_string(), compiled);
        Ok(result)
    }
}

fn truth_value(truth: Option<bool>) -> Value {
    truth.map(Value::Bool).unwrap_or(Value::Null)
}

fn add_days(date: chrono::NaiveDate, days: i64) -> Result<Value> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .map(Value::Date)
        .ok_or_else(|| CsvError::TypeConversion(format!("Date out of range: {} + {} days", date, days)))
}

/// `Ok(None)` on overflow, so the caller can widen.
fn integer_op(op: BinaryOperator, a: i64, b: i64) -> Result<Option<i64>> {
    Ok(match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Sub => a.checked_sub(b),
        BinaryOperator::Mul => a.checked_mul(b),
        BinaryOperator::Div | BinaryOperator::Mod if b == 0 => return Err(CsvError::DivisionByZero),
        BinaryOperator::Div => a.checked_div(b),
        BinaryOperator::Mod => a.checked_rem(b),
        _ => None,
    })
}

fn float_op(op: BinaryOperator, a: f64, b: f64) -> f64 {
    match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Sub => a - b,
        BinaryOperator::Mul => a * b,
        BinaryOperator::Div => a / b,
        BinaryOperator::Mod => a % b,
        _ => f64::NAN,
    }
}

fn decimal_op(op: BinaryOperator, a: Decimal, b: Decimal) -> Result<Value> {
    if matches!(op, BinaryOperator::Div | BinaryOperator::Mod) && b.is_zero() {
        return Err(CsvError::DivisionByZero);
    }
    let result = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Sub => a.checked_sub(b),
        BinaryOperator::Mul => a.checked_mul(b),
        BinaryOperator::Div => a.checked_div(b),
        BinaryOperator::Mod => a.checked_rem(b),
        _ => None,
    };
    result
        .map(Value::Decimal)
        .ok_or_else(|| CsvError::TypeConversion(format!("BigDecimal overflow: {} {} {}", a, op.symbol(), b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::lexer::Lexer;
    use crate::sql::parser::Parser;
    use chrono::NaiveDate;

    fn evaluator() -> ExprEvaluator {
        ExprEvaluator::new(Arc::new(Converter::default()))
    }

    /// Parse `expr` as the single projection of a SELECT.
    fn expr(text: &str) -> Expr {
        let tokens = Lexer::new(&format!("SELECT {}", text)).tokenize().unwrap();
        let mut stmt = Parser::new(tokens).parse().unwrap();
        stmt.columns.remove(0).expr
    }

    fn env() -> RowEnv {
        let mut env = RowEnv::new();
        env.insert("A", Value::Int(10));
        env.insert("B", Value::Null);
        env.insert("S", Value::Text("abc".into()));
        env.insert("D", Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        env.insert("P", Value::Double(2.5));
        env
    }

    fn eval(text: &str) -> Value {
        evaluator().eval(&expr(text), &env()).unwrap()
    }

    #[test]
    fn test_column_lookup() {
        assert_eq!(eval("a"), Value::Int(10));
        assert_eq!(eval("missing"), Value::Null);
    }

    #[test]
    fn test_arithmetic_promotion() {
        assert_eq!(eval("a + 1"), Value::Int(11));
        assert_eq!(eval("a * 2L"), Value::Long(20));
        assert_eq!(eval("a / 4"), Value::Int(2));
        assert_eq!(eval("a % 3"), Value::Int(1));
        assert_eq!(eval("a + p"), Value::Double(12.5));
        assert_eq!(eval("2147483647 + 1"), Value::Long(2_147_483_648));
        assert_eq!(eval("-a"), Value::Int(-10));
        assert_eq!(eval("a + b"), Value::Null);
        assert_eq!(eval("'5' * 2"), Value::Long(10));
    }

    #[test]
    fn test_division_by_zero() {
        let result = evaluator().eval(&expr("a / 0"), &env());
        assert!(matches!(result, Err(CsvError::DivisionByZero)));
        assert_eq!(eval("p / 0"), Value::Double(f64::INFINITY));
    }

    #[test]
    fn test_text_and_date_arithmetic() {
        assert_eq!(eval("s + 1"), Value::Text("abc1".into()));
        assert_eq!(
            eval("d + 30"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
        );
        assert_eq!(
            eval("d - 1"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(eval("d - d"), Value::Long(0));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("a = 10"), Value::Bool(true));
        assert_eq!(eval("a <> 10"), Value::Bool(false));
        assert_eq!(eval("a >= 10.0"), Value::Bool(true));
        assert_eq!(eval("a = '10'"), Value::Bool(true));
        assert_eq!(eval("d > '2024-01-15'"), Value::Bool(true));
        assert_eq!(eval("b = 1"), Value::Null);
        assert_eq!(eval("s < 'abd'"), Value::Bool(true));
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(eval("b = 1 AND a = 1"), Value::Bool(false));
        assert_eq!(eval("b = 1 AND a = 10"), Value::Null);
        assert_eq!(eval("b = 1 OR a = 10"), Value::Bool(true));
        assert_eq!(eval("b = 1 OR a = 1"), Value::Null);
        assert_eq!(eval("NOT b = 1"), Value::Null);
        assert_eq!(eval("NOT a = 1"), Value::Bool(true));

        let ev = evaluator();
        assert!(!ev.is_true(&expr("b = 1"), &env()).unwrap());
        assert!(!ev.is_true(&expr("NOT b = 1"), &env()).unwrap());
    }

    #[test]
    fn test_is_null_complement() {
        let ev = evaluator();
        for column in ["a", "b", "s"] {
            let is_null = ev.is_true(&expr(&format!("{} IS NULL", column)), &env()).unwrap();
            let not_null = ev
                .is_true(&expr(&format!("NOT ({} IS NULL)", column)), &env())
                .unwrap();
            assert_ne!(is_null, not_null);
        }
        assert_eq!(eval("b IS NULL"), Value::Bool(true));
        assert_eq!(eval("a IS NOT NULL"), Value::Bool(true));
    }

    #[test]
    fn test_between() {
        assert_eq!(eval("a BETWEEN 5 AND 10"), Value::Bool(true));
        assert_eq!(eval("a NOT BETWEEN 5 AND 10"), Value::Bool(false));
        assert_eq!(eval("a BETWEEN 11 AND b"), Value::Bool(false));
        assert_eq!(eval("a BETWEEN 1 AND b"), Value::Null);
    }

    #[test]
    fn test_like() {
        let ev = evaluator();
        let like = expr("s LIKE 'a%c'");
        for (text, expected) in [("abc", true), ("ac", true), ("abx", false)] {
            let mut row = RowEnv::new();
            row.insert("S", Value::Text(text.into()));
            assert_eq!(ev.eval(&like, &row).unwrap(), Value::Bool(expected), "{}", text);
        }
        assert_eq!(eval("s LIKE 'abc'"), Value::Bool(true));
        assert_eq!(eval("s LIKE 'a_c'"), Value::Bool(true));
        assert_eq!(eval("s LIKE '%b%'"), Value::Bool(true));
        assert_eq!(eval("s LIKE 'ab%'"), Value::Bool(true));
        assert_eq!(eval("s LIKE '%bc'"), Value::Bool(true));
        assert_eq!(eval("s NOT LIKE 'x%'"), Value::Bool(true));
        assert_eq!(eval("s LIKE 'a.c'"), Value::Bool(false));
        assert_eq!(eval("a LIKE '1%'"), Value::Bool(true));
        assert_eq!(eval("b LIKE '%'"), Value::Null);
    }

    #[test]
    fn test_like_pattern_cache() {
        let ev = evaluator();
        let like = expr("s LIKE 'a%c'");
        ev.eval(&like, &env()).unwrap();
        ev.eval(&like, &env()).unwrap();
        assert_eq!(ev.pattern_cache.lock().len(), 1);
    }

    #[test]
    fn test_scalar_functions() {
        assert_eq!(eval("UPPER(s)"), Value::Text("ABC".into()));
        assert_eq!(eval("LOWER('MiXeD')"), Value::Text("mixed".into()));
        assert_eq!(eval("LOWER(b)"), Value::Null);
        assert_eq!(eval("ROUND(p)"), Value::Long(3));
        assert_eq!(eval("ROUND(-2.5)"), Value::Long(-3));
        assert_eq!(eval("ROUND(a)"), Value::Int(10));
        assert_eq!(eval("ROUND(3.14159, 2)"), Value::Double(3.14));
        assert_eq!(eval("ROUND('7.6')"), Value::Long(8));
        assert_eq!(eval("ROUND(b)"), Value::Null);
    }

    #[test]
    fn test_aggregate_over_group() {
        let ev = evaluator();
        let members: Vec<RowEnv> = [1, 2, 3]
            .iter()
            .map(|v| {
                let mut row = RowEnv::new();
                row.insert("X", Value::Int(*v));
                row
            })
            .collect();
        let group = members[0].clone().with_group(Arc::new(members));

        assert_eq!(ev.eval(&expr("SUM(x)"), &group).unwrap(), Value::Long(6));
        assert_eq!(ev.eval(&expr("COUNT(*) + 1"), &group).unwrap(), Value::Long(4));
        assert_eq!(ev.eval(&expr("MAX(x) - MIN(x)"), &group).unwrap(), Value::Int(2));
        assert_eq!(ev.eval(&expr("x"), &group).unwrap(), Value::Int(1));
        assert_eq!(ev.eval(&expr("SUM(x)"), &RowEnv::new()).unwrap(), Value::Null);

        let totals = RowEnv::new().with_totals(Arc::new(vec![Value::Long(42)]));
        assert_eq!(ev.eval(&expr("COUNT(*)"), &totals).unwrap(), Value::Long(42));
    }
}
