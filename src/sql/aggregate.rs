/// Aggregate accumulators for COUNT / SUM / AVG / MIN / MAX
use ahash::AHashSet;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;

use super::ast::{AggregateCall, AggregateFunction};
use crate::error::{CsvError, Result};
use crate::types::{NumericRank, Value};

/// Running numeric total. Integer inputs sum as Long until one overflows or
/// a wider input arrives.
#[derive(Debug, Clone, Copy)]
enum Total {
    Empty,
    Long(i64),
    Double(f64),
    Decimal(Decimal),
}

impl Total {
    fn add(self, value: &Value) -> Result<Total> {
        let rank = value.numeric_rank().ok_or_else(|| {
            CsvError::TypeConversion(format!(
                "Cannot sum {} value '{}'",
                value.type_name(),
                value
            ))
        })?;

        let total = match (self, rank) {
            (Total::Empty, NumericRank::Int | NumericRank::Long) => {
                Total::Long(value.as_i64().unwrap_or_default())
            }
            (Total::Empty, NumericRank::Double) => Total::Double(value.as_f64().unwrap_or_default()),
            (Total::Empty, NumericRank::Decimal) => {
                Total::Decimal(value.as_decimal().unwrap_or_default())
            }

            (Total::Long(sum), NumericRank::Int | NumericRank::Long) => {
                let v = value.as_i64().unwrap_or_default();
                match sum.checked_add(v) {
                    Some(s) => Total::Long(s),
                    None => Total::Double(sum as f64 + v as f64),
                }
            }
            (Total::Long(sum), NumericRank::Double) => {
                Total::Double(sum as f64 + value.as_f64().unwrap_or_default())
            }
            (Total::Long(sum), NumericRank::Decimal) => {
                Total::Decimal(Decimal::from(sum) + value.as_decimal().unwrap_or_default())
            }

            (Total::Double(sum), NumericRank::Decimal) => match Decimal::from_f64(sum) {
                Some(d) => Total::Decimal(d + value.as_decimal().unwrap_or_default()),
                None => Total::Double(sum + value.as_f64().unwrap_or_default()),
            },
            (Total::Double(sum), _) => Total::Double(sum + value.as_f64().unwrap_or_default()),

            (Total::Decimal(sum), _) => {
                let v = value.as_decimal().unwrap_or_default();
                match sum.checked_add(v) {
                    Some(s) => Total::Decimal(s),
                    None => return Err(CsvError::TypeConversion("BigDecimal overflow in SUM".into())),
                }
            }
        };
        Ok(total)
    }

    fn value(self) -> Value {
        match self {
            Total::Empty => Value::Null,
            Total::Long(v) => Value::Long(v),
            Total::Double(v) => Value::Double(v),
            Total::Decimal(v) => Value::Decimal(v),
        }
    }
}

/// Accumulator for one aggregate call.
///
/// Nulls are ignored by every function except `COUNT(*)`, which counts rows.
#[derive(Debug, Clone)]
pub struct Accumulator {
    func: AggregateFunction,
    count_rows: bool,
    count: i64,
    total: Total,
    extreme: Option<Value>,
    /// Values already seen, for `DISTINCT` aggregates
    seen: Option<AHashSet<Value>>,
}

impl Accumulator {
    pub fn new(call: &AggregateCall) -> Self {
        Self {
            func: call.func,
            count_rows: call.arg.is_none(),
            count: 0,
            total: Total::Empty,
            extreme: None,
            seen: call.distinct.then(AHashSet::new),
        }
    }

    /// Feed one row. `value` is the evaluated argument, `None` for `COUNT(*)`.
    pub fn update(&mut self, value: Option<Value>) -> Result<()> {
        let value = match value {
            None if self.count_rows => {
                self.count += 1;
                return Ok(());
            }
            None | Some(Value::Null) => return Ok(()),
            Some(v) => v,
        };

        if let Some(seen) = self.seen.as_mut() {
            if !seen.insert(value.clone()) {
                return Ok(());
            }
        }

        match self.func {
            AggregateFunction::Count => self.count += 1,
            AggregateFunction::Sum | AggregateFunction::Avg => {
                let number = numeric_input(value)?;
                self.total = self.total.add(&number)?;
                self.count += 1;
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                let replace = match &self.extreme {
                    None => true,
                    Some(current) => {
                        let ord = value.total_cmp(current);
                        if self.func == AggregateFunction::Min {
                            ord == Ordering::Less
                        } else {
                            ord == Ordering::Greater
                        }
                    }
                };
                if replace {
                    self.extreme = Some(value);
                }
            }
        }
        Ok(())
    }

    /// Final value. SUM, AVG, MIN and MAX of no input are `Null`.
    pub fn finish(&self) -> Value {
        match self.func {
            AggregateFunction::Count => Value::Long(self.count),
            AggregateFunction::Sum => self.total.value(),
            AggregateFunction::Avg => match self.total {
                Total::Empty => Value::Null,
                Total::Long(sum) => Value::Double(sum as f64 / self.count as f64),
                Total::Double(sum) => Value::Double(sum / self.count as f64),
                Total::Decimal(sum) => sum
                    .checked_div(Decimal::from(self.count))
                    .map(Value::Decimal)
                    .unwrap_or(Value::Null),
            },
            AggregateFunction::Min | AggregateFunction::Max => {
                self.extreme.clone().unwrap_or(Value::Null)
            }
        }
    }
}

/// Text arguments of SUM/AVG are read as numbers.
fn numeric_input(value: Value) -> Result<Value> {
    match value {
        Value::Text(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .map(Value::Long)
                .or_else(|_| trimmed.parse::<f64>().map(Value::Double))
                .map_err(|_| CsvError::NumberFormat {
                    value: trimmed.to_string(),
                    type_name: "Double",
                })
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::Expr;

    fn call(func: AggregateFunction, distinct: bool) -> AggregateCall {
        AggregateCall {
            func,
            arg: Some(Box::new(Expr::column("x"))),
            distinct,
            slot: 0,
        }
    }

    fn run(func: AggregateFunction, distinct: bool, values: Vec<Value>) -> Value {
        let mut acc = Accumulator::new(&call(func, distinct));
        for v in values {
            acc.update(Some(v)).unwrap();
        }
        acc.finish()
    }

    #[test]
    fn test_count_star_counts_rows() {
        let mut acc = Accumulator::new(&AggregateCall {
            func: AggregateFunction::Count,
            arg: None,
            distinct: false,
            slot: 0,
        });
        acc.update(None).unwrap();
        acc.update(None).unwrap();
        assert_eq!(acc.finish(), Value::Long(2));
    }

    #[test]
    fn test_count_skips_nulls() {
        let values = vec![Value::Int(1), Value::Null, Value::Int(1)];
        assert_eq!(run(AggregateFunction::Count, false, values.clone()), Value::Long(2));
        assert_eq!(run(AggregateFunction::Count, true, values), Value::Long(1));
    }

    #[test]
    fn test_sum_and_avg() {
        let ints = vec![Value::Int(1), Value::Int(2), Value::Null, Value::Int(4)];
        assert_eq!(run(AggregateFunction::Sum, false, ints.clone()), Value::Long(7));
        assert_eq!(
            run(AggregateFunction::Avg, false, ints),
            Value::Double(7.0 / 3.0)
        );

        let mixed = vec![Value::Int(1), Value::Double(0.5)];
        assert_eq!(run(AggregateFunction::Sum, false, mixed), Value::Double(1.5));

        let text = vec![Value::Text("2".into()), Value::Text("3".into())];
        assert_eq!(run(AggregateFunction::Sum, false, text), Value::Long(5));

        let decimals = vec![
            Value::Decimal(Decimal::new(15, 1)),
            Value::Decimal(Decimal::new(25, 1)),
        ];
        assert_eq!(
            run(AggregateFunction::Avg, false, decimals),
            Value::Decimal(Decimal::new(2, 0))
        );

        assert_eq!(run(AggregateFunction::Sum, false, vec![]), Value::Null);
        assert_eq!(run(AggregateFunction::Avg, false, vec![Value::Null]), Value::Null);
    }

    #[test]
    fn test_sum_overflow_widens() {
        let values = vec![Value::Long(i64::MAX), Value::Long(1)];
        assert!(matches!(run(AggregateFunction::Sum, false, values), Value::Double(_)));
    }

    #[test]
    fn test_sum_rejects_non_numbers() {
        let mut acc = Accumulator::new(&call(AggregateFunction::Sum, false));
        assert!(acc.update(Some(Value::Text("abc".into()))).is_err());
        assert!(acc.update(Some(Value::Bool(true))).is_err());
    }

    #[test]
    fn test_min_max() {
        let values = vec![Value::Int(3), Value::Null, Value::Long(1), Value::Double(2.5)];
        assert_eq!(run(AggregateFunction::Min, false, values.clone()), Value::Long(1));
        assert_eq!(run(AggregateFunction::Max, false, values), Value::Int(3));

        let names = vec![Value::Text("pear".into()), Value::Text("apple".into())];
        assert_eq!(
            run(AggregateFunction::Min, false, names),
            Value::Text("apple".into())
        );
        assert_eq!(run(AggregateFunction::Max, false, vec![]), Value::Null);
    }
}
