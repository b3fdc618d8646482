/// Abstract Syntax Tree for SELECT statements
use std::fmt;

use crate::types::Value;

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub distinct: bool,                    // SELECT DISTINCT
    pub columns: Vec<SelectColumn>,
    pub from: Option<TableRef>,            // None for constant queries
    pub where_clause: Option<Expr>,
    pub group_by: Option<Vec<Expr>>,       // GROUP BY expr_list
    pub having: Option<Expr>,              // HAVING condition
    pub order_by: Option<Vec<OrderByExpr>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Table reference in FROM clause: table_name [AS alias]
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

/// One projected output column
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub alias: String,
    pub expr: Expr,
}

impl SelectColumn {
    /// Projection without an explicit alias
    pub fn unaliased(expr: Expr) -> Self {
        Self {
            alias: expr.default_alias(),
            expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub asc: bool,  // true = ASC, false = DESC
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, possibly qualified as `alias.column`
    Column(String),

    Literal(Value),

    /// `*` or `alias.*`; expanded before evaluation
    Asterisk(Option<String>),

    CurrentDate,

    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },

    /// expr [NOT] BETWEEN low AND high
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },

    /// expr [NOT] LIKE pattern
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },

    /// expr IS [NOT] NULL
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },

    Function {
        func: ScalarFunction,
        args: Vec<Expr>,
    },

    Aggregate(AggregateCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    Lower,
    Upper,
    Round,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Aggregate function node. `arg == None` is `COUNT(*)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub func: AggregateFunction,
    pub arg: Option<Box<Expr>>,
    pub distinct: bool,
    /// Index into the cursor's global accumulators, assigned at planning time
    pub slot: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical
    And,
    Or,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

/// Binding power of comparison-level postfix forms (LIKE, BETWEEN, IS NULL)
pub const COMPARISON_PRECEDENCE: u8 = 3;

impl BinaryOperator {
    /// Get operator precedence (higher = binds tighter)
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq | BinaryOperator::Ne |
            BinaryOperator::Lt | BinaryOperator::Gt |
            BinaryOperator::Le | BinaryOperator::Ge => COMPARISON_PRECEDENCE,
            BinaryOperator::Add | BinaryOperator::Sub => 4,
            BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => 5,
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == COMPARISON_PRECEDENCE
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Le => "<=",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
        }
    }
}

impl ScalarFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "LOWER" => Some(ScalarFunction::Lower),
            "UPPER" => Some(ScalarFunction::Upper),
            "ROUND" => Some(ScalarFunction::Round),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunction::Lower => "LOWER",
            ScalarFunction::Upper => "UPPER",
            ScalarFunction::Round => "ROUND",
        }
    }
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunction::Count),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            "MIN" => Some(AggregateFunction::Min),
            "MAX" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Output name used when a projection has no `AS` alias.
    pub fn default_alias(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Function { func, .. } => func.name().to_string(),
            Expr::Aggregate(call) => call.func.name().to_string(),
            other => other.to_string(),
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Asterisk(_) | Expr::CurrentDate => Vec::new(),
            Expr::BinaryOp { left, right, .. } => vec![&**left, &**right],
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => vec![&**expr],
            Expr::Between { expr, low, high, .. } => vec![&**expr, &**low, &**high],
            Expr::Like { expr, pattern, .. } => vec![&**expr, &**pattern],
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Aggregate(call) => call.arg.iter().map(|a| a.as_ref()).collect(),
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Asterisk(_) | Expr::CurrentDate => Vec::new(),
            Expr::BinaryOp { left, right, .. } => vec![&mut **left, &mut **right],
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } => vec![&mut **expr],
            Expr::Between { expr, low, high, .. } => vec![&mut **expr, &mut **low, &mut **high],
            Expr::Like { expr, pattern, .. } => vec![&mut **expr, &mut **pattern],
            Expr::Function { args, .. } => args.iter_mut().collect(),
            Expr::Aggregate(call) => call.arg.iter_mut().map(|a| a.as_mut()).collect(),
        }
    }

    /// Uppercased names of the columns referenced outside aggregate functions.
    pub fn used_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_columns(false, &mut out);
        out
    }

    /// Uppercased names of the columns referenced inside aggregate functions.
    pub fn aggregate_columns(&self) -> Vec<String> {
        let mut out = Vec::new();
        for call in self.aggregate_functions() {
            if let Some(arg) = &call.arg {
                arg.collect_columns(true, &mut out);
            }
        }
        out
    }

    fn collect_columns(&self, include_aggregates: bool, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                let upper = name.to_uppercase();
                if !out.contains(&upper) {
                    out.push(upper);
                }
            }
            Expr::Aggregate(_) if !include_aggregates => {}
            other => {
                for child in other.children() {
                    child.collect_columns(include_aggregates, out);
                }
            }
        }
    }

    /// Aggregate function nodes contained in this expression.
    pub fn aggregate_functions(&self) -> Vec<&AggregateCall> {
        let mut out = Vec::new();
        self.collect_aggregates(&mut out);
        out
    }

    fn collect_aggregates<'a>(&'a self, out: &mut Vec<&'a AggregateCall>) {
        match self {
            Expr::Aggregate(call) => out.push(call),
            other => {
                for child in other.children() {
                    child.collect_aggregates(out);
                }
            }
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        !self.aggregate_functions().is_empty()
    }

    /// Give every aggregate node a distinct accumulator slot, counting from `next`.
    pub fn number_aggregates(&mut self, next: &mut usize) {
        if let Expr::Aggregate(call) = self {
            call.slot = *next;
            *next += 1;
            return;
        }
        for child in self.children_mut() {
            child.number_aggregates(next);
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(Value::Text(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Expr::Literal(Value::Long(v)) => write!(f, "{}L", v),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Asterisk(None) => write!(f, "*"),
            Expr::Asterisk(Some(alias)) => write!(f, "{}.*", alias),
            Expr::CurrentDate => write!(f, "CURRENT_DATE"),
            Expr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::UnaryOp { op: UnaryOperator::Not, expr } => write!(f, "NOT {}", expr),
            Expr::UnaryOp { op: UnaryOperator::Minus, expr } => write!(f, "-{}", expr),
            Expr::UnaryOp { op: UnaryOperator::Plus, expr } => write!(f, "+{}", expr),
            Expr::Between { expr, low, high, negated } => write!(
                f,
                "{} {}BETWEEN {} AND {}",
                expr,
                if *negated { "NOT " } else { "" },
                low,
                high
            ),
            Expr::Like { expr, pattern, negated } => write!(
                f,
                "{} {}LIKE {}",
                expr,
                if *negated { "NOT " } else { "" },
                pattern
            ),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::Function { func, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func.name(), args.join(", "))
            }
            Expr::Aggregate(call) => {
                let distinct = if call.distinct { "DISTINCT " } else { "" };
                match &call.arg {
                    Some(arg) => write!(f, "{}({}{})", call.func.name(), distinct, arg),
                    None => write!(f, "{}(*)", call.func.name()),
                }
            }
        }
    }
}
