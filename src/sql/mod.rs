/// csvquery SQL engine
///
/// A read-only SELECT engine over row sources.
///
/// Architecture:
/// - Lexer: Tokenizes SQL strings
/// - Parser: Builds the SELECT AST from tokens
/// - Plan: Validates the statement against the table and picks an execution strategy
/// - Evaluator / Aggregate: Expression semantics, three-valued logic, accumulators
/// - Executor: The cursor that streams or materializes the result

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod plan;
pub mod executor;
pub mod evaluator;
pub mod aggregate;
pub mod row_converter;
pub mod metadata;

pub use token::{Token, TokenType};
pub use lexer::Lexer;
pub use ast::{
    AggregateCall, AggregateFunction, BinaryOperator, Expr, OrderByExpr, ScalarFunction,
    SelectColumn, SelectStmt, TableRef, UnaryOperator,
};
pub use parser::Parser;
pub use plan::{ExecutionPlan, MaterializeReason, QueryPlan};
pub use executor::Cursor;
pub use evaluator::ExprEvaluator;
pub use row_converter::{RowConverter, RowEnv};
pub use metadata::{ColumnMetadata, ResultMetadata};

use crate::error::Result;

/// Parse a single SELECT statement
pub fn parse_sql(sql: &str) -> Result<SelectStmt> {
    let mut lexer = Lexer::new(sql);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse()
}
