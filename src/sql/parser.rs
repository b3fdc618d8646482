/// SQL Parser - converts tokens into a SELECT statement AST
use super::ast::*;
use super::token::{Token, TokenType};
use crate::error::{CsvError, Result};
use crate::types::Value;

/// Binding power of unary minus/plus, tighter than any binary operator
const UNARY_PRECEDENCE: u8 = 6;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, position: 0 }
    }

    /// Parse exactly one SELECT statement, with an optional trailing `;`.
    pub fn parse(&mut self) -> Result<SelectStmt> {
        if !matches!(self.current().token_type, TokenType::Select) {
            return Err(self.error("Expected SELECT"));
        }
        let stmt = self.parse_select()?;

        // Optionally consume semicolon
        self.match_token(TokenType::Semicolon);

        if !matches!(self.current().token_type, TokenType::Eof) {
            return Err(self.error("Unexpected token after end of statement"));
        }
        Ok(stmt)
    }

    /// Parse SELECT statement
    fn parse_select(&mut self) -> Result<SelectStmt> {
        self.expect(TokenType::Select)?;

        // Parse DISTINCT (optional)
        let distinct = self.match_token(TokenType::Distinct);

        // Parse columns
        let columns = self.parse_select_columns()?;

        // FROM clause (optional: constant queries run against one empty row)
        let from = if self.match_token(TokenType::From) {
            Some(self.parse_single_table()?)
        } else {
            None
        };

        // WHERE clause (optional)
        let where_clause = if self.match_token(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        // GROUP BY clause (optional)
        let group_by = if self.match_token(TokenType::Group) {
            self.expect(TokenType::By)?;
            Some(self.parse_expr_list()?)
        } else {
            None
        };

        // HAVING clause (optional)
        let having = if self.match_token(TokenType::Having) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        // ORDER BY clause (optional)
        let order_by = if self.match_token(TokenType::Order) {
            self.expect(TokenType::By)?;
            Some(self.parse_order_by()?)
        } else {
            None
        };

        // LIMIT / OFFSET (optional, either order)
        let mut limit = None;
        let mut offset = None;
        loop {
            if limit.is_none() && self.match_token(TokenType::Limit) {
                limit = Some(self.parse_usize()?);
            } else if offset.is_none() && self.match_token(TokenType::Offset) {
                offset = Some(self.parse_usize()?);
            } else {
                break;
            }
        }

        Ok(SelectStmt {
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_select_columns(&mut self) -> Result<Vec<SelectColumn>> {
        let mut columns = Vec::new();

        loop {
            let expr = if self.match_token(TokenType::Star) {
                Expr::Asterisk(None)
            } else {
                self.parse_expr(0)?
            };

            // AS alias, or a bare identifier directly after the expression
            let alias = if self.match_token(TokenType::As) {
                Some(self.parse_identifier()?)
            } else if matches!(self.current().token_type, TokenType::Identifier(_)) {
                Some(self.parse_identifier()?)
            } else {
                None
            };

            columns.push(match alias {
                Some(alias) => SelectColumn { alias, expr },
                None => SelectColumn::unaliased(expr),
            });

            if !self.match_token(TokenType::Comma) {
                break;
            }
        }

        Ok(columns)
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderByExpr>> {
        let mut order_by = Vec::new();

        loop {
            let expr = self.parse_expr(0)?;
            let asc = if self.match_token(TokenType::Desc) {
                false
            } else {
                self.match_token(TokenType::Asc); // Optional
                true
            };

            order_by.push(OrderByExpr { expr, asc });

            if !self.match_token(TokenType::Comma) {
                break;
            }
        }

        Ok(order_by)
    }

    /// Parse a table reference: table_name [[AS] alias]
    fn parse_single_table(&mut self) -> Result<TableRef> {
        let name = self.parse_identifier()?;

        let alias = if self.match_token(TokenType::As) {
            Some(self.parse_identifier()?)
        } else if matches!(self.current().token_type, TokenType::Identifier(_)) {
            // Allow implicit alias (without AS keyword)
            Some(self.parse_identifier()?)
        } else {
            None
        };

        Ok(TableRef { name, alias })
    }

    /// Pratt loop: binary operators plus the comparison-level postfix forms
    /// `IS [NOT] NULL`, `[NOT] LIKE` and `[NOT] BETWEEN`.
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_prefix_expr()?;

        loop {
            if COMPARISON_PRECEDENCE >= min_precedence {
                if let Some(expr) = self.parse_postfix_expr(&mut left)? {
                    left = expr;
                    continue;
                }
            }

            let op = match self.try_parse_binary_op() {
                Some(op) => op,
                None => break,
            };
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }

            self.advance();
            let right = self.parse_expr(precedence + 1)?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_prefix_expr(&mut self) -> Result<Expr> {
        match self.current().token_type.clone() {
            TokenType::Not => {
                self.advance();
                let expr = self.parse_expr(COMPARISON_PRECEDENCE)?;
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(expr),
                })
            }
            TokenType::Minus => {
                self.advance();
                let expr = self.parse_expr(UNARY_PRECEDENCE)?;
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Minus,
                    expr: Box::new(expr),
                })
            }
            TokenType::Plus => {
                self.advance();
                let expr = self.parse_expr(UNARY_PRECEDENCE)?;
                Ok(Expr::UnaryOp {
                    op: UnaryOperator::Plus,
                    expr: Box::new(expr),
                })
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expr(0)?;
                self.expect(TokenType::RParen)?;
                Ok(expr)
            }
            TokenType::Number(text) => {
                let value = self.number_literal(&text)?;
                self.advance();
                Ok(Expr::Literal(value))
            }
            TokenType::String(s) => {
                self.advance();
                Ok(Expr::Literal(Value::Text(s)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(true)))
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::Literal(Value::Bool(false)))
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::Literal(Value::Null))
            }
            TokenType::CurrentDate => {
                self.advance();
                Ok(Expr::CurrentDate)
            }
            TokenType::Identifier(name) => {
                self.advance();
                if matches!(self.current().token_type, TokenType::LParen) {
                    return self.parse_function_call(name);
                }
                if self.match_token(TokenType::Dot) {
                    if self.match_token(TokenType::Star) {
                        return Ok(Expr::Asterisk(Some(name)));
                    }
                    let column = self.parse_identifier()?;
                    return Ok(Expr::Column(format!("{}.{}", name, column)));
                }
                Ok(Expr::Column(name))
            }
            _ => Err(self.error("Expected expression")),
        }
    }

    /// Postfix comparison forms on an already-parsed left operand. Returns
    /// `None` when the current token does not start one.
    fn parse_postfix_expr(&mut self, left: &mut Expr) -> Result<Option<Expr>> {
        if self.match_token(TokenType::Is) {
            let negated = self.match_token(TokenType::Not);
            self.expect(TokenType::Null)?;
            return Ok(Some(Expr::IsNull {
                expr: Box::new(take_expr(left)),
                negated,
            }));
        }

        let negated = matches!(self.current().token_type, TokenType::Not)
            && matches!(self.peek_type(), Some(TokenType::Like | TokenType::Between));
        if negated {
            self.advance();
        } else if !matches!(self.current().token_type, TokenType::Like | TokenType::Between) {
            return Ok(None);
        }

        if self.match_token(TokenType::Like) {
            let pattern = self.parse_expr(COMPARISON_PRECEDENCE + 1)?;
            return Ok(Some(Expr::Like {
                expr: Box::new(take_expr(left)),
                pattern: Box::new(pattern),
                negated,
            }));
        }

        self.expect(TokenType::Between)?;
        let low = self.parse_expr(COMPARISON_PRECEDENCE + 1)?;
        self.expect(TokenType::And)?;
        let high = self.parse_expr(COMPARISON_PRECEDENCE + 1)?;
        Ok(Some(Expr::Between {
            expr: Box::new(take_expr(left)),
            low: Box::new(low),
            high: Box::new(high),
            negated,
        }))
    }

    /// Parse `name(...)`; the current token is the opening parenthesis.
    fn parse_function_call(&mut self, name: String) -> Result<Expr> {
        self.expect(TokenType::LParen)?;

        if let Some(func) = AggregateFunction::from_name(&name) {
            if self.match_token(TokenType::Star) {
                if func != AggregateFunction::Count {
                    return Err(self.error(&format!("{}(*) is not supported", func.name())));
                }
                self.expect(TokenType::RParen)?;
                return Ok(Expr::Aggregate(AggregateCall {
                    func,
                    arg: None,
                    distinct: false,
                    slot: 0,
                }));
            }
            let distinct = self.match_token(TokenType::Distinct);
            let arg = self.parse_expr(0)?;
            self.expect(TokenType::RParen)?;
            return Ok(Expr::Aggregate(AggregateCall {
                func,
                arg: Some(Box::new(arg)),
                distinct,
                slot: 0,
            }));
        }

        let func = ScalarFunction::from_name(&name)
            .ok_or_else(|| CsvError::UnknownFunction(name.clone()))?;
        let args = if matches!(self.current().token_type, TokenType::RParen) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.expect(TokenType::RParen)?;

        let arity_ok = match func {
            ScalarFunction::Lower | ScalarFunction::Upper => args.len() == 1,
            ScalarFunction::Round => args.len() == 1 || args.len() == 2,
        };
        if !arity_ok {
            return Err(CsvError::InvalidArgument(format!(
                "{} does not take {} arguments",
                func.name(),
                args.len()
            )));
        }
        Ok(Expr::Function { func, args })
    }

    fn try_parse_binary_op(&self) -> Option<BinaryOperator> {
        match &self.current().token_type {
            TokenType::Eq => Some(BinaryOperator::Eq),
            TokenType::Ne => Some(BinaryOperator::Ne),
            TokenType::Lt => Some(BinaryOperator::Lt),
            TokenType::Gt => Some(BinaryOperator::Gt),
            TokenType::Le => Some(BinaryOperator::Le),
            TokenType::Ge => Some(BinaryOperator::Ge),
            TokenType::And => Some(BinaryOperator::And),
            TokenType::Or => Some(BinaryOperator::Or),
            TokenType::Plus => Some(BinaryOperator::Add),
            TokenType::Minus => Some(BinaryOperator::Sub),
            TokenType::Star => Some(BinaryOperator::Mul),
            TokenType::Slash => Some(BinaryOperator::Div),
            TokenType::Percent => Some(BinaryOperator::Mod),
            _ => None,
        }
    }

    /// Integer literals are Int, widening to Long when they do not fit; a
    /// trailing `L` forces Long and a fraction or exponent makes a Double.
    fn number_literal(&self, text: &str) -> Result<Value> {
        let invalid = || self.error(&format!("Invalid number: {}", text));
        if let Some(digits) = text.strip_suffix('L') {
            return digits.parse::<i64>().map(Value::Long).map_err(|_| invalid());
        }
        if text.contains(['.', 'e', 'E']) {
            return text.parse::<f64>().map(Value::Double).map_err(|_| invalid());
        }
        if let Ok(v) = text.parse::<i32>() {
            return Ok(Value::Int(v));
        }
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Value::Long(v));
        }
        text.parse::<f64>().map(Value::Double).map_err(|_| invalid())
    }

    // Helper methods

    fn parse_identifier(&mut self) -> Result<String> {
        if let TokenType::Identifier(name) = &self.current().token_type {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error("Expected identifier"))
        }
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut list = Vec::new();
        loop {
            list.push(self.parse_expr(0)?);
            if !self.match_token(TokenType::Comma) {
                break;
            }
        }
        Ok(list)
    }

    fn parse_usize(&mut self) -> Result<usize> {
        if let TokenType::Number(n) = &self.current().token_type {
            let value = n
                .parse::<usize>()
                .map_err(|_| self.error("Expected non-negative integer"))?;
            self.advance();
            Ok(value)
        } else {
            Err(self.error("Expected number"))
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_type(&self) -> Option<&TokenType> {
        self.tokens.get(self.position + 1).map(|t| &t.token_type)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if std::mem::discriminant(&self.current().token_type) == std::mem::discriminant(&token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token_type: TokenType) -> Result<()> {
        if std::mem::discriminant(&self.current().token_type) == std::mem::discriminant(&token_type) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected {:?}", token_type)))
        }
    }

    fn error(&self, msg: &str) -> CsvError {
        let token = self.current();
        CsvError::ParseError(format!(
            "{} at line {} column {}",
            msg, token.line, token.column
        ))
    }
}

fn take_expr(expr: &mut Expr) -> Expr {
    std::mem::replace(expr, Expr::Literal(Value::Null))
}
