//! SQL Parser
//!
//! This module parses SQL tokens into an AST. Errors carry the character
//! offset of the offending token; there is no error recovery.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Spanned, Token};
use crate::error::{Error, Result};

/// Parse a script of zero or more `;`-separated statements.
///
/// The whole text is parsed before anything is returned, so a syntax error
/// anywhere rejects the entire script.
pub fn parse_script(sql: &str) -> Result<Vec<ParsedStatement>> {
    Parser::new(sql)?.parse_all()
}

/// SQL Parser
pub struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    /// Number of `?` placeholders seen in the current statement
    positional: usize,
    /// Distinct `:name` placeholders seen in the current statement
    named: Vec<String>,
}

impl Parser {
    /// Create a new parser from a SQL string
    pub fn new(sql: &str) -> Result<Self> {
        let mut lexer = Lexer::new(sql);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
            positional: 0,
            named: Vec::new(),
        })
    }

    /// Parse a single SQL statement
    pub fn parse(&mut self) -> Result<ParsedStatement> {
        self.positional = 0;
        self.named.clear();

        let statement = self.parse_statement()?;

        if !self.check(&Token::Semicolon) && !self.is_at_end() {
            return Err(self.unexpected("';' or end of input"));
        }
        while self.check(&Token::Semicolon) {
            self.advance();
        }

        let parameters = if self.positional > 0 {
            ParameterSpec::Positional(self.positional)
        } else if !self.named.is_empty() {
            ParameterSpec::Named(std::mem::take(&mut self.named))
        } else {
            ParameterSpec::None
        };

        Ok(ParsedStatement {
            statement,
            parameters,
        })
    }

    /// Parse multiple SQL statements
    pub fn parse_all(&mut self) -> Result<Vec<ParsedStatement>> {
        let mut statements = Vec::new();

        while self.check(&Token::Semicolon) {
            self.advance();
        }
        while !self.is_at_end() {
            statements.push(self.parse()?);
        }

        Ok(statements)
    }

    /// Parse a single statement
    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Select => self.parse_select().map(Statement::Select),
            Token::Insert => self.parse_insert().map(Statement::Insert),
            Token::Update => self.parse_update().map(Statement::Update),
            Token::Delete => self.parse_delete().map(Statement::Delete),
            Token::Create => self.parse_create_table().map(Statement::CreateTable),
            Token::Drop => self.parse_drop().map(Statement::DropTable),
            Token::Begin => self.parse_begin(),
            Token::Commit | Token::End => self.parse_commit(),
            Token::Rollback => self.parse_rollback(),
            _ => Err(self.unexpected(
                "SELECT, INSERT, UPDATE, DELETE, CREATE, DROP, BEGIN, COMMIT, END or ROLLBACK",
            )),
        }
    }

    // ========== SELECT Statement ==========

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect(&Token::Select)?;

        let mut stmt = SelectStatement::default();

        // DISTINCT
        if self.check(&Token::Distinct) {
            self.advance();
            stmt.distinct = true;
        } else if self.check(&Token::All) {
            self.advance();
        }

        // Select list
        stmt.columns = self.parse_select_list()?;

        // FROM clause
        if self.check(&Token::From) {
            stmt.from = Some(self.parse_from_clause()?);
        }

        // WHERE clause
        if self.check(&Token::Where) {
            self.advance();
            stmt.where_clause = Some(self.parse_expr()?);
        }

        // GROUP BY clause
        if self.check(&Token::Group) {
            self.advance();
            self.expect(&Token::By)?;
            stmt.group_by = self.parse_expr_list()?;
        }

        // HAVING clause
        if self.check(&Token::Having) {
            self.advance();
            stmt.having = Some(self.parse_expr()?);
        }

        // ORDER BY clause
        if self.check(&Token::Order) {
            self.advance();
            self.expect(&Token::By)?;
            stmt.order_by = self.parse_order_by_list()?;
        }

        // LIMIT clause: LIMIT n [OFFSET m] or LIMIT m, n
        if self.check(&Token::Limit) {
            self.advance();
            let first = self.parse_expr()?;
            if self.check(&Token::Comma) {
                self.advance();
                stmt.offset = Some(first);
                stmt.limit = Some(self.parse_expr()?);
            } else {
                stmt.limit = Some(first);
                if self.check(&Token::Offset) {
                    self.advance();
                    stmt.offset = Some(self.parse_expr()?);
                }
            }
        }

        Ok(stmt)
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>> {
        let mut items = Vec::new();

        loop {
            items.push(self.parse_select_item()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance(); // consume comma
        }

        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        // Check for *
        if self.check(&Token::Asterisk) {
            self.advance();
            return Ok(SelectItem::Wildcard);
        }

        // Check for table.*
        if let Some(name) = self.current_name() {
            if self.peek() == Some(&Token::Dot) && self.peek_at(2) == Some(&Token::Asterisk) {
                self.advance(); // consume identifier
                self.advance(); // consume dot
                self.advance(); // consume *
                return Ok(SelectItem::QualifiedWildcard(name));
            }
        }

        // Parse as expression
        let expr = self.parse_expr()?;

        // Check for alias
        let alias = if self.check(&Token::As) {
            self.advance();
            Some(self.expect_alias()?)
        } else if let Token::Identifier(name) = self.current().clone() {
            // Alias without AS
            self.advance();
            Some(name)
        } else {
            None
        };

        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_from_clause(&mut self) -> Result<FromClause> {
        self.expect(&Token::From)?;

        let table = self.parse_table_ref()?;
        let mut joins = Vec::new();

        loop {
            if self.check(&Token::Comma) {
                // FROM a, b is a cross join
                self.advance();
                joins.push(Join {
                    join_type: JoinType::Cross,
                    table: self.parse_table_ref()?,
                    condition: None,
                });
            } else if self.is_join_keyword() {
                joins.push(self.parse_join()?);
            } else {
                break;
            }
        }

        Ok(FromClause { table, joins })
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let name = self.expect_identifier()?;

        let alias = if self.check(&Token::As) {
            self.advance();
            Some(self.expect_identifier()?)
        } else if let Token::Identifier(alias) = self.current().clone() {
            self.advance();
            Some(alias)
        } else {
            None
        };

        Ok(TableRef { name, alias })
    }

    fn is_join_keyword(&self) -> bool {
        matches!(
            self.current(),
            Token::Join | Token::Inner | Token::Left | Token::Cross
        )
    }

    fn parse_join(&mut self) -> Result<Join> {
        let join_type = self.parse_join_type();
        self.expect(&Token::Join)?;
        let table = self.parse_table_ref()?;

        let condition = if self.check(&Token::On) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(Join {
            join_type,
            table,
            condition,
        })
    }

    fn parse_join_type(&mut self) -> JoinType {
        if self.check(&Token::Inner) {
            self.advance();
            JoinType::Inner
        } else if self.check(&Token::Left) {
            self.advance();
            if self.check(&Token::Outer) {
                self.advance();
            }
            JoinType::Left
        } else if self.check(&Token::Cross) {
            self.advance();
            JoinType::Cross
        } else {
            // Just JOIN means INNER JOIN
            JoinType::Inner
        }
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByItem>> {
        let mut items = Vec::new();

        loop {
            let expr = self.parse_expr()?;
            let ascending = if self.check(&Token::Desc) {
                self.advance();
                false
            } else {
                if self.check(&Token::Asc) {
                    self.advance();
                }
                true
            };

            items.push(OrderByItem { expr, ascending });

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(items)
    }

    // ========== INSERT Statement ==========

    fn parse_insert(&mut self) -> Result<InsertStatement> {
        self.expect(&Token::Insert)?;
        self.expect(&Token::Into)?;

        let table_name = self.expect_identifier()?;

        // Optional column list
        let columns = if self.check(&Token::LParen) {
            self.advance();
            let cols = self.parse_identifier_list()?;
            self.expect(&Token::RParen)?;
            Some(cols)
        } else {
            None
        };

        let source = if self.check(&Token::Select) {
            InsertSource::Select(Box::new(self.parse_select()?))
        } else {
            self.expect(&Token::Values)?;
            let mut rows = Vec::new();
            loop {
                self.expect(&Token::LParen)?;
                rows.push(self.parse_expr_list()?);
                self.expect(&Token::RParen)?;

                if !self.check(&Token::Comma) {
                    break;
                }
                self.advance();
            }
            InsertSource::Values(rows)
        };

        Ok(InsertStatement {
            table_name,
            columns,
            source,
        })
    }

    // ========== UPDATE Statement ==========

    fn parse_update(&mut self) -> Result<UpdateStatement> {
        self.expect(&Token::Update)?;
        let table_name = self.expect_identifier()?;
        self.expect(&Token::Set)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            self.expect(&Token::Eq)?;
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        let where_clause = if self.check(&Token::Where) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(UpdateStatement {
            table_name,
            assignments,
            where_clause,
        })
    }

    // ========== DELETE Statement ==========

    fn parse_delete(&mut self) -> Result<DeleteStatement> {
        self.expect(&Token::Delete)?;
        self.expect(&Token::From)?;
        let table_name = self.expect_identifier()?;

        let where_clause = if self.check(&Token::Where) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };

        Ok(DeleteStatement {
            table_name,
            where_clause,
        })
    }

    // ========== CREATE / DROP TABLE ==========

    fn parse_create_table(&mut self) -> Result<CreateTableStatement> {
        self.expect(&Token::Create)?;
        self.expect(&Token::Table)?;

        let if_not_exists = if self.check(&Token::If) && self.peek() == Some(&Token::Not) {
            self.advance();
            self.advance();
            self.expect(&Token::Exists)?;
            true
        } else {
            false
        };

        let table_name = self.expect_identifier()?;
        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();

        loop {
            if matches!(
                self.current(),
                Token::Constraint | Token::Primary | Token::Unique
            ) {
                constraints.push(self.parse_table_constraint()?);
            } else if constraints.is_empty() {
                columns.push(self.parse_column_def()?);
            } else {
                return Err(self.unexpected("table constraint"));
            }

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        self.expect(&Token::RParen)?;

        Ok(CreateTableStatement {
            table_name,
            columns,
            constraints,
            if_not_exists,
        })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_identifier()?;
        let data_type = self.parse_type_name()?;
        let mut column = ColumnDef::new(name, data_type);

        loop {
            match self.current() {
                Token::Constraint => {
                    self.advance();
                    self.expect_identifier()?;
                }
                Token::Primary => {
                    self.advance();
                    self.expect(&Token::Key)?;
                    if self.check(&Token::Asc) || self.check(&Token::Desc) {
                        self.advance();
                    }
                    if matches!(self.current(), Token::Identifier(word) if word.eq_ignore_ascii_case("autoincrement"))
                    {
                        self.advance();
                    }
                    column.primary_key = true;
                }
                Token::Not => {
                    self.advance();
                    self.expect(&Token::Null)?;
                    column.not_null = true;
                }
                Token::Null => {
                    self.advance();
                }
                Token::Unique => {
                    self.advance();
                    column.unique = true;
                }
                Token::Default => {
                    self.advance();
                    column.default = Some(self.parse_default()?);
                }
                Token::Collate => {
                    self.advance();
                    column.collation = Some(self.expect_identifier()?);
                }
                _ => break,
            }
        }

        Ok(column)
    }

    /// Parse a type name: one or more words, optionally followed by `(n)` or `(n, m)`
    fn parse_type_name(&mut self) -> Result<Option<String>> {
        let mut words = Vec::new();
        while let Token::Identifier(word) = self.current().clone() {
            words.push(word);
            self.advance();
        }
        if words.is_empty() {
            return Ok(None);
        }

        let mut type_name = words.join(" ");
        if self.check(&Token::LParen) {
            self.advance();
            let mut sizes = vec![self.expect_signed_number()?];
            if self.check(&Token::Comma) {
                self.advance();
                sizes.push(self.expect_signed_number()?);
            }
            self.expect(&Token::RParen)?;
            type_name.push_str(&format!("({})", sizes.join(",")));
        }
        Ok(Some(type_name))
    }

    /// DEFAULT accepts a literal, a signed number or a parenthesized expression
    fn parse_default(&mut self) -> Result<Expr> {
        match self.current() {
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }
            Token::Minus | Token::Plus => {
                let op = if self.check(&Token::Minus) {
                    UnaryOperator::Minus
                } else {
                    UnaryOperator::Plus
                };
                self.advance();
                let literal = self.parse_literal()?;
                Ok(Expr::UnaryOp {
                    op,
                    expr: Box::new(literal),
                })
            }
            _ => self.parse_literal(),
        }
    }

    fn parse_literal(&mut self) -> Result<Expr> {
        let literal = match self.current().clone() {
            Token::IntegerLiteral(n) => Literal::Integer(n),
            Token::FloatLiteral(n) => Literal::Float(n),
            Token::StringLiteral(s) => Literal::String(s),
            Token::BlobLiteral(b) => Literal::Blob(b),
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::Null => Literal::Null,
            _ => return Err(self.unexpected("literal value")),
        };
        self.advance();
        Ok(Expr::Literal(literal))
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint> {
        if self.check(&Token::Constraint) {
            self.advance();
            self.expect_identifier()?;
        }

        let primary = if self.check(&Token::Primary) {
            self.advance();
            self.expect(&Token::Key)?;
            true
        } else {
            self.expect(&Token::Unique)?;
            false
        };

        self.expect(&Token::LParen)?;
        let column = self.expect_identifier()?;
        if self.check(&Token::Asc) || self.check(&Token::Desc) {
            self.advance();
        }
        if self.check(&Token::Comma) {
            return Err(Error::syntax(
                self.current_position(),
                "multi-column keys are not supported",
            ));
        }
        self.expect(&Token::RParen)?;

        Ok(if primary {
            TableConstraint::PrimaryKey(column)
        } else {
            TableConstraint::Unique(column)
        })
    }

    fn parse_drop(&mut self) -> Result<DropTableStatement> {
        self.expect(&Token::Drop)?;
        self.expect(&Token::Table)?;

        let if_exists = if self.check(&Token::If) && self.peek() == Some(&Token::Exists) {
            self.advance();
            self.advance();
            true
        } else {
            false
        };

        let table_name = self.expect_identifier()?;
        Ok(DropTableStatement {
            table_name,
            if_exists,
        })
    }

    // ========== Expressions ==========

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and_expr()?;

        while self.check(&Token::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = Expr::binary(left, BinaryOperator::Or, right);
        }

        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_not_expr()?;

        while self.check(&Token::And) {
            self.advance();
            let right = self.parse_not_expr()?;
            left = Expr::binary(left, BinaryOperator::And, right);
        }

        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr> {
        if self.check(&Token::Not) {
            self.advance();
            let expr = self.parse_not_expr()?;
            Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(expr),
            })
        } else {
            self.parse_comparison_expr()
        }
    }

    fn parse_comparison_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive_expr()?;

        loop {
            // IS NULL / IS NOT NULL
            if self.check(&Token::Is) {
                self.advance();
                let negated = if self.check(&Token::Not) {
                    self.advance();
                    true
                } else {
                    false
                };
                self.expect(&Token::Null)?;
                left = if negated {
                    Expr::IsNotNull(Box::new(left))
                } else {
                    Expr::IsNull(Box::new(left))
                };
                continue;
            }

            // [NOT] BETWEEN, [NOT] IN, [NOT] LIKE
            let negated = self.check(&Token::Not)
                && matches!(
                    self.peek(),
                    Some(Token::Between) | Some(Token::In) | Some(Token::Like)
                );
            if negated {
                self.advance();
            }

            match self.current() {
                Token::Between => {
                    self.advance();
                    let low = self.parse_additive_expr()?;
                    self.expect(&Token::And)?;
                    let high = self.parse_additive_expr()?;
                    left = Expr::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated,
                    };
                    continue;
                }
                Token::In => {
                    self.advance();
                    self.expect(&Token::LParen)?;
                    let list = if self.check(&Token::RParen) {
                        Vec::new()
                    } else {
                        self.parse_expr_list()?
                    };
                    self.expect(&Token::RParen)?;
                    left = Expr::InList {
                        expr: Box::new(left),
                        list,
                        negated,
                    };
                    continue;
                }
                Token::Like => {
                    self.advance();
                    let pattern = self.parse_additive_expr()?;
                    left = Expr::Like {
                        expr: Box::new(left),
                        pattern: Box::new(pattern),
                        negated,
                    };
                    continue;
                }
                _ => {}
            }

            // Comparison operators
            let op = match self.current() {
                Token::Eq => BinaryOperator::Eq,
                Token::Neq => BinaryOperator::Neq,
                Token::Lt => BinaryOperator::Lt,
                Token::Gt => BinaryOperator::Gt,
                Token::Lte => BinaryOperator::Lte,
                Token::Gte => BinaryOperator::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive_expr()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_additive_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative_expr()?;

        loop {
            let op = match self.current() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expr()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_concat_expr()?;

        loop {
            let op = match self.current() {
                Token::Asterisk => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                Token::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_concat_expr()?;
            left = Expr::binary(left, op, right);
        }

        Ok(left)
    }

    fn parse_concat_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary_expr()?;

        while self.check(&Token::Concat) {
            self.advance();
            let right = self.parse_unary_expr()?;
            left = Expr::binary(left, BinaryOperator::Concat, right);
        }

        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        let op = match self.current() {
            Token::Minus => Some(UnaryOperator::Minus),
            Token::Plus => Some(UnaryOperator::Plus),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary_expr()?;
            return Ok(Expr::UnaryOp {
                op,
                expr: Box::new(expr),
            });
        }

        let mut expr = self.parse_primary_expr()?;

        // Postfix COLLATE binds tighter than any binary operator
        while self.check(&Token::Collate) {
            self.advance();
            let collation = self.expect_identifier()?;
            expr = Expr::Collate {
                expr: Box::new(expr),
                collation,
            };
        }

        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        match self.current().clone() {
            // Literals
            Token::IntegerLiteral(_)
            | Token::FloatLiteral(_)
            | Token::StringLiteral(_)
            | Token::BlobLiteral(_)
            | Token::True
            | Token::False
            | Token::Null => self.parse_literal(),

            // Placeholders
            Token::QuestionMark => {
                self.advance();
                self.placeholder(None)
            }
            Token::NamedParameter(name) => {
                self.advance();
                self.placeholder(Some(name))
            }

            // Parenthesized expression
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }

            Token::Case => self.parse_case_expr(),
            Token::Cast => self.parse_cast_expr(),

            _ => {
                let Some(name) = self.current_name() else {
                    return Err(self.unexpected("expression"));
                };
                self.advance();

                if self.check(&Token::LParen) {
                    return self.parse_function(name);
                }

                if self.check(&Token::Dot) {
                    self.advance();
                    let column = self.expect_identifier()?;
                    return Ok(Expr::Column(ColumnRef {
                        table: Some(name),
                        column,
                    }));
                }

                Ok(Expr::column(name))
            }
        }
    }

    fn placeholder(&mut self, name: Option<String>) -> Result<Expr> {
        // Position of the placeholder token just consumed
        let position = self.tokens[self.position.saturating_sub(1)].position;

        let slot = match &name {
            None => {
                if !self.named.is_empty() {
                    return Err(Error::syntax(
                        position,
                        "cannot mix '?' and ':name' placeholders in one statement",
                    ));
                }
                self.positional += 1;
                self.positional - 1
            }
            Some(name) => {
                if self.positional > 0 {
                    return Err(Error::syntax(
                        position,
                        "cannot mix '?' and ':name' placeholders in one statement",
                    ));
                }
                match self.named.iter().position(|n| n == name) {
                    Some(slot) => slot,
                    None => {
                        self.named.push(name.clone());
                        self.named.len() - 1
                    }
                }
            }
        };

        Ok(Expr::Parameter(Placeholder { slot, name }))
    }

    fn parse_function(&mut self, name: String) -> Result<Expr> {
        self.expect(&Token::LParen)?;

        // f(*)
        if self.check(&Token::Asterisk) {
            self.advance();
            self.expect(&Token::RParen)?;
            return Ok(Expr::Function {
                name,
                args: Vec::new(),
                distinct: false,
                wildcard: true,
            });
        }

        let mut distinct = false;
        let args = if self.check(&Token::RParen) {
            Vec::new()
        } else {
            if self.check(&Token::Distinct) {
                self.advance();
                distinct = true;
            }
            self.parse_expr_list()?
        };
        self.expect(&Token::RParen)?;

        Ok(Expr::Function {
            name,
            args,
            distinct,
            wildcard: false,
        })
    }

    fn parse_case_expr(&mut self) -> Result<Expr> {
        self.expect(&Token::Case)?;

        let operand = if self.check(&Token::When) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut when_clauses = Vec::new();
        while self.check(&Token::When) {
            self.advance();
            let condition = self.parse_expr()?;
            self.expect(&Token::Then)?;
            let result = self.parse_expr()?;
            when_clauses.push((condition, result));
        }
        if when_clauses.is_empty() {
            return Err(self.unexpected("WHEN"));
        }

        let else_clause = if self.check(&Token::Else) {
            self.advance();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.expect(&Token::End)?;

        Ok(Expr::Case {
            operand,
            when_clauses,
            else_clause,
        })
    }

    fn parse_cast_expr(&mut self) -> Result<Expr> {
        self.expect(&Token::Cast)?;
        self.expect(&Token::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(&Token::As)?;
        let Some(type_name) = self.parse_type_name()? else {
            return Err(self.unexpected("type name"));
        };
        self.expect(&Token::RParen)?;

        Ok(Expr::Cast {
            expr: Box::new(expr),
            type_name,
        })
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = Vec::new();

        loop {
            exprs.push(self.parse_expr()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(exprs)
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>> {
        let mut identifiers = Vec::new();

        loop {
            identifiers.push(self.expect_identifier()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(identifiers)
    }

    // ========== Token helpers ==========

    fn current(&self) -> &Token {
        self.tokens
            .get(self.position)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn current_position(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.position)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset).map(|s| &s.token)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::syntax(
            self.current_position(),
            format!("expected {}, found {}", expected, self.current()),
        )
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    /// Identifier at the current position, including keywords usable as names
    fn current_name(&self) -> Option<String> {
        match self.current() {
            Token::Identifier(name) => Some(name.clone()),
            other => other.as_identifier().map(str::to_string),
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current_name() {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => Err(self.unexpected("identifier")),
        }
    }

    /// Column aliases may also be written as string literals
    fn expect_alias(&mut self) -> Result<String> {
        if let Token::StringLiteral(alias) = self.current().clone() {
            self.advance();
            return Ok(alias);
        }
        self.expect_identifier()
    }

    fn expect_signed_number(&mut self) -> Result<String> {
        let sign = if self.check(&Token::Minus) {
            self.advance();
            "-"
        } else {
            if self.check(&Token::Plus) {
                self.advance();
            }
            ""
        };
        let number = match self.current() {
            Token::IntegerLiteral(n) => n.to_string(),
            Token::FloatLiteral(n) => n.to_string(),
            _ => return Err(self.unexpected("number")),
        };
        self.advance();
        Ok(format!("{}{}", sign, number))
    }

    // ========== Transaction Statements ==========

    fn parse_begin(&mut self) -> Result<Statement> {
        self.expect(&Token::Begin)?;
        if matches!(self.current(), Token::Identifier(mode)
            if ["deferred", "immediate", "exclusive"].contains(&mode.to_lowercase().as_str()))
        {
            self.advance();
        }
        if self.check(&Token::Transaction) {
            self.advance();
        }
        Ok(Statement::BeginTransaction)
    }

    fn parse_commit(&mut self) -> Result<Statement> {
        self.advance(); // COMMIT or END
        if self.check(&Token::Transaction) {
            self.advance();
        }
        Ok(Statement::Commit)
    }

    fn parse_rollback(&mut self) -> Result<Statement> {
        self.expect(&Token::Rollback)?;
        if self.check(&Token::Transaction) {
            self.advance();
        }
        Ok(Statement::Rollback)
    }
}
