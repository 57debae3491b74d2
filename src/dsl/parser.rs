//! Parser for the query text syntax.
//!
//! Grammar (in rough EBNF):
//!
//! statement  = [ "." IDENT ] "(" "if" ":" expr ")" [ "->" "." IDENT ] | expr
//! expr       = or_expr
//! or_expr    = and_expr ("||" and_expr)*
//! and_expr   = eq_expr ("&&" eq_expr)*
//! eq_expr    = cmp_expr (("==" | "!=") cmp_expr)*
//! cmp_expr   = sum_expr (("<" | "<=" | ">" | ">=") sum_expr)*
//! sum_expr   = prod_expr (("+" | "-") prod_expr)*
//! prod_expr  = unary_expr (("*" | "/") unary_expr)*
//! unary_expr = ("!" | "-") unary_expr | primary
//! primary    = "(" expr ")" | STRING | NUMBER | "::" | "t" "[" STRING "]"
//!            | call | IDENT "." call
//! call       = IDENT "(" [ args | IDENT ] ")"
//! args       = expr ("," expr)*
//!
//! The criterion of a statement is an `args` list too. Surplus criteria
//! and arguments are attached anyway and reported as static errors.

use super::lexer::{Spanned, Token, tokenize};
use crate::eval::{AggregateFunc, BinaryOp, BinaryOperator, Evaluator, UnaryOp, UnaryOperator};
use crate::filter::FilterStatement;
use crate::model::{DEFAULT_SET, ElementKind};
use crate::statement::{Diagnostics, Statement};

/// Deepest expression nesting accepted. Evaluation recurses per level.
const MAX_DEPTH: usize = 128;

/// Parser state.
struct Parser<'d> {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Parser<'d> {
    fn new(tokens: Vec<Spanned>, diagnostics: &'d mut Diagnostics) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            diagnostics,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map_or(&Token::Eof, |spanned| &spanned.token)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |spanned| spanned.line)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        let line = self.line();
        let tok = self.advance();
        if tok == expected {
            Ok(())
        } else {
            Err(format!("line {}: Expected {:?}, got {:?}", line, expected, tok))
        }
    }

    fn expect_ident(&mut self) -> Result<String, String> {
        let line = self.line();
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(format!("line {}: Expected identifier, got {:?}", line, other)),
        }
    }

    fn expect_str(&mut self) -> Result<String, String> {
        let line = self.line();
        match self.advance() {
            Token::Str(value) => Ok(value),
            other => Err(format!("line {}: Expected string, got {:?}", line, other)),
        }
    }

    /// Enters one nesting level. Callers restore `depth` when done.
    fn descend(&mut self) -> Result<(), String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!(
                "line {}: Expression nested deeper than {} levels",
                self.line(),
                MAX_DEPTH
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Builds a unary node through the statement protocol.
    fn unary(&mut self, op: UnaryOp, line: u32, child: Evaluator) -> Evaluator {
        let mut node = UnaryOperator::new(op, line);
        node.add_statement(Statement::Evaluator(child), "", self.diagnostics);
        Evaluator::Unary(node)
    }

    /// Builds a binary node through the statement protocol.
    fn binary(&mut self, op: BinaryOp, line: u32, lhs: Evaluator, rhs: Evaluator) -> Evaluator {
        let mut node = BinaryOperator::new(op, line);
        node.add_statement(Statement::Evaluator(lhs), "", self.diagnostics);
        node.add_statement(Statement::Evaluator(rhs), "", self.diagnostics);
        Evaluator::Binary(node)
    }

    /// Parse a filter statement, or a bare expression as its criterion.
    fn parse_statement(&mut self) -> Result<FilterStatement, String> {
        let line = self.line();
        let is_statement = matches!(self.peek(), Token::Dot)
            || (matches!(self.peek(), Token::LParen)
                && matches!(self.peek_at(1), Token::Ident(name) if name == "if")
                && matches!(self.peek_at(2), Token::Colon));

        if !is_statement {
            let mut stmt = FilterStatement::new(line);
            for criterion in self.parse_arguments()? {
                stmt.add_statement(Statement::Evaluator(criterion), "", self.diagnostics);
            }
            return Ok(stmt);
        }

        let mut stmt = FilterStatement::new(line);
        if matches!(self.peek(), Token::Dot) {
            self.advance(); // consume .
            stmt = stmt.with_input(self.expect_ident()?);
        }
        self.expect(Token::LParen)?;
        match self.advance() {
            Token::Ident(name) if name == "if" => {}
            other => return Err(format!("line {}: Expected 'if', got {:?}", line, other)),
        }
        self.expect(Token::Colon)?;
        for criterion in self.parse_arguments()? {
            stmt.add_statement(Statement::Evaluator(criterion), "", self.diagnostics);
        }
        self.expect(Token::RParen)?;

        if matches!(self.peek(), Token::Arrow) {
            self.advance(); // consume ->
            self.expect(Token::Dot)?;
            stmt = stmt.with_output(self.expect_ident()?);
        }
        Ok(stmt)
    }

    fn parse_expr(&mut self) -> Result<Evaluator, String> {
        let depth = self.depth;
        self.descend()?;
        let expr = self.parse_or_expr()?;
        self.depth = depth;
        Ok(expr)
    }

    /// Parse a comma-separated list: expr ("," expr)*
    fn parse_arguments(&mut self) -> Result<Vec<Evaluator>, String> {
        let mut args = vec![self.parse_expr()?];
        while matches!(self.peek(), Token::Comma) {
            self.advance(); // consume ,
            args.push(self.parse_expr()?);
        }
        Ok(args)
    }

    /// Parse OR expression: and_expr ("||" and_expr)*
    fn parse_or_expr(&mut self) -> Result<Evaluator, String> {
        let depth = self.depth;
        let mut left = self.parse_and_expr()?;
        while matches!(self.peek(), Token::OrOr) {
            self.descend()?;
            let line = self.line();
            self.advance(); // consume ||
            let right = self.parse_and_expr()?;
            left = self.binary(BinaryOp::Or, line, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    /// Parse AND expression: eq_expr ("&&" eq_expr)*
    fn parse_and_expr(&mut self) -> Result<Evaluator, String> {
        let depth = self.depth;
        let mut left = self.parse_eq_expr()?;
        while matches!(self.peek(), Token::AndAnd) {
            self.descend()?;
            let line = self.line();
            self.advance(); // consume &&
            let right = self.parse_eq_expr()?;
            left = self.binary(BinaryOp::And, line, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_eq_expr(&mut self) -> Result<Evaluator, String> {
        let depth = self.depth;
        let mut left = self.parse_cmp_expr()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Equal,
                Token::Ne => BinaryOp::NotEqual,
                _ => break,
            };
            self.descend()?;
            let line = self.line();
            self.advance();
            let right = self.parse_cmp_expr()?;
            left = self.binary(op, line, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_cmp_expr(&mut self) -> Result<Evaluator, String> {
        let depth = self.depth;
        let mut left = self.parse_sum_expr()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Less,
                Token::Le => BinaryOp::LessOrEqual,
                Token::Gt => BinaryOp::Greater,
                Token::Ge => BinaryOp::GreaterOrEqual,
                _ => break,
            };
            self.descend()?;
            let line = self.line();
            self.advance();
            let right = self.parse_sum_expr()?;
            left = self.binary(op, line, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_sum_expr(&mut self) -> Result<Evaluator, String> {
        let depth = self.depth;
        let mut left = self.parse_prod_expr()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Plus,
                Token::Minus => BinaryOp::Minus,
                _ => break,
            };
            self.descend()?;
            let line = self.line();
            self.advance();
            let right = self.parse_prod_expr()?;
            left = self.binary(op, line, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_prod_expr(&mut self) -> Result<Evaluator, String> {
        let depth = self.depth;
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Times,
                Token::Slash => BinaryOp::Divided,
                _ => break,
            };
            self.descend()?;
            let line = self.line();
            self.advance();
            let right = self.parse_unary_expr()?;
            left = self.binary(op, line, left, right);
        }
        self.depth = depth;
        Ok(left)
    }

    /// Parse unary expression: ("!" | "-") unary_expr | primary
    fn parse_unary_expr(&mut self) -> Result<Evaluator, String> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Negate,
            _ => return self.parse_primary(),
        };
        let depth = self.depth;
        self.descend()?;
        let line = self.line();
        self.advance();
        let inner = self.parse_unary_expr()?;
        self.depth = depth;
        Ok(self.unary(op, line, inner))
    }

    fn parse_primary(&mut self) -> Result<Evaluator, String> {
        let line = self.line();
        match self.advance() {
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Str(value) | Token::Number(value) => Ok(Evaluator::Fixed(value)),
            Token::ColonColon => Ok(Evaluator::KeyValue),
            Token::Ident(name) if name == "t" && matches!(self.peek(), Token::LBracket) => {
                self.advance(); // consume [
                let key = self.expect_str()?;
                self.expect(Token::RBracket)?;
                Ok(Evaluator::Value { key })
            }
            Token::Ident(name) if matches!(self.peek(), Token::Dot) => {
                self.advance(); // consume .
                let method = self.expect_ident()?;
                self.parse_call(&name, &method, line)
            }
            Token::Ident(name) => self.parse_call(DEFAULT_SET, &name, line),
            other => Err(format!("line {}: Unexpected token: {:?}", line, other)),
        }
    }

    /// Parse the argument list of `function`, called on `set` for set methods.
    fn parse_call(&mut self, set: &str, function: &str, line: u32) -> Result<Evaluator, String> {
        self.expect(Token::LParen)?;
        let empty = matches!(self.peek(), Token::RParen);

        let evaluator = if function == "count" {
            let kind = if empty {
                None
            } else {
                let plural = self.expect_ident()?;
                Some(ElementKind::from_plural(&plural).ok_or_else(|| {
                    format!("line {}: Unknown element kind '{}'", line, plural)
                })?)
            };
            Evaluator::SetCount {
                set: set.to_string(),
                kind,
            }
        } else if let Some(func) = AggregateFunc::from_method(function) {
            let value = if empty {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            Evaluator::Aggregate {
                func,
                set: set.to_string(),
                value,
            }
        } else if set != DEFAULT_SET {
            return Err(format!("line {}: Unknown set method '{}'", line, function));
        } else {
            self.parse_builtin(function, empty, line)?
        };

        self.expect(Token::RParen)?;
        Ok(evaluator)
    }

    /// Parse the arguments of a function not bound to a set.
    fn parse_builtin(&mut self, function: &str, empty: bool, line: u32) -> Result<Evaluator, String> {
        match function {
            "id" | "type" if !empty => {
                Err(format!("line {}: {}() takes no arguments", line, function))
            }
            "id" => Ok(Evaluator::Id),
            "type" => Ok(Evaluator::Type),
            "is_tag" => Ok(Evaluator::IsTag {
                key: self.expect_str()?,
            }),
            "number" | "is_number" => {
                let op = if function == "number" {
                    UnaryOp::Number
                } else {
                    UnaryOp::IsNum
                };
                let mut node = UnaryOperator::new(op, line);
                if !empty {
                    for child in self.parse_arguments()? {
                        node.add_statement(Statement::Evaluator(child), "", self.diagnostics);
                    }
                }
                Ok(Evaluator::Unary(node))
            }
            _ => Err(format!("line {}: Unknown function '{}'", line, function)),
        }
    }
}

fn parse_with<T>(
    input: &str,
    diagnostics: &mut Diagnostics,
    parse: impl FnOnce(&mut Parser<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens, diagnostics);
    let parsed = parse(&mut parser)?;

    // Ensure we consumed all tokens
    if !matches!(parser.peek(), Token::Eof) {
        return Err(format!(
            "line {}: Unexpected token after expression: {:?}",
            parser.line(),
            parser.peek()
        ));
    }

    Ok(parsed)
}

/// Parse an expression into an evaluator tree.
#[cfg(test)]
pub fn parse_evaluator(input: &str, diagnostics: &mut Diagnostics) -> Result<Evaluator, String> {
    parse_with(input, diagnostics, |parser| parser.parse_expr())
}

/// Parse a filter statement, `[.from](if: expr)[->.into]`, or a bare
/// expression used as the criterion of a `_` to `_` filter.
pub fn parse_filter(input: &str, diagnostics: &mut Diagnostics) -> Result<FilterStatement, String> {
    if input.trim().is_empty() {
        return Ok(FilterStatement::new(1));
    }
    parse_with(input, diagnostics, |parser| parser.parse_statement())
}
