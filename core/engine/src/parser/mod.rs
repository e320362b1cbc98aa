//! Recursive-descent parser for Tern scripts.

pub mod ast;
mod lexer;
pub mod visitor;

use self::ast::{
    BinaryOp, Expression, FunctionDeclaration, Program, Statement, StatementKind, UnaryOp,
};
use self::lexer::{Keyword, Token, TokenKind, tokenize};
use crate::{Position, TernError, TernResult, Value};
use std::rc::Rc;

/// Parser over a token stream.
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    /// Parses a complete script.
    pub fn parse_program(source: &str) -> TernResult<Program> {
        let mut parser = Self::new(source)?;
        let mut body = Vec::new();
        while !parser.at_eof() {
            body.push(parser.statement()?);
        }
        Ok(Program { body })
    }

    /// Parses a single expression, as used by debugger evaluation.
    pub fn parse_expression(source: &str) -> TernResult<Expression> {
        let mut parser = Self::new(source)?;
        let expression = parser.expression()?;
        parser.eat_punctuator(";");
        if !parser.at_eof() {
            return Err(TernError::syntax(
                "unexpected token after expression",
                parser.position(),
            ));
        }
        Ok(expression)
    }

    fn new(source: &str) -> TernResult<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            cursor: 0,
        })
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.cursor].kind
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        let index = (self.cursor + n).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn position(&self) -> Position {
        self.tokens[self.cursor].position
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.cursor].kind.clone();
        if self.cursor < self.tokens.len() - 1 {
            self.cursor += 1;
        }
        kind
    }

    fn is_punctuator(&self, p: &str) -> bool {
        matches!(self.peek(), TokenKind::Punctuator(q) if *q == p)
    }

    fn eat_punctuator(&mut self, p: &str) -> bool {
        if self.is_punctuator(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punctuator(&mut self, p: &str) -> TernResult<()> {
        if self.eat_punctuator(p) {
            Ok(())
        } else {
            Err(TernError::syntax(
                format!("expected `{p}`, found {:?}", self.peek()),
                self.position(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> TernResult<String> {
        match self.advance() {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(TernError::syntax(
                format!("expected identifier, found {other:?}"),
                self.position(),
            )),
        }
    }

    fn end_of_statement(&mut self) -> TernResult<()> {
        if self.eat_punctuator(";") || self.is_punctuator("}") || self.at_eof() {
            Ok(())
        } else {
            Err(TernError::syntax("expected `;`", self.position()))
        }
    }

    fn block(&mut self) -> TernResult<Vec<Statement>> {
        self.expect_punctuator("{")?;
        let mut statements = Vec::new();
        while !self.is_punctuator("}") {
            if self.at_eof() {
                return Err(TernError::syntax("unterminated block", self.position()));
            }
            statements.push(self.statement()?);
        }
        self.advance();
        Ok(statements)
    }

    fn statement(&mut self) -> TernResult<Statement> {
        let position = self.position();
        let kind = match self.peek().clone() {
            TokenKind::Keyword(Keyword::Let) => {
                self.advance();
                let name = self.expect_identifier()?;
                let init = if self.eat_punctuator("=") {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.end_of_statement()?;
                StatementKind::Let { name, init }
            }
            TokenKind::Keyword(Keyword::Debugger) => {
                self.advance();
                self.end_of_statement()?;
                StatementKind::Debugger
            }
            TokenKind::Keyword(Keyword::If) => {
                self.advance();
                self.expect_punctuator("(")?;
                let test = self.expression()?;
                self.expect_punctuator(")")?;
                let consequent = self.block()?;
                let alternate = if matches!(self.peek(), TokenKind::Keyword(Keyword::Else)) {
                    self.advance();
                    if matches!(self.peek(), TokenKind::Keyword(Keyword::If)) {
                        Some(vec![self.statement()?])
                    } else {
                        Some(self.block()?)
                    }
                } else {
                    None
                };
                StatementKind::If {
                    test,
                    consequent,
                    alternate,
                }
            }
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                self.expect_punctuator("(")?;
                let test = self.expression()?;
                self.expect_punctuator(")")?;
                let body = self.block()?;
                StatementKind::While { test, body }
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let name = self.expect_identifier()?;
                self.expect_punctuator("(")?;
                let mut params = Vec::new();
                if !self.is_punctuator(")") {
                    loop {
                        params.push(self.expect_identifier()?);
                        if !self.eat_punctuator(",") {
                            break;
                        }
                    }
                }
                self.expect_punctuator(")")?;
                let body = self.block()?;
                StatementKind::Function(Rc::new(FunctionDeclaration { name, params, body }))
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.is_punctuator(";") || self.is_punctuator("}") {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_of_statement()?;
                StatementKind::Return(value)
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                let value = self.expression()?;
                self.end_of_statement()?;
                StatementKind::Throw(value)
            }
            TokenKind::Identifier(name)
                if matches!(self.peek_nth(1), TokenKind::Punctuator("=")) =>
            {
                self.advance();
                self.advance();
                let value = self.expression()?;
                self.end_of_statement()?;
                StatementKind::Assign { name, value }
            }
            _ => {
                let expression = self.expression()?;
                self.end_of_statement()?;
                match expression {
                    Expression::Call { callee, args } if callee == "print" => {
                        StatementKind::Print(args)
                    }
                    other => StatementKind::Expression(other),
                }
            }
        };
        Ok(Statement { position, kind })
    }

    fn expression(&mut self) -> TernResult<Expression> {
        self.binary(0)
    }

    fn binary(&mut self, min_precedence: u8) -> TernResult<Expression> {
        let mut lhs = self.unary()?;
        loop {
            let Some((op, precedence)) = self.peek_binary_op() else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let rhs = self.binary(precedence + 1)?;
            lhs = Expression::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, u8)> {
        let TokenKind::Punctuator(p) = self.peek() else {
            return None;
        };
        Some(match *p {
            "||" => (BinaryOp::Or, 1),
            "&&" => (BinaryOp::And, 2),
            "==" | "===" => (BinaryOp::Eq, 3),
            "!=" | "!==" => (BinaryOp::Ne, 3),
            "<" => (BinaryOp::Lt, 4),
            "<=" => (BinaryOp::Le, 4),
            ">" => (BinaryOp::Gt, 4),
            ">=" => (BinaryOp::Ge, 4),
            "+" => (BinaryOp::Add, 5),
            "-" => (BinaryOp::Sub, 5),
            "*" => (BinaryOp::Mul, 6),
            "/" => (BinaryOp::Div, 6),
            "%" => (BinaryOp::Rem, 6),
            _ => return None,
        })
    }

    fn unary(&mut self) -> TernResult<Expression> {
        let op = if self.eat_punctuator("-") {
            UnaryOp::Neg
        } else if self.eat_punctuator("!") {
            UnaryOp::Not
        } else {
            return self.primary();
        };
        Ok(Expression::Unary {
            op,
            operand: Box::new(self.unary()?),
        })
    }

    fn primary(&mut self) -> TernResult<Expression> {
        let position = self.position();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expression::Literal(Value::Number(n))),
            TokenKind::String(s) => Ok(Expression::Literal(Value::String(s))),
            TokenKind::Keyword(Keyword::True) => Ok(Expression::Literal(Value::Boolean(true))),
            TokenKind::Keyword(Keyword::False) => Ok(Expression::Literal(Value::Boolean(false))),
            TokenKind::Keyword(Keyword::Undefined) => Ok(Expression::Literal(Value::Undefined)),
            TokenKind::Identifier(name) => {
                if !self.eat_punctuator("(") {
                    return Ok(Expression::Identifier(name));
                }
                let mut args = Vec::new();
                if !self.is_punctuator(")") {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat_punctuator(",") {
                            break;
                        }
                    }
                }
                self.expect_punctuator(")")?;
                Ok(Expression::Call { callee: name, args })
            }
            TokenKind::Punctuator("(") => {
                let expression = self.expression()?;
                self.expect_punctuator(")")?;
                Ok(expression)
            }
            other => Err(TernError::syntax(
                format!("unexpected token {other:?}"),
                position,
            )),
        }
    }
}
