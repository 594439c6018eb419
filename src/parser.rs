use std::rc::Rc;

use crate::ast::{AssignOp, BinaryOp, Expr, IfBranch, Program, Stmt, UnaryOp};
use crate::error::{Error, Result};
use crate::location::Span;
use crate::token::{Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    path: String,
    pos: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>, path: impl Into<String>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::EndOfFile, "", Span::default()));
        }
        Self {
            tokens,
            path: path.into(),
            pos: 0,
        }
    }

    pub fn parse_program(mut self) -> Result<Program> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if self.matches(&[TokenKind::Semicolon]) {
                continue;
            }
            statements.push(self.declaration()?);
        }
        Ok(Program { statements })
    }

    pub fn parse_expression(mut self) -> Result<Expr> {
        let expr = self.assignment()?;
        if !self.is_at_end() {
            return Err(self.error_at_current("unexpected token after expression"));
        }
        Ok(expr)
    }

    fn declaration(&mut self) -> Result<Stmt> {
        if self.matches(&[TokenKind::Var]) {
            return self.var_declaration();
        }
        if self.matches(&[TokenKind::Function]) {
            return self.function_declaration();
        }
        self.statement()
    }

    fn statement(&mut self) -> Result<Stmt> {
        if self.matches(&[TokenKind::Echo]) {
            let expr = self.assignment()?;
            return Ok(Stmt::Echo { expr });
        }
        if self.matches(&[TokenKind::If]) {
            return self.if_statement();
        }
        if self.matches(&[TokenKind::While]) {
            return self.while_statement();
        }
        if self.matches(&[TokenKind::For]) {
            return self.for_statement();
        }
        if self.matches(&[TokenKind::Return]) {
            return self.return_statement();
        }
        let expr = self.assignment()?;
        Ok(Stmt::Expr { expr })
    }

    fn var_declaration(&mut self) -> Result<Stmt> {
        let name = self.consume_identifier("expected variable name")?;
        let initializer = if self.matches(&[TokenKind::Equal]) {
            Some(self.assignment()?)
        } else {
            None
        };
        Ok(Stmt::VarDecl { name, initializer })
    }

    fn function_declaration(&mut self) -> Result<Stmt> {
        let name = self.consume_identifier("expected function name")?;
        self.consume(TokenKind::LeftParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                params.push(self.consume_identifier("expected parameter name")?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expected ')' after parameters")?;
        let body = self.block_until(&[TokenKind::End])?;
        self.consume(TokenKind::End, "expected 'end' after function body")?;
        Ok(Stmt::FunctionDecl {
            name,
            params,
            body: Rc::new(body),
        })
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let mut branches = Vec::new();
        let condition = self.assignment()?;
        let body = self.block_until(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::End])?;
        branches.push(IfBranch { condition, body });

        while self.matches(&[TokenKind::ElseIf]) {
            let condition = self.assignment()?;
            let body = self.block_until(&[TokenKind::ElseIf, TokenKind::Else, TokenKind::End])?;
            branches.push(IfBranch { condition, body });
        }

        let else_body = if self.matches(&[TokenKind::Else]) {
            Some(self.block_until(&[TokenKind::End])?)
        } else {
            None
        };
        self.consume(TokenKind::End, "expected 'end' after if statement")?;
        Ok(Stmt::If {
            branches,
            else_body,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        let condition = self.assignment()?;
        let body = self.block_until(&[TokenKind::End])?;
        self.consume(TokenKind::End, "expected 'end' after while body")?;
        Ok(Stmt::While { condition, body })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        let first = self.consume_identifier("expected loop variable name")?;
        let (index_name, value_name) = if self.matches(&[TokenKind::Comma]) {
            let second = self.consume_identifier("expected loop value name")?;
            (Some(first), second)
        } else {
            (None, first)
        };
        self.consume(TokenKind::In, "expected 'in' after loop variables")?;
        let iterable = self.assignment()?;
        let body = self.block_until(&[TokenKind::End])?;
        self.consume(TokenKind::End, "expected 'end' after for body")?;
        Ok(Stmt::For {
            index_name,
            value_name,
            iterable,
            body,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let value = if starts_expression(self.peek().kind) {
            Some(self.assignment()?)
        } else {
            None
        };
        Ok(Stmt::Return { value })
    }

    fn block_until(&mut self, terminators: &[TokenKind]) -> Result<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            if self.matches(&[TokenKind::Semicolon]) {
                continue;
            }
            if self.is_at_end() || terminators.contains(&self.peek().kind) {
                break;
            }
            statements.push(self.declaration()?);
        }
        Ok(statements)
    }

    fn assignment(&mut self) -> Result<Expr> {
        let expr = self.expression()?;

        let op = match self.peek().kind {
            TokenKind::Equal => Some(AssignOp::Assign),
            TokenKind::PlusEqual => Some(AssignOp::AddAssign),
            TokenKind::MinusEqual => Some(AssignOp::SubtractAssign),
            TokenKind::StarEqual => Some(AssignOp::MultiplyAssign),
            TokenKind::SlashEqual => Some(AssignOp::DivideAssign),
            TokenKind::PercentEqual => Some(AssignOp::ModuloAssign),
            TokenKind::DotDotEqual => Some(AssignOp::ConcatAssign),
            _ => None,
        };
        if let Some(op) = op {
            let op_span = self.peek().span;
            self.advance();
            let value = self.assignment()?;
            if !matches!(expr, Expr::Identifier { .. } | Expr::Index { .. }) {
                return Err(Error::parse(
                    "invalid assignment target",
                    &self.path,
                    op_span.start,
                ));
            }
            return Ok(Expr::Assignment {
                target: Box::new(expr),
                op,
                value: Box::new(value),
            });
        }

        Ok(expr)
    }

    fn expression(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut expr = self.and_expr()?;
        while self.matches(&[TokenKind::Or]) {
            let right = self.and_expr()?;
            expr = binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut expr = self.equality()?;
        while self.matches(&[TokenKind::And]) {
            let right = self.equality()?;
            expr = binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinaryOp::Equal,
                TokenKind::NotEqual => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut expr = self.concat()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Less => BinaryOp::Less,
                TokenKind::LessEqual => BinaryOp::LessEqual,
                TokenKind::Greater => BinaryOp::Greater,
                TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let right = self.concat()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn concat(&mut self) -> Result<Expr> {
        let mut expr = self.additive()?;
        while self.matches(&[TokenKind::DotDot]) {
            let right = self.additive()?;
            expr = binary(BinaryOp::Concat, expr, right);
        }
        Ok(expr)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut expr = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.matches(&[TokenKind::Not]) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.matches(&[TokenKind::Minus]) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(&[TokenKind::LeftParen]) {
                let mut args = Vec::new();
                if !self.check(TokenKind::RightParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.matches(&[TokenKind::Comma]) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RightParen, "expected ')' after arguments")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
                continue;
            }
            if self.matches(&[TokenKind::LeftBracket]) {
                let index = self.expression()?;
                self.consume(TokenKind::RightBracket, "expected ']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                Ok(Expr::Literal {
                    repr: format!("num({})", token.lexeme),
                })
            }
            TokenKind::String => {
                self.advance();
                Ok(Expr::Literal {
                    repr: format!("str({})", token.lexeme),
                })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal {
                    repr: "bool(true)".to_string(),
                })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal {
                    repr: "bool(false)".to_string(),
                })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal {
                    repr: "null".to_string(),
                })
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr::Identifier { name: token.lexeme })
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenKind::RightParen, "expected ')' after expression")?;
                Ok(expr)
            }
            TokenKind::LeftBracket => {
                self.advance();
                self.array_literal()
            }
            TokenKind::LeftBrace => {
                self.advance();
                self.object_literal()
            }
            _ => Err(self.error_at_current("expected expression")),
        }
    }

    fn array_literal(&mut self) -> Result<Expr> {
        let mut elements = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "expected ']' after array literal")?;
        Ok(Expr::ArrayLiteral { elements })
    }

    fn object_literal(&mut self) -> Result<Expr> {
        let mut fields = Vec::new();
        if !self.check(TokenKind::RightBrace) {
            loop {
                if !self.check(TokenKind::String) {
                    return Err(self.error_at_current("expected string key in object literal"));
                }
                let key = self.advance().lexeme.clone();
                self.consume(TokenKind::Colon, "expected ':' after object key")?;
                let value = self.expression()?;
                fields.push((key, value));
                if !self.matches(&[TokenKind::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBrace, "expected '}' after object literal")?;
        Ok(Expr::ObjectLiteral { fields })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn matches(&mut self, kinds: &[TokenKind]) -> bool {
        if kinds.contains(&self.peek().kind) {
            self.advance();
            return true;
        }
        false
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        &self.tokens[self.pos - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::EndOfFile
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }
        Err(self.error_at_current(message))
    }

    fn consume_identifier(&mut self, message: &str) -> Result<String> {
        if self.check(TokenKind::Identifier) {
            return Ok(self.advance().lexeme.clone());
        }
        Err(self.error_at_current(message))
    }

    fn error_at_current(&self, message: &str) -> Error {
        Error::parse(message, &self.path, self.peek().span.start)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn starts_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number
            | TokenKind::String
            | TokenKind::True
            | TokenKind::False
            | TokenKind::Null
            | TokenKind::Identifier
            | TokenKind::LeftParen
            | TokenKind::LeftBracket
            | TokenKind::LeftBrace
            | TokenKind::Not
            | TokenKind::Minus
    )
}

pub fn parse_program(tokens: Vec<Token>, path: &str) -> Result<Program> {
    Parser::new(tokens, path).parse_program()
}

pub fn parse_expression(tokens: Vec<Token>, path: &str) -> Result<Expr> {
    Parser::new(tokens, path).parse_expression()
}
