//! Expression parsing with operator precedence.
//!
//! Precedence (lowest → highest):
//! 8. `c ? a : b`
//! 7. `??`
//! 6. `||`
//! 5. `&&`
//! 4. `==`, `!=`, `<`, `>`, `<=`, `>=`
//! 3. `+`, `-`
//! 2. `*`, `/`, `%`
//! 1. unary `!`, `-`, `typeof`
//! 0. `.member`, `[index]`, `(call)`

use std::sync::Arc;

use crate::ast::{BinOp, Expr, ExprKind, FnDef, LogicalOp, UnaryOp};
use crate::parser::{ParseResult, Parser};
use crate::token::TokenKind;

impl Parser<'_> {
    /// Parse an expression.
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.parse_conditional();
        self.leave();
        result
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let cond = self.parse_nullish()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_expression()?;
        self.expect(&TokenKind::Colon)?;
        let otherwise = self.parse_expression()?;
        let span = cond.span;
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        ))
    }

    fn parse_nullish(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_or()?;
        while self.eat(&TokenKind::QuestionQuestion) {
            let right = self.parse_or()?;
            left = logical(LogicalOp::Nullish, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.parse_and()?;
            left = logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.parse_comparison()?;
            left = logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::BangEq => BinOp::NotEq,
                TokenKind::Less => BinOp::Less,
                TokenKind::LessEq => BinOp::LessEq,
                TokenKind::Greater => BinOp::Greater,
                TokenKind::GreaterEq => BinOp::GreaterEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Typeof => UnaryOp::Typeof,
            _ => return self.parse_postfix(),
        };
        let span = self.advance().span;
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand?),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let span = self.current_span();
            expr = match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.expect_property_name()?;
                    Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                        },
                        span,
                    )
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket)?;
                    Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    )
                }
                TokenKind::LParen => {
                    let args = self.parse_args()?;
                    Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    )
                }
                _ => return Ok(expr),
            };
        }
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::Ident(name) => {
                if matches!(self.look_ahead(1), TokenKind::Arrow) {
                    return self.parse_arrow(vec![]);
                }
                self.advance();
                ExprKind::Ident(name)
            }
            TokenKind::Fn => ExprKind::Function(self.parse_fn_def(false)?),
            TokenKind::LParen => {
                if self.is_arrow_params() {
                    let params = self.parse_params()?;
                    return self.parse_arrow(params);
                }
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket)?;
                ExprKind::Array(items)
            }
            TokenKind::LBrace => self.parse_object()?,
            other => return Err(self.error_at(span, format!("unexpected {other}"))),
        };
        Ok(Expr::new(kind, span))
    }

    fn parse_object(&mut self) -> ParseResult<ExprKind> {
        self.expect(&TokenKind::LBrace)?;
        let mut fields: Vec<(String, Expr)> = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key_span = self.current_span();
            let key = match self.peek_kind().clone() {
                TokenKind::Str(s) => {
                    self.advance();
                    s
                }
                TokenKind::Number(n) => {
                    self.advance();
                    crate::value::format_number(n)
                }
                _ => self.expect_property_name()?,
            };
            let value = if self.eat(&TokenKind::Colon) {
                self.parse_expression()?
            } else {
                // `{ name }` shorthand
                Expr::new(ExprKind::Ident(key.clone()), key_span)
            };
            fields.retain(|(existing, _)| existing != &key);
            fields.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(ExprKind::Object(fields))
    }

    /// At `(`: does the matching `)` precede `=>`?
    fn is_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            match self.look_ahead(offset) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.look_ahead(offset + 1), TokenKind::Arrow);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    /// `x => body` (params empty, ident pending) or `(a, b) => body`.
    fn parse_arrow(&mut self, mut params: Vec<String>) -> ParseResult<Expr> {
        let span = self.current_span();
        if params.is_empty() && !self.check(&TokenKind::Arrow) {
            params.push(self.expect_ident()?);
        }
        self.expect(&TokenKind::Arrow)?;
        let body = self.parse_arrow_body()?;
        Ok(Expr::new(
            ExprKind::Function(Arc::new(FnDef {
                name: None,
                params,
                body,
                span,
            })),
            span,
        ))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    let span = left.span;
    Expr::new(
        ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use crate::ast::{BinOp, ExprKind, StmtKind};
    use crate::compile;

    fn expr(source: &str) -> ExprKind {
        let program = compile(source, "t").unwrap();
        match &program.body[0].kind {
            StmtKind::Expr(e) => e.kind.clone(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        match expr("1 + 2 * 3") {
            ExprKind::Binary { op, right, .. } => {
                assert_eq!(op, BinOp::Add);
                assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_arrow_functions() {
        assert!(matches!(expr("(a, b) => a + b"), ExprKind::Function(def) if def.params.len() == 2));
        assert!(matches!(expr("x => x"), ExprKind::Function(def) if def.params == ["x"]));
        assert!(matches!(expr("() => { return 1 }"), ExprKind::Function(def) if def.params.is_empty()));
    }

    #[test]
    fn test_parenthesized_is_not_arrow() {
        assert!(matches!(expr("(1 + 2) * 3"), ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_keyword_member_access() {
        assert!(matches!(
            expr("mod.default"),
            ExprKind::Member { property, .. } if property == "default"
        ));
    }

    #[test]
    fn test_object_literal_forms() {
        let program = compile("let o = { a: 1, 'b-c': 2, name, default: 3, }", "t").unwrap();
        match &program.body[0].kind {
            StmtKind::Let { value: Some(v), .. } => match &v.kind {
                ExprKind::Object(fields) => {
                    let keys: Vec<_> = fields.iter().map(|(k, _)| k.as_str()).collect();
                    assert_eq!(keys, ["a", "b-c", "name", "default"]);
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_conditional_and_nullish() {
        assert!(matches!(expr("a ?? b ? 1 : 2"), ExprKind::Conditional { .. }));
    }

    #[test]
    fn test_call_chain() {
        assert!(matches!(expr("a.b(1)[0].c()"), ExprKind::Call { .. }));
    }
}
