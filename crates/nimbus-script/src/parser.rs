//! Core parser: token cursor, error reporting and statement parsing.
//!
//! Expressions live in [`crate::parse_expr`]. The parser stops at the first
//! error; a function source that fails to parse is never served.

use std::sync::Arc;

use crate::ast::{Export, Expr, ExprKind, FnDef, Program, Stmt, StmtKind};
use crate::error::CompileError;
use crate::token::{Span, Token, TokenKind};

/// Maximum nesting of blocks and expressions.
pub(crate) const MAX_NESTING: u32 = 64;

pub(crate) type ParseResult<T> = Result<T, CompileError>;

/// Recursive-descent parser over a lexed token stream.
pub struct Parser<'src> {
    /// The token stream (ends with `Eof`).
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    /// Logical name for error messages.
    name: &'src str,
    /// Current nesting depth.
    pub(crate) depth: u32,
    /// Depth of enclosing function bodies.
    fn_depth: u32,
    /// Depth of enclosing loops within the current function.
    loop_depth: u32,
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Token>, name: &'src str) -> Self {
        Self {
            tokens,
            pos: 0,
            name,
            depth: 0,
            fn_depth: 0,
            loop_depth: 0,
        }
    }

    /// Parse a whole program.
    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut body = Vec::new();
        while !self.at_end() {
            if self.check(&TokenKind::Export) {
                body.push(self.parse_export()?);
            } else {
                body.push(self.parse_statement()?);
            }
        }
        Ok(Program {
            name: self.name.to_string(),
            body,
        })
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, expected: &TokenKind) -> ParseResult<Token> {
        if self.check(expected) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(format!(
                "expected {}, got {}",
                expected,
                self.peek_kind()
            )))
        }
    }

    pub(crate) fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_at_current(format!("expected identifier, got {other}"))),
        }
    }

    /// Identifier or keyword used as a property name (`obj.default`, `{ if: 1 }`).
    pub(crate) fn expect_property_name(&mut self) -> ParseResult<String> {
        let kind = self.peek_kind().clone();
        match &kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => match kind.as_word() {
                Some(word) => {
                    self.advance();
                    Ok(word.to_string())
                }
                None => Err(self.error_at_current(format!("expected property name, got {kind}"))),
            },
        }
    }

    pub(crate) fn error_at(&self, span: Span, message: impl Into<String>) -> CompileError {
        CompileError::new(self.name, span.line, span.col, message)
    }

    pub(crate) fn error_at_current(&self, message: impl Into<String>) -> CompileError {
        self.error_at(self.current_span(), message)
    }

    pub(crate) fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_at_current(format!(
                "maximum nesting depth of {MAX_NESTING} exceeded"
            )));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth -= 1;
    }

    // ── Statements ────────────────────────────────────────────────────────────

    fn parse_export(&mut self) -> ParseResult<Stmt> {
        let span = self.expect(&TokenKind::Export)?.span;
        let export = match self.peek_kind() {
            TokenKind::Default => {
                self.advance();
                let value = self.parse_expression()?;
                self.eat(&TokenKind::Semicolon);
                Export::Default(value)
            }
            TokenKind::Let | TokenKind::Const => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(&TokenKind::Eq)?;
                let value = self.parse_expression()?;
                self.eat(&TokenKind::Semicolon);
                Export::Binding { name, value }
            }
            TokenKind::Fn => Export::Function(self.parse_fn_def(true)?),
            other => {
                return Err(self.error_at_current(format!(
                    "expected `default`, `let`, `const` or `fn` after `export`, got {other}"
                )));
            }
        };
        Ok(Stmt {
            kind: StmtKind::Export(export),
            span,
        })
    }

    pub(crate) fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace)?;
        self.enter()?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.error_at_current("expected `}`, got end of input"));
            }
            if self.check(&TokenKind::Export) {
                return Err(self.error_at_current("`export` is only allowed at the top level"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        self.leave();
        Ok(body)
    }

    pub(crate) fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::Let | TokenKind::Const => {
                self.advance();
                let name = self.expect_ident()?;
                let value = if self.eat(&TokenKind::Eq) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.eat(&TokenKind::Semicolon);
                StmtKind::Let { name, value }
            }
            TokenKind::Fn if matches!(self.look_ahead(1), TokenKind::Ident(_)) => {
                StmtKind::Function(self.parse_fn_def(true)?)
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                let body = self.parse_loop_body()?;
                StmtKind::While { cond, body }
            }
            TokenKind::For => self.parse_for_of()?,
            TokenKind::Return => {
                self.advance();
                if self.fn_depth == 0 {
                    return Err(self.error_at(span, "`return` outside of a function"));
                }
                let value = if matches!(
                    self.peek_kind(),
                    TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.eat(&TokenKind::Semicolon);
                StmtKind::Return(value)
            }
            TokenKind::Break | TokenKind::Continue => {
                let token = self.advance();
                if self.loop_depth == 0 {
                    return Err(self.error_at(span, format!("{} outside of a loop", token.kind)));
                }
                self.eat(&TokenKind::Semicolon);
                if token.kind == TokenKind::Break {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.eat(&TokenKind::Semicolon);
                StmtKind::Throw(value)
            }
            TokenKind::Try => self.parse_try()?,
            TokenKind::LBrace => StmtKind::Block(self.parse_block()?),
            _ => self.parse_expression_statement()?,
        };
        Ok(Stmt { kind, span })
    }

    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let then = self.parse_block()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let span = self.current_span();
                let nested = self.parse_if()?;
                Some(vec![Stmt { kind: nested, span }])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_for_of(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;
        if !self.eat(&TokenKind::Let) {
            self.eat(&TokenKind::Const);
        }
        let binding = self.expect_ident()?;
        self.expect(&TokenKind::Of)?;
        let iterable = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_loop_body()?;
        Ok(StmtKind::ForOf {
            binding,
            iterable,
            body,
        })
    }

    fn parse_try(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::Try)?;
        let body = self.parse_block()?;
        self.expect(&TokenKind::Catch)?;
        let binding = if self.eat(&TokenKind::LParen) {
            let name = self.expect_ident()?;
            self.expect(&TokenKind::RParen)?;
            Some(name)
        } else {
            None
        };
        let handler = self.parse_block()?;
        Ok(StmtKind::Try {
            body,
            binding,
            handler,
        })
    }

    fn parse_expression_statement(&mut self) -> ParseResult<StmtKind> {
        let target = self.parse_expression()?;
        let compound = match self.peek_kind() {
            TokenKind::Eq => None,
            TokenKind::PlusEq => Some(crate::ast::BinOp::Add),
            TokenKind::MinusEq => Some(crate::ast::BinOp::Sub),
            TokenKind::StarEq => Some(crate::ast::BinOp::Mul),
            TokenKind::SlashEq => Some(crate::ast::BinOp::Div),
            _ => {
                self.eat(&TokenKind::Semicolon);
                return Ok(StmtKind::Expr(target));
            }
        };
        let op_span = self.advance().span;
        if !target.is_place() {
            return Err(self.error_at(op_span, "invalid assignment target"));
        }
        let rhs = self.parse_expression()?;
        self.eat(&TokenKind::Semicolon);
        let value = match compound {
            None => rhs,
            Some(op) => Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(target.clone()),
                    right: Box::new(rhs),
                },
                op_span,
            ),
        };
        Ok(StmtKind::Assign { target, value })
    }

    /// `fn [name](params) { body }`; the name is mandatory for declarations.
    pub(crate) fn parse_fn_def(&mut self, named: bool) -> ParseResult<Arc<FnDef>> {
        let span = self.expect(&TokenKind::Fn)?.span;
        let name = if named || matches!(self.peek_kind(), TokenKind::Ident(_)) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        let params = self.parse_params()?;
        let body = self.parse_fn_body()?;
        Ok(Arc::new(FnDef {
            name,
            params,
            body,
            span,
        }))
    }

    pub(crate) fn parse_params(&mut self) -> ParseResult<Vec<String>> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let name = self.expect_ident()?;
            if params.contains(&name) {
                return Err(self.error_at_current(format!("duplicate parameter `{name}`")));
            }
            params.push(name);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_loop_body(&mut self) -> ParseResult<Vec<Stmt>> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    pub(crate) fn parse_fn_body(&mut self) -> ParseResult<Vec<Stmt>> {
        let loops = std::mem::take(&mut self.loop_depth);
        self.fn_depth += 1;
        let body = self.parse_block();
        self.fn_depth -= 1;
        self.loop_depth = loops;
        body
    }

    /// Arrow body: a block, or a single expression that is returned.
    pub(crate) fn parse_arrow_body(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.check(&TokenKind::LBrace) {
            return self.parse_fn_body();
        }
        let span = self.current_span();
        let value = self.parse_expression()?;
        Ok(vec![Stmt {
            kind: StmtKind::Return(Some(value)),
            span,
        }])
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Export, StmtKind};
    use crate::compile;

    #[test]
    fn test_export_default_function() {
        let program = compile("export default fn(ctx) { return 1 }", "hello").unwrap();
        assert_eq!(program.export_names(), vec!["default"]);
    }

    #[test]
    fn test_named_exports() {
        let program = compile(
            "export fn main(ctx) { return ctx }\nexport const version = '1'",
            "m",
        )
        .unwrap();
        assert_eq!(program.export_names(), vec!["main", "version"]);
    }

    #[test]
    fn test_export_inside_block_rejected() {
        let err = compile("if (true) { export default 1 }", "m").unwrap_err();
        assert!(err.message.contains("top level"));
    }

    #[test]
    fn test_return_outside_function_rejected() {
        let err = compile("return 1", "m").unwrap_err();
        assert!(err.message.contains("outside of a function"));
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let err = compile("while (true) { fn f() { break } }", "m").unwrap_err();
        assert_eq!(err.message, "`break` outside of a loop");
        assert!(compile("while (true) { if (true) { break } }", "m").is_ok());
    }

    #[test]
    fn test_compound_assignment_desugars() {
        let program = compile("let n = 1\nn += 2", "m").unwrap();
        assert!(matches!(program.body[1].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = compile("f() = 1", "m").unwrap_err();
        assert_eq!(err.message, "invalid assignment target");
    }

    #[test]
    fn test_else_if_chain() {
        let program = compile(
            "let x = 1\nif (x == 1) { x = 2 } else if (x == 2) { x = 3 } else { x = 4 }",
            "m",
        )
        .unwrap();
        assert!(matches!(
            &program.body[1].kind,
            StmtKind::If { otherwise: Some(branch), .. } if branch.len() == 1
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let source = format!("let x = {}1{}", "(".repeat(100), ")".repeat(100));
        let err = compile(&source, "deep").unwrap_err();
        assert!(err.message.contains("nesting depth"));
    }

    #[test]
    fn test_error_position() {
        let err = compile("let x = \n  )", "api/broken").unwrap_err();
        assert_eq!((err.line, err.col), (2, 3));
        assert_eq!(err.name, "api/broken");
    }

    #[test]
    fn test_export_binding_requires_value() {
        assert!(compile("export let x", "m").is_err());
        let program = compile("export let x = 1;", "m").unwrap();
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::Export(Export::Binding { name, .. }) if name == "x"
        ));
    }
}
