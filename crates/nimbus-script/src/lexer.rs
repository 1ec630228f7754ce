//! Lexer: converts function source text to a token stream.
//!
//! - `//` line comments and `/* */` block comments are skipped
//! - Strings accept `"` or `'` quotes with the usual backslash escapes
//! - Stops at the first error (a function that does not lex is not served)

use crate::error::CompileError;
use crate::token::{Span, Token, TokenKind};

/// The function-source lexer.
pub struct Lexer<'src> {
    /// The full source text as chars.
    chars: Vec<char>,
    /// Logical name (for errors).
    name: &'src str,
    /// Current offset into `chars`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer over `source`.
    pub fn new(source: &'src str, name: &'src str) -> Self {
        Self {
            chars: source.chars().collect(),
            name,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Lex the whole source. The stream always ends with [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let span = Span::new(self.line, self.col);
            let Some(ch) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, span));
                return Ok(tokens);
            };

            let kind = if ch.is_ascii_digit()
                || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()))
            {
                self.number(span)?
            } else if ch == '"' || ch == '\'' {
                self.string(ch, span)?
            } else if is_ident_start(ch) {
                self.ident()
            } else {
                self.punct(ch, span)?
            };
            tokens.push(Token::new(kind, span));
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, span: Span, message: impl Into<String>) -> CompileError {
        CompileError::new(self.name, span.line, span.col, message)
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.advance();
                }
                (Some('/'), Some('/')) => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = Span::new(self.line, self.col);
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error(start, "unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self, span: Span) -> Result<TokenKind, CompileError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.advance();
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+')
            {
                text.push(c);
                self.advance();
                if let Some(sign) = self.peek().filter(|s| *s == '-' || *s == '+') {
                    text.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(span, format!("invalid number literal `{text}`")))
    }

    fn string(&mut self, quote: char, span: Span) -> Result<TokenKind, CompileError> {
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => return Err(self.error(span, "unterminated string literal")),
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => {
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('u') => self.unicode_escape(span)?,
                        Some(other) => {
                            return Err(self.error(span, format!("unknown escape `\\{other}`")));
                        }
                        None => return Err(self.error(span, "unterminated string literal")),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    /// `\u{1F600}` style escape; the `\u` prefix is already consumed.
    fn unicode_escape(&mut self, span: Span) -> Result<char, CompileError> {
        if !self.eat('{') {
            return Err(self.error(span, "expected `{` after `\\u`"));
        }
        let mut hex = String::new();
        while let Some(c) = self.peek() {
            if c == '}' {
                break;
            }
            hex.push(c);
            self.advance();
        }
        if !self.eat('}') {
            return Err(self.error(span, "unterminated unicode escape"));
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(span, format!("invalid unicode escape `{hex}`")))
    }

    fn ident(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek().filter(|c| is_ident_continue(*c)) {
            text.push(c);
            self.advance();
        }
        TokenKind::keyword(&text).unwrap_or(TokenKind::Ident(text))
    }

    fn punct(&mut self, ch: char, span: Span) -> Result<TokenKind, CompileError> {
        self.advance();
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '%' => TokenKind::Percent,
            '+' if self.eat('=') => TokenKind::PlusEq,
            '+' => TokenKind::Plus,
            '-' if self.eat('=') => TokenKind::MinusEq,
            '-' => TokenKind::Minus,
            '*' if self.eat('=') => TokenKind::StarEq,
            '*' => TokenKind::Star,
            '/' if self.eat('=') => TokenKind::SlashEq,
            '/' => TokenKind::Slash,
            '?' if self.eat('?') => TokenKind::QuestionQuestion,
            '?' => TokenKind::Question,
            '!' if self.eat('=') => {
                self.eat('=');
                TokenKind::BangEq
            }
            '!' => TokenKind::Bang,
            '=' if self.eat('=') => {
                self.eat('=');
                TokenKind::EqEq
            }
            '=' if self.eat('>') => TokenKind::Arrow,
            '=' => TokenKind::Eq,
            '<' if self.eat('=') => TokenKind::LessEq,
            '<' => TokenKind::Less,
            '>' if self.eat('=') => TokenKind::GreaterEq,
            '>' => TokenKind::Greater,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            other => return Err(self.error(span, format!("unexpected character `{other}`"))),
        };
        Ok(kind)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
