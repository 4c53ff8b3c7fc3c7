//! Lexer for the document language.
//!
//! Converts source text into a stream of tokens. Uses memchr for accelerated
//! string scanning. Tracks line/column for error reporting.

use memchr::memchr2;
use sqlgraph_ast::Span;

use crate::token::{Token, TokenKind};

/// Document lexer that produces a stream of tokens from source text.
pub struct Lexer<'a> {
    /// The source bytes (UTF-8).
    src: &'a [u8],
    /// Current byte offset into src.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number (1-based).
    col: u32,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given document source text.
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input into a Vec of tokens.
    #[must_use]
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token();
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let start_line = self.line;
        let start_col = self.col;

        let Some(ch) = self.peek() else {
            return self.make_token(TokenKind::Eof, start, start_line, start_col);
        };

        let kind = match ch {
            b'\'' | b'"' => self.lex_string(ch),
            b'0'..=b'9' => self.lex_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_identifier(),
            b'$' => self.lex_variable(),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b',' => self.single(TokenKind::Comma),
            b':' => self.single(TokenKind::Colon),
            b'+' => self.single(TokenKind::Plus),
            b'-' => self.single(TokenKind::Minus),
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'.' => self.lex_dots(),
            b'=' => self.single(TokenKind::Eq),
            b'!' => self.lex_bang(),
            b'<' => self.lex_lt(),
            b'>' => self.lex_gt(),
            _ => {
                self.advance();
                // Resynchronize to a char boundary for multi-byte input.
                while self.peek().is_some_and(|b| b & 0xC0 == 0x80) {
                    self.advance();
                }
                let s = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
                TokenKind::Error(format!("unexpected character: {s}"))
            }
        };

        self.make_token(kind, start, start_line, start_col)
    }

    // -----------------------------------------------------------------------
    // Scanning primitives
    // -----------------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    #[allow(clippy::cast_possible_truncation)]
    fn make_token(&self, kind: TokenKind, start: usize, line: u32, col: u32) -> Token {
        Token {
            kind,
            span: Span::new(start as u32, self.pos as u32),
            line,
            col,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.advance(),
                // Line comment: '#' to end of line.
                Some(b'#') => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Token scanners
    // -----------------------------------------------------------------------

    /// Scan a quoted string with backslash escapes. Either quote style works;
    /// the token carries the unescaped contents.
    fn lex_string(&mut self, quote: u8) -> TokenKind {
        self.advance(); // opening quote
        let mut out = String::new();

        loop {
            let rest = &self.src[self.pos..];
            let Some(idx) = memchr2(quote, b'\\', rest) else {
                let len = rest.len();
                self.advance_n(len);
                return TokenKind::Error("unterminated string literal".to_owned());
            };

            out.push_str(&String::from_utf8_lossy(&rest[..idx]));
            let hit = rest[idx];
            self.advance_n(idx);

            if hit == quote {
                self.advance(); // closing quote
                return TokenKind::Str(out);
            }

            // Backslash escape.
            self.advance();
            match self.peek() {
                Some(b'n') => out.push('\n'),
                Some(b't') => out.push('\t'),
                Some(b'r') => out.push('\r'),
                Some(b'\\') => out.push('\\'),
                Some(b'\'') => out.push('\''),
                Some(b'"') => out.push('"'),
                Some(other) => {
                    return TokenKind::Error(format!(
                        "invalid escape sequence: \\{}",
                        other as char
                    ));
                }
                None => {
                    return TokenKind::Error("unterminated string literal".to_owned());
                }
            }
            self.advance();
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        let mut is_float = false;

        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.')
            && !is_float
            && self.peek_at(1).is_some_and(|b| b.is_ascii_digit())
        {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = String::from_utf8_lossy(&self.src[start..self.pos]);
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => TokenKind::Float(v),
                Err(_) => TokenKind::Error(format!("invalid float literal: {text}")),
            }
        } else {
            match text.parse::<i64>() {
                Ok(n) => TokenKind::Integer(n),
                Err(_) => TokenKind::Error(format!("integer literal out of range: {text}")),
            }
        }
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.advance();
        }
        let text = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        TokenKind::lookup_keyword(&text).unwrap_or(TokenKind::Ident(text))
    }

    fn lex_variable(&mut self) -> TokenKind {
        self.advance(); // '$'
        if !self
            .peek()
            .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        {
            return TokenKind::Error("expected variable name after '$'".to_owned());
        }
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.advance();
        }
        let name = String::from_utf8_lossy(&self.src[start..self.pos]).into_owned();
        TokenKind::Variable(name)
    }

    fn lex_dots(&mut self) -> TokenKind {
        if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') {
            self.advance_n(3);
            TokenKind::Spread
        } else {
            self.single(TokenKind::Dot)
        }
    }

    fn lex_bang(&mut self) -> TokenKind {
        self.advance();
        if self.peek() == Some(b'=') {
            self.advance();
            TokenKind::Ne
        } else {
            TokenKind::Bang
        }
    }

    fn lex_lt(&mut self) -> TokenKind {
        self.advance();
        if self.peek() == Some(b'=') {
            self.advance();
            TokenKind::Le
        } else {
            TokenKind::Lt
        }
    }

    fn lex_gt(&mut self) -> TokenKind {
        self.advance();
        if self.peek() == Some(b'=') {
            self.advance();
            TokenKind::Ge
        } else {
            TokenKind::Gt
        }
    }
}
