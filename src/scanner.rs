//! Module `scanner` implements a one‑pass, streaming lexer for Space Lua.
//!
//! It transforms a source string into a sequence of `Token<'a>`s, skipping
//! whitespace and comments, and emitting exactly one `EOF` token at the end.
//! As a `FusedIterator` it can be chained safely with other adapters.
//!
//! # Public API
//!
//! - `Scanner::new(src: &'a str) -> Scanner<'a>`
//! - `impl Iterator for Scanner<'a>` yielding `Result<Token<'a>, LuaError>`.
//!
//! # Token Recognition
//!
//! - Punctuation and operators, longest match first (`...` before `..`
//!   before `.`, `//` before `/`, `::` before `:`).
//! - Quoted strings `"…"` / `'…'`: escapes are skipped, not decoded. An
//!   unescaped newline is an error.
//! - Long brackets `[[…]]`, `[==[…]==]` as strings, `--[[…]]` as comments.
//! - Numbers: decimal, fractional, exponent and `0x` hexadecimal.
//! - Names/keywords through a perfect‑hash `KEYWORDS` map.
//!
//! Right after the `query` keyword an opening `[[` is split into two
//! `LEFT_BRACKET` tokens so the parser sees the clause list instead of a
//! long string.
//!
//! Comments are normally blanked beforehand by
//! [`crate::cst::strip_comments`]; the scanner still skips them so it can be
//! used on raw text.

use crate::ast::Span;
use crate::error::{LuaError, Result};
use crate::token::{Token, TokenType};
use log::{debug, info};
use memchr::memchr;
use phf::phf_map;
use std::iter::FusedIterator;

// ─────────────────────────────────────────────────────────────────────────────
// Static keyword map (compile‑time perfect hash)
// ─────────────────────────────────────────────────────────────────────────────

static KEYWORDS: phf::Map<&'static [u8], TokenType> = phf_map! {
    b"and"      => TokenType::AND,
    b"break"    => TokenType::BREAK,
    b"do"       => TokenType::DO,
    b"else"     => TokenType::ELSE,
    b"elseif"   => TokenType::ELSEIF,
    b"end"      => TokenType::END,
    b"false"    => TokenType::FALSE,
    b"for"      => TokenType::FOR,
    b"function" => TokenType::FUNCTION,
    b"goto"     => TokenType::GOTO,
    b"if"       => TokenType::IF,
    b"in"       => TokenType::IN,
    b"local"    => TokenType::LOCAL,
    b"nil"      => TokenType::NIL,
    b"not"      => TokenType::NOT,
    b"or"       => TokenType::OR,
    b"repeat"   => TokenType::REPEAT,
    b"return"   => TokenType::RETURN,
    b"then"     => TokenType::THEN,
    b"true"     => TokenType::TRUE,
    b"until"    => TokenType::UNTIL,
    b"while"    => TokenType::WHILE,
    b"query"    => TokenType::QUERY,
};

/// Single pass scanner over a source string. Every emitted token's `lexeme`
/// borrows from the original buffer.
pub struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    start: usize,               // first byte of the current lexeme
    curr: usize,                // one past the last byte examined
    line: usize,                // 1‑based line counter
    pending: Option<TokenType>, // recognised token kind waiting to be emitted
    query_brackets: u8,         // `[` still to be split after `query`
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(src: &'a str) -> Self {
        info!("Scanner created over {} bytes", src.len());

        Self {
            src,
            bytes: src.as_bytes(),
            start: 0,
            curr: 0,
            line: 1,
            pending: None,
            query_brackets: 0,
        }
    }

    // ───────────────────────────── primitive helpers ────────────────────────

    #[inline(always)]
    const fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        self.curr >= self.len()
    }

    /// Advance one byte and return it. Callers guard with [`Self::is_at_end`].
    #[inline(always)]
    fn advance(&mut self) -> u8 {
        let b = self.bytes[self.curr];
        self.curr += 1;
        b
    }

    /// Current byte, `0` past EOF.
    #[inline(always)]
    fn peek(&self) -> u8 {
        self.bytes.get(self.curr).copied().unwrap_or(0)
    }

    #[inline(always)]
    fn peek_next(&self) -> u8 {
        self.bytes.get(self.curr + 1).copied().unwrap_or(0)
    }

    #[inline(always)]
    fn match_byte(&mut self, expected: u8) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn span(&self) -> Span {
        Span::new(self.start, self.curr)
    }

    fn either(&mut self, expected: u8, matched: TokenType, otherwise: TokenType) {
        let tt = if self.match_byte(expected) {
            matched
        } else {
            otherwise
        };

        self.pending = Some(tt);
    }

    // ───────────────────────────── core lexing ─────────────────────────────

    /// Scan a *single* token starting at `self.curr`. Whitespace and comments
    /// return `Ok(())` with `pending = None`.
    fn scan_token(&mut self) -> Result<()> {
        let b = self.advance();

        match b {
            // ── single‑character punctuators ──────────────────────────────
            b'(' => self.pending = Some(TokenType::LEFT_PAREN),
            b')' => self.pending = Some(TokenType::RIGHT_PAREN),
            b'{' => self.pending = Some(TokenType::LEFT_BRACE),
            b'}' => self.pending = Some(TokenType::RIGHT_BRACE),
            b']' => self.pending = Some(TokenType::RIGHT_BRACKET),
            b',' => self.pending = Some(TokenType::COMMA),
            b';' => self.pending = Some(TokenType::SEMICOLON),
            b'+' => self.pending = Some(TokenType::PLUS),
            b'*' => self.pending = Some(TokenType::STAR),
            b'%' => self.pending = Some(TokenType::PERCENT),
            b'^' => self.pending = Some(TokenType::CARET),
            b'#' => self.pending = Some(TokenType::HASH),
            b'&' => self.pending = Some(TokenType::AMPERSAND),
            b'|' => self.pending = Some(TokenType::PIPE),

            // ── multi‑character operators ─────────────────────────────────
            b'/' => self.either(b'/', TokenType::SLASH_SLASH, TokenType::SLASH),

            b':' => self.either(b':', TokenType::DOUBLE_COLON, TokenType::COLON),

            b'~' => self.either(b'=', TokenType::TILDE_EQUAL, TokenType::TILDE),

            b'=' => self.either(b'=', TokenType::EQUAL_EQUAL, TokenType::EQUAL),

            b'<' => {
                let tt = if self.match_byte(b'=') {
                    TokenType::LESS_EQUAL
                } else if self.match_byte(b'<') {
                    TokenType::LESS_LESS
                } else {
                    TokenType::LESS
                };

                self.pending = Some(tt);
            }

            b'>' => {
                let tt = if self.match_byte(b'=') {
                    TokenType::GREATER_EQUAL
                } else if self.match_byte(b'>') {
                    TokenType::GREATER_GREATER
                } else {
                    TokenType::GREATER
                };

                self.pending = Some(tt);
            }

            b'.' => {
                if self.peek().is_ascii_digit() {
                    return self.parse_number();
                }

                let tt = if self.match_byte(b'.') {
                    if self.match_byte(b'.') {
                        TokenType::ELLIPSIS
                    } else {
                        TokenType::DOT_DOT
                    }
                } else {
                    TokenType::DOT
                };

                self.pending = Some(tt);
            }

            // ── `[`: plain bracket or long string ─────────────────────────
            b'[' => {
                if self.query_brackets > 0 {
                    self.query_brackets -= 1;
                    self.pending = Some(TokenType::LEFT_BRACKET);

                    return Ok(());
                }

                match self.long_bracket_level() {
                    Some(level) => {
                        self.skip_long_bracket(level)?;
                        self.pending = Some(TokenType::STRING);
                    }

                    None => self.pending = Some(TokenType::LEFT_BRACKET),
                }
            }

            // ── comments (`--` line or `--[[ … ]]` block) ───────────────
            b'-' => {
                if !self.match_byte(b'-') {
                    self.pending = Some(TokenType::MINUS);

                    return Ok(());
                }

                if self.peek() == b'[' {
                    self.advance();

                    if let Some(level) = self.long_bracket_level() {
                        return self.skip_long_bracket(level);
                    }
                }

                if let Some(pos) = memchr(b'\n', &self.bytes[self.curr..]) {
                    self.curr += pos;
                } else {
                    self.curr = self.len();
                }

                return Ok(());
            }

            // ── whitespace / newline ─────────────────────────────────────
            b' ' | b'\r' | b'\t' | 0x0b | 0x0c => {
                return Ok(());
            }

            b'\n' => {
                self.line += 1;

                return Ok(());
            }

            b'"' | b'\'' => {
                return self.parse_string(b);
            }

            b'0'..=b'9' => {
                return self.parse_number();
            }

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.parse_identifier();
            }

            // ── unexpected character ─────────────────────────────────────
            _ => {
                // do not resume inside a multi-byte character
                while !self.is_at_end() && self.peek() & 0xC0 == 0x80 {
                    self.advance();
                }

                let found = &self.src[self.start..self.curr];

                return Err(LuaError::lex(
                    self.span(),
                    format!("unexpected symbol near '{}'", found),
                ));
            }
        }

        Ok(())
    }

    /// With `self.curr` just past a `[`, consume `=*[` and return the level,
    /// or rewind and return `None` when this is not a long bracket.
    fn long_bracket_level(&mut self) -> Option<usize> {
        let save = self.curr;
        let mut level = 0;

        while self.peek() == b'=' {
            self.advance();
            level += 1;
        }

        if self.match_byte(b'[') {
            Some(level)
        } else {
            self.curr = save;
            None
        }
    }

    /// Skip to the closing `]=*]` of the given level.
    fn skip_long_bracket(&mut self, level: usize) -> Result<()> {
        loop {
            let Some(pos) = memchr(b']', &self.bytes[self.curr..]) else {
                self.curr = self.len();

                return Err(LuaError::lex(self.span(), "unfinished long string"));
            };

            self.line += self.bytes[self.curr..self.curr + pos]
                .iter()
                .filter(|&&c| c == b'\n')
                .count();
            self.curr += pos + 1;

            let mut closing = 0;

            while closing < level && self.peek() == b'=' {
                self.advance();
                closing += 1;
            }

            if closing == level && self.match_byte(b']') {
                return Ok(());
            }
        }
    }

    /// Quoted string; `self.start` points at the opening quote.
    fn parse_string(&mut self, quote: u8) -> Result<()> {
        loop {
            if self.is_at_end() {
                return Err(LuaError::lex(self.span(), "unfinished string"));
            }

            match self.advance() {
                b'\\' => {
                    if !self.is_at_end() && self.advance() == b'\n' {
                        self.line += 1;
                    }
                }

                b'\n' => {
                    return Err(LuaError::lex(self.span(), "unfinished string"));
                }

                c if c == quote => break,

                _ => {}
            }
        }

        self.pending = Some(TokenType::STRING);

        Ok(())
    }

    /// Numeric literal: `123`, `3.14`, `.5`, `1e10`, `0xFF`.
    fn parse_number(&mut self) -> Result<()> {
        let lexeme_start = self.start;

        if self.bytes[lexeme_start] == b'0' && matches!(self.peek(), b'x' | b'X') {
            self.advance();

            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }

            let digits = &self.src[lexeme_start + 2..self.curr];
            let value = u64::from_str_radix(digits, 16)
                .map_err(|_| LuaError::lex(self.span(), "malformed number"))?;

            self.pending = Some(TokenType::NUMBER(value as i64 as f64));

            return Ok(());
        }

        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // `1..2` is a concatenation, not a fraction
        if self.bytes[lexeme_start] != b'.' && self.peek() == b'.' && self.peek_next() != b'.' {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        if matches!(self.peek(), b'e' | b'E') {
            self.advance();

            if matches!(self.peek(), b'+' | b'-') {
                self.advance();
            }

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = &self.src[lexeme_start..self.curr];
        let value: f64 = text
            .parse()
            .map_err(|_| LuaError::lex(self.span(), format!("malformed number near '{}'", text)))?;

        self.pending = Some(TokenType::NUMBER(value));

        Ok(())
    }

    /// Identifier or keyword.
    fn parse_identifier(&mut self) {
        while {
            let c: u8 = self.peek();
            c.is_ascii_alphanumeric() || c == b'_'
        } {
            self.advance();
        }

        let slice: &[u8] = &self.bytes[self.start..self.curr];

        let tt: TokenType = KEYWORDS
            .get(slice)
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER);

        self.pending = Some(tt);
    }
}

// ───────────────────────── Iterator implementation ─────────────────────────

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.curr <= self.len() {
            // 1. EOF guard – emit exactly one EOF then terminate.
            if self.curr == self.len() {
                self.curr += 1;
                let end = self.len();

                return Some(Ok(Token::new(
                    TokenType::EOF,
                    "",
                    Span::new(end, end),
                    self.line,
                )));
            }

            // 2. Reset per‑token state.
            self.start = self.curr;
            self.pending = None;
            let line = self.line;

            // 3. Attempt to scan a token.
            if let Err(e) = self.scan_token() {
                self.query_brackets = 0;

                return Some(Err(e));
            }

            // 4. If a real token was recognised, build and return it.
            if let Some(tt) = self.pending.take() {
                match tt {
                    TokenType::QUERY => self.query_brackets = 2,

                    TokenType::LEFT_BRACKET => {}

                    _ => self.query_brackets = 0,
                }

                let lexeme: &'a str = &self.src[self.start..self.curr];
                debug!("Scanned token ({:?}) on line {}", tt, line);

                return Some(Ok(Token::new(tt, lexeme, self.span(), line)));
            }
        }

        None
    }
}

impl<'a> FusedIterator for Scanner<'a> {}
