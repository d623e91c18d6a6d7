use log::debug;
use serde::Serialize;
use std::fmt;
use std::mem;

use crate::ast::Span;

/// The different kinds of tokens recognized by the Space Lua scanner.
///
/// `NUMBER(f64)` carries its numeric value; `STRING` tokens keep their raw
/// lexeme (delimiters and escapes included) and are decoded by the AST
/// builder. `EOF` marks the end of input.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Serialize)]
pub enum TokenType {
    // ── punctuation ─────────────────────────────────────────────────────
    LEFT_PAREN,
    RIGHT_PAREN,
    LEFT_BRACE,
    RIGHT_BRACE,
    LEFT_BRACKET,
    RIGHT_BRACKET,
    COMMA,
    SEMICOLON,
    COLON,

    /// '::'
    DOUBLE_COLON,
    DOT,

    /// '..'
    DOT_DOT,

    /// '...'
    ELLIPSIS,

    // ── operators ───────────────────────────────────────────────────────
    PLUS,
    MINUS,
    STAR,
    SLASH,

    /// '//'
    SLASH_SLASH,
    PERCENT,
    CARET,
    HASH,
    AMPERSAND,
    TILDE,
    PIPE,

    /// '<<'
    LESS_LESS,

    /// '>>'
    GREATER_GREATER,
    EQUAL,
    EQUAL_EQUAL,

    /// '~='
    TILDE_EQUAL,
    LESS,
    LESS_EQUAL,
    GREATER,
    GREATER_EQUAL,

    // ── literals ────────────────────────────────────────────────────────
    /// A user‑defined name
    IDENTIFIER,

    /// A quoted or long-bracket string, undecoded
    STRING,

    /// A numeric literal
    #[serde(rename = "NUMBER")]
    NUMBER(f64),

    // ── keywords ────────────────────────────────────────────────────────
    AND,
    BREAK,
    DO,
    ELSE,
    ELSEIF,
    END,
    FALSE,
    FOR,
    FUNCTION,
    GOTO,
    IF,
    IN,
    LOCAL,
    NIL,
    NOT,
    OR,
    REPEAT,
    RETURN,
    THEN,
    TRUE,
    UNTIL,
    WHILE,

    /// 'query', opens a `query [[ ... ]]` expression
    QUERY,

    /// End‑of‑file marker
    EOF,
}

impl TokenType {
    /// Upper-case variant name, without payload.
    pub fn name(&self) -> &'static str {
        match self {
            TokenType::LEFT_PAREN => "LEFT_PAREN",
            TokenType::RIGHT_PAREN => "RIGHT_PAREN",
            TokenType::LEFT_BRACE => "LEFT_BRACE",
            TokenType::RIGHT_BRACE => "RIGHT_BRACE",
            TokenType::LEFT_BRACKET => "LEFT_BRACKET",
            TokenType::RIGHT_BRACKET => "RIGHT_BRACKET",
            TokenType::COMMA => "COMMA",
            TokenType::SEMICOLON => "SEMICOLON",
            TokenType::COLON => "COLON",
            TokenType::DOUBLE_COLON => "DOUBLE_COLON",
            TokenType::DOT => "DOT",
            TokenType::DOT_DOT => "DOT_DOT",
            TokenType::ELLIPSIS => "ELLIPSIS",
            TokenType::PLUS => "PLUS",
            TokenType::MINUS => "MINUS",
            TokenType::STAR => "STAR",
            TokenType::SLASH => "SLASH",
            TokenType::SLASH_SLASH => "SLASH_SLASH",
            TokenType::PERCENT => "PERCENT",
            TokenType::CARET => "CARET",
            TokenType::HASH => "HASH",
            TokenType::AMPERSAND => "AMPERSAND",
            TokenType::TILDE => "TILDE",
            TokenType::PIPE => "PIPE",
            TokenType::LESS_LESS => "LESS_LESS",
            TokenType::GREATER_GREATER => "GREATER_GREATER",
            TokenType::EQUAL => "EQUAL",
            TokenType::EQUAL_EQUAL => "EQUAL_EQUAL",
            TokenType::TILDE_EQUAL => "TILDE_EQUAL",
            TokenType::LESS => "LESS",
            TokenType::LESS_EQUAL => "LESS_EQUAL",
            TokenType::GREATER => "GREATER",
            TokenType::GREATER_EQUAL => "GREATER_EQUAL",
            TokenType::IDENTIFIER => "IDENTIFIER",
            TokenType::STRING => "STRING",
            TokenType::NUMBER(_) => "NUMBER",
            TokenType::AND => "AND",
            TokenType::BREAK => "BREAK",
            TokenType::DO => "DO",
            TokenType::ELSE => "ELSE",
            TokenType::ELSEIF => "ELSEIF",
            TokenType::END => "END",
            TokenType::FALSE => "FALSE",
            TokenType::FOR => "FOR",
            TokenType::FUNCTION => "FUNCTION",
            TokenType::GOTO => "GOTO",
            TokenType::IF => "IF",
            TokenType::IN => "IN",
            TokenType::LOCAL => "LOCAL",
            TokenType::NIL => "NIL",
            TokenType::NOT => "NOT",
            TokenType::OR => "OR",
            TokenType::REPEAT => "REPEAT",
            TokenType::RETURN => "RETURN",
            TokenType::THEN => "THEN",
            TokenType::TRUE => "TRUE",
            TokenType::UNTIL => "UNTIL",
            TokenType::WHILE => "WHILE",
            TokenType::QUERY => "QUERY",
            TokenType::EOF => "EOF",
        }
    }
}

impl PartialEq for TokenType {
    /// Two TokenTypes are equal if they share the same variant
    /// (ignoring any inner data).
    fn eq(&self, other: &Self) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

/// A scanned token: its type, the original lexeme, its byte span and the
/// line where it starts.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Token<'a> {
    /// The category of this token.
    pub token_type: TokenType,

    /// The exact substring from the source that produced this token.
    pub lexeme: &'a str,

    /// Byte range in the source.
    pub span: Span,

    /// 1‑based line number in the source.
    pub line: usize,
}

impl<'a> Token<'a> {
    pub fn new(token_type: TokenType, lexeme: &'a str, span: Span, line: usize) -> Self {
        debug!(
            "Creating new token: type={:?}, lexeme={}, line={}",
            token_type, lexeme, line
        );

        Self {
            token_type,
            lexeme,
            span,
            line,
        }
    }
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 3 → "3.0", 3.14 → "3.14", everything else has no literal
        let literal: String = match &self.token_type {
            TokenType::NUMBER(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                let mut buf: itoa::Buffer = itoa::Buffer::new();
                format!("{}.0", buf.format(*n as i64))
            }

            TokenType::NUMBER(n) => n.to_string(),

            _ => "null".to_string(),
        };

        write!(f, "{} {} {}", self.token_type.name(), self.lexeme, literal)
    }
}
