//! Centralised error hierarchy for the **Space Lua interpreter**.
//!
//! All subsystems (scanner, CST parser, AST builder, evaluator, standard
//! library) convert their failure modes into one of the variants defined
//! here, giving a uniform `Result<T>` alias across the crate.
//!
//! Control flow (`break`, `return`) is *not* represented here; see
//! [`crate::interpreter::Flow`]. Protective calls therefore only ever see
//! genuine failures.
//!
//! The module **does not** print diagnostics itself; [`LuaError::pretty`]
//! renders a report the host may print.

use std::fmt::Write as _;
use std::io;

use log::info;
use thiserror::Error;

use crate::ast::Span;
use crate::frame::StackFrame;

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LuaError {
    /// Lexical (scanner) error.
    #[error("[{span}] Lex error: {message}")]
    Lex { message: String, span: Span },

    /// Syntactic error, raised either by the CST parser or by the AST builder
    /// when it meets a node shape it does not expect.
    #[error("[{span}] Parse error: {message}")]
    Parse {
        /// Human‑readable description.
        message: String,

        /// Byte range of the offending node.
        span: Span,
    },

    /// Runtime evaluation error. The message is shown verbatim to scripts
    /// through `pcall`.
    #[error("{message}")]
    Runtime {
        message: String,

        /// Call chain at the point of failure.
        frame: StackFrame,
    },

    /// Wrapper around `std::io::Error` (transparent).
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl LuaError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(span: Span, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: span={}, msg={}", span, message);

        LuaError::Lex { message, span }
    }

    /// Helper constructor for the **parser** and **builder**.
    pub fn parse<S: Into<String>>(span: Span, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: span={}, msg={}", span, message);

        LuaError::Parse { message, span }
    }

    /// Helper constructor for the **evaluator** and native functions.
    pub fn runtime<S: Into<String>>(frame: &StackFrame, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: msg={}", message);

        LuaError::Runtime {
            message,
            frame: frame.clone(),
        }
    }

    /// `true` for errors a protective call (`pcall`) may swallow.
    pub fn is_runtime(&self) -> bool {
        matches!(self, LuaError::Runtime { .. })
    }

    /// The bare message, without location decoration.
    pub fn message(&self) -> String {
        match self {
            LuaError::Lex { message, .. }
            | LuaError::Parse { message, .. }
            | LuaError::Runtime { message, .. } => message.clone(),

            other => other.to_string(),
        }
    }

    /// Render the error against `source` with `line:column` locations.
    ///
    /// Runtime errors list every frame of the call chain, innermost first,
    /// and underline the innermost location.
    pub fn pretty(&self, source: &str) -> String {
        let spans: Vec<Span> = match self {
            LuaError::Lex { span, .. } | LuaError::Parse { span, .. } => vec![*span],

            LuaError::Runtime { frame, .. } => frame.spans(),

            _ => Vec::new(),
        };

        let mut out = format!("Error: {}", self.message());

        if let Some(first) = spans.first() {
            let (line, col) = first.location(source);

            if let Some(text) = source.lines().nth(line - 1) {
                let _ = write!(out, "\n  {text}\n  {}^", " ".repeat(col - 1));
            }
        }

        for span in &spans {
            let (line, col) = span.location(source);
            let _ = write!(out, "\n    at {line}:{col}");
        }

        out
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LuaError>;
