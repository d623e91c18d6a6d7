//! Space Lua: a Lua dialect with an embedded collection-query expression.
//!
//! Source text goes through [`cst::strip_comments`], the [`scanner`] and the
//! [`parser`] into a generic [`cst::ParseTree`], which [`builder`] turns into
//! the typed [`ast`]. The [`interpreter`] walks that tree; host calls may
//! answer with pending values (see [`pending`]).

pub mod ast;
pub mod ast_printer;
pub mod builder;
pub mod cst;
pub mod environment;
pub mod error;
pub mod frame;
pub mod interpreter;
pub mod parser;
pub mod pending;
pub mod query;
pub mod scanner;
pub mod stdlib;
pub mod table;
pub mod token;
pub mod value;

use log::debug;

pub use error::{LuaError, Result};
pub use interpreter::Interpreter;
pub use value::Value;

/// Parse a chunk of source into its top-level block.
pub fn parse(source: &str) -> Result<ast::Block> {
    let stripped = cst::strip_comments(source);
    let tree = parser::Parser::new(scanner::Scanner::new(&stripped))?.parse_chunk()?;

    debug!("Parse tree has {} top-level nodes", tree.children.len());

    builder::build_chunk(&tree)
}

/// Parse source holding exactly one expression.
pub fn parse_expression(source: &str) -> Result<ast::Expr> {
    let stripped = cst::strip_comments(source);
    let tree = parser::Parser::new(scanner::Scanner::new(&stripped))?.parse_expression()?;

    builder::build_expression(&tree)
}
