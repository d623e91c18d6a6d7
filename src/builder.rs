//! Conversion of the generic [`ParseTree`] into the typed AST.
//!
//! Every function here matches on node type tags and child positions only.
//! Any shape it does not expect is reported as a parse error naming the
//! offending node type and span; a failure never yields a partial tree.
//!
//! Literal resolution also happens here: numbers become `f64` with an
//! integer/float tag, quoted strings are unescaped and long-bracket strings
//! are taken verbatim.

use std::rc::Rc;

use log::debug;

use crate::ast::{
    AttName, Attribute, BinaryOp, Block, Expr, FunctionBody, FunctionCall, FunctionName, IfClause, LValue,
    NumberKind, Ordering, QueryClause, Stmt, TableField, UnaryOp,
};
use crate::cst::ParseTree;
use crate::error::{LuaError, Result};

/// Punctuation leaves that carry no meaning once the tree is typed.
const SEPARATORS: [&str; 8] = [",", ";", "(", ")", "{", "}", "[", "]"];

fn unexpected(node: &ParseTree) -> LuaError {
    debug!("Unexpected node {} at {}", node.node_type, node.span());

    LuaError::parse(
        node.span(),
        format!("unexpected node type '{}'", node.node_type),
    )
}

fn child(node: &ParseTree, index: usize) -> Result<&ParseTree> {
    node.children.get(index).ok_or_else(|| unexpected(node))
}

/// Children with separators filtered out.
fn significant(node: &ParseTree) -> impl Iterator<Item = &ParseTree> {
    node.children
        .iter()
        .filter(|c| !SEPARATORS.contains(&c.node_type.as_str()))
}

fn expect<'t>(node: &'t ParseTree, node_type: &str) -> Result<&'t ParseTree> {
    if node.is(node_type) {
        Ok(node)
    } else {
        Err(unexpected(node))
    }
}

fn name_of(node: &ParseTree) -> Result<String> {
    Ok(expect(node, "Name")?.text().to_string())
}

// ── statements ──────────────────────────────────────────────────────────────

/// Build the top-level block of a `Chunk`.
pub fn build_chunk(node: &ParseTree) -> Result<Block> {
    debug!("Building chunk");

    build_block(child(expect(node, "Chunk")?, 0)?)
}

pub fn build_block(node: &ParseTree) -> Result<Block> {
    let node = expect(node, "Block")?;

    let statements = node
        .children
        .iter()
        .map(build_statement)
        .collect::<Result<Vec<_>>>()?;

    Ok(Block {
        statements,
        span: node.span(),
    })
}

pub fn build_statement(node: &ParseTree) -> Result<Stmt> {
    let span = node.span();

    let stmt = match node.node_type.as_str() {
        ";" => Stmt::Semicolon { span },

        "Label" => Stmt::Label {
            name: name_of(child(node, 1)?)?,
            span,
        },

        "Break" => Stmt::Break { span },

        "Goto" => Stmt::Goto {
            name: name_of(child(node, 1)?)?,
            span,
        },

        "Scope" => Stmt::Block(build_block(child(node, 1)?)?),

        "WhileStatement" => Stmt::While {
            condition: build_expression(child(node, 1)?)?,
            block: build_block(child(node, 3)?)?,
            span,
        },

        "RepeatStatement" => Stmt::Repeat {
            block: build_block(child(node, 1)?)?,
            condition: build_expression(child(node, 3)?)?,
            span,
        },

        "IfStatement" => build_if(node)?,

        "ForStatement" => build_for(node)?,

        "Function" => {
            let name = build_function_name(child(node, 1)?)?;
            let mut body = build_function_body(child(node, 2)?)?;

            if name.colon_name.is_some() {
                body.parameters.insert(0, "self".to_string());
            }

            Stmt::Function {
                name,
                body: Rc::new(body),
                span,
            }
        }

        "LocalFunction" => Stmt::LocalFunction {
            name: name_of(child(node, 2)?)?,
            body: Rc::new(build_function_body(child(node, 3)?)?),
            span,
        },

        "Local" => {
            let names = significant(expect(child(node, 1)?, "AttNameList")?)
                .map(build_attribute_name)
                .collect::<Result<Vec<_>>>()?;

            let closing = names.iter().filter(|n| n.attribute == Some(Attribute::Close)).count();

            if closing > 1 {
                return Err(LuaError::parse(span, "multiple <close> variables in local list"));
            }

            let expressions = match node.children.get(3) {
                Some(list) => build_expression_list(list)?,

                None => Vec::new(),
            };

            Stmt::Local {
                names,
                expressions,
                span,
            }
        }

        "Assign" => {
            let variables = significant(expect(child(node, 0)?, "VarList")?)
                .map(build_lvalue)
                .collect::<Result<Vec<_>>>()?;

            Stmt::Assignment {
                variables,
                expressions: build_expression_list(child(node, 2)?)?,
                span,
            }
        }

        "ReturnStatement" => {
            let expressions = match node.children.get(1) {
                Some(list) if list.is("ExpList") => build_expression_list(list)?,

                _ => Vec::new(),
            };

            Stmt::Return { expressions, span }
        }

        "FunctionCall" => Stmt::FunctionCall {
            call: build_call(node)?,
            span,
        },

        _ => return Err(unexpected(node)),
    };

    Ok(stmt)
}

/// `if c then b {elseif c then b} [else b] end` as a flat child list.
fn build_if(node: &ParseTree) -> Result<Stmt> {
    let mut conditions = Vec::new();
    let mut else_block = None;
    let mut i = 0;

    loop {
        let marker = child(node, i)?;

        match marker.node_type.as_str() {
            "if" | "elseif" => {
                conditions.push(IfClause {
                    condition: build_expression(child(node, i + 1)?)?,
                    block: build_block(child(node, i + 3)?)?,
                });
                i += 4;
            }

            "else" => {
                else_block = Some(build_block(child(node, i + 1)?)?);
                i += 2;
            }

            "end" => break,

            _ => return Err(unexpected(marker)),
        }
    }

    Ok(Stmt::If {
        conditions,
        else_block,
        span: node.span(),
    })
}

fn build_for(node: &ParseTree) -> Result<Stmt> {
    let head = child(node, 1)?;
    let block = build_block(child(node, 3)?)?;
    let span = node.span();

    match head.node_type.as_str() {
        "ForNumeric" => Ok(Stmt::For {
            name: name_of(child(head, 0)?)?,
            start: build_expression(child(head, 2)?)?,
            end: build_expression(child(head, 4)?)?,
            step: head.children.get(6).map(build_expression).transpose()?,
            block,
            span,
        }),

        "ForGeneric" => Ok(Stmt::ForIn {
            names: significant(expect(child(head, 0)?, "NameList")?)
                .map(name_of)
                .collect::<Result<Vec<_>>>()?,
            expressions: build_expression_list(child(head, 2)?)?,
            block,
            span,
        }),

        _ => Err(unexpected(head)),
    }
}

fn build_function_name(node: &ParseTree) -> Result<FunctionName> {
    let node = expect(node, "FuncName")?;
    let mut prop_names = Vec::new();
    let mut colon_name = None;
    let mut after_colon = false;

    for part in &node.children {
        match part.node_type.as_str() {
            "." => {}

            ":" => after_colon = true,

            "Name" if after_colon => colon_name = Some(part.text().to_string()),

            "Name" => prop_names.push(part.text().to_string()),

            _ => return Err(unexpected(part)),
        }
    }

    Ok(FunctionName {
        prop_names,
        colon_name,
        span: node.span(),
    })
}

fn build_function_body(node: &ParseTree) -> Result<FunctionBody> {
    let node = expect(node, "FuncBody")?;
    let mut parameters = Vec::new();
    let mut varargs = false;

    for parameter in significant(expect(child(node, 1)?, "ParamList")?) {
        match parameter.node_type.as_str() {
            "Name" => parameters.push(parameter.text().to_string()),

            "Ellipsis" => varargs = true,

            _ => return Err(unexpected(parameter)),
        }
    }

    Ok(FunctionBody {
        parameters,
        varargs,
        block: build_block(child(node, 3)?)?,
        span: node.span(),
    })
}

fn build_attribute_name(node: &ParseTree) -> Result<AttName> {
    let node = expect(node, "AttName")?;
    let attribute = match child(node, 1)?.children.get(1) {
        Some(word) => {
            let word = name_of(word)?;

            Some(Attribute::from_name(&word).ok_or_else(|| {
                LuaError::parse(node.span(), format!("unknown attribute '{}'", word))
            })?)
        }

        None => None,
    };

    Ok(AttName {
        name: name_of(child(node, 0)?)?,
        attribute,
        span: node.span(),
    })
}

fn build_lvalue(node: &ParseTree) -> Result<LValue> {
    let span = node.span();

    match node.node_type.as_str() {
        "Name" => Ok(LValue::Variable {
            name: node.text().to_string(),
            span,
        }),

        "Property" => Ok(LValue::PropertyAccess {
            object: build_expression(child(node, 0)?)?,
            property: name_of(child(node, 2)?)?,
            span,
        }),

        "MemberExpression" => Ok(LValue::TableAccess {
            object: build_expression(child(node, 0)?)?,
            key: build_expression(child(node, 2)?)?,
            span,
        }),

        _ => Err(unexpected(node)),
    }
}

// ── expressions ─────────────────────────────────────────────────────────────

fn build_expression_list(node: &ParseTree) -> Result<Vec<Expr>> {
    significant(expect(node, "ExpList")?)
        .map(build_expression)
        .collect()
}

pub fn build_expression(node: &ParseTree) -> Result<Expr> {
    let span = node.span();

    let expr = match node.node_type.as_str() {
        "nil" => Expr::Nil { span },

        "true" => Expr::Boolean { value: true, span },

        "false" => Expr::Boolean { value: false, span },

        "Ellipsis" => Expr::Vararg { span },

        "Number" => {
            let (value, kind) = parse_number(node)?;

            Expr::Number { value, kind, span }
        }

        "LiteralString" => Expr::String {
            value: decode_string(node)?,
            span,
        },

        "Name" => Expr::Variable {
            name: node.text().to_string(),
            span,
        },

        "BinaryExpression" => {
            let operator_node = child(node, 1)?;
            let operator = BinaryOp::from_symbol(&operator_node.node_type)
                .ok_or_else(|| unexpected(operator_node))?;

            Expr::Binary {
                operator,
                left: Box::new(build_expression(child(node, 0)?)?),
                right: Box::new(build_expression(child(node, 2)?)?),
                span,
            }
        }

        "UnaryExpression" => {
            let operator_node = child(node, 0)?;
            let operator = UnaryOp::from_symbol(&operator_node.node_type)
                .ok_or_else(|| unexpected(operator_node))?;

            Expr::Unary {
                operator,
                argument: Box::new(build_expression(child(node, 1)?)?),
                span,
            }
        }

        // Only multi-valued expressions observe their parentheses.
        "Parens" => {
            let inner = build_expression(child(node, 1)?)?;

            if inner.is_multi_valued() {
                Expr::Parenthesized {
                    expression: Box::new(inner),
                    span,
                }
            } else {
                inner
            }
        }

        "Property" => Expr::PropertyAccess {
            object: Box::new(build_expression(child(node, 0)?)?),
            property: name_of(child(node, 2)?)?,
            span,
        },

        "MemberExpression" => Expr::TableAccess {
            object: Box::new(build_expression(child(node, 0)?)?),
            key: Box::new(build_expression(child(node, 2)?)?),
            span,
        },

        "FunctionCall" => Expr::FunctionCall(build_call(node)?),

        "TableConstructor" => Expr::TableConstructor {
            fields: significant(node)
                .map(build_field)
                .collect::<Result<Vec<_>>>()?,
            span,
        },

        "FunctionDef" => Expr::FunctionDefinition {
            body: Rc::new(build_function_body(child(node, 1)?)?),
            span,
        },

        "Query" => Expr::Query {
            clauses: node
                .children
                .iter()
                .filter(|c| c.is("QueryClause"))
                .map(|c| build_query_clause(child(c, 0)?))
                .collect::<Result<Vec<_>>>()?,
            span,
        },

        _ => return Err(unexpected(node)),
    };

    Ok(expr)
}

fn build_call(node: &ParseTree) -> Result<FunctionCall> {
    let prefix = Box::new(build_expression(child(node, 0)?)?);

    let (name, args) = if child(node, 1)?.is(":") {
        (Some(name_of(child(node, 2)?)?), child(node, 3)?)
    } else {
        (None, child(node, 1)?)
    };

    let args = significant(expect(args, "Args")?)
        .map(build_expression)
        .collect::<Result<Vec<_>>>()?;

    Ok(FunctionCall {
        prefix,
        name,
        args,
        span: node.span(),
    })
}

fn build_field(node: &ParseTree) -> Result<TableField> {
    let span = node.span();

    match node.node_type.as_str() {
        "FieldExp" => Ok(TableField::Positional {
            value: build_expression(child(node, 0)?)?,
            span,
        }),

        "FieldProp" => Ok(TableField::Property {
            key: name_of(child(node, 0)?)?,
            value: build_expression(child(node, 2)?)?,
            span,
        }),

        "FieldDynamic" => Ok(TableField::Dynamic {
            key: build_expression(child(node, 1)?)?,
            value: build_expression(child(node, 4)?)?,
            span,
        }),

        _ => Err(unexpected(node)),
    }
}

fn build_query_clause(node: &ParseTree) -> Result<QueryClause> {
    let span = node.span();

    match node.node_type.as_str() {
        "FromClause" if node.children.len() == 4 => Ok(QueryClause::From {
            name: Some(name_of(child(node, 1)?)?),
            expression: build_expression(child(node, 3)?)?,
            span,
        }),

        "FromClause" => Ok(QueryClause::From {
            name: None,
            expression: build_expression(child(node, 1)?)?,
            span,
        }),

        "WhereClause" => Ok(QueryClause::Where {
            expression: build_expression(child(node, 1)?)?,
            span,
        }),

        "OrderByClause" => Ok(QueryClause::OrderBy {
            orderings: node
                .children
                .iter()
                .filter(|c| c.is("OrderBy"))
                .map(build_ordering)
                .collect::<Result<Vec<_>>>()?,
            span,
        }),

        "LimitClause" => Ok(QueryClause::Limit {
            limit: build_expression(child(node, 1)?)?,
            offset: node.children.get(3).map(build_expression).transpose()?,
            span,
        }),

        "SelectClause" => Ok(QueryClause::Select {
            expression: build_expression(child(node, 1)?)?,
            span,
        }),

        _ => Err(unexpected(node)),
    }
}

fn build_ordering(node: &ParseTree) -> Result<Ordering> {
    Ok(Ordering {
        expression: build_expression(child(node, 0)?)?,
        descending: node.children.get(1).is_some_and(|d| d.is("desc")),
        span: node.span(),
    })
}

// ── literals ────────────────────────────────────────────────────────────────

fn parse_number(node: &ParseTree) -> Result<(f64, NumberKind)> {
    let text = node.text();

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        let value = u64::from_str_radix(hex, 16).map_err(|_| unexpected(node))?;

        return Ok((value as i64 as f64, NumberKind::Int));
    }

    let value: f64 = text.parse().map_err(|_| unexpected(node))?;
    let kind = if text.contains(['.', 'e', 'E']) {
        NumberKind::Float
    } else {
        NumberKind::Int
    };

    Ok((value, kind))
}

/// Decode a raw string token: quoted strings are unescaped, long-bracket
/// strings are taken verbatim minus a leading newline.
fn decode_string(node: &ParseTree) -> Result<String> {
    let raw = node.text();

    if raw.starts_with('[') {
        let level = raw[1..].bytes().take_while(|&b| b == b'=').count();
        let open = level + 2;

        if raw.len() < open * 2 {
            return Err(unexpected(node));
        }

        let body = &raw[open..raw.len() - open];
        let body = body
            .strip_prefix("\r\n")
            .or_else(|| body.strip_prefix('\n'))
            .unwrap_or(body);

        return Ok(body.to_string());
    }

    if raw.len() < 2 {
        return Err(unexpected(node));
    }

    unescape(&raw[1..raw.len() - 1]).ok_or_else(|| {
        LuaError::parse(node.span(), format!("invalid escape sequence in {}", raw))
    })
}

fn unescape(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next()? {
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'n' | '\n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0b}'),

            'x' => {
                let hex: String = (0..2).filter_map(|_| chars.next()).collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }

            'u' => {
                if chars.next()? != '{' {
                    return None;
                }

                let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }

            // skip following whitespace
            'z' => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
            }

            d if d.is_ascii_digit() => {
                let mut code = d.to_digit(10)?;

                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(10)) {
                        Some(digit) => {
                            code = code * 10 + digit;
                            chars.next();
                        }

                        None => break,
                    }
                }

                out.push(char::from_u32(code)?);
            }

            other => out.push(other),
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::unescape;

    #[test]
    fn unescapes_standard_sequences() {
        assert_eq!(
            unescape(r#"a\tb\n\"q\" \\ \x41\u{263A}\65"#).as_deref(),
            Some("a\tb\n\"q\" \\ A\u{263A}A")
        );
    }

    #[test]
    fn rejects_truncated_hex() {
        assert_eq!(unescape(r"\xZZ"), None);
    }
}
