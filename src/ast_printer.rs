use std::fmt::Write as _;

use crate::ast::{
    Block, Expr, FunctionBody, FunctionCall, LValue, NumberKind, QueryClause, Stmt, TableField,
};

/// Renders an AST back to Space Lua source.
///
/// Binary and unary operations are always parenthesised so the rendered text
/// parses back to the same tree regardless of precedence.
pub struct AstPrinter;

impl AstPrinter {
    pub fn print(expr: &Expr) -> String {
        match expr {
            // ── literals ────────────────────────────────────────────────
            Expr::Nil { .. } => "nil".into(),

            Expr::Boolean { value, .. } => value.to_string(),

            Expr::Number { value, kind, .. } => Self::number(*value, *kind),

            Expr::String { value, .. } => Self::quote(value),

            Expr::Vararg { .. } => "...".into(),

            Expr::Variable { name, .. } => name.clone(),

            // ── access / call ───────────────────────────────────────────
            Expr::Parenthesized { expression, .. } => format!("({})", Self::print(expression)),

            Expr::PropertyAccess {
                object, property, ..
            } => format!("{}.{}", Self::prefix(object), property),

            Expr::TableAccess { object, key, .. } => {
                format!("{}[{}]", Self::prefix(object), Self::print(key))
            }

            Expr::FunctionCall(call) => Self::call(call),

            // ── operators ───────────────────────────────────────────────
            Expr::Binary {
                operator,
                left,
                right,
                ..
            } => format!(
                "({} {} {})",
                Self::print(left),
                operator.as_str(),
                Self::print(right)
            ),

            Expr::Unary {
                operator, argument, ..
            } => {
                let separator = if operator.as_str() == "not" { " " } else { "" };

                format!(
                    "({}{}{})",
                    operator.as_str(),
                    separator,
                    Self::print(argument)
                )
            }

            // ── constructors ────────────────────────────────────────────
            Expr::TableConstructor { fields, .. } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|field| match field {
                        TableField::Positional { value, .. } => Self::print(value),

                        TableField::Property { key, value, .. } => {
                            format!("{} = {}", key, Self::print(value))
                        }

                        TableField::Dynamic { key, value, .. } => {
                            format!("[{}] = {}", Self::print(key), Self::print(value))
                        }
                    })
                    .collect();

                format!("{{{}}}", fields.join(", "))
            }

            Expr::FunctionDefinition { body, .. } => {
                let mut out = String::from("function");
                Self::function_body(&mut out, body, 0, false);
                out
            }

            Expr::Query { clauses, .. } => {
                let clauses: Vec<String> = clauses.iter().map(Self::query_clause).collect();

                format!("query [[{} ]]", clauses.join(" "))
            }
        }
    }

    /// Render a block as a sequence of lines.
    pub fn print_block(block: &Block) -> String {
        let mut out = String::new();
        Self::block(&mut out, block, 0);
        out
    }

    // ── helpers ─────────────────────────────────────────────────────────────

    fn number(value: f64, kind: NumberKind) -> String {
        let integral = value.fract() == 0.0 && value.abs() < 1e15;

        match (kind, integral) {
            (NumberKind::Int, true) => itoa::Buffer::new().format(value as i64).to_string(),

            (NumberKind::Float, true) => {
                format!("{}.0", itoa::Buffer::new().format(value as i64))
            }

            (NumberKind::Int, false) => format!("{:.0}", value),

            (NumberKind::Float, false) if value.fract() == 0.0 => format!("{:e}", value),

            _ => value.to_string(),
        }
    }

    pub fn quote(value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');

        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    let _ = write!(out, "\\u{{{:x}}}", c as u32);
                }
                c => out.push(c),
            }
        }

        out.push('"');
        out
    }

    /// Objects of an access or call must be prefix expressions.
    fn prefix(expr: &Expr) -> String {
        match expr {
            Expr::Variable { .. }
            | Expr::PropertyAccess { .. }
            | Expr::TableAccess { .. }
            | Expr::FunctionCall(_)
            | Expr::Parenthesized { .. } => Self::print(expr),

            _ => format!("({})", Self::print(expr)),
        }
    }

    fn call(call: &FunctionCall) -> String {
        let args: Vec<String> = call.args.iter().map(Self::print).collect();

        match &call.name {
            Some(name) => format!("{}:{}({})", Self::prefix(&call.prefix), name, args.join(", ")),

            None => format!("{}({})", Self::prefix(&call.prefix), args.join(", ")),
        }
    }

    fn list(expressions: &[Expr]) -> String {
        expressions
            .iter()
            .map(Self::print)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn query_clause(clause: &QueryClause) -> String {
        match clause {
            QueryClause::From {
                name: Some(name),
                expression,
                ..
            } => format!("from {} = {}", name, Self::print(expression)),

            QueryClause::From { expression, .. } => format!("from {}", Self::print(expression)),

            QueryClause::Where { expression, .. } => format!("where {}", Self::print(expression)),

            QueryClause::OrderBy { orderings, .. } => {
                let orderings: Vec<String> = orderings
                    .iter()
                    .map(|o| {
                        if o.descending {
                            format!("{} desc", Self::print(&o.expression))
                        } else {
                            Self::print(&o.expression)
                        }
                    })
                    .collect();

                format!("order by {}", orderings.join(", "))
            }

            QueryClause::Limit {
                limit,
                offset: Some(offset),
                ..
            } => format!("limit {}, {}", Self::print(limit), Self::print(offset)),

            QueryClause::Limit { limit, .. } => format!("limit {}", Self::print(limit)),

            QueryClause::Select { expression, .. } => format!("select {}", Self::print(expression)),
        }
    }

    fn lvalue(lvalue: &LValue) -> String {
        match lvalue {
            LValue::Variable { name, .. } => name.clone(),

            LValue::PropertyAccess {
                object, property, ..
            } => format!("{}.{}", Self::prefix(object), property),

            LValue::TableAccess { object, key, .. } => {
                format!("{}[{}]", Self::prefix(object), Self::print(key))
            }
        }
    }

    fn function_body(out: &mut String, body: &FunctionBody, depth: usize, method: bool) {
        let skip = usize::from(method);
        let mut parameters: Vec<&str> = body.parameters.iter().skip(skip).map(String::as_str).collect();

        if body.varargs {
            parameters.push("...");
        }

        let _ = writeln!(out, "({})", parameters.join(", "));
        Self::block(out, &body.block, depth + 1);
        let _ = write!(out, "{}end", "  ".repeat(depth));
    }

    fn block(out: &mut String, block: &Block, depth: usize) {
        for stmt in &block.statements {
            out.push_str(&"  ".repeat(depth));
            Self::statement(out, stmt, depth);
            out.push('\n');
        }
    }

    fn statement(out: &mut String, stmt: &Stmt, depth: usize) {
        let indent = "  ".repeat(depth);

        match stmt {
            Stmt::Semicolon { .. } => out.push(';'),

            Stmt::Label { name, .. } => {
                let _ = write!(out, "::{}::", name);
            }

            Stmt::Break { .. } => out.push_str("break"),

            Stmt::Goto { name, .. } => {
                let _ = write!(out, "goto {}", name);
            }

            Stmt::Block(block) => {
                out.push_str("do\n");
                Self::block(out, block, depth + 1);
                let _ = write!(out, "{}end", indent);
            }

            Stmt::While {
                condition, block, ..
            } => {
                let _ = writeln!(out, "while {} do", Self::print(condition));
                Self::block(out, block, depth + 1);
                let _ = write!(out, "{}end", indent);
            }

            Stmt::Repeat {
                block, condition, ..
            } => {
                out.push_str("repeat\n");
                Self::block(out, block, depth + 1);
                let _ = write!(out, "{}until {}", indent, Self::print(condition));
            }

            Stmt::If {
                conditions,
                else_block,
                ..
            } => {
                for (i, clause) in conditions.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "elseif" };

                    if i > 0 {
                        out.push_str(&indent);
                    }

                    let _ = writeln!(out, "{} {} then", keyword, Self::print(&clause.condition));
                    Self::block(out, &clause.block, depth + 1);
                }

                if let Some(block) = else_block {
                    let _ = writeln!(out, "{}else", indent);
                    Self::block(out, block, depth + 1);
                }

                let _ = write!(out, "{}end", indent);
            }

            Stmt::For {
                name,
                start,
                end,
                step,
                block,
                ..
            } => {
                let _ = write!(out, "for {} = {}, {}", name, Self::print(start), Self::print(end));

                if let Some(step) = step {
                    let _ = write!(out, ", {}", Self::print(step));
                }

                out.push_str(" do\n");
                Self::block(out, block, depth + 1);
                let _ = write!(out, "{}end", indent);
            }

            Stmt::ForIn {
                names,
                expressions,
                block,
                ..
            } => {
                let _ = writeln!(out, "for {} in {} do", names.join(", "), Self::list(expressions));
                Self::block(out, block, depth + 1);
                let _ = write!(out, "{}end", indent);
            }

            Stmt::Function { name, body, .. } => {
                let _ = write!(out, "function {}", name.prop_names.join("."));

                if let Some(method) = &name.colon_name {
                    let _ = write!(out, ":{}", method);
                }

                Self::function_body(out, body, depth, name.colon_name.is_some());
            }

            Stmt::LocalFunction { name, body, .. } => {
                let _ = write!(out, "local function {}", name);
                Self::function_body(out, body, depth, false);
            }

            Stmt::Assignment {
                variables,
                expressions,
                ..
            } => {
                let variables: Vec<String> = variables.iter().map(Self::lvalue).collect();
                let _ = write!(out, "{} = {}", variables.join(", "), Self::list(expressions));
            }

            Stmt::Local {
                names, expressions, ..
            } => {
                let names: Vec<String> = names
                    .iter()
                    .map(|n| match &n.attribute {
                        Some(attribute) => format!("{} <{}>", n.name, attribute),

                        None => n.name.clone(),
                    })
                    .collect();

                let _ = write!(out, "local {}", names.join(", "));

                if !expressions.is_empty() {
                    let _ = write!(out, " = {}", Self::list(expressions));
                }
            }

            Stmt::Return { expressions, .. } => {
                out.push_str("return");

                if !expressions.is_empty() {
                    let _ = write!(out, " {}", Self::list(expressions));
                }
            }

            Stmt::FunctionCall { call, .. } => out.push_str(&Self::call(call)),
        }
    }
}
