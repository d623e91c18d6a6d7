//! Typed abstract syntax tree.
//!
//! Nodes are immutable once built. Function bodies sit behind `Rc` so that
//! closures can share them with the tree that produced them. Every node
//! carries a [`Span`] used only for error attribution.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

/// Byte range in the source text.
///
/// Spans are attribution metadata: two spans always compare equal so that
/// structurally identical trees parsed from different text are equal.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Span {
    pub from: usize,
    pub to: usize,
}

impl Span {
    pub fn new(from: usize, to: usize) -> Self {
        Span { from, to }
    }

    /// 1-based `(line, column)` of `from` within `source`.
    pub fn location(&self, source: &str) -> (usize, usize) {
        let upto = &source.as_bytes()[..self.from.min(source.len())];
        let line = upto.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = upto.iter().rposition(|&b| b == b'\n').map_or(0, |p| p + 1);

        (line, self.from.min(source.len()) - line_start + 1)
    }
}

impl PartialEq for Span {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

// ── statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    /// Empty statement `;`
    Semicolon { span: Span },

    /// `::name::`
    Label { name: String, span: Span },

    Break { span: Span },

    Goto { name: String, span: Span },

    /// `do ... end`
    Block(Block),

    While {
        condition: Expr,
        block: Block,
        span: Span,
    },

    /// `repeat block until condition`; the condition sees the block's locals.
    Repeat {
        block: Block,
        condition: Expr,
        span: Span,
    },

    /// `if`/`elseif` chain as ordered (condition, block) pairs.
    If {
        conditions: Vec<IfClause>,
        else_block: Option<Block>,
        span: Span,
    },

    /// Numeric `for name = start, end [, step]`
    For {
        name: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        block: Block,
        span: Span,
    },

    /// Generic `for names in expressions`
    ForIn {
        names: Vec<String>,
        expressions: Vec<Expr>,
        block: Block,
        span: Span,
    },

    /// `function a.b:c() ... end`
    Function {
        name: FunctionName,
        body: Rc<FunctionBody>,
        span: Span,
    },

    LocalFunction {
        name: String,
        body: Rc<FunctionBody>,
        span: Span,
    },

    Assignment {
        variables: Vec<LValue>,
        expressions: Vec<Expr>,
        span: Span,
    },

    Local {
        names: Vec<AttName>,
        expressions: Vec<Expr>,
        span: Span,
    },

    Return { expressions: Vec<Expr>, span: Span },

    FunctionCall { call: FunctionCall, span: Span },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block(block) => block.span,

            Stmt::Semicolon { span }
            | Stmt::Label { span, .. }
            | Stmt::Break { span }
            | Stmt::Goto { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Repeat { span, .. }
            | Stmt::If { span, .. }
            | Stmt::For { span, .. }
            | Stmt::ForIn { span, .. }
            | Stmt::Function { span, .. }
            | Stmt::LocalFunction { span, .. }
            | Stmt::Assignment { span, .. }
            | Stmt::Local { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::FunctionCall { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfClause {
    pub condition: Expr,
    pub block: Block,
}

/// Dotted function name with an optional method part: `a.b.c:d`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionName {
    pub prop_names: Vec<String>,
    pub colon_name: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionBody {
    pub parameters: Vec<String>,

    /// Trailing `...` parameter.
    pub varargs: bool,
    pub block: Block,
    pub span: Span,
}

/// Assignable place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LValue {
    Variable {
        name: String,
        span: Span,
    },

    PropertyAccess {
        object: Expr,
        property: String,
        span: Span,
    },

    TableAccess {
        object: Expr,
        key: Expr,
        span: Span,
    },
}

impl LValue {
    pub fn span(&self) -> Span {
        match self {
            LValue::Variable { span, .. }
            | LValue::PropertyAccess { span, .. }
            | LValue::TableAccess { span, .. } => *span,
        }
    }
}

/// Attribute of a `local` name. Both kinds make the binding read-only;
/// `close` also runs the value's `__close` metamethod when its block exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Attribute {
    Const,
    Close,
}

impl Attribute {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "const" => Some(Attribute::Const),
            "close" => Some(Attribute::Close),
            _ => None,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Const => write!(f, "const"),
            Attribute::Close => write!(f, "close"),
        }
    }
}

/// `name <attribute>` in a `local` declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttName {
    pub name: String,
    pub attribute: Option<Attribute>,
    pub span: Span,
}

// ── expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NumberKind {
    /// Plain numeric literal (`3`, `0xff`).
    Int,

    /// Literal written with a fraction or exponent (`3.0`, `1e3`).
    Float,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub prefix: Box<Expr>,

    /// Method name for `prefix:name(args)`.
    pub name: Option<String>,
    pub args: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Nil {
        span: Span,
    },

    Boolean {
        value: bool,
        span: Span,
    },

    Number {
        value: f64,
        kind: NumberKind,
        span: Span,
    },

    /// Decoded string literal.
    String {
        value: String,
        span: Span,
    },

    Variable {
        name: String,
        span: Span,
    },

    /// `...`
    Vararg {
        span: Span,
    },

    /// `( expression )`, truncates multiple results to one.
    Parenthesized {
        expression: Box<Expr>,
        span: Span,
    },

    PropertyAccess {
        object: Box<Expr>,
        property: String,
        span: Span,
    },

    TableAccess {
        object: Box<Expr>,
        key: Box<Expr>,
        span: Span,
    },

    FunctionCall(FunctionCall),

    Binary {
        operator: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },

    Unary {
        operator: UnaryOp,
        argument: Box<Expr>,
        span: Span,
    },

    TableConstructor {
        fields: Vec<TableField>,
        span: Span,
    },

    FunctionDefinition {
        body: Rc<FunctionBody>,
        span: Span,
    },

    /// `query [[ clauses ]]`
    Query {
        clauses: Vec<QueryClause>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::FunctionCall(call) => call.span,

            Expr::Nil { span }
            | Expr::Boolean { span, .. }
            | Expr::Number { span, .. }
            | Expr::String { span, .. }
            | Expr::Variable { span, .. }
            | Expr::Vararg { span }
            | Expr::Parenthesized { span, .. }
            | Expr::PropertyAccess { span, .. }
            | Expr::TableAccess { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::TableConstructor { span, .. }
            | Expr::FunctionDefinition { span, .. }
            | Expr::Query { span, .. } => *span,
        }
    }

    /// Expressions that may produce several values when last in a list.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Expr::FunctionCall(_) | Expr::Vararg { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TableField {
    /// `value`, keyed by the next array index
    Positional { value: Expr, span: Span },

    /// `name = value`
    Property {
        key: String,
        value: Expr,
        span: Span,
    },

    /// `[key] = value`
    Dynamic { key: Expr, value: Expr, span: Span },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryClause {
    From {
        name: Option<String>,
        expression: Expr,
        span: Span,
    },

    Where {
        expression: Expr,
        span: Span,
    },

    OrderBy {
        orderings: Vec<Ordering>,
        span: Span,
    },

    Limit {
        limit: Expr,
        offset: Option<Expr>,
        span: Span,
    },

    Select {
        expression: Expr,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ordering {
    pub expression: Expr,
    pub descending: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::IDiv,
            "%" => BinaryOp::Mod,
            "^" => BinaryOp::Pow,
            ".." => BinaryOp::Concat,
            "==" => BinaryOp::Eq,
            "~=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "&" => BinaryOp::BAnd,
            "|" => BinaryOp::BOr,
            "~" => BinaryOp::BXor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            _ => return None,
        };

        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "..",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "~=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::BAnd => "&",
            BinaryOp::BOr => "|",
            BinaryOp::BXor => "~",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    /// `-`
    Neg,

    /// `not`
    Not,

    /// `#`
    Len,

    /// `~`
    BNot,
}

impl UnaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "-" => Some(UnaryOp::Neg),
            "not" => Some(UnaryOp::Not),
            "#" => Some(UnaryOp::Len),
            "~" => Some(UnaryOp::BNot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
            UnaryOp::Len => "#",
            UnaryOp::BNot => "~",
        }
    }
}
