//! Runtime values.
//!
//! [`Value`] is a tagged union over every Lua value plus the multi-result
//! wrapper used for multiple returns. Tables, functions and host objects are
//! reference types compared by identity; numbers compare numerically across
//! the default and the tagged-float subtype.

use std::fmt;
use std::rc::Rc;

use log::debug;
use serde_json::json;

use crate::ast::FunctionBody;
use crate::environment::EnvRef;
use crate::error::Result;
use crate::frame::StackFrame;
use crate::pending::Eval;
use crate::query::QueryCollection;
use crate::table::{Table, TableRef};

/// Object supplied by the embedding host.
pub trait HostObject: fmt::Debug {
    fn type_name(&self) -> &str {
        "userdata"
    }

    /// Keyed read access, `None` when the key is absent.
    fn get(&self, _key: &Value) -> Option<Value> {
        None
    }

    /// Query-source view used by `from` clauses.
    fn as_collection(&self) -> Option<&dyn QueryCollection> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),

    /// Default numeric subtype; integral values render without a fraction.
    Number(f64),

    /// Tagged float; always renders with a fractional part.
    Float(f64),
    String(String),
    Table(TableRef),
    Function(Callable),
    Userdata(Rc<dyn HostObject>),

    /// Multiple results of a call or `...`.
    Multi(Vec<Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn table(table: Table) -> Self {
        Value::Table(TableRef::new(table))
    }

    /// Pack call results: none is an empty multi-result, one is itself.
    pub fn from_results(mut values: Vec<Value>) -> Self {
        if values.len() == 1 {
            values.pop().unwrap_or_default()
        } else {
            Value::Multi(values)
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil | Value::Bool(false) => false,

            Value::Multi(values) => values.first().is_some_and(Value::is_truthy),

            _ => true,
        }
    }

    /// First value of a multi-result; other values unchanged.
    pub fn single(self) -> Value {
        match self {
            Value::Multi(values) => values.into_iter().next().unwrap_or_default(),

            value => value,
        }
    }

    /// Spread a multi-result into its values.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Value::Multi(values) => values,

            value => vec![value],
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Userdata(object) => object.type_name(),
            Value::Multi(values) => values.first().map_or("nil", Value::type_name),
        }
    }

    /// Numeric payload without coercion.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) | Value::Float(n) => Some(*n),

            _ => None,
        }
    }

    /// Numeric value with string coercion (`"10"`, `" 0x1F "`).
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) | Value::Float(n) => Some(*n),

            Value::String(s) => parse_number(s),

            _ => None,
        }
    }

    /// Integral numeric value.
    pub fn to_integer(&self) -> Option<i64> {
        self.to_number()
            .filter(|n| n.fract() == 0.0 && n.is_finite())
            .map(|n| n as i64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),

            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),

            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Function(f) => Some(f),

            _ => None,
        }
    }

    // ── host conversion ─────────────────────────────────────────────────────

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Nil,

            serde_json::Value::Bool(b) => Value::Bool(*b),

            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),

            serde_json::Value::String(s) => Value::String(s.clone()),

            serde_json::Value::Array(items) => {
                Value::Table(TableRef::from_values(items.iter().map(Value::from_json).collect()))
            }

            serde_json::Value::Object(entries) => {
                let mut table = Table::new();

                for (key, value) in entries {
                    table.set_str(key.clone(), Value::from_json(value));
                }

                Value::table(table)
            }
        }
    }

    /// Tables with an array part become arrays, other tables objects.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_guarded(&mut Vec::new())
    }

    fn to_json_guarded(&self, visiting: &mut Vec<usize>) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,

            Value::Bool(b) => json!(b),

            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => json!(*n as i64),

            Value::Number(n) | Value::Float(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),

            Value::String(s) => json!(s),

            Value::Table(t) => {
                if visiting.contains(&t.id()) {
                    return serde_json::Value::Null;
                }

                visiting.push(t.id());
                let table = t.borrow();

                let json = if table.len() > 0 {
                    serde_json::Value::Array(
                        table
                            .array()
                            .iter()
                            .map(|v| v.to_json_guarded(visiting))
                            .collect(),
                    )
                } else {
                    let mut object = serde_json::Map::new();

                    for key in table.keys() {
                        let value = table.get(&key).to_json_guarded(visiting);
                        object.insert(key.to_string(), value);
                    }

                    serde_json::Value::Object(object)
                };

                visiting.pop();
                json
            }

            Value::Multi(values) => {
                serde_json::Value::Array(values.iter().map(|v| v.to_json_guarded(visiting)).collect())
            }

            Value::Function(_) | Value::Userdata(_) => serde_json::Value::Null,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, visiting: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Table(t) => {
                if visiting.contains(&t.id()) {
                    return write!(f, "<circular reference>");
                }

                visiting.push(t.id());
                let table = t.borrow();
                write!(f, "{{")?;

                let array_len = table.len();
                let mut first = true;

                for value in table.array() {
                    if !first {
                        write!(f, ", ")?;
                    }

                    first = false;
                    value.render(f, visiting)?;
                }

                for key in table.keys() {
                    let in_array = key
                        .as_number()
                        .is_some_and(|n| n >= 1.0 && n <= array_len as f64 && n.fract() == 0.0);

                    if in_array {
                        continue;
                    }

                    if !first {
                        write!(f, ", ")?;
                    }

                    first = false;

                    match &key {
                        Value::String(s) => write!(f, "{} = ", s)?,

                        other => write!(f, "[{}] = ", other)?,
                    }

                    table.get(&key).render(f, visiting)?;
                }

                visiting.pop();
                write!(f, "}}")
            }

            Value::Multi(values) => match values.first() {
                Some(value) => value.render(f, visiting),

                None => write!(f, "nil"),
            },

            other => write!(f, "{}", other),
        }
    }
}

/// Parse a numeric string the way `tonumber` does.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),

        None => (false, s),
    };

    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()? as f64
    } else {
        if digits.is_empty() || digits.starts_with(['+', '-']) {
            return None;
        }

        // reject Rust-only spellings such as "inf" or "NaN"
        if !digits.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
            return None;
        }

        digits.parse::<f64>().ok()?
    };

    Some(if negative { -value } else { value })
}

/// Render a number following the integer/float formatting contract.
pub fn format_number(n: f64, float: bool) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }

    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    match (n.fract() == 0.0, float) {
        (true, true) => format!("{:.1}", n),

        (true, false) if n.abs() < 1e15 => itoa::Buffer::new().format(n as i64).to_string(),

        _ => n.to_string(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => write!(f, "{}", format_number(*n, false)),

            Value::Float(n) => write!(f, "{}", format_number(*n, true)),

            Value::String(s) => write!(f, "{}", s),

            Value::Function(callable) => write!(f, "{}", callable),

            Value::Userdata(object) => write!(f, "<{}>", object.type_name()),

            Value::Table(_) | Value::Multi(_) => self.render(f, &mut Vec::new()),
        }
    }
}

/// Raw equality: numbers by value, strings by content, references by
/// identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,

            (Value::Bool(a), Value::Bool(b)) => a == b,

            (Value::Number(a) | Value::Float(a), Value::Number(b) | Value::Float(b)) => a == b,

            (Value::String(a), Value::String(b)) => a == b,

            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),

            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),

            (Value::Userdata(a), Value::Userdata(b)) => {
                std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
            }

            (Value::Multi(a), Value::Multi(b)) => a == b,

            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

// ── callables ───────────────────────────────────────────────────────────────

/// User-defined function: body plus the environment it was defined in.
#[derive(Debug)]
pub struct Closure {
    pub body: Rc<FunctionBody>,
    pub env: EnvRef,
}

pub type NativeFn =
    dyn Fn(&StackFrame, Vec<serde_json::Value>) -> Result<Eval<'static, serde_json::Value>>;

pub type BuiltinFn = dyn Fn(&StackFrame, Vec<Value>) -> Result<Eval<'static, Value>>;

/// Host function exchanging JSON values.
pub struct NativeFunction {
    pub name: String,
    pub func: Box<NativeFn>,
}

/// Library function operating on raw values.
pub struct BuiltinFunction {
    pub name: String,
    pub func: Box<BuiltinFn>,
}

#[derive(Clone)]
pub enum Callable {
    Closure(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Builtin(Rc<BuiltinFunction>),
}

impl Callable {
    pub fn builtin<F>(name: &str, func: F) -> Self
    where
        F: Fn(&StackFrame, Vec<Value>) -> Result<Eval<'static, Value>> + 'static,
    {
        Callable::Builtin(Rc::new(BuiltinFunction {
            name: name.to_string(),
            func: Box::new(func),
        }))
    }

    pub fn native<F>(name: &str, func: F) -> Self
    where
        F: Fn(&StackFrame, Vec<serde_json::Value>) -> Result<Eval<'static, serde_json::Value>>
            + 'static,
    {
        Callable::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            func: Box::new(func),
        }))
    }

    /// Invoke with already-evaluated arguments. The result may be pending.
    pub fn call(&self, frame: &StackFrame, args: Vec<Value>) -> Result<Eval<'static, Value>> {
        match self {
            Callable::Closure(closure) => crate::interpreter::call_closure(closure, frame, args),

            Callable::Native(native) => {
                debug!("Calling native function '{}'", native.name);

                let args = args.iter().map(Value::to_json).collect();
                let result = (native.func)(frame, args)?;

                Ok(result.map(|json| Value::from_json(&json)))
            }

            Callable::Builtin(builtin) => {
                debug!("Calling builtin '{}'", builtin.name);

                (builtin.func)(frame, args)
            }
        }
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Closure(a), Callable::Closure(b)) => Rc::ptr_eq(a, b),

            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),

            (Callable::Builtin(a), Callable::Builtin(b)) => Rc::ptr_eq(a, b),

            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Closure(closure) => {
                let mut parameters = closure.body.parameters.clone();

                if closure.body.varargs {
                    parameters.push("...".to_string());
                }

                write!(f, "<lua function({})>", parameters.join(", "))
            }

            Callable::Native(native) => write!(f, "<native function: {}>", native.name),

            Callable::Builtin(builtin) => write!(f, "<builtin function: {}>", builtin.name),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting_contract() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Number(-2.0).to_string(), "-2");
    }

    #[test]
    fn numeric_subtypes_compare_equal() {
        assert_eq!(Value::Number(2.0), Value::Float(2.0));
        assert_ne!(Value::Number(2.0), Value::str("2"));
    }

    #[test]
    fn string_coercion() {
        assert_eq!(parse_number(" 0x10 "), Some(16.0));
        assert_eq!(parse_number("1e2"), Some(100.0));
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn json_round_trip_of_records() {
        let json = json!([{"name": "Pete", "age": 38}]);

        assert_eq!(Value::from_json(&json).to_json(), json);
    }
}
