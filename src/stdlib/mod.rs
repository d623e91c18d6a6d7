//! Standard library.
//!
//! Each submodule builds one library table (or, for `base`, the top-level
//! functions). Library functions are [`Callable::Builtin`]s: they receive the
//! caller's stack frame and raw argument values, and may answer with a
//! pending value when they call back into script functions that pend.

use log::info;

use crate::environment::EnvRef;
use crate::error::{LuaError, Result};
use crate::frame::StackFrame;
use crate::pending::Eval;
use crate::table::Table;
use crate::value::{Callable, Value};

pub mod base;
pub mod math;
pub mod pattern;
pub mod string;
pub mod table;

/// Result type of every library function.
pub type BuiltinResult = Result<Eval<'static, Value>>;

/// Install the full standard library into `globals`.
pub fn install(globals: &EnvRef) {
    let mut scope = globals.borrow_mut();

    base::install(&mut scope);

    scope.define("string", Value::table(string::library()));
    scope.define("table", Value::table(table::library()));
    scope.define("math", Value::table(math::library()));

    info!("Standard library installed");
}

// ── argument helpers ────────────────────────────────────────────────────────

pub(crate) fn register<F>(table: &mut Table, name: &str, func: F)
where
    F: Fn(&StackFrame, Vec<Value>) -> BuiltinResult + 'static,
{
    table.set_str(name, Value::Function(Callable::builtin(name, func)));
}

pub(crate) fn ready(value: impl Into<Value>) -> BuiltinResult {
    Ok(Eval::Ready(value.into()))
}

pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

pub(crate) fn bad_argument(sf: &StackFrame, i: usize, name: &str, message: &str) -> LuaError {
    LuaError::runtime(sf, format!("bad argument #{} to '{}' ({})", i + 1, name, message))
}

fn expected(sf: &StackFrame, i: usize, name: &str, what: &str, got: &Value) -> LuaError {
    bad_argument(
        sf,
        i,
        name,
        &format!("{} expected, got {}", what, got.type_name()),
    )
}

pub(crate) fn check_table(
    args: &[Value],
    i: usize,
    name: &str,
    sf: &StackFrame,
) -> Result<crate::table::TableRef> {
    match args.get(i) {
        Some(Value::Table(t)) => Ok(t.clone()),

        other => Err(expected(sf, i, name, "table", other.unwrap_or(&Value::Nil))),
    }
}

/// String argument; numbers are converted.
pub(crate) fn check_string(args: &[Value], i: usize, name: &str, sf: &StackFrame) -> Result<String> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s.clone()),

        Some(n @ (Value::Number(_) | Value::Float(_))) => Ok(n.to_string()),

        other => Err(expected(sf, i, name, "string", other.unwrap_or(&Value::Nil))),
    }
}

pub(crate) fn check_number(args: &[Value], i: usize, name: &str, sf: &StackFrame) -> Result<f64> {
    let value = arg(args, i);

    value
        .to_number()
        .ok_or_else(|| expected(sf, i, name, "number", &value))
}

pub(crate) fn check_integer(args: &[Value], i: usize, name: &str, sf: &StackFrame) -> Result<i64> {
    let value = arg(args, i);

    match value.to_integer() {
        Some(n) => Ok(n),

        None if value.to_number().is_some() => {
            Err(bad_argument(sf, i, name, "number has no integer representation"))
        }

        None => Err(expected(sf, i, name, "number", &value)),
    }
}

pub(crate) fn opt_integer(
    args: &[Value],
    i: usize,
    name: &str,
    default: i64,
    sf: &StackFrame,
) -> Result<i64> {
    if arg(args, i).is_nil() {
        Ok(default)
    } else {
        check_integer(args, i, name, sf)
    }
}
