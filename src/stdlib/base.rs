//! Top-level functions: `print`, `type`, `pcall`, iteration helpers and
//! friends.

use std::cell::Cell;

use log::debug;

use super::{arg, bad_argument, check_string, check_table, opt_integer, ready, BuiltinResult};
use crate::environment::Environment;
use crate::error::LuaError;
use crate::frame::StackFrame;
use crate::interpreter::invoke;
use crate::pending::Eval;
use crate::value::{parse_number, Callable, Value};

pub(crate) fn install(scope: &mut Environment) {
    let functions: [(&str, fn(&StackFrame, Vec<Value>) -> BuiltinResult); 20] = [
        ("print", print),
        ("type", type_of),
        ("tostring", tostring),
        ("tonumber", tonumber),
        ("error", error),
        ("assert", assert),
        ("pcall", pcall),
        ("xpcall", xpcall),
        ("select", select),
        ("next", next),
        ("unpack", unpack),
        ("rawget", rawget),
        ("rawset", rawset),
        ("rawequal", rawequal),
        ("setmetatable", setmetatable),
        ("getmetatable", getmetatable),
        ("pairs", pairs),
        ("ipairs", ipairs),
        ("each", each),
        ("some", some),
    ];

    for (name, func) in functions {
        scope.define(name, Value::Function(Callable::builtin(name, func)));
    }
}

fn print(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let line: Vec<String> = args.iter().map(Value::to_string).collect();
    println!("{}", line.join("\t"));

    ready(Value::Multi(Vec::new()))
}

fn type_of(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(arg(&args, 0).type_name())
}

fn tostring(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(arg(&args, 0).to_string())
}

fn tonumber(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let value = arg(&args, 0);

    if !arg(&args, 1).is_nil() {
        let base = opt_integer(&args, 1, "tonumber", 10, sf)?;

        if !(2..=36).contains(&base) {
            return Err(bad_argument(sf, 1, "tonumber", "base out of range"));
        }

        let text = check_string(&args, 0, "tonumber", sf)?.trim().to_lowercase();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest.to_string()),

            None => (false, text),
        };

        // from_str_radix accepts its own sign, which would allow "--1"
        if digits.starts_with(&['-', '+'][..]) {
            return ready(Value::Nil);
        }

        return ready(match i64::from_str_radix(&digits, base as u32) {
            Ok(n) if negative => Value::Number(-n as f64),

            Ok(n) => Value::Number(n as f64),

            Err(_) => Value::Nil,
        });
    }

    ready(match value {
        Value::Number(_) | Value::Float(_) => value,

        Value::String(s) => match parse_number(&s) {
            Some(n) => {
                let lower = s.to_ascii_lowercase();
                let hex = lower.trim_start().trim_start_matches('-').starts_with("0x");

                if !hex && (lower.contains('.') || lower.contains('e')) {
                    Value::Float(n)
                } else {
                    Value::Number(n)
                }
            }

            None => Value::Nil,
        },

        _ => Value::Nil,
    })
}

fn error(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    Err(LuaError::runtime(sf, arg(&args, 0).to_string()))
}

fn assert(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    if arg(&args, 0).is_truthy() {
        return ready(Value::Multi(args));
    }

    match arg(&args, 1) {
        Value::Nil => Err(LuaError::runtime(sf, "assertion failed!")),

        message => Err(LuaError::runtime(sf, message.to_string())),
    }
}

fn succeeded(value: Value) -> Value {
    let mut results = vec![Value::Bool(true)];
    results.extend(value.into_values());

    Value::Multi(results)
}

/// Call `callee`, turning a runtime error into `handler(message)`. Other
/// failures pass through untouched.
fn protected_call<H>(sf: &StackFrame, callee: &Value, args: Vec<Value>, handler: H) -> BuiltinResult
where
    H: FnOnce(String) -> BuiltinResult + 'static,
{
    match invoke(callee, args, sf) {
        Ok(Eval::Ready(value)) => ready(succeeded(value)),

        Ok(Eval::Pending(future)) => Ok(Eval::pending(async move {
            match future.await {
                Ok(value) => Ok(succeeded(value)),

                Err(e) if e.is_runtime() => handler(e.message())?.resolve().await,

                Err(e) => Err(e),
            }
        })),

        Err(e) if e.is_runtime() => {
            debug!("Protected call caught: {}", e.message());

            handler(e.message())
        }

        Err(e) => Err(e),
    }
}

fn pcall(sf: &StackFrame, mut args: Vec<Value>) -> BuiltinResult {
    if args.is_empty() {
        return Err(bad_argument(sf, 0, "pcall", "value expected"));
    }

    let callee = args.remove(0);

    protected_call(sf, &callee, args, |message| {
        ready(Value::Multi(vec![Value::Bool(false), Value::String(message)]))
    })
}

fn xpcall(sf: &StackFrame, mut args: Vec<Value>) -> BuiltinResult {
    if args.len() < 2 {
        return Err(bad_argument(sf, 1, "xpcall", "value expected"));
    }

    let callee = args.remove(0);
    let handler = args.remove(0);
    let frame = sf.clone();

    protected_call(sf, &callee, args, move |message| {
        let handled = invoke(&handler, vec![Value::String(message)], &frame)?;

        Ok(handled.map(|value| Value::Multi(vec![Value::Bool(false), value.single()])))
    })
}

fn select(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let rest = args.len().saturating_sub(1);

    if arg(&args, 0).as_str() == Some("#") {
        return ready(rest as f64);
    }

    let n = opt_integer(&args, 0, "select", 0, sf)?;

    let start = match n {
        n if n > 0 => (n as usize).min(rest + 1),

        n if n < 0 && n.unsigned_abs() as usize <= rest => rest + 1 - n.unsigned_abs() as usize,

        _ => return Err(bad_argument(sf, 0, "select", "index out of range")),
    };

    ready(Value::Multi(args.get(start..).map(<[Value]>::to_vec).unwrap_or_default()))
}

fn next(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "next", sf)?;
    let entry = table.borrow().next(&arg(&args, 1));

    ready(match entry {
        Some((key, value)) => Value::Multi(vec![key, value]),

        None => Value::Nil,
    })
}

/// Largest result list `unpack` will build.
const MAX_UNPACK: i64 = 1_000_000;

/// `unpack(t [, i [, j]])`, shared with `table.unpack`.
pub(crate) fn unpack(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "unpack", sf)?;
    let from = opt_integer(&args, 1, "unpack", 1, sf)?;
    let to = opt_integer(&args, 2, "unpack", table.len() as i64, sf)?;

    if from <= to && to.checked_sub(from).map_or(true, |n| n >= MAX_UNPACK) {
        return Err(LuaError::runtime(sf, "too many results to unpack"));
    }

    let values = (from..=to)
        .map(|i| table.get(&Value::Number(i as f64)))
        .collect();

    ready(Value::Multi(values))
}

fn rawget(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "rawget", sf)?;

    ready(table.get(&arg(&args, 1)))
}

fn rawset(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "rawset", sf)?;
    let key = arg(&args, 1);

    if key.is_nil() {
        return Err(LuaError::runtime(sf, "table index is nil"));
    }

    table.set(key, arg(&args, 2));

    ready(Value::Table(table))
}

fn rawequal(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(arg(&args, 0) == arg(&args, 1))
}

fn setmetatable(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "setmetatable", sf)?;

    match arg(&args, 1) {
        Value::Table(metatable) => table.borrow_mut().metatable = Some(metatable),

        Value::Nil => return Err(LuaError::runtime(sf, "metatable cannot be set to nil")),

        other => {
            return Err(bad_argument(
                sf,
                1,
                "setmetatable",
                &format!("nil or table expected, got {}", other.type_name()),
            ))
        }
    }

    ready(Value::Table(table))
}

fn getmetatable(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(match arg(&args, 0) {
        Value::Table(table) => table.metatable().map_or(Value::Nil, Value::Table),

        _ => Value::Nil,
    })
}

fn pairs(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "pairs", sf)?;
    let keys = table.borrow().keys();
    let position = Cell::new(0);

    let iterator = Callable::builtin("pairs_iterator", move |_, _| {
        while let Some(key) = keys.get(position.get()) {
            position.set(position.get() + 1);

            let value = table.get(key);

            // skip entries cleared during the traversal
            if !value.is_nil() {
                return ready(Value::Multi(vec![key.clone(), value]));
            }
        }

        ready(Value::Nil)
    });

    ready(Value::Function(iterator))
}

/// Array-part iteration; stops at the array length, not at the first nil.
fn ipairs(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "ipairs", sf)?;
    let index = Cell::new(0);

    let iterator = Callable::builtin("ipairs_iterator", move |_, _| {
        let i = index.get() + 1;

        if i > table.len() {
            return ready(Value::Nil);
        }

        index.set(i);

        let key = Value::Number(i as f64);
        let value = table.get(&key);

        ready(Value::Multi(vec![key, value]))
    });

    ready(Value::Function(iterator))
}

fn each(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "each", sf)?;
    let length = table.len();
    let index = Cell::new(0);

    let iterator = Callable::builtin("each_iterator", move |_, _| {
        let i = index.get() + 1;

        if i > length {
            return ready(Value::Nil);
        }

        index.set(i);

        ready(table.get(&Value::Number(i as f64)))
    });

    ready(Value::Function(iterator))
}

/// `nil` for empty tables, blank strings and non-finite numbers; the value
/// itself otherwise.
fn some(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let value = arg(&args, 0);

    let empty = match &value {
        Value::Number(n) | Value::Float(n) => !n.is_finite(),

        Value::String(s) => s.trim().is_empty(),

        Value::Table(t) => t.is_empty(),

        _ => false,
    };

    ready(if empty { Value::Nil } else { value })
}
