//! The `math` library.

use super::{arg, bad_argument, check_number, ready, register, BuiltinResult};
use crate::frame::StackFrame;
use crate::interpreter::compare;
use crate::table::Table;
use crate::value::Value;

pub fn library() -> Table {
    let mut math = Table::new();

    register(&mut math, "floor", floor);
    register(&mut math, "ceil", ceil);
    register(&mut math, "abs", abs);
    register(&mut math, "sqrt", sqrt);
    register(&mut math, "max", max);
    register(&mut math, "min", min);
    register(&mut math, "fmod", fmod);
    register(&mut math, "tointeger", tointeger);

    math.set_str("pi", Value::Float(std::f64::consts::PI));
    math.set_str("huge", Value::Float(f64::INFINITY));

    math
}

fn floor(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_number(&args, 0, "floor", sf)?.floor())
}

fn ceil(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(check_number(&args, 0, "ceil", sf)?.ceil())
}

fn abs(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let n = check_number(&args, 0, "abs", sf)?;

    ready(match arg(&args, 0) {
        Value::Float(_) => Value::Float(n.abs()),

        _ => Value::Number(n.abs()),
    })
}

fn sqrt(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(Value::Float(check_number(&args, 0, "sqrt", sf)?.sqrt()))
}

/// Extremum of the arguments; `wanted` is the ordering that replaces the
/// current pick.
fn extremum(sf: &StackFrame, args: Vec<Value>, name: &str, wanted: std::cmp::Ordering) -> BuiltinResult {
    check_number(&args, 0, name, sf)?;

    let mut best = arg(&args, 0);

    for i in 1..args.len() {
        check_number(&args, i, name, sf)?;

        if compare(&args[i], &best) == Some(wanted) {
            best = args[i].clone();
        }
    }

    ready(best)
}

fn max(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    extremum(sf, args, "max", std::cmp::Ordering::Greater)
}

fn min(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    extremum(sf, args, "min", std::cmp::Ordering::Less)
}

/// Remainder truncated towards zero, unlike `%`.
fn fmod(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let a = check_number(&args, 0, "fmod", sf)?;
    let b = check_number(&args, 1, "fmod", sf)?;
    let float = arg(&args, 0).is_float() || arg(&args, 1).is_float();

    if b == 0.0 && !float {
        return Err(bad_argument(sf, 1, "fmod", "zero"));
    }

    ready(if float { Value::Float(a % b) } else { Value::Number(a % b) })
}

fn tointeger(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    ready(match arg(&args, 0) {
        Value::Number(n) | Value::Float(n) if n.fract() == 0.0 && n.is_finite() => Value::Number(n),

        _ => Value::Nil,
    })
}
