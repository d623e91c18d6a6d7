//! The `table` library.

use std::cmp::Ordering;

use super::base;
use super::{arg, bad_argument, check_integer, check_string, check_table, opt_integer, ready, register, BuiltinResult};
use crate::error::{LuaError, Result};
use crate::frame::StackFrame;
use crate::interpreter::{compare, invoke};
use crate::pending::Eval;
use crate::table::{Table, TableRef};
use crate::value::Value;

pub fn library() -> Table {
    let mut table = Table::new();

    register(&mut table, "insert", insert);
    register(&mut table, "remove", remove);
    register(&mut table, "concat", concat);
    register(&mut table, "sort", sort);
    register(&mut table, "unpack", base::unpack);
    register(&mut table, "pack", pack);

    // non-standard
    register(&mut table, "keys", keys);
    register(&mut table, "includes", includes);
    register(&mut table, "select", select);

    table
}

/// `table.insert(t, [pos,] value)`
fn insert(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "insert", sf)?;
    let len = table.len() as i64;

    match args.len() {
        2 => table.borrow_mut().push(arg(&args, 1)),

        3 => {
            let pos = check_integer(&args, 1, "insert", sf)?;

            if pos < 1 || pos > len + 1 {
                return Err(bad_argument(sf, 1, "insert", "position out of bounds"));
            }

            table.borrow_mut().insert(pos as usize, arg(&args, 2));
        }

        _ => return Err(LuaError::runtime(sf, "wrong number of arguments to 'insert'")),
    }

    ready(Value::Multi(Vec::new()))
}

/// `table.remove(t [, pos])`, returning the removed value.
fn remove(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "remove", sf)?;
    let len = table.len() as i64;
    let pos = opt_integer(&args, 1, "remove", len, sf)?;

    if len == 0 && arg(&args, 1).is_nil() {
        return ready(Value::Nil);
    }

    if pos < 1 || pos > len + 1 {
        return Err(bad_argument(sf, 1, "remove", "position out of bounds"));
    }

    let removed = table.borrow_mut().remove(pos as usize);

    ready(removed)
}

/// `table.concat(t [, sep [, i [, j]]])`
fn concat(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "concat", sf)?;
    let separator = match arg(&args, 1) {
        Value::Nil => String::new(),

        _ => check_string(&args, 1, "concat", sf)?,
    };
    let from = opt_integer(&args, 2, "concat", 1, sf)?;
    let to = opt_integer(&args, 3, "concat", table.len() as i64, sf)?;

    let mut parts = Vec::new();

    for i in from..=to {
        match table.get(&Value::Number(i as f64)) {
            value @ (Value::String(_) | Value::Number(_) | Value::Float(_)) => {
                parts.push(value.to_string())
            }

            other => {
                return Err(LuaError::runtime(
                    sf,
                    format!(
                        "invalid value (at index {}) in table for 'concat': {}",
                        i,
                        other.type_name()
                    ),
                ))
            }
        }
    }

    ready(parts.join(&separator))
}

async fn less(comparator: &Value, a: &Value, b: &Value, sf: &StackFrame) -> Result<bool> {
    let result = invoke(comparator, vec![a.clone(), b.clone()], sf)?.resolve().await?;

    Ok(result.single().is_truthy())
}

/// Bottom-up merge sort driven by a script comparator that may pend.
async fn merge_sort(mut values: Vec<Value>, comparator: &Value, sf: &StackFrame) -> Result<Vec<Value>> {
    let n = values.len();
    let mut width = 1;

    while width < n {
        let mut merged = Vec::with_capacity(n);
        let mut start = 0;

        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j) = (start, mid);

            while i < mid && j < end {
                // right wins only when strictly less, so equal runs keep their order
                if less(comparator, &values[j], &values[i], sf).await? {
                    merged.push(values[j].clone());
                    j += 1;
                } else {
                    merged.push(values[i].clone());
                    i += 1;
                }
            }

            merged.extend_from_slice(&values[i..mid]);
            merged.extend_from_slice(&values[j..end]);
            start = end;
        }

        values = merged;
        width *= 2;
    }

    Ok(values)
}

/// `table.sort(t [, comp])`, in place.
fn sort(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "sort", sf)?;
    let comparator = arg(&args, 1);
    let mut values = table.borrow().array().to_vec();

    if comparator.is_nil() {
        let mut failure = None;

        values.sort_by(|a, b| {
            compare(a, b).unwrap_or_else(|| {
                failure.get_or_insert_with(|| format!("attempt to compare {} with {}", a.type_name(), b.type_name()));

                Ordering::Equal
            })
        });

        if let Some(message) = failure {
            return Err(LuaError::runtime(sf, message));
        }

        *table.borrow_mut().array_mut() = values;

        return ready(Value::Multi(Vec::new()));
    }

    let sf = sf.clone();

    Eval::from_future(async move {
        let sorted = merge_sort(values, &comparator, &sf).await?;
        *table.borrow_mut().array_mut() = sorted;

        Ok(Value::Multi(Vec::new()))
    })
}

/// `table.pack(...)`: the arguments plus a count in `n`.
fn pack(_sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let count = args.len();
    let mut table = Table::new();

    for (i, value) in args.into_iter().enumerate() {
        table.set(Value::Number((i + 1) as f64), value);
    }

    table.set_str("n", Value::Number(count as f64));

    ready(Value::table(table))
}

fn keys(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "keys", sf)?;
    let keys = table.borrow().keys();

    ready(Value::Table(TableRef::from_values(keys)))
}

/// Whether any value of the table equals the argument.
fn includes(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let needle = arg(&args, 1);

    let table = match arg(&args, 0) {
        Value::Nil => return ready(false),

        Value::Table(table) => table,

        _ => {
            return Err(LuaError::runtime(
                sf,
                "Cannot use includes on a non-table value",
            ))
        }
    };

    let table = table.borrow();
    let found = table.keys().iter().any(|key| table.get(key) == needle);

    ready(found)
}

/// `table.select(t, k1, k2, ...)` or `table.select(t, {k1, k2})`: a new table
/// holding only the named keys.
fn select(sf: &StackFrame, args: Vec<Value>) -> BuiltinResult {
    let table = check_table(&args, 0, "select", sf)?;

    let names = match arg(&args, 1) {
        Value::Table(list) => list.borrow().array().to_vec(),

        _ => args.get(1..).map(<[Value]>::to_vec).unwrap_or_default(),
    };

    let source = table.borrow();
    let mut selected = Table::new();

    for name in names {
        if name.is_nil() {
            continue;
        }

        let value = source.get(&name);
        selected.set(name, value);
    }

    ready(Value::table(selected))
}
