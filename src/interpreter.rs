//! Tree-walking evaluator.
//!
//! Every evaluation function returns `Result<Eval<'a, _>>`: errors propagate
//! through `?`, and the [`Eval`] says whether the value is available now or
//! only after a host future completes. Statement execution yields a [`Flow`]
//! describing how control leaves the statement, so `break` and `return` never
//! travel through the error channel.
//!
//! Synchronous code stays synchronous: a loop over statements only switches
//! to an `async` continuation once one of them actually comes back pending.

use std::rc::Rc;

use futures::future::FutureExt;
use log::{debug, info};

use crate::ast::{Attribute, BinaryOp, Block, Expr, FunctionCall, IfClause, LValue, NumberKind, Stmt, TableField, UnaryOp};
use crate::environment::{EnvRef, Environment};
use crate::error::{LuaError, Result};
use crate::frame::StackFrame;
use crate::pending::{gather, Eval};
use crate::table::{Table, TableRef};
use crate::value::{Callable, Closure, Value};

/// How control leaves a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

type Evaluated<'a> = Result<Eval<'a, Value>>;
type Executed<'a> = Result<Eval<'a, Flow>>;

/// Widen a `'static` result produced by a call to the caller's lifetime.
fn widen<'a, T: 'a>(eval: Eval<'static, T>) -> Eval<'a, T> {
    match eval {
        Eval::Ready(value) => Eval::Ready(value),

        Eval::Pending(future) => Eval::Pending(future),
    }
}

/// Outcome of one loop iteration: `None` keeps looping.
fn loop_exit(flow: Flow) -> Option<Flow> {
    match flow {
        Flow::Normal => None,

        Flow::Break => Some(Flow::Normal),

        ret @ Flow::Return(_) => Some(ret),
    }
}

fn runtime_error(sf: &StackFrame, span: crate::ast::Span, message: impl Into<String>) -> LuaError {
    LuaError::runtime(&sf.with_span(span), message)
}

// ─────────────────────────────────────────────────────────────────────────────
// Expressions
// ─────────────────────────────────────────────────────────────────────────────

/// Evaluate an expression. Calls and `...` may produce a multi-result.
pub fn evaluate<'a>(expr: &'a Expr, env: &EnvRef, sf: &StackFrame) -> Evaluated<'a> {
    match expr {
        Expr::Nil { .. } => Ok(Eval::Ready(Value::Nil)),

        Expr::Boolean { value, .. } => Ok(Eval::Ready(Value::Bool(*value))),

        Expr::Number { value, kind, .. } => Ok(Eval::Ready(match kind {
            NumberKind::Int => Value::Number(*value),

            NumberKind::Float => Value::Float(*value),
        })),

        Expr::String { value, .. } => Ok(Eval::Ready(Value::String(value.clone()))),

        Expr::Variable { name, span } => match env.borrow().get(name) {
            Some(value) => Ok(Eval::Ready(value)),

            None => Err(runtime_error(sf, *span, format!("Undefined variable {}", name))),
        },

        Expr::Vararg { span } => match env.borrow().get("...") {
            Some(values) => Ok(Eval::Ready(values)),

            None => Err(runtime_error(
                sf,
                *span,
                "cannot use '...' outside a vararg function",
            )),
        },

        Expr::Parenthesized { expression, .. } => {
            Ok(evaluate(expression, env, sf)?.map(Value::single))
        }

        Expr::PropertyAccess {
            object,
            property,
            span,
        } => {
            let env = env.clone();
            let sf = sf.with_span(*span);

            evaluate(object, &env, &sf)?.then(move |object| {
                Ok(widen(index_value(&object.single(), &Value::str(property.as_str()), &env, &sf)?))
            })
        }

        Expr::TableAccess { object, key, span } => {
            let object = evaluate(object, env, sf)?.map(Value::single);
            let key = evaluate(key, env, sf)?.map(Value::single);
            let env = env.clone();
            let sf = sf.with_span(*span);

            gather(vec![object, key]).then(move |values| {
                let [object, key]: [Value; 2] = values
                    .try_into()
                    .map_err(|_| LuaError::runtime(&sf, "malformed index"))?;

                Ok(widen(index_value(&object, &key, &env, &sf)?))
            })
        }

        Expr::FunctionCall(call) => evaluate_call(call, env, sf),

        Expr::Binary {
            operator: BinaryOp::And,
            left,
            right,
            ..
        } => {
            let env = env.clone();
            let sf = sf.clone();

            evaluate(left, &env, &sf)?.then(move |left| {
                let left = left.single();

                if left.is_truthy() {
                    Ok(evaluate(right, &env, &sf)?.map(Value::single))
                } else {
                    Ok(Eval::Ready(left))
                }
            })
        }

        Expr::Binary {
            operator: BinaryOp::Or,
            left,
            right,
            ..
        } => {
            let env = env.clone();
            let sf = sf.clone();

            evaluate(left, &env, &sf)?.then(move |left| {
                let left = left.single();

                if left.is_truthy() {
                    Ok(Eval::Ready(left))
                } else {
                    Ok(evaluate(right, &env, &sf)?.map(Value::single))
                }
            })
        }

        Expr::Binary {
            operator,
            left,
            right,
            span,
        } => {
            let left = evaluate(left, env, sf)?;
            let right = evaluate(right, env, sf)?;
            let operator = *operator;
            let sf = sf.with_span(*span);

            match (left, right) {
                (Eval::Ready(l), Eval::Ready(r)) => {
                    binary_op(operator, l.single(), r.single(), &sf).map(Eval::Ready)
                }

                (left, right) => gather(vec![left, right]).try_map(move |values| {
                    let mut values = values.into_iter().map(Value::single);
                    let l = values.next().unwrap_or_default();
                    let r = values.next().unwrap_or_default();

                    binary_op(operator, l, r, &sf)
                }),
            }
        }

        Expr::Unary {
            operator,
            argument,
            span,
        } => {
            let operator = *operator;
            let sf = sf.with_span(*span);

            evaluate(argument, env, &sf)?.try_map(move |value| unary_op(operator, value.single(), &sf))
        }

        Expr::TableConstructor { fields, span } => evaluate_table(fields, env, &sf.with_span(*span)),

        Expr::FunctionDefinition { body, .. } => {
            Ok(Eval::Ready(Value::Function(Callable::Closure(Rc::new(Closure {
                body: body.clone(),
                env: env.clone(),
            })))))
        }

        Expr::Query { clauses, span } => {
            crate::query::evaluate_query(clauses, env, &sf.with_span(*span))
        }
    }
}

/// Evaluate an expression list; the last expression spreads its results.
pub fn evaluate_list<'a>(
    expressions: &'a [Expr],
    env: &EnvRef,
    sf: &StackFrame,
) -> Result<Eval<'a, Vec<Value>>> {
    let count = expressions.len();
    let mut items = Vec::with_capacity(count);

    for (i, expression) in expressions.iter().enumerate() {
        let value = evaluate(expression, env, sf)?;

        items.push(if i + 1 == count {
            value
        } else {
            value.map(Value::single)
        });
    }

    Ok(gather(items).map(move |values| {
        let mut out = Vec::with_capacity(count);

        for (i, value) in values.into_iter().enumerate() {
            if i + 1 == count {
                out.extend(value.into_values());
            } else {
                out.push(value);
            }
        }

        out
    }))
}

fn evaluate_call<'a>(call: &'a FunctionCall, env: &EnvRef, sf: &StackFrame) -> Evaluated<'a> {
    let frame = sf.with_span(call.span);
    let prefix = evaluate(&call.prefix, env, sf)?.map(Value::single);

    match &call.name {
        None => {
            let args = evaluate_list(&call.args, env, sf)?;

            match (prefix, args) {
                (Eval::Ready(callee), Eval::Ready(args)) => {
                    Ok(widen(invoke(&callee, args, &frame)?))
                }

                (prefix, args) => {
                    let callee = prefix.map(|v| vec![v]);

                    gather(vec![callee, args]).then(move |mut parts| {
                        let args = parts.pop().unwrap_or_default();
                        let callee = parts.pop().and_then(|mut v| v.pop()).unwrap_or_default();

                        Ok(widen(invoke(&callee, args, &frame)?))
                    })
                }
            }
        }

        // obj:name(args) evaluates obj once and passes it as `self`
        Some(name) => {
            let env = env.clone();
            let sf = sf.clone();

            prefix.then(move |object| {
                let method = index_value(&object, &Value::str(name.as_str()), &env, &frame)?;

                widen(method).then(move |method| {
                    evaluate_list(&call.args, &env, &sf)?.then(move |mut args| {
                        args.insert(0, object);

                        Ok(widen(invoke(&method, args, &frame)?))
                    })
                })
            })
        }
    }
}

/// Call a value with evaluated arguments.
pub fn invoke(callee: &Value, args: Vec<Value>, sf: &StackFrame) -> Result<Eval<'static, Value>> {
    match callee {
        Value::Function(callable) => callable.call(sf, args),

        other => {
            debug!("Attempt to call {}", other.type_name());

            Err(LuaError::runtime(
                sf,
                format!("attempt to call a {} value", other.type_name()),
            ))
        }
    }
}

/// Invoke a closure: bind parameters in a child of the captured scope and run
/// the body. Zero returned values give an empty multi-result.
pub fn call_closure(
    closure: &Rc<Closure>,
    sf: &StackFrame,
    args: Vec<Value>,
) -> Result<Eval<'static, Value>> {
    let closure = closure.clone();
    let env = Environment::child(&closure.env);

    {
        let mut scope = env.borrow_mut();
        let parameters = &closure.body.parameters;

        for (i, parameter) in parameters.iter().enumerate() {
            scope.define(parameter, args.get(i).cloned().unwrap_or_default());
        }

        if closure.body.varargs {
            let rest = args.get(parameters.len()..).map(<[Value]>::to_vec).unwrap_or_default();
            scope.define("...", Value::Multi(rest));
        }
    }

    let sf = sf.clone();

    Eval::from_future(async move {
        let flow = execute_statements(&closure.body.block.statements, env, sf.clone())?
            .resolve()
            .await?;

        match flow {
            Flow::Normal => Ok(Value::Multi(Vec::new())),

            Flow::Return(values) => Ok(Value::from_results(values)),

            Flow::Break => Err(LuaError::runtime(&sf, "break outside a loop")),
        }
    })
}

/// Read `object[key]`, consulting `__index` only when the direct lookup
/// misses. Strings index the `string` library.
pub fn index_value(
    object: &Value,
    key: &Value,
    env: &EnvRef,
    sf: &StackFrame,
) -> Result<Eval<'static, Value>> {
    match object {
        Value::Table(table) => {
            let raw = table.get(key);

            if !raw.is_nil() {
                return Ok(Eval::Ready(raw));
            }

            let handler = table
                .metatable()
                .map(|mt| mt.borrow().get_str("__index"))
                .unwrap_or_default();

            match handler {
                Value::Nil => Ok(Eval::Ready(Value::Nil)),

                Value::Function(_) => {
                    Ok(invoke(&handler, vec![object.clone(), key.clone()], sf)?.map(Value::single))
                }

                next => index_value(&next, key, env, sf),
            }
        }

        Value::Userdata(host) => Ok(Eval::Ready(host.get(key).unwrap_or_default())),

        Value::String(_) => {
            let library = env.borrow().get("string").unwrap_or_default();

            match library {
                Value::Table(library) => Ok(Eval::Ready(library.get(key))),

                _ => Ok(Eval::Ready(Value::Nil)),
            }
        }

        other => Err(LuaError::runtime(
            sf,
            format!("attempt to index a {} value", other.type_name()),
        )),
    }
}

/// Write `object[key] = value`, consulting `__newindex` only when the key is
/// absent.
pub fn assign_index(
    object: &Value,
    key: Value,
    value: Value,
    env: &EnvRef,
    sf: &StackFrame,
) -> Result<Eval<'static, ()>> {
    let Value::Table(table) = object else {
        return Err(LuaError::runtime(
            sf,
            format!("attempt to index a {} value", object.type_name()),
        ));
    };

    if key.is_nil() {
        return Err(LuaError::runtime(sf, "table index is nil"));
    }

    if key.as_number().is_some_and(f64::is_nan) {
        return Err(LuaError::runtime(sf, "table index is NaN"));
    }

    let handler = if table.borrow().has(&key) {
        Value::Nil
    } else {
        table
            .metatable()
            .map(|mt| mt.borrow().get_str("__newindex"))
            .unwrap_or_default()
    };

    match handler {
        Value::Nil => {
            table.set(key, value);

            Ok(Eval::Ready(()))
        }

        Value::Function(_) => {
            Ok(invoke(&handler, vec![object.clone(), key, value], sf)?.map(|_| ()))
        }

        next => assign_index(&next, key, value, env, sf),
    }
}

fn evaluate_table<'a>(fields: &'a [TableField], env: &EnvRef, sf: &StackFrame) -> Evaluated<'a> {
    let table = TableRef::new(Table::new());
    let mut next_index = 1.0;
    let mut entries: Vec<Eval<'a, Vec<(Value, Value)>>> = Vec::with_capacity(fields.len());

    for (i, field) in fields.iter().enumerate() {
        let last = i + 1 == fields.len();

        let entry = match field {
            TableField::Positional { value, .. } => {
                let index = next_index;
                next_index += 1.0;

                let spread = last && value.is_multi_valued();

                evaluate(value, env, sf)?.map(move |value| {
                    if spread {
                        value
                            .into_values()
                            .into_iter()
                            .enumerate()
                            .map(|(offset, v)| (Value::Number(index + offset as f64), v))
                            .collect()
                    } else {
                        vec![(Value::Number(index), value.single())]
                    }
                })
            }

            TableField::Property { key, value, .. } => {
                let key = Value::str(key.as_str());

                evaluate(value, env, sf)?.map(move |value| vec![(key, value.single())])
            }

            TableField::Dynamic { key, value, .. } => {
                let key = evaluate(key, env, sf)?.map(Value::single);
                let value = evaluate(value, env, sf)?.map(Value::single);

                gather(vec![key, value]).map(|mut pair| {
                    let value = pair.pop().unwrap_or_default();
                    let key = pair.pop().unwrap_or_default();

                    vec![(key, value)]
                })
            }
        };

        entries.push(entry);
    }

    let sf = sf.clone();

    gather(entries).try_map(move |entries| {
        {
            let mut target = table.borrow_mut();

            for (key, value) in entries.into_iter().flatten() {
                if key.is_nil() {
                    return Err(LuaError::runtime(&sf, "table index is nil"));
                }

                target.set(key, value);
            }
        }

        Ok(Value::Table(table))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────────────

fn arithmetic_operands(l: &Value, r: &Value, sf: &StackFrame) -> Result<(f64, f64, bool)> {
    match (l.to_number(), r.to_number()) {
        (Some(a), Some(b)) => Ok((a, b, l.is_float() || r.is_float())),

        _ => {
            let culprit = if l.to_number().is_none() { l } else { r };

            Err(LuaError::runtime(
                sf,
                format!("attempt to perform arithmetic on a {} value", culprit.type_name()),
            ))
        }
    }
}

fn integer_operands(l: &Value, r: &Value, sf: &StackFrame) -> Result<(i64, i64)> {
    match (l.to_integer(), r.to_integer()) {
        (Some(a), Some(b)) => Ok((a, b)),

        _ => {
            let culprit = if l.to_integer().is_none() { l } else { r };

            Err(LuaError::runtime(
                sf,
                format!("attempt to perform bitwise operation on a {} value", culprit.type_name()),
            ))
        }
    }
}

fn number(n: f64, float: bool) -> Value {
    if float {
        Value::Float(n)
    } else {
        Value::Number(n)
    }
}

fn shift_left(a: i64, b: i64) -> i64 {
    match b {
        b if b <= -64 || b >= 64 => 0,

        b if b < 0 => ((a as u64) >> (-b)) as i64,

        b => ((a as u64) << b) as i64,
    }
}

fn concat_operand(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),

        Value::Number(_) | Value::Float(_) => Some(value.to_string()),

        _ => None,
    }
}

/// Apply a non-short-circuit binary operator to resolved operands.
pub fn binary_op(operator: BinaryOp, l: Value, r: Value, sf: &StackFrame) -> Result<Value> {
    let value = match operator {
        BinaryOp::Add => {
            let (a, b, float) = arithmetic_operands(&l, &r, sf)?;
            number(a + b, float)
        }

        BinaryOp::Sub => {
            let (a, b, float) = arithmetic_operands(&l, &r, sf)?;
            number(a - b, float)
        }

        BinaryOp::Mul => {
            let (a, b, float) = arithmetic_operands(&l, &r, sf)?;
            number(a * b, float)
        }

        BinaryOp::Div => {
            let (a, b, _) = arithmetic_operands(&l, &r, sf)?;
            Value::Float(a / b)
        }

        BinaryOp::Pow => {
            let (a, b, _) = arithmetic_operands(&l, &r, sf)?;
            Value::Float(a.powf(b))
        }

        BinaryOp::IDiv => {
            let (a, b, float) = arithmetic_operands(&l, &r, sf)?;

            if b == 0.0 && !float {
                return Err(LuaError::runtime(sf, "attempt to perform 'n//0'"));
            }

            number((a / b).floor(), float)
        }

        BinaryOp::Mod => {
            let (a, b, float) = arithmetic_operands(&l, &r, sf)?;

            if b == 0.0 && !float {
                return Err(LuaError::runtime(sf, "attempt to perform 'n%%0'"));
            }

            number(a - (a / b).floor() * b, float)
        }

        BinaryOp::Concat => match (concat_operand(&l), concat_operand(&r)) {
            (Some(a), Some(b)) => Value::String(a + &b),

            (None, _) => {
                return Err(LuaError::runtime(
                    sf,
                    format!("attempt to concatenate a {} value", l.type_name()),
                ))
            }

            (_, None) => {
                return Err(LuaError::runtime(
                    sf,
                    format!("attempt to concatenate a {} value", r.type_name()),
                ))
            }
        },

        BinaryOp::Eq => Value::Bool(l == r),

        BinaryOp::Ne => Value::Bool(l != r),

        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&l, &r).ok_or_else(|| {
                LuaError::runtime(
                    sf,
                    format!("attempt to compare {} with {}", l.type_name(), r.type_name()),
                )
            })?;

            Value::Bool(match operator {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }

        BinaryOp::BAnd => {
            let (a, b) = integer_operands(&l, &r, sf)?;
            Value::Number((a & b) as f64)
        }

        BinaryOp::BOr => {
            let (a, b) = integer_operands(&l, &r, sf)?;
            Value::Number((a | b) as f64)
        }

        BinaryOp::BXor => {
            let (a, b) = integer_operands(&l, &r, sf)?;
            Value::Number((a ^ b) as f64)
        }

        BinaryOp::Shl => {
            let (a, b) = integer_operands(&l, &r, sf)?;
            Value::Number(shift_left(a, b) as f64)
        }

        BinaryOp::Shr => {
            let (a, b) = integer_operands(&l, &r, sf)?;
            Value::Number(shift_left(a, b.saturating_neg()) as f64)
        }

        BinaryOp::And => {
            if l.is_truthy() {
                r
            } else {
                l
            }
        }

        BinaryOp::Or => {
            if l.is_truthy() {
                l
            } else {
                r
            }
        }
    };

    Ok(value)
}

/// Ordering of two numbers or two strings; `None` for anything else.
pub fn compare(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),

        _ => l.as_number()?.partial_cmp(&r.as_number()?),
    }
}

pub fn unary_op(operator: UnaryOp, value: Value, sf: &StackFrame) -> Result<Value> {
    match operator {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),

        UnaryOp::Neg => match value {
            Value::Number(n) => Ok(Value::Number(-n)),

            Value::Float(n) => Ok(Value::Float(-n)),

            other => other.to_number().map(|n| Value::Number(-n)).ok_or_else(|| {
                LuaError::runtime(
                    sf,
                    format!("attempt to perform arithmetic on a {} value", other.type_name()),
                )
            }),
        },

        UnaryOp::Len => match &value {
            Value::String(s) => Ok(Value::Number(s.len() as f64)),

            Value::Table(t) => Ok(Value::Number(t.len() as f64)),

            other => Err(LuaError::runtime(
                sf,
                format!("attempt to get length of a {} value", other.type_name()),
            )),
        },

        UnaryOp::BNot => value
            .to_integer()
            .map(|i| Value::Number(!i as f64))
            .ok_or_else(|| {
                LuaError::runtime(
                    sf,
                    format!("attempt to perform bitwise operation on a {} value", value.type_name()),
                )
            }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

/// Run a block in a fresh child scope.
pub fn execute_block<'a>(block: &'a Block, env: &EnvRef, sf: &StackFrame) -> Executed<'a> {
    execute_statements(&block.statements, Environment::child(env), sf.clone())
}

/// Run statements in `env` until one leaves abnormally, then close the
/// scope's `<close>` variables however it was left.
pub fn execute_statements<'a>(statements: &'a [Stmt], env: EnvRef, sf: StackFrame) -> Executed<'a> {
    let outcome = match run_statements(statements, env.clone(), sf.clone()) {
        Ok(Eval::Ready(flow)) => Ok(flow),

        Ok(Eval::Pending(future)) => {
            return Ok(Eval::Pending(
                async move {
                    let outcome = future.await;

                    close_scope(env, outcome, sf).await
                }
                .boxed_local(),
            ))
        }

        Err(e) => Err(e),
    };

    if !env.borrow().has_to_close() {
        return outcome.map(Eval::Ready);
    }

    Eval::from_future(close_scope(env, outcome, sf))
}

fn close_handler(value: &Value) -> Option<Value> {
    let Value::Table(table) = value else {
        return None;
    };

    let handler = table.metatable()?.borrow().get_str("__close");

    (!handler.is_nil()).then_some(handler)
}

/// Call `__close(value, err)` for each of the scope's `<close>` values,
/// latest first. An error raised by a handler replaces the outcome.
async fn close_scope(env: EnvRef, mut outcome: Result<Flow>, sf: StackFrame) -> Result<Flow> {
    let values = env.borrow_mut().take_to_close();

    for value in values.into_iter().rev() {
        let Some(handler) = close_handler(&value) else {
            continue;
        };

        let error = match &outcome {
            Err(e) => Value::str(e.message()),

            Ok(_) => Value::Nil,
        };

        debug!("Closing {} value", value.type_name());

        let closed = match invoke(&handler, vec![value, error], &sf) {
            Ok(eval) => eval.resolve().await.map(|_| ()),

            Err(e) => Err(e),
        };

        if let Err(e) = closed {
            outcome = Err(e);
        }
    }

    outcome
}

fn run_statements<'a>(statements: &'a [Stmt], env: EnvRef, sf: StackFrame) -> Executed<'a> {
    for (i, stmt) in statements.iter().enumerate() {
        match execute(stmt, &env, &sf)? {
            Eval::Ready(Flow::Normal) => {}

            Eval::Ready(flow) => return Ok(Eval::Ready(flow)),

            Eval::Pending(future) => {
                let rest = &statements[i + 1..];

                return Ok(Eval::Pending(
                    async move {
                        match future.await? {
                            Flow::Normal => run_statements(rest, env, sf)?.resolve().await,

                            flow => Ok(flow),
                        }
                    }
                    .boxed_local(),
                ));
            }
        }
    }

    Ok(Eval::Ready(Flow::Normal))
}

pub fn execute<'a>(stmt: &'a Stmt, env: &EnvRef, sf: &StackFrame) -> Executed<'a> {
    debug!("Executing statement at {}", stmt.span());

    match stmt {
        Stmt::Semicolon { .. } | Stmt::Label { .. } => Ok(Eval::Ready(Flow::Normal)),

        Stmt::Break { .. } => Ok(Eval::Ready(Flow::Break)),

        Stmt::Goto { name, span } => Err(runtime_error(
            sf,
            *span,
            format!("goto {} is not supported", name),
        )),

        Stmt::Block(block) => execute_block(block, env, sf),

        Stmt::FunctionCall { call, .. } => {
            Ok(evaluate_call(call, env, sf)?.map(|_| Flow::Normal))
        }

        Stmt::Return { expressions, .. } => {
            Ok(evaluate_list(expressions, env, sf)?.map(Flow::Return))
        }

        Stmt::Local {
            names, expressions, ..
        } => {
            if expressions.is_empty() {
                if let Some(name) = names.iter().find(|n| n.attribute == Some(Attribute::Const)) {
                    return Err(runtime_error(
                        sf,
                        name.span,
                        format!("const variable '{}' must be initialized", name.name),
                    ));
                }
            }

            let env = env.clone();
            let sf = sf.clone();

            evaluate_list(expressions, &env, &sf)?.try_map(move |values| {
                let mut scope = env.borrow_mut();

                for (i, name) in names.iter().enumerate() {
                    let value = values.get(i).cloned().unwrap_or_default();

                    match name.attribute {
                        None => scope.define(&name.name, value),

                        Some(Attribute::Const) => scope.define_const(&name.name, value),

                        Some(Attribute::Close) => {
                            if value.is_truthy() && close_handler(&value).is_none() {
                                return Err(runtime_error(
                                    &sf,
                                    name.span,
                                    format!("variable '{}' got a non-closable value", name.name),
                                ));
                            }

                            scope.define_const(&name.name, value.clone());
                            scope.mark_to_close(value);
                        }
                    }
                }

                Ok(Flow::Normal)
            })
        }

        Stmt::Assignment {
            variables,
            expressions,
            ..
        } => execute_assignment(variables, expressions, env, sf),

        Stmt::LocalFunction { name, body, .. } => {
            env.borrow_mut().define(name, Value::Nil);

            let closure = Value::Function(Callable::Closure(Rc::new(Closure {
                body: body.clone(),
                env: env.clone(),
            })));

            env.borrow_mut().define(name, closure);

            Ok(Eval::Ready(Flow::Normal))
        }

        Stmt::Function { name, body, span } => {
            let closure = Value::Function(Callable::Closure(Rc::new(Closure {
                body: body.clone(),
                env: env.clone(),
            })));

            let (first, path) = match name.prop_names.split_first() {
                Some(parts) => parts,

                None => return Err(runtime_error(sf, *span, "malformed function name")),
            };

            if path.is_empty() && name.colon_name.is_none() {
                if env.borrow().is_const(first) {
                    return Err(runtime_error(sf, *span, const_assignment(first)));
                }

                env.borrow_mut().assign(first, closure);

                return Ok(Eval::Ready(Flow::Normal));
            }

            let mut target = env
                .borrow()
                .get(first)
                .ok_or_else(|| runtime_error(sf, *span, format!("Undefined variable {}", first)))?;

            // all but the final key select the table to store into
            let mut keys: Vec<&String> = path.iter().collect();
            let last = match &name.colon_name {
                Some(method) => method,

                None => keys.pop().unwrap_or(first),
            };

            let sf = sf.with_span(*span);

            for key in keys {
                target = match index_value(&target, &Value::str(key.as_str()), env, &sf)? {
                    Eval::Ready(value) => value,

                    Eval::Pending(_) => {
                        return Err(LuaError::runtime(&sf, "cannot define function on a pending value"))
                    }
                };
            }

            Ok(widen(assign_index(&target, Value::str(last.as_str()), closure, env, &sf)?)
                .map(|_| Flow::Normal))
        }

        Stmt::If {
            conditions,
            else_block,
            ..
        } => execute_if(conditions, else_block.as_ref(), env, sf),

        Stmt::While {
            condition, block, ..
        } => execute_while(condition, block, env.clone(), sf.clone()),

        Stmt::Repeat {
            block, condition, ..
        } => execute_repeat(block, condition, env.clone(), sf.clone()),

        Stmt::For {
            name,
            start,
            end,
            step,
            block,
            span,
        } => {
            let mut bounds = vec![
                evaluate(start, env, sf)?.map(Value::single),
                evaluate(end, env, sf)?.map(Value::single),
            ];

            if let Some(step) = step {
                bounds.push(evaluate(step, env, sf)?.map(Value::single));
            }

            let env = env.clone();
            let sf = sf.with_span(*span);

            gather(bounds).then(move |bounds| {
                let float = bounds.iter().any(Value::is_float);
                let mut numbers = Vec::with_capacity(3);

                for (value, what) in bounds.iter().zip(["initial", "limit", "step"]) {
                    numbers.push(value.to_number().ok_or_else(|| {
                        LuaError::runtime(&sf, format!("'for' {} value must be a number", what))
                    })?);
                }

                let step = numbers.get(2).copied().unwrap_or(1.0);

                if step == 0.0 {
                    return Err(LuaError::runtime(&sf, "'for' step is zero"));
                }

                execute_numeric_for(name, numbers[0], numbers[1], step, float, block, env, sf)
            })
        }

        Stmt::ForIn {
            names,
            expressions,
            block,
            ..
        } => {
            let env = env.clone();
            let sf = sf.clone();

            evaluate_list(expressions, &env, &sf)?.then(move |values| {
                let mut values = values.into_iter();
                let iterator = values.next().unwrap_or_default();
                let state = values.next().unwrap_or_default();
                let control = values.next().unwrap_or_default();

                execute_generic_for(names, iterator, state, control, block, env, sf)
            })
        }
    }
}

fn execute_assignment<'a>(
    variables: &'a [LValue],
    expressions: &'a [Expr],
    env: &EnvRef,
    sf: &StackFrame,
) -> Executed<'a> {
    enum Target {
        Name(String),
        Index(Value, Value),
    }

    let mut targets: Vec<Eval<'a, Target>> = Vec::with_capacity(variables.len());

    for variable in variables {
        let target = match variable {
            LValue::Variable { name, .. } => Eval::Ready(Target::Name(name.clone())),

            LValue::PropertyAccess {
                object, property, ..
            } => {
                let key = Value::str(property.as_str());

                evaluate(object, env, sf)?.map(move |object| Target::Index(object.single(), key))
            }

            LValue::TableAccess { object, key, .. } => {
                let object = evaluate(object, env, sf)?.map(Value::single);
                let key = evaluate(key, env, sf)?.map(Value::single);

                gather(vec![object, key]).map(|mut pair| {
                    let key = pair.pop().unwrap_or_default();
                    let object = pair.pop().unwrap_or_default();

                    Target::Index(object, key)
                })
            }
        };

        targets.push(target);
    }

    let targets = gather(targets);
    let values = evaluate_list(expressions, env, sf)?;
    let env = env.clone();
    let sf = sf.clone();

    targets.then(move |targets| {
        values.then(move |values| {
            let mut stores = Vec::new();

            for (i, target) in targets.into_iter().enumerate() {
                let value = values.get(i).cloned().unwrap_or_default();

                match target {
                    Target::Name(name) => {
                        if env.borrow().is_const(&name) {
                            return Err(LuaError::runtime(&sf, const_assignment(&name)));
                        }

                        env.borrow_mut().assign(&name, value);
                    }

                    Target::Index(object, key) => {
                        stores.push(widen(assign_index(&object, key, value, &env, &sf)?));
                    }
                }
            }

            Ok(gather(stores).map(|_| Flow::Normal))
        })
    })
}

fn const_assignment(name: &str) -> String {
    format!("attempt to assign to const variable '{}'", name)
}

fn execute_if<'a>(
    clauses: &'a [IfClause],
    else_block: Option<&'a Block>,
    env: &EnvRef,
    sf: &StackFrame,
) -> Executed<'a> {
    let Some((first, rest)) = clauses.split_first() else {
        return match else_block {
            Some(block) => execute_block(block, env, sf),

            None => Ok(Eval::Ready(Flow::Normal)),
        };
    };

    let env = env.clone();
    let sf = sf.clone();

    evaluate(&first.condition, &env, &sf)?.then(move |condition| {
        if condition.single().is_truthy() {
            execute_block(&first.block, &env, &sf)
        } else {
            execute_if(rest, else_block, &env, &sf)
        }
    })
}

fn execute_while<'a>(condition: &'a Expr, block: &'a Block, env: EnvRef, sf: StackFrame) -> Executed<'a> {
    loop {
        let value = match evaluate(condition, &env, &sf)? {
            Eval::Ready(value) => value,

            Eval::Pending(future) => {
                return Ok(Eval::Pending(
                    async move {
                        let mut value = future.await?;

                        loop {
                            if !value.single().is_truthy() {
                                return Ok(Flow::Normal);
                            }

                            let flow = execute_block(block, &env, &sf)?.resolve().await?;

                            if let Some(exit) = loop_exit(flow) {
                                return Ok(exit);
                            }

                            value = evaluate(condition, &env, &sf)?.resolve().await?;
                        }
                    }
                    .boxed_local(),
                ))
            }
        };

        if !value.single().is_truthy() {
            return Ok(Eval::Ready(Flow::Normal));
        }

        match execute_block(block, &env, &sf)? {
            Eval::Ready(flow) => {
                if let Some(exit) = loop_exit(flow) {
                    return Ok(Eval::Ready(exit));
                }
            }

            Eval::Pending(future) => {
                return Ok(Eval::Pending(
                    async move {
                        if let Some(exit) = loop_exit(future.await?) {
                            return Ok(exit);
                        }

                        execute_while(condition, block, env, sf)?.resolve().await
                    }
                    .boxed_local(),
                ))
            }
        }
    }
}

/// `repeat` runs its body in a scope the `until` condition can see.
fn execute_repeat<'a>(block: &'a Block, condition: &'a Expr, env: EnvRef, sf: StackFrame) -> Executed<'a> {
    loop {
        let scope = Environment::child(&env);

        let flow = match execute_statements(&block.statements, scope.clone(), sf.clone())? {
            Eval::Ready(flow) => flow,

            Eval::Pending(future) => {
                return Ok(Eval::Pending(
                    async move {
                        if let Some(exit) = loop_exit(future.await?) {
                            return Ok(exit);
                        }

                        if evaluate(condition, &scope, &sf)?.resolve().await?.single().is_truthy() {
                            return Ok(Flow::Normal);
                        }

                        execute_repeat(block, condition, env, sf)?.resolve().await
                    }
                    .boxed_local(),
                ))
            }
        };

        if let Some(exit) = loop_exit(flow) {
            return Ok(Eval::Ready(exit));
        }

        match evaluate(condition, &scope, &sf)? {
            Eval::Ready(value) => {
                if value.single().is_truthy() {
                    return Ok(Eval::Ready(Flow::Normal));
                }
            }

            Eval::Pending(future) => {
                return Ok(Eval::Pending(
                    async move {
                        if future.await?.single().is_truthy() {
                            return Ok(Flow::Normal);
                        }

                        execute_repeat(block, condition, env, sf)?.resolve().await
                    }
                    .boxed_local(),
                ))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_numeric_for<'a>(
    name: &'a str,
    start: f64,
    limit: f64,
    step: f64,
    float: bool,
    block: &'a Block,
    env: EnvRef,
    sf: StackFrame,
) -> Executed<'a> {
    let in_range = move |i: f64| if step > 0.0 { i <= limit } else { i >= limit };
    let mut i = start;

    while in_range(i) {
        let scope = Environment::child(&env);
        scope.borrow_mut().define(name, number(i, float));

        match execute_statements(&block.statements, scope, sf.clone())? {
            Eval::Ready(flow) => {
                if let Some(exit) = loop_exit(flow) {
                    return Ok(Eval::Ready(exit));
                }
            }

            Eval::Pending(future) => {
                return Ok(Eval::Pending(
                    async move {
                        if let Some(exit) = loop_exit(future.await?) {
                            return Ok(exit);
                        }

                        let mut i = i + step;

                        while in_range(i) {
                            let scope = Environment::child(&env);
                            scope.borrow_mut().define(name, number(i, float));

                            let flow = execute_statements(&block.statements, scope, sf.clone())?
                                .resolve()
                                .await?;

                            if let Some(exit) = loop_exit(flow) {
                                return Ok(exit);
                            }

                            i += step;
                        }

                        Ok(Flow::Normal)
                    }
                    .boxed_local(),
                ))
            }
        }

        i += step;
    }

    Ok(Eval::Ready(Flow::Normal))
}

/// One step of the generic `for` protocol: call the iterator and bind the
/// results. `None` once the first result is nil.
fn bind_iteration(
    names: &[String],
    results: Value,
    env: &EnvRef,
) -> Option<(EnvRef, Value)> {
    let results = results.into_values();
    let control = results.first().cloned().unwrap_or_default();

    if control.is_nil() {
        return None;
    }

    let scope = Environment::child(env);

    {
        let mut scope = scope.borrow_mut();

        for (i, name) in names.iter().enumerate() {
            scope.define(name, results.get(i).cloned().unwrap_or_default());
        }
    }

    Some((scope, control))
}

fn execute_generic_for<'a>(
    names: &'a [String],
    iterator: Value,
    state: Value,
    mut control: Value,
    block: &'a Block,
    env: EnvRef,
    sf: StackFrame,
) -> Executed<'a> {
    loop {
        let results = match invoke(&iterator, vec![state.clone(), control.clone()], &sf)? {
            Eval::Ready(results) => results,

            Eval::Pending(future) => {
                return Ok(Eval::Pending(
                    async move {
                        let mut results = future.await?;

                        loop {
                            let Some((scope, next)) = bind_iteration(names, results, &env) else {
                                return Ok(Flow::Normal);
                            };

                            let flow = execute_statements(&block.statements, scope, sf.clone())?
                                .resolve()
                                .await?;

                            if let Some(exit) = loop_exit(flow) {
                                return Ok(exit);
                            }

                            results = invoke(&iterator, vec![state.clone(), next], &sf)?
                                .resolve()
                                .await?;
                        }
                    }
                    .boxed_local(),
                ))
            }
        };

        let Some((scope, next)) = bind_iteration(names, results, &env) else {
            return Ok(Eval::Ready(Flow::Normal));
        };

        control = next;

        match execute_statements(&block.statements, scope, sf.clone())? {
            Eval::Ready(flow) => {
                if let Some(exit) = loop_exit(flow) {
                    return Ok(Eval::Ready(exit));
                }
            }

            Eval::Pending(future) => {
                return Ok(Eval::Pending(
                    async move {
                        if let Some(exit) = loop_exit(future.await?) {
                            return Ok(exit);
                        }

                        execute_generic_for(names, iterator, state, control, block, env, sf)?
                            .resolve()
                            .await
                    }
                    .boxed_local(),
                ))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Embeddable interpreter: a global scope plus entry points for running
/// scripts and expressions.
pub struct Interpreter {
    globals: EnvRef,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter with the standard library installed.
    pub fn new() -> Self {
        info!("Initializing Interpreter");

        let globals = Environment::root();
        crate::stdlib::install(&globals);

        Self { globals }
    }

    /// Interpreter with an empty global scope.
    pub fn bare() -> Self {
        Self {
            globals: Environment::root(),
        }
    }

    pub fn globals(&self) -> &EnvRef {
        &self.globals
    }

    pub fn define(&self, name: &str, value: Value) {
        debug!("Defining global '{}'", name);

        self.globals.borrow_mut().define(name, value);
    }

    /// Expose a JSON value as a global.
    pub fn define_json(&self, name: &str, json: &serde_json::Value) {
        self.define(name, Value::from_json(json));
    }

    /// Expose a host function exchanging JSON values.
    pub fn define_native<F>(&self, name: &str, func: F)
    where
        F: Fn(&StackFrame, Vec<serde_json::Value>) -> Result<Eval<'static, serde_json::Value>>
            + 'static,
    {
        self.define(name, Value::Function(Callable::native(name, func)));
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name)
    }

    /// Parse and run a script. The result holds the values of a top-level
    /// `return` (an empty multi-result otherwise).
    pub fn run(&self, source: &str) -> Result<Eval<'static, Value>> {
        let block = crate::parse(source)?;

        info!("Running script with {} statements", block.statements.len());

        self.run_block(block)
    }

    pub fn run_block(&self, block: Block) -> Result<Eval<'static, Value>> {
        let env = Environment::child(&self.globals);

        Eval::from_future(async move {
            let sf = StackFrame::root();
            let flow = execute_statements(&block.statements, env, sf.clone())?
                .resolve()
                .await?;

            match flow {
                Flow::Normal => Ok(Value::Multi(Vec::new())),

                Flow::Return(values) => Ok(Value::from_results(values)),

                Flow::Break => Err(LuaError::runtime(&sf, "break outside a loop")),
            }
        })
    }

    /// Parse and evaluate a single expression against the globals.
    pub fn evaluate_source(&self, source: &str) -> Result<Eval<'static, Value>> {
        let expr = crate::parse_expression(source)?;
        let env = self.globals.clone();

        info!("Evaluating expression");

        Eval::from_future(async move {
            evaluate(&expr, &env, &StackFrame::root())?.resolve().await
        })
    }
}
