//! Collection queries.
//!
//! Two evaluators live here:
//!
//! * [`evaluate_query`] runs a `query [[ from ... where ... ]]` expression.
//!   Clause expressions are Lua expressions evaluated per record.
//! * [`apply_query`] runs a structured [`Query`] (field filters with fixed
//!   operators) over a list of records, typically supplied by a
//!   [`CollectionProvider`].
//!
//! Both execute their stages in the same order: filter, order by,
//! limit/offset, select. A missing clause leaves its stage a no-op.

use std::cmp::Ordering;
use std::fmt;

use log::debug;
use regex::Regex;

use crate::ast::{Expr, QueryClause};
use crate::environment::{EnvRef, Environment};
use crate::error::{LuaError, Result};
use crate::frame::StackFrame;
use crate::interpreter::{compare, evaluate};
use crate::pending::{gather, Eval};
use crate::table::{Table, TableRef};
use crate::value::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Lua-level queries
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrderBy<'a> {
    pub expression: &'a Expr,
    pub descending: bool,
}

/// A `query` expression with its outer-scope parts (limit, offset) already
/// evaluated.
#[derive(Debug, Clone, Default)]
pub struct CollectionQuery<'a> {
    /// Name bound to each record; `None` binds the record's keys instead.
    pub object_variable: Option<String>,
    pub filter: Option<&'a Expr>,
    pub order_by: Vec<OrderBy<'a>>,
    pub select: Option<&'a Expr>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A source that can answer a [`CollectionQuery`].
pub trait QueryCollection {
    fn query<'a>(
        &self,
        query: &CollectionQuery<'a>,
        env: &EnvRef,
        sf: &StackFrame,
    ) -> Result<Eval<'a, Vec<Value>>>;
}

/// In-memory record list.
#[derive(Debug, Clone, Default)]
pub struct ArrayCollection {
    items: Vec<Value>,
}

impl ArrayCollection {
    pub fn new(items: Vec<Value>) -> Self {
        ArrayCollection { items }
    }
}

impl QueryCollection for ArrayCollection {
    fn query<'a>(
        &self,
        query: &CollectionQuery<'a>,
        env: &EnvRef,
        sf: &StackFrame,
    ) -> Result<Eval<'a, Vec<Value>>> {
        debug!("Querying {} in-memory records", self.items.len());

        Eval::from_future(run_pipeline(
            self.items.clone(),
            query.clone(),
            env.clone(),
            sf.clone(),
        ))
    }
}

/// Scope in which per-record clause expressions run.
pub fn build_item_env(object_variable: Option<&str>, item: &Value, env: &EnvRef) -> EnvRef {
    let item_env = Environment::child(env);

    {
        let mut scope = item_env.borrow_mut();

        match object_variable {
            Some(name) => scope.define(name, item.clone()),

            None => {
                if let Value::Table(table) = item {
                    let table = table.borrow();

                    for key in table.keys() {
                        if let Value::String(name) = &key {
                            scope.define(name, table.get(&key));
                        }
                    }
                }

                scope.define("_", item.clone());
            }
        }
    }

    item_env
}

async fn run_pipeline<'a>(
    items: Vec<Value>,
    query: CollectionQuery<'a>,
    env: EnvRef,
    sf: StackFrame,
) -> Result<Vec<Value>> {
    let variable = query.object_variable.as_deref();

    let mut records = Vec::with_capacity(items.len());

    for item in items {
        if let Some(filter) = query.filter {
            let item_env = build_item_env(variable, &item, &env);
            let keep = evaluate(filter, &item_env, &sf)?.resolve().await?;

            if !keep.single().is_truthy() {
                continue;
            }
        }

        records.push(item);
    }

    if !query.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(records.len());

        for record in records {
            let item_env = build_item_env(variable, &record, &env);
            let mut keys = Vec::with_capacity(query.order_by.len());

            for ordering in &query.order_by {
                keys.push(evaluate(ordering.expression, &item_env, &sf)?.resolve().await?.single());
            }

            keyed.push((keys, record));
        }

        // sort_by is stable: equal keys keep their filtered order
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, ordering) in query.order_by.iter().enumerate() {
                let order = sort_order(&a[i], &b[i]);

                if order != Ordering::Equal {
                    return if ordering.descending { order.reverse() } else { order };
                }
            }

            Ordering::Equal
        });

        records = keyed.into_iter().map(|(_, record)| record).collect();
    }

    let records: Vec<Value> = records
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    let Some(select) = query.select else {
        return Ok(records);
    };

    let mut projected = Vec::with_capacity(records.len());

    for record in records {
        let item_env = build_item_env(variable, &record, &env);
        projected.push(evaluate(select, &item_env, &sf)?.resolve().await?.single());
    }

    Ok(projected)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) | Value::Float(_) => 1,
        Value::String(_) => 2,
        Value::Table(_) => 3,
        Value::Function(_) => 4,
        Value::Userdata(_) => 5,
        Value::Multi(_) => 6,
        Value::Nil => 7,
    }
}

/// Total order used by `order by`: numbers and strings compare naturally,
/// `false` sorts before `true`, other mixes sort by type, and nil sorts after
/// everything so it lands last ascending and first descending.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    if let (Value::Bool(a), Value::Bool(b)) = (a, b) {
        return a.cmp(b);
    }

    compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

fn count_argument(value: Value, clause: &str, sf: &StackFrame) -> Result<Option<usize>> {
    if value.is_nil() {
        return Ok(None);
    }

    match value.to_integer() {
        Some(n) if n >= 0 => Ok(Some(n as usize)),

        _ => Err(LuaError::runtime(
            sf,
            format!("{} must be a non-negative integer, got {}", clause, value),
        )),
    }
}

/// Evaluate a `query [[ ... ]]` expression to an array table of results.
pub fn evaluate_query<'a>(
    clauses: &'a [QueryClause],
    env: &EnvRef,
    sf: &StackFrame,
) -> Result<Eval<'a, Value>> {
    let mut query = CollectionQuery::default();
    let mut source = None;
    let mut limit = None;
    let mut offset = None;

    for clause in clauses {
        match clause {
            QueryClause::From { name, expression, .. } => {
                query.object_variable = name.clone();
                source = Some(expression);
            }

            QueryClause::Where { expression, .. } => query.filter = Some(expression),

            QueryClause::OrderBy { orderings, .. } => {
                query.order_by = orderings
                    .iter()
                    .map(|o| OrderBy {
                        expression: &o.expression,
                        descending: o.descending,
                    })
                    .collect();
            }

            QueryClause::Limit {
                limit: count,
                offset: skip,
                ..
            } => {
                limit = Some(count);
                offset = skip.as_ref();
            }

            QueryClause::Select { expression, .. } => query.select = Some(expression),
        }
    }

    let Some(source) = source else {
        return Err(LuaError::runtime(sf, "query is missing a 'from' clause"));
    };

    let mut parts = vec![evaluate(source, env, sf)?.map(Value::single)];

    for expression in [limit, offset] {
        parts.push(match expression {
            Some(expression) => evaluate(expression, env, sf)?.map(Value::single),

            None => Eval::Ready(Value::Nil),
        });
    }

    let env = env.clone();
    let sf = sf.clone();

    gather(parts).then(move |parts| {
        let mut parts = parts.into_iter();
        let collection = parts.next().unwrap_or_default();
        query.limit = count_argument(parts.next().unwrap_or_default(), "limit", &sf)?;
        query.offset = count_argument(parts.next().unwrap_or_default(), "offset", &sf)?;

        debug!("Evaluating query over a {}", collection.type_name());

        let results = match &collection {
            Value::Table(table) => {
                let items = table.borrow().array().to_vec();

                ArrayCollection::new(items).query(&query, &env, &sf)?
            }

            Value::Userdata(host) => match host.as_collection() {
                Some(source) => source.query(&query, &env, &sf)?,

                None => {
                    return Err(LuaError::runtime(
                        &sf,
                        format!("cannot query a {} value", collection.type_name()),
                    ))
                }
            },

            other => {
                return Err(LuaError::runtime(
                    &sf,
                    format!("cannot query a {} value", other.type_name()),
                ))
            }
        };

        Ok(results.map(|records| Value::Table(TableRef::from_values(records))))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Structured queries
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    /// `=~`, regular expression match
    Matches,

    /// `!=~`
    NotMatches,

    /// Membership in a list value.
    In,
}

impl FilterOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "=" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            "<" => FilterOp::Lt,
            "<=" => FilterOp::Le,
            ">" => FilterOp::Gt,
            ">=" => FilterOp::Ge,
            "=~" => FilterOp::Matches,
            "!=~" => FilterOp::NotMatches,
            "in" => FilterOp::In,
            _ => return None,
        };

        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::Matches => "=~",
            FilterOp::NotMatches => "!=~",
            FilterOp::In => "in",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub op: FilterOp,
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Filter {
            op,
            field: field.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
    pub desc: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,

    /// Fields to keep in each result record.
    pub select: Option<Vec<String>>,
}

/// Named record collections for structured queries.
pub trait CollectionProvider {
    fn collection(&self, name: &str) -> Option<Vec<Value>>;
}

fn field(record: &Value, name: &str) -> Value {
    match record {
        Value::Table(table) => table.borrow().get_str(name),

        Value::Userdata(host) => host.get(&Value::str(name)).unwrap_or_default(),

        _ => Value::Nil,
    }
}

fn list_contains(list: &Value, needle: &Value) -> bool {
    list.as_table()
        .is_some_and(|t| t.borrow().array().iter().any(|v| v == needle))
}

fn regex_matches(pattern: &Value, subject: &Value, sf: &StackFrame) -> Result<bool> {
    let pattern = pattern.to_string();
    let regex = Regex::new(&pattern)
        .map_err(|e| LuaError::runtime(sf, format!("invalid regex '{}': {}", pattern, e)))?;

    Ok(match subject {
        Value::Nil => false,

        subject => regex.is_match(&subject.to_string()),
    })
}

impl Filter {
    /// Whether `record` satisfies this filter.
    pub fn matches(&self, record: &Value, sf: &StackFrame) -> Result<bool> {
        let actual = field(record, &self.field);

        let keep = match self.op {
            // a list field matches when it contains the value (or any of them)
            FilterOp::Eq => match (&actual, &self.value) {
                (Value::Table(items), Value::Table(wanted)) => {
                    let wanted = wanted.borrow();

                    items.borrow().array().iter().any(|v| wanted.array().contains(v))
                }

                (Value::Table(_), wanted) => list_contains(&actual, wanted),

                (actual, wanted) => actual == wanted,
            },

            FilterOp::Ne => actual != self.value,

            FilterOp::Lt => compare(&actual, &self.value).is_some_and(Ordering::is_lt),

            FilterOp::Le => compare(&actual, &self.value).is_some_and(Ordering::is_le),

            FilterOp::Gt => compare(&actual, &self.value).is_some_and(Ordering::is_gt),

            FilterOp::Ge => compare(&actual, &self.value).is_some_and(Ordering::is_ge),

            FilterOp::Matches => regex_matches(&self.value, &actual, sf)?,

            FilterOp::NotMatches => !regex_matches(&self.value, &actual, sf)?,

            FilterOp::In => list_contains(&self.value, &actual),
        };

        Ok(keep)
    }
}

/// Run a structured query over `records`.
pub fn apply_query(query: &Query, records: &[Value], sf: &StackFrame) -> Result<Vec<Value>> {
    let mut results = Vec::new();

    'records: for record in records {
        for filter in &query.filters {
            if !filter.matches(record, sf)? {
                continue 'records;
            }
        }

        results.push(record.clone());
    }

    debug!(
        "Query on '{}' kept {} of {} records",
        query.collection,
        results.len(),
        records.len()
    );

    if let Some(order_by) = &query.order_by {
        results.sort_by(|a, b| {
            let order = sort_order(&field(a, order_by), &field(b, order_by));

            if query.desc {
                order.reverse()
            } else {
                order
            }
        });
    }

    let results = results
        .into_iter()
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX));

    let Some(select) = &query.select else {
        return Ok(results.collect());
    };

    Ok(results
        .map(|record| {
            let mut projected = Table::new();

            for name in select {
                projected.set_str(name.as_str(), field(&record, name));
            }

            Value::table(projected)
        })
        .collect())
}

/// Look the query's collection up in `provider` and run the query over it.
pub fn run_query(
    query: &Query,
    provider: &dyn CollectionProvider,
    sf: &StackFrame,
) -> Result<Vec<Value>> {
    let records = provider
        .collection(&query.collection)
        .ok_or_else(|| LuaError::runtime(sf, format!("unknown collection '{}'", query.collection)))?;

    apply_query(query, &records, sf)
}
