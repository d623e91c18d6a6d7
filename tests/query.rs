#[cfg(test)]
mod query_tests {
    use std::collections::HashMap;
    use std::rc::Rc;

    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use space_lua::ast::Span;
    use space_lua::frame::StackFrame;
    use space_lua::query::*;
    use space_lua::value::HostObject;
    use space_lua::{Interpreter, LuaError, Value};

    fn people() -> serde_json::Value {
        json!([
            {"name": "Pete", "age": 20, "tags": ["admin"]},
            {"name": "Angie", "age": 38, "tags": ["dev", "ops"]},
            {"name": "Bob", "age": 45, "tags": []},
            {"name": "Zed", "age": 38, "tags": ["dev"]}
        ])
    }

    fn interpreter() -> Interpreter {
        let interpreter = Interpreter::new();
        interpreter.define_json("people", &people());
        interpreter
    }

    fn query_json(interpreter: &Interpreter, source: &str) -> Result<serde_json::Value, LuaError> {
        let value = block_on(interpreter.run(source)?.resolve())?;

        Ok(value.single().to_json())
    }

    fn run_query_script(source: &str) -> serde_json::Value {
        query_json(&interpreter(), source).unwrap()
    }

    fn records() -> Vec<Value> {
        match Value::from_json(&people()) {
            Value::Table(table) => table.borrow().array().to_vec(),

            other => panic!("expected a table, got {}", other),
        }
    }

    fn names(results: &[Value]) -> Vec<String> {
        results
            .iter()
            .map(|r| r.as_table().map(|t| t.borrow().get_str("name").to_string()).unwrap_or_default())
            .collect()
    }

    #[derive(Debug)]
    struct Inventory {
        items: ArrayCollection,
    }

    impl HostObject for Inventory {
        fn type_name(&self) -> &str {
            "inventory"
        }

        fn as_collection(&self) -> Option<&dyn QueryCollection> {
            Some(&self.items)
        }
    }

    struct Store {
        collections: HashMap<String, Vec<Value>>,
    }

    impl CollectionProvider for Store {
        fn collection(&self, name: &str) -> Option<Vec<Value>> {
            self.collections.get(name).cloned()
        }
    }

    // ── query expressions ───────────────────────────────────────────────────

    #[test]
    fn test_where_and_select() {
        assert_eq!(
            run_query_script("return query [[from p = people where p.age > 30 select p.name]]"),
            json!(["Angie", "Bob", "Zed"])
        );
    }

    #[test]
    fn test_order_by_is_stable_with_tie_breaks() {
        assert_eq!(
            run_query_script("return query [[from p = people order by p.age desc select p.name]]"),
            json!(["Bob", "Angie", "Zed", "Pete"])
        );

        assert_eq!(
            run_query_script(
                "return query [[from p = people order by p.age desc, p.name desc select p.name]]"
            ),
            json!(["Bob", "Zed", "Angie", "Pete"])
        );
    }

    #[test]
    fn test_order_by_puts_missing_keys_last() {
        let source = "local rows = {{a = 3}, {b = 1}, {a = 1}, {a = 2}}\n";

        assert_eq!(
            run_query_script(&format!(
                "{}return query [[from p = rows order by p.a select p.a or \"none\"]]",
                source
            )),
            json!([1, 2, 3, "none"])
        );

        assert_eq!(
            run_query_script(&format!(
                "{}return query [[from p = rows order by p.a desc select p.a or \"none\"]]",
                source
            )),
            json!(["none", 3, 2, 1])
        );
    }

    #[test]
    fn test_order_by_mixed_types() {
        assert_eq!(
            run_query_script("return query [[from v = {\"b\", 2, true, \"a\", false, 1} order by v]]"),
            json!([false, true, 1, 2, "a", "b"])
        );
    }

    #[test]
    fn test_limit_and_offset_apply_before_select() {
        assert_eq!(
            run_query_script("return query [[from p = people order by p.age limit 2, 1 select p.name]]"),
            json!(["Angie", "Zed"])
        );
    }

    #[test]
    fn test_limit_evaluated_in_outer_scope() {
        assert_eq!(
            run_query_script(
                "local n = 1\n\
                 return query [[from p = people where p.age > 30 limit n select p.name]]"
            ),
            json!(["Angie"])
        );
    }

    #[test]
    fn test_unnamed_from_binds_fields() {
        assert_eq!(
            run_query_script("return query [[from people where age < 30 select name .. \"!\"]]"),
            json!(["Pete!"])
        );
    }

    #[test]
    fn test_select_table_constructor() {
        assert_eq!(
            run_query_script(
                "return query [[from p = people where p.name == \"Bob\" select {who = p.name, years = p.age}]]"
            ),
            json!([{"who": "Bob", "years": 45}])
        );
    }

    #[test]
    fn test_where_calls_functions() {
        assert_eq!(
            run_query_script(
                "local function tagged(p, tag) return table.includes(p.tags, tag) end\n\
                 return query [[from p = people where tagged(p, \"dev\") select p.name]]"
            ),
            json!(["Angie", "Zed"])
        );
    }

    #[test]
    fn test_query_over_plain_values() {
        assert_eq!(
            run_query_script("return query [[from n = {5, 3, 9, 1} where n > 2 order by n select n * 10]]"),
            json!([30, 50, 90])
        );
    }

    #[test]
    fn test_query_without_clauses_copies_records() {
        let interpreter = interpreter();

        assert_eq!(
            query_json(&interpreter, "return #query [[from people]]").unwrap(),
            json!(4)
        );
    }

    #[test]
    fn test_query_errors() {
        let interpreter = interpreter();

        let error = query_json(&interpreter, "return query [[from p = 42]]").unwrap_err();
        assert_eq!(error.message(), "cannot query a number value");

        let error = query_json(&interpreter, "return query [[from p = people limit -1]]").unwrap_err();
        assert!(error.message().starts_with("limit must be a non-negative integer"));

        let error = query_json(&interpreter, "return query [[where true]]").unwrap_err();
        assert_eq!(error.message(), "query is missing a 'from' clause");
    }

    #[test]
    fn test_host_collection() {
        let interpreter = interpreter();
        let inventory = Inventory {
            items: ArrayCollection::new(vec![Value::str("bolt"), Value::str("nut"), Value::str("gear")]),
        };
        interpreter.define("inventory", Value::Userdata(Rc::new(inventory)));

        assert_eq!(
            query_json(
                &interpreter,
                "return query [[from i = inventory where #i > 3 order by i select string.upper(i)]]"
            )
            .unwrap(),
            json!(["BOLT", "GEAR"])
        );
    }

    // ── structured queries ──────────────────────────────────────────────────

    #[test]
    fn test_filter_operators() {
        let record = Value::from_json(&json!({"name": "Angie", "age": 38, "tags": ["dev", "ops"]}));

        let cases = [
            (Filter::new("age", FilterOp::Eq, 38.0), true),
            (Filter::new("age", FilterOp::Ne, 38.0), false),
            (Filter::new("age", FilterOp::Lt, 40.0), true),
            (Filter::new("age", FilterOp::Ge, 40.0), false),
            (Filter::new("name", FilterOp::Matches, "^An"), true),
            (Filter::new("name", FilterOp::NotMatches, "^An"), false),
            (Filter::new("tags", FilterOp::Eq, "ops"), true),
            (Filter::new("tags", FilterOp::Eq, "qa"), false),
            (Filter::new("missing", FilterOp::Eq, Value::Nil), true),
            (
                Filter::new("name", FilterOp::In, Value::from_json(&json!(["Bob", "Angie"]))),
                true,
            ),
        ];

        for (filter, expected) in cases {
            assert_eq!(filter.matches(&record, &StackFrame::root()).unwrap(), expected, "{:?}", filter);
        }
    }

    #[test]
    fn test_filter_op_symbols() {
        for symbol in ["=", "!=", "<", "<=", ">", ">=", "=~", "!=~", "in"] {
            let op = FilterOp::from_symbol(symbol).unwrap();

            assert_eq!(op.as_str(), symbol);
            assert_eq!(op.to_string(), symbol);
        }

        assert_eq!(FilterOp::from_symbol("<>"), None);
    }

    #[test]
    fn test_apply_query_pipeline() {
        let query = Query {
            collection: "people".to_string(),
            filters: vec![Filter::new("age", FilterOp::Gt, 30.0)],
            order_by: Some("name".to_string()),
            desc: true,
            limit: Some(2),
            ..Default::default()
        };

        let results = apply_query(&query, &records(), &StackFrame::root()).unwrap();

        assert_eq!(names(&results), vec!["Zed", "Bob"]);
    }

    #[test]
    fn test_apply_query_select_and_offset() {
        let query = Query {
            collection: "people".to_string(),
            order_by: Some("age".to_string()),
            offset: Some(3),
            select: Some(vec!["name".to_string()]),
            ..Default::default()
        };

        let results = apply_query(&query, &records(), &StackFrame::root()).unwrap();
        let rendered: Vec<serde_json::Value> = results.iter().map(Value::to_json).collect();

        assert_eq!(rendered, vec![json!({"name": "Bob"})]);
    }

    #[test]
    fn test_apply_query_orders_missing_fields() {
        let records = match Value::from_json(&json!([{"a": 3}, {"b": 1}, {"a": 1}, {"a": 2}])) {
            Value::Table(table) => table.borrow().array().to_vec(),

            other => panic!("expected a table, got {}", other),
        };

        let mut query = Query {
            collection: "rows".to_string(),
            order_by: Some("a".to_string()),
            ..Default::default()
        };

        let rendered = |results: Vec<Value>| results.iter().map(Value::to_json).collect::<Vec<_>>();

        assert_eq!(
            rendered(apply_query(&query, &records, &StackFrame::root()).unwrap()),
            vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3}), json!({"b": 1})]
        );

        query.desc = true;

        assert_eq!(
            rendered(apply_query(&query, &records, &StackFrame::root()).unwrap()),
            vec![json!({"b": 1}), json!({"a": 3}), json!({"a": 2}), json!({"a": 1})]
        );
    }

    #[test]
    fn test_sort_order_is_total() {
        let values = [
            Value::Nil,
            Value::str("a"),
            Value::Number(2.0),
            Value::Bool(true),
            Value::Number(1.0),
            Value::Bool(false),
        ];

        let mut sorted = values.to_vec();
        sorted.sort_by(sort_order);

        let rendered: Vec<String> = sorted.iter().map(Value::to_string).collect();
        assert_eq!(rendered, vec!["false", "true", "1", "2", "a", "nil"]);
    }

    #[test]
    fn test_structured_errors_keep_caller_frame() {
        let sf = StackFrame::root().with_span(Span::new(7, 19));
        let record = Value::from_json(&json!({"name": "Angie"}));

        let error = Filter::new("name", FilterOp::Matches, "(")
            .matches(&record, &sf)
            .unwrap_err();
        assert!(error.message().starts_with("invalid regex '('"));
        assert!(matches!(error, LuaError::Runtime { ref frame, .. } if frame.span().map(|s| s.from) == Some(7)));

        let store = Store {
            collections: HashMap::new(),
        };
        let unknown = Query {
            collection: "pets".to_string(),
            ..Default::default()
        };

        let error = run_query(&unknown, &store, &sf).unwrap_err();
        assert!(matches!(error, LuaError::Runtime { ref frame, .. } if frame.depth() == 1));
    }

    #[test]
    fn test_run_query_with_provider() {
        let store = Store {
            collections: HashMap::from([("people".to_string(), records())]),
        };

        let query = Query {
            collection: "people".to_string(),
            filters: vec![Filter::new("name", FilterOp::Matches, "e$")],
            ..Default::default()
        };

        assert_eq!(names(&run_query(&query, &store, &StackFrame::root()).unwrap()), vec!["Pete", "Angie"]);

        let unknown = Query {
            collection: "pets".to_string(),
            ..Default::default()
        };

        assert_eq!(
            run_query(&unknown, &store, &StackFrame::root()).unwrap_err().message(),
            "unknown collection 'pets'"
        );
    }
}
