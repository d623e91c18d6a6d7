#[cfg(test)]
mod interpreter_tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::channel::oneshot;
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use space_lua::pending::Eval;
    use space_lua::value::Callable;
    use space_lua::{Interpreter, LuaError, Value};

    fn run_with(interpreter: &Interpreter, source: &str) -> Result<Value, LuaError> {
        block_on(interpreter.run(source)?.resolve())
    }

    fn run(source: &str) -> Value {
        run_with(&Interpreter::new(), source).unwrap()
    }

    /// Display form of the script's return values, tab separated.
    fn output(source: &str) -> String {
        run(source)
            .into_values()
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\t")
    }

    fn eval(source: &str) -> Value {
        let interpreter = Interpreter::new();

        block_on(interpreter.evaluate_source(source).unwrap().resolve()).unwrap()
    }

    fn runtime_error(source: &str) -> String {
        match run_with(&Interpreter::new(), source) {
            Err(e) if e.is_runtime() => e.message(),

            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    /// Interpreter with `f(x)` answering `x` through an unresolved future,
    /// and `g(x)` answering `x` immediately.
    fn with_pending_natives() -> Interpreter {
        let interpreter = Interpreter::new();

        interpreter.define(
            "f",
            Value::Function(Callable::builtin("f", |_sf, args| {
                let value = args.into_iter().next().unwrap_or_default();

                Ok(Eval::pending(async move {
                    futures::future::ready(()).await;
                    Ok(value)
                }))
            })),
        );

        interpreter.define_native("g", |_sf, args| {
            Ok(Eval::Ready(args.into_iter().next().unwrap_or_default()))
        });

        interpreter
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 + 3 - 3").to_string(), "3");
        assert_eq!(eval("4 // 3").to_string(), "1");
        assert_eq!(eval("4 % 3").to_string(), "1");
        assert_eq!(eval("-7 % 3").to_string(), "2");
        assert_eq!(eval("7 // -2").to_string(), "-4");
        assert_eq!(eval("2 ^ 10").to_string(), "1024.0");
        assert_eq!(eval("7 / 2").to_string(), "3.5");
        assert_eq!(eval("6 / 2").to_string(), "3.0");
        assert_eq!(eval("1.5 + 1.5").to_string(), "3.0");
        assert_eq!(eval("\"10\" + 5").to_string(), "15");
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(eval("5 & 3").to_string(), "1");
        assert_eq!(eval("5 | 3").to_string(), "7");
        assert_eq!(eval("5 ~ 3").to_string(), "6");
        assert_eq!(eval("1 << 4").to_string(), "16");
        assert_eq!(eval("256 >> 4").to_string(), "16");
        assert_eq!(eval("~0").to_string(), "-1");
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval("1 < 2"), Value::Bool(true));
        assert_eq!(eval("\"a\" < \"b\""), Value::Bool(true));
        assert_eq!(eval("1 == 1.0"), Value::Bool(true));
        assert_eq!(eval("\"1\" == 1"), Value::Bool(false));
        assert_eq!(eval("nil or 5").to_string(), "5");
        assert_eq!(eval("false and error(\"never\")"), Value::Bool(false));
        assert_eq!(eval("1 and 2").to_string(), "2");
        assert_eq!(eval("not nil"), Value::Bool(true));
    }

    #[test]
    fn test_concat_and_length() {
        assert_eq!(eval("\"a\" .. 1 .. 2.0").to_string(), "a12.0");
        assert_eq!(eval("#\"hello\"").to_string(), "5");
        assert_eq!(eval("#{}").to_string(), "0");
        assert_eq!(eval("#{1, 2, 3}").to_string(), "3");
    }

    #[test]
    fn test_table_constructors() {
        assert_eq!(eval("{3, 1, 2}").to_json(), serde_json::json!([3, 1, 2]));

        assert_eq!(
            output("local t = {[3 + 2] = 1, [\"a\" .. \"b\"] = 2}\nreturn t[5], t.ab"),
            "1\t2"
        );

        assert_eq!(
            output("local function two() return 1, 2 end\nlocal t = {two(), two()}\nreturn #t"),
            "3"
        );
    }

    #[test]
    fn test_locals_and_scoping() {
        assert_eq!(
            output(
                "local x = 1\n\
                 do local x = 2 end\n\
                 local a, b, c = 1, 2\n\
                 return x, c"
            ),
            "1\tnil"
        );
    }

    #[test]
    fn test_multiple_assignment_evaluates_right_first() {
        assert_eq!(output("local a, b = 1, 2\na, b = b, a\nreturn a, b"), "2\t1");
    }

    #[test]
    fn test_closures_capture_variables() {
        assert_eq!(
            output(
                "local function counter()\n\
                   local n = 0\n\
                   return function() n = n + 1; return n end\n\
                 end\n\
                 local c1, c2 = counter(), counter()\n\
                 c1(); c1()\n\
                 return c1(), c2()"
            ),
            "3\t1"
        );
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            output(
                "local function fib(n) if n < 2 then return n end return fib(n - 1) + fib(n - 2) end\n\
                 return fib(15)"
            ),
            "610"
        );
    }

    #[test]
    fn test_varargs() {
        assert_eq!(
            output(
                "local function f(...) local a, b = ... return select(\"#\", ...), a, b end\n\
                 return f(7, 8, 9)"
            ),
            "3\t7\t8"
        );

        assert_eq!(output("local function f(...) return (...) end\nreturn f(1, 2)"), "1");
    }

    #[test]
    fn test_loops() {
        assert_eq!(
            output("local s = 0\nfor i = 1, 10 do s = s + i end\nreturn s"),
            "55"
        );
        assert_eq!(
            output("local s = 0\nfor i = 10, 1, -3 do s = s + i end\nreturn s"),
            "22"
        );
        assert_eq!(
            output("local i = 0\nwhile true do i = i + 1 if i > 4 then break end end\nreturn i"),
            "5"
        );
        assert_eq!(
            output("local i = 0\nrepeat local j = i; i = i + 1 until j >= 3\nreturn i"),
            "4"
        );
    }

    #[test]
    fn test_generic_for() {
        assert_eq!(
            output(
                "local t = {10, 20, 30}\n\
                 local s = 0\n\
                 for i, v in ipairs(t) do s = s + i * v end\n\
                 return s"
            ),
            "140"
        );

        assert_eq!(
            output(
                "local t = {a = 1, b = 2, c = 3}\n\
                 local s = 0\n\
                 for k, v in pairs(t) do s = s + v end\n\
                 return s"
            ),
            "6"
        );
    }

    #[test]
    fn test_methods_and_self() {
        assert_eq!(
            output(
                "local Account = {balance = 0}\n\
                 function Account:deposit(v) self.balance = self.balance + v end\n\
                 Account:deposit(5)\n\
                 Account.deposit(Account, 10)\n\
                 return Account.balance"
            ),
            "15"
        );
    }

    #[test]
    fn test_metatables() {
        assert_eq!(
            output(
                "local defaults = {color = \"red\"}\n\
                 local t = setmetatable({}, {__index = defaults})\n\
                 local log = {}\n\
                 local u = setmetatable({}, {__newindex = function(tbl, k, v) rawset(log, k, v) end})\n\
                 u.x = 1\n\
                 local f = setmetatable({}, {__index = function(tbl, k) return k .. \"!\" end})\n\
                 return t.color, rawget(u, \"x\"), log.x, f.hi"
            ),
            "red\tnil\t1\thi!"
        );
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(output("local s = \"Hello\"\nreturn s:upper(), s:len()"), "HELLO\t5");
    }

    #[test]
    fn test_top_level_return_values() {
        assert_eq!(run("local x = 1"), Value::Multi(Vec::new()));
        assert_eq!(run("return 42").to_string(), "42");
    }

    #[test]
    fn test_globals_from_host() {
        let interpreter = Interpreter::new();
        interpreter.define_json("config", &serde_json::json!({"name": "space", "tags": ["a", "b"]}));

        let value = run_with(&interpreter, "return config.name .. #config.tags").unwrap();
        assert_eq!(value.to_string(), "space2");

        run_with(&interpreter, "answer = 42").unwrap();
        assert_eq!(interpreter.get("answer").map(|v| v.to_string()), Some("42".to_string()));
    }

    #[test]
    fn test_pending_results_propagate() {
        let interpreter = with_pending_natives();

        assert_eq!(run_with(&interpreter, "return -f(3)").unwrap().to_string(), "-3");
        assert_eq!(run_with(&interpreter, "return f(3) + 1").unwrap().to_string(), "4");
        assert_eq!(run_with(&interpreter, "return g(3) + f(4)").unwrap().to_string(), "7");
    }

    #[test]
    fn test_pending_inside_loops_and_tables() {
        let interpreter = with_pending_natives();

        let value = run_with(
            &interpreter,
            "local s = 0\n\
             for i = 1, 5 do s = s + f(i) end\n\
             local t = {f(1), f(2), x = f(\"y\")}\n\
             return s, #t, t.x",
        )
        .unwrap();

        let rendered: Vec<String> = value.into_values().iter().map(Value::to_string).collect();
        assert_eq!(rendered, vec!["15", "2", "y"]);
    }

    #[test]
    fn test_pending_future_completed_later() {
        let (sender, receiver) = oneshot::channel::<f64>();
        let receiver = Rc::new(RefCell::new(Some(receiver)));
        let interpreter = Interpreter::new();

        interpreter.define(
            "fetch",
            Value::Function(Callable::builtin("fetch", move |sf, _args| {
                let receiver = receiver.borrow_mut().take();
                let sf = sf.clone();

                Ok(Eval::pending(async move {
                    match receiver {
                        Some(receiver) => receiver
                            .await
                            .map(Value::Number)
                            .map_err(|_| LuaError::runtime(&sf, "cancelled")),

                        None => Ok(Value::Nil),
                    }
                }))
            })),
        );

        let eval = interpreter.run("return fetch() * 2").unwrap();
        assert!(eval.is_pending());

        sender.send(21.0).unwrap();
        assert_eq!(block_on(eval.resolve()).unwrap().to_string(), "42");
    }

    #[test]
    fn test_runtime_errors() {
        assert_eq!(runtime_error("return nil + 1"), "attempt to perform arithmetic on a nil value");
        assert_eq!(runtime_error("local t = nil\nreturn t.x"), "attempt to index a nil value");
        assert_eq!(runtime_error("local t = 5\nt()"), "attempt to call a number value");
        assert_eq!(runtime_error("return {} < {}"), "attempt to compare table with table");
        assert_eq!(runtime_error("return 1 // 0"), "attempt to perform 'n//0'");
        assert_eq!(runtime_error("return #5"), "attempt to get length of a number value");
        assert_eq!(runtime_error("return undefinedName"), "Undefined variable undefinedName");
        assert_eq!(runtime_error("for i = 1, 2, 0 do end"), "'for' step is zero");
        assert_eq!(runtime_error("local t = {}\nt[nil] = 1"), "table index is nil");
    }

    #[test]
    fn test_const_locals() {
        assert_eq!(
            runtime_error("local x <const> = 1\nx = 2"),
            "attempt to assign to const variable 'x'"
        );
        assert_eq!(
            runtime_error("local a, b <const> = 1, 2\na, b = 3, 4"),
            "attempt to assign to const variable 'b'"
        );
        assert_eq!(
            runtime_error("local a <const> = 1\nlocal function f() a = 2 end\nf()"),
            "attempt to assign to const variable 'a'"
        );
        assert_eq!(
            runtime_error("local f <const> = 1\nfunction f() end"),
            "attempt to assign to const variable 'f'"
        );
        assert_eq!(
            runtime_error("local a <const>, b <const>"),
            "const variable 'a' must be initialized"
        );

        assert_eq!(
            output(
                "local a <const> = 1\n\
                 do local a = 2; a = 3 end\n\
                 local t <const> = {x = 1}\n\
                 t.x = t.x + 1\n\
                 local n <const> = nil\n\
                 return a, t.x, n == nil"
            ),
            "1\t2\ttrue"
        );
    }

    #[test]
    fn test_close_locals_run_close_metamethod() {
        assert_eq!(
            output(
                "local log = {}\n\
                 local function closer(name)\n\
                   return setmetatable({}, {__close = function(v, e) log[#log + 1] = name .. \":\" .. tostring(e) end})\n\
                 end\n\
                 do\n\
                   local a <close> = closer(\"a\")\n\
                   local b <close> = closer(\"b\")\n\
                   log[#log + 1] = \"body\"\n\
                 end\n\
                 local ok = pcall(function()\n\
                   local c <close> = closer(\"c\")\n\
                   error(\"boom\")\n\
                 end)\n\
                 local function early()\n\
                   local d <close> = closer(\"d\")\n\
                   return 1\n\
                 end\n\
                 early()\n\
                 local skipped <close> = nil\n\
                 return ok, table.concat(log, \",\")"
            ),
            "false\tbody,b:nil,a:nil,c:boom,d:nil"
        );

        assert_eq!(
            runtime_error("local x <close> = 42"),
            "variable 'x' got a non-closable value"
        );
        assert_eq!(
            runtime_error("local c <close> = setmetatable({}, {__close = function() error(\"in close\") end})"),
            "in close"
        );
    }

    #[test]
    fn test_runtime_error_caught_by_pcall() {
        assert_eq!(
            output(
                "local ok, e = pcall(function() local t = nil; return t.x end)\n\
                 return ok, e"
            ),
            "false\tattempt to index a nil value"
        );
    }
}
