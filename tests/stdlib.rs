#[cfg(test)]
mod stdlib_tests {
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use space_lua::{Interpreter, Value};

    fn output(source: &str) -> String {
        let interpreter = Interpreter::new();
        let value = block_on(interpreter.run(source).unwrap().resolve()).unwrap();

        value
            .into_values()
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\t")
    }

    fn error_message(source: &str) -> String {
        let interpreter = Interpreter::new();

        match interpreter.run(source).and_then(|eval| block_on(eval.resolve())) {
            Err(e) => e.message(),

            Ok(value) => panic!("expected an error, got {}", value),
        }
    }

    // ── base ────────────────────────────────────────────────────────────────

    #[test]
    fn test_type_and_tostring() {
        assert_eq!(
            output("return type(nil), type(1), type(\"s\"), type({}), type(print), type(true)"),
            "nil\tnumber\tstring\ttable\tfunction\tboolean"
        );
        assert_eq!(output("return tostring(12), tostring(1.5), tostring(nil)"), "12\t1.5\tnil");
    }

    #[test]
    fn test_tonumber() {
        assert_eq!(
            output("return tonumber(\"42\"), tonumber(\" 0x10 \"), tonumber(\"z\"), tonumber(\"ff\", 16), tonumber(\"101\", 2)"),
            "42\t16\tnil\t255\t5"
        );
    }

    #[test]
    fn test_tonumber_with_base_rejects_second_sign() {
        assert_eq!(
            output("return tonumber(\"--9223372036854775808\", 10), tonumber(\"-+5\", 10), tonumber(\"-ff\", 16)"),
            "nil\tnil\t-255"
        );
        assert_eq!(output("return tonumber(\"9223372036854775808\", 10)"), "nil");
    }

    #[test]
    fn test_pcall() {
        assert_eq!(output("return pcall(error, \"boom\")"), "false\tboom");
        assert_eq!(output("return pcall(function(a) return a * 2 end, 21)"), "true\t42");
    }

    #[test]
    fn test_xpcall_calls_handler() {
        assert_eq!(
            output("return xpcall(function() error(\"bad\") end, function(m) return \"handled \" .. m end)"),
            "false\thandled bad"
        );
    }

    #[test]
    fn test_assert() {
        assert_eq!(output("return assert(1, \"unused\")"), "1\tunused");
        assert_eq!(error_message("assert(false, \"custom\")"), "custom");
        assert_eq!(error_message("assert(nil)"), "assertion failed!");
    }

    #[test]
    fn test_select() {
        assert_eq!(output("return select(\"#\", 1, nil, 3)"), "3");
        assert_eq!(output("return select(2, \"a\", \"b\", \"c\")"), "b\tc");
        assert_eq!(output("return select(-1, \"a\", \"b\", \"c\")"), "c");
    }

    #[test]
    fn test_ipairs_and_each() {
        assert_eq!(
            output(
                "local out = {}\n\
                 for i, v in ipairs({\"a\", \"b\", \"c\"}) do out[#out + 1] = i .. v end\n\
                 for v in each({\"x\", \"y\"}) do out[#out + 1] = v end\n\
                 return table.concat(out, \",\")"
            ),
            "1a,2b,3c,x,y"
        );
    }

    #[test]
    fn test_next_walks_every_key() {
        assert_eq!(
            output(
                "local t = {1, 2, k = 3}\n\
                 local n, k = 0, next(t)\n\
                 while k ~= nil do n = n + 1; k = next(t, k) end\n\
                 return n"
            ),
            "3"
        );
    }

    #[test]
    fn test_some() {
        assert_eq!(
            output("return some({}), some(\"  \"), some(\"x\"), some(0)"),
            "nil\tnil\tx\t0"
        );
    }

    #[test]
    fn test_getmetatable() {
        assert_eq!(
            output("local mt = {}\nlocal t = setmetatable({}, mt)\nreturn getmetatable(t) == mt, getmetatable({})"),
            "true\tnil"
        );
    }

    // ── string ──────────────────────────────────────────────────────────────

    #[test]
    fn test_string_basics() {
        assert_eq!(
            output("return string.len(\"abc\"), (\"abc\"):upper(), string.rep(\"ab\", 3, \"-\"), string.reverse(\"abc\")"),
            "3\tABC\tab-ab-ab\tcba"
        );
        assert_eq!(
            output("return string.sub(\"hello\", 2, 4), string.sub(\"hello\", -3), string.sub(\"hello\", 4, 2)"),
            "ell\tllo\t"
        );
        assert_eq!(output("return string.byte(\"A\"), string.char(72, 105)"), "65\tHi");
    }

    #[test]
    fn test_string_find() {
        assert_eq!(output("return string.find(\"hello world\", \"o w\")"), "5\t7");
        assert_eq!(output("return string.find(\"a.b\", \".\", 1, true)"), "2\t2");
        assert_eq!(output("return string.find(\"abc\", \"x\")"), "nil");
        assert_eq!(output("return string.find(\"key=val\", \"(%w+)=(%w+)\")"), "1\t7\tkey\tval");
    }

    #[test]
    fn test_string_match_patterns() {
        assert_eq!(output("return string.match(\"order 66 done\", \"%d+\")"), "66");
        assert_eq!(output("return string.match(\"file.txt\", \"%.(%a+)$\")"), "txt");
        assert_eq!(output("return string.match(\"  trim  \", \"^%s*(.-)%s*$\")"), "trim");
        assert_eq!(output("return string.match(\"2024-01-05\", \"(%d+)-(%d+)-(%d+)\")"), "2024\t01\t05");
        assert_eq!(output("return string.match(\"abc\", \"[^a]+\")"), "bc");
    }

    #[test]
    fn test_gmatch() {
        assert_eq!(
            output(
                "local words = {}\n\
                 for w in string.gmatch(\"one two  three\", \"%a+\") do words[#words + 1] = w end\n\
                 return table.concat(words, \"|\")"
            ),
            "one|two|three"
        );
    }

    #[test]
    fn test_gsub() {
        assert_eq!(output("return string.gsub(\"hello world\", \"o\", \"0\")"), "hell0 w0rld\t2");
        assert_eq!(output("return string.gsub(\"abc\", \"%w\", \"%0%0\", 2)"), "aabbc\t2");
        assert_eq!(
            output("return string.gsub(\"$name is $age\", \"%$(%w+)\", {name = \"Ann\", age = 30})"),
            "Ann is 30\t2"
        );
        assert_eq!(
            output("return string.gsub(\"1 2 3\", \"%d\", function(d) return d * 10 end)"),
            "10 20 30\t3"
        );
    }

    #[test]
    fn test_unsupported_pattern_items() {
        assert_eq!(
            error_message("return string.find(\"(x)\", \"%b()\")"),
            "pattern item '%b' is not supported"
        );
    }

    #[test]
    fn test_format() {
        assert_eq!(
            output("return string.format(\"%d|%5d|%-5d|%05d|%.2f|%s|%x|%%\", 7, 42, 42, -42, 3.14159, \"s\", 255)"),
            "7|   42|42   |-0042|3.14|s|ff|%"
        );
        assert_eq!(output("return string.format(\"%q\", \"a\\\"b\")"), "\"a\\\"b\"");
    }

    #[test]
    fn test_format_width_and_precision_limits() {
        assert_eq!(output("return #string.format(\"%99d\", 1)"), "99");
        assert_eq!(
            error_message("return string.format(\"%99999999999999999999d\", 1)"),
            "bad argument #1 to 'format' (invalid conversion '%99999999999999999999' to 'format')"
        );
        assert_eq!(
            error_message("return string.format(\"%.100f\", 1)"),
            "bad argument #1 to 'format' (invalid conversion '%100' to 'format')"
        );
    }

    #[test]
    fn test_string_extensions() {
        assert_eq!(
            output("local parts = string.split(\"a,b,c\", \",\")\nreturn #parts, parts[2]"),
            "3\tb"
        );
        assert_eq!(
            output("return (\"space\"):startsWith(\"sp\"), (\"space\"):endsWith(\"x\")"),
            "true\tfalse"
        );
        assert_eq!(
            output("return \"[\" .. string.trim(\"  x \") .. string.trimStart(\" y \") .. string.trimEnd(\" z \") .. \"]\""),
            "[xy  z]"
        );
    }

    #[test]
    fn test_match_regex() {
        assert_eq!(
            output("local m = string.matchRegex(\"id: 42\", \"(\\\\w+): (\\\\d+)\")\nreturn m[1], m[2], m[3]"),
            "id: 42\tid\t42"
        );
        assert_eq!(
            output(
                "local n = 0\n\
                 for m in string.matchRegexAll(\"a1 b2 c3\", \"[a-z]\\\\d\") do n = n + 1 end\n\
                 return n"
            ),
            "3"
        );
    }

    // ── table ───────────────────────────────────────────────────────────────

    #[test]
    fn test_table_insert_and_remove() {
        assert_eq!(
            output(
                "local t = {1, 2, 3}\n\
                 table.insert(t, 4)\n\
                 table.insert(t, 1, 0)\n\
                 local last = table.remove(t)\n\
                 local first = table.remove(t, 1)\n\
                 return table.concat(t, \",\"), last, first"
            ),
            "1,2,3\t4\t0"
        );
    }

    #[test]
    fn test_table_sort() {
        assert_eq!(
            output("local t = {3, 1, 2}\ntable.sort(t)\nreturn table.concat(t, \" \")"),
            "1 2 3"
        );
        assert_eq!(
            output("local t = {3, 1, 2}\ntable.sort(t, function(a, b) return a > b end)\nreturn table.concat(t, \" \")"),
            "3 2 1"
        );
        assert!(error_message("table.sort({1, \"a\"})").starts_with("attempt to compare"));
    }

    #[test]
    fn test_table_pack_unpack() {
        assert_eq!(output("local p = table.pack(1, 2, 3)\nreturn p.n, table.unpack(p)"), "3\t1\t2\t3");
        assert_eq!(output("return unpack({1, 2, 3}, 2)"), "2\t3");
        assert_eq!(output("return select(\"#\", unpack({}, 3, 1))"), "0");
        assert_eq!(error_message("return unpack({}, 1, 1e12)"), "too many results to unpack");
        assert_eq!(
            error_message("return table.unpack({}, -1e15, 1e15)"),
            "too many results to unpack"
        );
    }

    #[test]
    fn test_table_extensions() {
        assert_eq!(
            output(
                "local t = {a = 1, b = 2, c = 3}\n\
                 local s = table.select(t, \"a\", \"c\")\n\
                 return #table.keys(t), table.includes(t, 2), table.includes(t, 9), s.a, s.b, s.c"
            ),
            "3\ttrue\tfalse\t1\tnil\t3"
        );
    }

    // ── math ────────────────────────────────────────────────────────────────

    #[test]
    fn test_math() {
        assert_eq!(
            output("return math.floor(3.7), math.ceil(3.2), math.abs(-4), math.max(1, 5, 3), math.min(2, -1)"),
            "3\t4\t4\t5\t-1"
        );
        assert_eq!(output("return math.sqrt(16), math.fmod(7, 3), math.tointeger(3.0)"), "4.0\t1\t3");
        assert_eq!(output("return math.huge > 1e308, math.pi > 3.14"), "true\ttrue");
    }
}
