#[cfg(test)]
mod parser_tests {
    use pretty_assertions::assert_eq;
    use space_lua::ast::*;
    use space_lua::ast_printer::AstPrinter;

    fn parse(source: &str) -> Block {
        space_lua::parse(source).unwrap()
    }

    fn expr(source: &str) -> Expr {
        space_lua::parse_expression(source).unwrap()
    }

    fn int(value: f64) -> Expr {
        Expr::Number {
            value,
            kind: NumberKind::Int,
            span: Span::default(),
        }
    }

    fn var(name: &str) -> Expr {
        Expr::Variable {
            name: name.to_string(),
            span: Span::default(),
        }
    }

    fn binary(operator: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            span: Span::default(),
        }
    }

    /// The printed form of `source` parses back to an equal tree.
    fn assert_same_tree(source: &str) {
        let tree = expr(source);
        let printed = AstPrinter::print(&tree);

        assert_eq!(
            space_lua::parse_expression(&printed).unwrap(),
            tree,
            "{:?} printed as {:?}",
            source,
            printed
        );
    }

    /// Printing the parse of the printed form reproduces it.
    fn assert_round_trip(source: &str) {
        let first = AstPrinter::print_block(&parse(source));
        let second = AstPrinter::print_block(&parse(&first));

        assert_eq!(first, second, "printer output did not re-parse to the same text");
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(
            expr("1 + 2 * 3"),
            binary(
                BinaryOp::Add,
                int(1.0),
                binary(BinaryOp::Mul, int(2.0), int(3.0))
            )
        );
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        assert_eq!(
            expr("a - b - c"),
            binary(
                BinaryOp::Sub,
                binary(BinaryOp::Sub, var("a"), var("b")),
                var("c")
            )
        );
    }

    #[test]
    fn test_concat_and_power_are_right_associative() {
        assert_eq!(
            expr("a .. b .. c"),
            binary(
                BinaryOp::Concat,
                var("a"),
                binary(BinaryOp::Concat, var("b"), var("c"))
            )
        );

        assert_eq!(
            expr("2 ^ 3 ^ 2"),
            binary(
                BinaryOp::Pow,
                int(2.0),
                binary(BinaryOp::Pow, int(3.0), int(2.0))
            )
        );
    }

    #[test]
    fn test_unary_minus_below_power() {
        assert_eq!(
            expr("-x ^ 2"),
            Expr::Unary {
                operator: UnaryOp::Neg,
                argument: Box::new(binary(BinaryOp::Pow, var("x"), int(2.0))),
                span: Span::default(),
            }
        );
    }

    #[test]
    fn test_float_literal_kind() {
        assert_eq!(
            expr("3.0"),
            Expr::Number {
                value: 3.0,
                kind: NumberKind::Float,
                span: Span::default(),
            }
        );
    }

    #[test]
    fn test_string_escapes_are_decoded() {
        assert_eq!(
            expr(r#""a\tb\65\u{48}""#),
            Expr::String {
                value: "a\tbAH".to_string(),
                span: Span::default(),
            }
        );
    }

    #[test]
    fn test_method_call_shape() {
        let Expr::FunctionCall(call) = expr("obj:greet(1, 2)") else {
            panic!("expected a call");
        };

        assert_eq!(*call.prefix, var("obj"));
        assert_eq!(call.name.as_deref(), Some("greet"));
        assert_eq!(call.args, vec![int(1.0), int(2.0)]);
    }

    #[test]
    fn test_call_sugar_arguments() {
        let Expr::FunctionCall(call) = expr("f \"x\"") else {
            panic!("expected a call");
        };
        assert_eq!(call.args.len(), 1);

        let Expr::FunctionCall(call) = expr("f { 1, 2 }") else {
            panic!("expected a call");
        };
        assert!(matches!(call.args[0], Expr::TableConstructor { .. }));
    }

    #[test]
    fn test_table_constructor_fields() {
        let Expr::TableConstructor { fields, .. } = expr("{ 1, a = 2, [3] = 4; }") else {
            panic!("expected a table constructor");
        };

        assert_eq!(fields.len(), 3);
        assert!(matches!(fields[0], TableField::Positional { .. }));
        assert!(matches!(&fields[1], TableField::Property { key, .. } if key == "a"));
        assert!(matches!(fields[2], TableField::Dynamic { .. }));
    }

    #[test]
    fn test_statements() {
        let block = parse(
            "local x <const> = 1\n\
             x, y = y, x\n\
             function a.b:c(p, ...) return p end\n\
             for i = 1, 10, 2 do end\n\
             for k, v in pairs(t) do end\n\
             while true do break end\n\
             repeat local z = 1 until z\n\
             if a then elseif b then else end\n\
             ::top::\n\
             goto top",
        );

        let kinds: Vec<&str> = block
            .statements
            .iter()
            .map(|stmt| match stmt {
                Stmt::Local { .. } => "local",
                Stmt::Assignment { .. } => "assign",
                Stmt::Function { .. } => "function",
                Stmt::For { .. } => "for",
                Stmt::ForIn { .. } => "forin",
                Stmt::While { .. } => "while",
                Stmt::Repeat { .. } => "repeat",
                Stmt::If { .. } => "if",
                Stmt::Label { .. } => "label",
                Stmt::Goto { .. } => "goto",
                _ => "other",
            })
            .collect();

        assert_eq!(
            kinds,
            vec!["local", "assign", "function", "for", "forin", "while", "repeat", "if", "label", "goto"]
        );

        let Stmt::Local { names, .. } = &block.statements[0] else {
            unreachable!()
        };
        assert_eq!(names[0].attribute, Some(Attribute::Const));

        let Stmt::Function { name, body, .. } = &block.statements[2] else {
            unreachable!()
        };
        assert_eq!(name.prop_names, vec!["a", "b"]);
        assert_eq!(name.colon_name.as_deref(), Some("c"));
        assert_eq!(body.parameters, vec!["p"]);
        assert!(body.varargs);

        let Stmt::If { conditions, else_block, .. } = &block.statements[7] else {
            unreachable!()
        };
        assert_eq!(conditions.len(), 2);
        assert!(else_block.is_some());
    }

    #[test]
    fn test_query_clauses() {
        let Expr::Query { clauses, .. } =
            expr("query [[from p = people where p.age > 30 order by p.name desc limit 2, 1 select p.name]]")
        else {
            panic!("expected a query");
        };

        assert_eq!(clauses.len(), 5);
        assert!(matches!(&clauses[0], QueryClause::From { name: Some(n), .. } if n == "p"));
        assert!(matches!(clauses[1], QueryClause::Where { .. }));

        let QueryClause::OrderBy { orderings, .. } = &clauses[2] else {
            panic!("expected order by");
        };
        assert_eq!(orderings.len(), 1);
        assert!(orderings[0].descending);

        assert!(matches!(clauses[3], QueryClause::Limit { offset: Some(_), .. }));
        assert!(matches!(clauses[4], QueryClause::Select { .. }));
    }

    #[test]
    fn test_comments_are_ignored() {
        let block = parse("-- leading\nlocal a = 1 --[[ inline ]] + 2\n--[==[\nblock\n]==]");

        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn test_syntax_errors() {
        for source in ["local = 1", "if x then", "x = = 2", "f(", "return return"] {
            let error = space_lua::parse(source);

            assert!(
                matches!(error, Err(space_lua::LuaError::Parse { .. })),
                "{:?} should not parse: {:?}",
                source,
                error
            );
        }
    }

    #[test]
    fn test_local_attributes() {
        for (source, message) in [
            ("local x <nope> = 1", "unknown attribute 'nope'"),
            ("local x <Const> = 1", "unknown attribute 'Const'"),
            ("local a <close>, b <close> = nil", "multiple <close> variables in local list"),
        ] {
            match space_lua::parse(source) {
                Err(error @ space_lua::LuaError::Parse { .. }) => assert_eq!(error.message(), message),

                other => panic!("{:?} should not parse: {:?}", source, other),
            }
        }

        let block = parse("local a <close>, b = nil");
        let Stmt::Local { names, .. } = &block.statements[0] else {
            unreachable!()
        };
        assert_eq!(names[0].attribute, Some(Attribute::Close));
        assert_eq!(names[1].attribute, None);
    }

    #[test]
    fn test_lexical_error_reported_from_parse() {
        assert!(matches!(
            space_lua::parse("x = $"),
            Err(space_lua::LuaError::Lex { .. })
        ));
    }

    #[test]
    fn test_printer_parenthesises_operators() {
        assert_eq!(AstPrinter::print(&expr("1 + 2 * 3")), "(1 + (2 * 3))");
        assert_eq!(AstPrinter::print(&expr("not a")), "(not a)");
        assert_eq!(AstPrinter::print(&expr("-a")), "(-a)");
    }

    #[test]
    fn test_printer_quotes_strings() {
        assert_eq!(AstPrinter::quote("a\"b\n"), r#""a\"b\n""#);
    }

    #[test]
    fn test_printer_round_trips() {
        assert_round_trip(
            "local function fib(n)\n\
               if n < 2 then return n end\n\
               return fib(n - 1) + fib(n - 2)\n\
             end\n\
             local t = { 1, 2, x = \"y\", [1 + 1] = 3.5 }\n\
             for i = 10, 1, -1 do t[i] = i end\n\
             for k, v in pairs(t) do print(k, v) end\n\
             while t.x do t.x = nil end\n\
             repeat local q = 1 until q == 1\n\
             obj:method(\"a\", ...)\n\
             local r = query [[from v = t where v > 1 order by v desc limit 3 select v * 2]]\n\
             return #t, -1, not true",
        );
    }

    #[test]
    fn test_printer_output_parses_to_same_tree() {
        let source = "local a, b = 1, 2.5\nreturn (a + b) * 2 ^ -a .. \"x\"";
        let tree = parse(source);
        let printed = AstPrinter::print_block(&tree);

        assert_eq!(parse(&printed), tree);
    }

    #[test]
    fn test_printed_expressions_parse_to_same_tree() {
        let binary_operators = [
            "+", "-", "*", "/", "//", "%", "^", "..", "==", "~=", "<", "<=", ">", ">=", "and", "or",
            "&", "|", "~", "<<", ">>",
        ];

        for operator in binary_operators {
            assert_same_tree(&format!("a {} b", operator));
            assert_same_tree(&format!("(a {} b) {} c", operator, operator));
        }

        for source in ["-a", "not a", "#a", "~a", "-(-a)", "not not a", "-x ^ 2", "#t.list + 1"] {
            assert_same_tree(source);
        }

        for source in [
            "nil",
            "true",
            "false",
            "3",
            "3.5",
            "2.0",
            "1e20",
            "0x1F",
            r#""tab\tquote\"bell\a\65\x41\u{263A}""#,
            "[==[ long ]] string ]==]",
            "[[\nfirst newline dropped]]",
            "{1, \"two\", x = 3, [4 + 1] = {nested = true}; 5}",
            "{}",
            "function(a, b, ...) local s = a + b return s, ... end",
            "function() end",
            "obj:method(1, \"a\"):chain()",
            "f \"sugar\"",
            "f {1, 2}",
            "(\"x\"):upper()",
            "a.b.c[1][\"k\"].d",
            "(f())",
            "(a)",
            "query [[from p = people where p.age > 30 and p.name ~= \"x\" order by p.age desc, p.name limit 10, 5 select {name = p.name, n = #p.tags}]]",
            "query [[from items where x select x .. \"!\"]]",
            "query [[from v = {3, 1} order by v limit 1]]",
        ] {
            assert_same_tree(source);
        }
    }

    #[test]
    fn test_printed_blocks_parse_to_same_tree() {
        let source = "local x <const>, y = 1\n\
             x, y = y, x\n\
             function a.b:c(p, ...) return p, ... end\n\
             local function f(n) if n < 2 then return n elseif n > 9 then return -n else return f(n - 1) end end\n\
             for i = 1, 10, 2 do t[i] = (...) end\n\
             for k, v in pairs(t) do print(k, v) end\n\
             while true do break end\n\
             repeat local z = 1 until z\n\
             do local w = query [[from p = t select p]] end\n\
             ::top::\n\
             goto top\n\
             return f(3), {1, x = 2}";

        let tree = parse(source);
        let printed = AstPrinter::print_block(&tree);

        assert_eq!(parse(&printed), tree, "printed as {:?}", printed);
    }
}
