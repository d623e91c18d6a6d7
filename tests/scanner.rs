#[cfg(test)]
mod scanner_tests {
    use pretty_assertions::assert_eq;
    use space_lua::scanner::*;
    use space_lua::token::*;

    fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
        let scanner = Scanner::new(source);
        let tokens: Vec<_> = scanner.filter_map(Result::ok).collect();

        assert_eq!(tokens.len(), expected.len(), "token count for {:?}", source);

        for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
            assert_eq!(actual.token_type, *expected_type);
            assert_eq!(actual.lexeme, *expected_lexeme);
        }
    }

    fn token_lines(source: &str) -> Vec<String> {
        Scanner::new(source)
            .filter_map(Result::ok)
            .map(|t| t.to_string())
            .collect()
    }

    #[test]
    fn test_scanner_punctuation() {
        assert_token_sequence(
            "({[]}),;:::",
            &[
                (TokenType::LEFT_PAREN, "("),
                (TokenType::LEFT_BRACE, "{"),
                (TokenType::LEFT_BRACKET, "["),
                (TokenType::RIGHT_BRACKET, "]"),
                (TokenType::RIGHT_BRACE, "}"),
                (TokenType::RIGHT_PAREN, ")"),
                (TokenType::COMMA, ","),
                (TokenType::SEMICOLON, ";"),
                (TokenType::DOUBLE_COLON, "::"),
                (TokenType::COLON, ":"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_longest_operator_first() {
        assert_token_sequence(
            "a // b ~= c .. d ... << >> <= >= == ~",
            &[
                (TokenType::IDENTIFIER, "a"),
                (TokenType::SLASH_SLASH, "//"),
                (TokenType::IDENTIFIER, "b"),
                (TokenType::TILDE_EQUAL, "~="),
                (TokenType::IDENTIFIER, "c"),
                (TokenType::DOT_DOT, ".."),
                (TokenType::IDENTIFIER, "d"),
                (TokenType::ELLIPSIS, "..."),
                (TokenType::LESS_LESS, "<<"),
                (TokenType::GREATER_GREATER, ">>"),
                (TokenType::LESS_EQUAL, "<="),
                (TokenType::GREATER_EQUAL, ">="),
                (TokenType::EQUAL_EQUAL, "=="),
                (TokenType::TILDE, "~"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_keywords_and_names() {
        assert_token_sequence(
            "local function f() return nil end query _x1",
            &[
                (TokenType::LOCAL, "local"),
                (TokenType::FUNCTION, "function"),
                (TokenType::IDENTIFIER, "f"),
                (TokenType::LEFT_PAREN, "("),
                (TokenType::RIGHT_PAREN, ")"),
                (TokenType::RETURN, "return"),
                (TokenType::NIL, "nil"),
                (TokenType::END, "end"),
                (TokenType::QUERY, "query"),
                (TokenType::IDENTIFIER, "_x1"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_numbers() {
        let lines = token_lines("3 3.5 0x1F 1e2 .5");

        assert_eq!(
            lines,
            vec![
                "NUMBER 3 3.0",
                "NUMBER 3.5 3.5",
                "NUMBER 0x1F 31.0",
                "NUMBER 1e2 100.0",
                "NUMBER .5 0.5",
                "EOF  null",
            ]
        );
    }

    #[test]
    fn test_scanner_number_before_concat() {
        assert_token_sequence(
            "1..2",
            &[
                (TokenType::NUMBER(1.0), "1"),
                (TokenType::DOT_DOT, ".."),
                (TokenType::NUMBER(2.0), "2"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_strings_keep_raw_lexeme() {
        assert_token_sequence(
            r#""a\"b" 'c' [==[ x ]] y ]==]"#,
            &[
                (TokenType::STRING, r#""a\"b""#),
                (TokenType::STRING, "'c'"),
                (TokenType::STRING, "[==[ x ]] y ]==]"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_skips_comments() {
        assert_token_sequence(
            "a -- line comment\nb --[[ block\ncomment ]] c",
            &[
                (TokenType::IDENTIFIER, "a"),
                (TokenType::IDENTIFIER, "b"),
                (TokenType::IDENTIFIER, "c"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_splits_query_brackets() {
        assert_token_sequence(
            "query [[from p = people]]",
            &[
                (TokenType::QUERY, "query"),
                (TokenType::LEFT_BRACKET, "["),
                (TokenType::LEFT_BRACKET, "["),
                (TokenType::IDENTIFIER, "from"),
                (TokenType::IDENTIFIER, "p"),
                (TokenType::EQUAL, "="),
                (TokenType::IDENTIFIER, "people"),
                (TokenType::RIGHT_BRACKET, "]"),
                (TokenType::RIGHT_BRACKET, "]"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_scanner_long_string_outside_query() {
        assert_token_sequence(
            "x = [[from]]",
            &[
                (TokenType::IDENTIFIER, "x"),
                (TokenType::EQUAL, "="),
                (TokenType::STRING, "[[from]]"),
                (TokenType::EOF, ""),
            ],
        );
    }

    #[test]
    fn test_unexpected_symbol_recovers() {
        let results: Vec<_> = Scanner::new("a $ b").collect();

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
        assert!(results[3].is_ok());

        let error = results[1].as_ref().err().map(|e| e.to_string()).unwrap_or_default();
        assert!(
            error.contains("unexpected symbol near '$'"),
            "unexpected error text: {}",
            error
        );
    }

    #[test]
    fn test_unfinished_string() {
        let errors: Vec<String> = Scanner::new("\"abc\nd")
            .filter_map(|r| r.err())
            .map(|e| e.to_string())
            .collect();

        assert!(errors.iter().any(|e| e.contains("unfinished string")));
    }

    #[test]
    fn test_line_numbers() {
        let tokens: Vec<_> = Scanner::new("a\nb\n\nc").filter_map(Result::ok).collect();
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();

        assert_eq!(lines, vec![1, 2, 4, 4]);
    }
}
