/*!
Recursive‑descent parser producing the generic concrete syntax tree
([`ParseTree`]) consumed by the AST builder.

### Logging Policy

| Location                        | Level  | Purpose                                   |
|---------------------------------|--------|-------------------------------------------|
| `Parser::new`, `parse_chunk`    | `info` | Lifecycle milestones.                     |
| `statement`, `simple_expression`| `debug`| High‑level descent into grammar branches. |
| Error paths (`consume`, etc.)   | `debug`| Context before returning structured error.|

--------------------------------------------------------------------------------
Grammar (EBNF, condensed)
--------------------------------------------------------------------------------

```text
chunk       → block EOF ;
block       → stat* retstat? ;
stat        → ";" | "::" Name "::" | "break" | "goto" Name
            | "do" block "end"
            | "while" exp "do" block "end"
            | "repeat" block "until" exp
            | "if" exp "then" block ("elseif" exp "then" block)* ("else" block)? "end"
            | "for" Name "=" exp "," exp ("," exp)? "do" block "end"
            | "for" namelist "in" explist "do" block "end"
            | "function" funcname funcbody
            | "local" "function" Name funcbody
            | "local" attnamelist ("=" explist)?
            | varlist "=" explist
            | functioncall ;
retstat     → "return" explist? ";"? ;
exp         → subexp(0) ;
subexp      → (unop subexp(12) | simpleexp) (binop subexp)* ;
simpleexp   → nil | false | true | Number | String | "..."
            | tableconstructor | "function" funcbody | query
            | suffixedexp ;
suffixedexp → primaryexp ( "." Name | "[" exp "]" | ":" Name args | args )* ;
primaryexp  → Name | "(" exp ")" ;
query       → "query" "[" "[" clause* "]" "]" ;
clause      → "from" (Name "=")? exp | "where" exp
            | "order" "by" exp ("asc"|"desc")? ("," exp ("asc"|"desc")?)*
            | "limit" exp ("," exp)? | "select" exp ;
```

Binary operators are resolved by precedence climbing with Lua's priority
table; `..` and `^` are right associative and `^` binds tighter than a unary
operator on its left. Query clause words are contextual names.
*/

use crate::cst::ParseTree;
use crate::error::{LuaError, Result};
use crate::scanner::Scanner;
use crate::token::{Token, TokenType};

use log::{debug, info};

/// Operand priority for unary operators.
const UNARY_PRIORITY: u8 = 12;

/// `(left, right)` binding priorities of a binary operator token.
fn binary_priority(token_type: &TokenType) -> Option<(u8, u8)> {
    let priority = match token_type {
        TokenType::OR => (1, 1),
        TokenType::AND => (2, 2),
        TokenType::LESS
        | TokenType::GREATER
        | TokenType::LESS_EQUAL
        | TokenType::GREATER_EQUAL
        | TokenType::TILDE_EQUAL
        | TokenType::EQUAL_EQUAL => (3, 3),
        TokenType::PIPE => (4, 4),
        TokenType::TILDE => (5, 5),
        TokenType::AMPERSAND => (6, 6),
        TokenType::LESS_LESS | TokenType::GREATER_GREATER => (7, 7),
        TokenType::DOT_DOT => (9, 8),
        TokenType::PLUS | TokenType::MINUS => (10, 10),
        TokenType::STAR | TokenType::SLASH | TokenType::SLASH_SLASH | TokenType::PERCENT => {
            (11, 11)
        }
        TokenType::CARET => (14, 13),
        _ => return None,
    };

    Some(priority)
}

fn is_unary(token_type: &TokenType) -> bool {
    matches!(
        token_type,
        TokenType::NOT | TokenType::MINUS | TokenType::HASH | TokenType::TILDE
    )
}

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    current: usize,
}

impl<'a> Parser<'a> {
    /// Drain the scanner. The first lexical error aborts parsing.
    pub fn new(scanner: Scanner<'a>) -> Result<Self> {
        let tokens: Vec<Token<'a>> = scanner.collect::<Result<_>>()?;

        info!("Parser created over {} tokens", tokens.len());

        Ok(Self { tokens, current: 0 })
    }

    /// Parse a whole chunk: `Chunk[Block]`.
    pub fn parse_chunk(&mut self) -> Result<ParseTree> {
        info!("Parsing chunk");

        let block = self.block()?;

        self.consume(TokenType::EOF)?;

        Ok(ParseTree::node("Chunk", vec![block]))
    }

    /// Parse a single expression spanning the whole input.
    pub fn parse_expression(&mut self) -> Result<ParseTree> {
        info!("Parsing standalone expression");

        let expression = self.expression()?;

        self.consume(TokenType::EOF)?;

        Ok(expression)
    }

    // ───────────────────────────── helpers ─────────────────────────────────

    fn peek(&self) -> &Token<'a> {
        let last = self.tokens.len() - 1;

        &self.tokens[self.current.min(last)]
    }

    fn peek_next(&self) -> &Token<'a> {
        let last = self.tokens.len() - 1;

        &self.tokens[(self.current + 1).min(last)]
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.peek().token_type == token_type
    }

    /// Contextual word (query clause keyword).
    fn check_word(&self, word: &str) -> bool {
        self.check(TokenType::IDENTIFIER) && self.peek().lexeme == word
    }

    /// Consume and return the current token. `EOF` is never consumed.
    fn advance(&mut self) -> &Token<'a> {
        let index = self.current.min(self.tokens.len() - 1);

        if !self.check(TokenType::EOF) {
            self.current += 1;
        }

        &self.tokens[index]
    }

    fn matches(&mut self, token_type: TokenType) -> Option<ParseTree> {
        if self.check(token_type) {
            Some(self.leaf())
        } else {
            None
        }
    }

    fn consume(&mut self, token_type: TokenType) -> Result<ParseTree> {
        if self.check(token_type.clone()) {
            return Ok(self.leaf());
        }

        debug!(
            "Expected {:?}, found {:?}",
            token_type,
            self.peek().token_type
        );

        Err(self.unexpected())
    }

    fn consume_word(&mut self, word: &str) -> Result<ParseTree> {
        if self.check_word(word) {
            let token = self.advance();

            return Ok(ParseTree::leaf(word, word, token.span));
        }

        Err(self.unexpected())
    }

    fn unexpected(&self) -> LuaError {
        let token = self.peek();
        let near = if token.token_type == TokenType::EOF {
            "<eof>"
        } else {
            token.lexeme
        };

        LuaError::parse(token.span, format!("unexpected symbol near '{}'", near))
    }

    /// Consume the current token as a leaf. Keywords and punctuation use
    /// their text as node type.
    fn leaf(&mut self) -> ParseTree {
        let token = self.advance();

        let node_type = match token.token_type {
            TokenType::IDENTIFIER => "Name",
            TokenType::NUMBER(_) => "Number",
            TokenType::STRING => "LiteralString",
            TokenType::ELLIPSIS => "Ellipsis",
            _ => token.lexeme,
        };

        ParseTree::leaf(node_type, token.lexeme, token.span)
    }

    fn name(&mut self) -> Result<ParseTree> {
        self.consume(TokenType::IDENTIFIER)
    }

    fn position(&self) -> usize {
        self.peek().span.from
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::EOF | TokenType::END | TokenType::ELSE | TokenType::ELSEIF | TokenType::UNTIL
        )
    }

    // ───────────────────────────── statements ──────────────────────────────

    fn block(&mut self) -> Result<ParseTree> {
        let at = self.position();
        let mut statements = Vec::new();

        while !self.block_follows() {
            if self.check(TokenType::RETURN) {
                statements.push(self.return_statement()?);
                break;
            }

            statements.push(self.statement()?);
        }

        if statements.is_empty() {
            Ok(ParseTree::empty("Block", at))
        } else {
            Ok(ParseTree::node("Block", statements))
        }
    }

    fn statement(&mut self) -> Result<ParseTree> {
        debug!("Parsing statement at {:?}", self.peek().token_type);

        match self.peek().token_type {
            TokenType::SEMICOLON => Ok(self.leaf()),

            TokenType::DOUBLE_COLON => {
                let open = self.leaf();
                let name = self.name()?;
                let close = self.consume(TokenType::DOUBLE_COLON)?;

                Ok(ParseTree::node("Label", vec![open, name, close]))
            }

            TokenType::BREAK => {
                let keyword = self.leaf();

                Ok(ParseTree::node("Break", vec![keyword]))
            }

            TokenType::GOTO => {
                let keyword = self.leaf();
                let name = self.name()?;

                Ok(ParseTree::node("Goto", vec![keyword, name]))
            }

            TokenType::DO => {
                let open = self.leaf();
                let block = self.block()?;
                let close = self.consume(TokenType::END)?;

                Ok(ParseTree::node("Scope", vec![open, block, close]))
            }

            TokenType::WHILE => {
                let keyword = self.leaf();
                let condition = self.expression()?;
                let open = self.consume(TokenType::DO)?;
                let block = self.block()?;
                let close = self.consume(TokenType::END)?;

                Ok(ParseTree::node(
                    "WhileStatement",
                    vec![keyword, condition, open, block, close],
                ))
            }

            TokenType::REPEAT => {
                let keyword = self.leaf();
                let block = self.block()?;
                let until = self.consume(TokenType::UNTIL)?;
                let condition = self.expression()?;

                Ok(ParseTree::node(
                    "RepeatStatement",
                    vec![keyword, block, until, condition],
                ))
            }

            TokenType::IF => self.if_statement(),

            TokenType::FOR => self.for_statement(),

            TokenType::FUNCTION => {
                let keyword = self.leaf();
                let name = self.function_name()?;
                let body = self.function_body()?;

                Ok(ParseTree::node("Function", vec![keyword, name, body]))
            }

            TokenType::LOCAL => {
                let local = self.leaf();

                if let Some(keyword) = self.matches(TokenType::FUNCTION) {
                    let name = self.name()?;
                    let body = self.function_body()?;

                    return Ok(ParseTree::node(
                        "LocalFunction",
                        vec![local, keyword, name, body],
                    ));
                }

                let mut children = vec![local, self.attribute_names()?];

                if let Some(equal) = self.matches(TokenType::EQUAL) {
                    children.push(equal);
                    children.push(self.expression_list()?);
                }

                Ok(ParseTree::node("Local", children))
            }

            _ => self.expression_statement(),
        }
    }

    fn if_statement(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.leaf()];

        children.push(self.expression()?);
        children.push(self.consume(TokenType::THEN)?);
        children.push(self.block()?);

        while let Some(keyword) = self.matches(TokenType::ELSEIF) {
            children.push(keyword);
            children.push(self.expression()?);
            children.push(self.consume(TokenType::THEN)?);
            children.push(self.block()?);
        }

        if let Some(keyword) = self.matches(TokenType::ELSE) {
            children.push(keyword);
            children.push(self.block()?);
        }

        children.push(self.consume(TokenType::END)?);

        Ok(ParseTree::node("IfStatement", children))
    }

    fn for_statement(&mut self) -> Result<ParseTree> {
        let keyword = self.leaf();
        let first = self.name()?;

        let head = if let Some(equal) = self.matches(TokenType::EQUAL) {
            let mut children = vec![first, equal, self.expression()?];

            children.push(self.consume(TokenType::COMMA)?);
            children.push(self.expression()?);

            if let Some(comma) = self.matches(TokenType::COMMA) {
                children.push(comma);
                children.push(self.expression()?);
            }

            ParseTree::node("ForNumeric", children)
        } else {
            let mut names = vec![first];

            while let Some(comma) = self.matches(TokenType::COMMA) {
                names.push(comma);
                names.push(self.name()?);
            }

            let keyword_in = self.consume(TokenType::IN)?;
            let expressions = self.expression_list()?;

            ParseTree::node(
                "ForGeneric",
                vec![ParseTree::node("NameList", names), keyword_in, expressions],
            )
        };

        let open = self.consume(TokenType::DO)?;
        let block = self.block()?;
        let close = self.consume(TokenType::END)?;

        Ok(ParseTree::node(
            "ForStatement",
            vec![keyword, head, open, block, close],
        ))
    }

    fn return_statement(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.leaf()];

        if !self.block_follows() && !self.check(TokenType::SEMICOLON) {
            children.push(self.expression_list()?);
        }

        if let Some(semicolon) = self.matches(TokenType::SEMICOLON) {
            children.push(semicolon);
        }

        Ok(ParseTree::node("ReturnStatement", children))
    }

    /// Assignment or call statement; both start with a suffixed expression.
    fn expression_statement(&mut self) -> Result<ParseTree> {
        let first = self.suffixed_expression()?;

        if self.check(TokenType::EQUAL) || self.check(TokenType::COMMA) {
            let mut variables = vec![first];

            while let Some(comma) = self.matches(TokenType::COMMA) {
                variables.push(comma);
                variables.push(self.suffixed_expression()?);
            }

            let equal = self.consume(TokenType::EQUAL)?;
            let expressions = self.expression_list()?;

            return Ok(ParseTree::node(
                "Assign",
                vec![ParseTree::node("VarList", variables), equal, expressions],
            ));
        }

        if first.is("FunctionCall") {
            return Ok(first);
        }

        debug!("Expression statement is not a call: {}", first.node_type);

        Err(LuaError::parse(
            first.span(),
            format!("syntax error near '{}'", self.peek().lexeme),
        ))
    }

    fn function_name(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.name()?];

        while let Some(dot) = self.matches(TokenType::DOT) {
            children.push(dot);
            children.push(self.name()?);
        }

        if let Some(colon) = self.matches(TokenType::COLON) {
            children.push(colon);
            children.push(self.name()?);
        }

        Ok(ParseTree::node("FuncName", children))
    }

    fn function_body(&mut self) -> Result<ParseTree> {
        let open = self.consume(TokenType::LEFT_PAREN)?;
        let at = self.position();
        let mut parameters = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if self.check(TokenType::ELLIPSIS) {
                    parameters.push(self.leaf());
                    break;
                }

                parameters.push(self.name()?);

                match self.matches(TokenType::COMMA) {
                    Some(comma) => parameters.push(comma),

                    None => break,
                }
            }
        }

        let parameters = if parameters.is_empty() {
            ParseTree::empty("ParamList", at)
        } else {
            ParseTree::node("ParamList", parameters)
        };

        let close = self.consume(TokenType::RIGHT_PAREN)?;
        let block = self.block()?;
        let end = self.consume(TokenType::END)?;

        Ok(ParseTree::node(
            "FuncBody",
            vec![open, parameters, close, block, end],
        ))
    }

    fn attribute_names(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.attribute_name()?];

        while let Some(comma) = self.matches(TokenType::COMMA) {
            children.push(comma);
            children.push(self.attribute_name()?);
        }

        Ok(ParseTree::node("AttNameList", children))
    }

    fn attribute_name(&mut self) -> Result<ParseTree> {
        let name = self.name()?;

        let attribute = match self.matches(TokenType::LESS) {
            Some(open) => {
                let attribute = self.name()?;
                let close = self.consume(TokenType::GREATER)?;

                ParseTree::node("Attrib", vec![open, attribute, close])
            }

            None => ParseTree::empty("Attrib", name.to),
        };

        Ok(ParseTree::node("AttName", vec![name, attribute]))
    }

    // ───────────────────────────── expressions ─────────────────────────────

    fn expression_list(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.expression()?];

        while let Some(comma) = self.matches(TokenType::COMMA) {
            children.push(comma);
            children.push(self.expression()?);
        }

        Ok(ParseTree::node("ExpList", children))
    }

    pub fn expression(&mut self) -> Result<ParseTree> {
        self.sub_expression(0)
    }

    fn sub_expression(&mut self, limit: u8) -> Result<ParseTree> {
        let mut left = if is_unary(&self.peek().token_type) {
            let operator = self.leaf();
            let operand = self.sub_expression(UNARY_PRIORITY)?;

            ParseTree::node("UnaryExpression", vec![operator, operand])
        } else {
            self.simple_expression()?
        };

        while let Some((left_priority, right_priority)) = binary_priority(&self.peek().token_type) {
            if left_priority <= limit {
                break;
            }

            let operator = self.leaf();
            let right = self.sub_expression(right_priority)?;

            left = ParseTree::node("BinaryExpression", vec![left, operator, right]);
        }

        Ok(left)
    }

    fn simple_expression(&mut self) -> Result<ParseTree> {
        debug!("Parsing simple expression at {:?}", self.peek().token_type);

        match self.peek().token_type {
            TokenType::NUMBER(_)
            | TokenType::STRING
            | TokenType::NIL
            | TokenType::TRUE
            | TokenType::FALSE
            | TokenType::ELLIPSIS => Ok(self.leaf()),

            TokenType::LEFT_BRACE => self.table_constructor(),

            TokenType::FUNCTION => {
                let keyword = self.leaf();
                let body = self.function_body()?;

                Ok(ParseTree::node("FunctionDef", vec![keyword, body]))
            }

            TokenType::QUERY => self.query(),

            _ => self.suffixed_expression(),
        }
    }

    fn primary_expression(&mut self) -> Result<ParseTree> {
        match self.peek().token_type {
            TokenType::IDENTIFIER => Ok(self.leaf()),

            TokenType::LEFT_PAREN => {
                let open = self.leaf();
                let inner = self.expression()?;
                let close = self.consume(TokenType::RIGHT_PAREN)?;

                Ok(ParseTree::node("Parens", vec![open, inner, close]))
            }

            _ => {
                debug!("No primary expression at {:?}", self.peek().token_type);

                Err(self.unexpected())
            }
        }
    }

    fn suffixed_expression(&mut self) -> Result<ParseTree> {
        let mut expression = self.primary_expression()?;

        loop {
            match self.peek().token_type {
                TokenType::DOT => {
                    let dot = self.leaf();
                    let name = self.name()?;

                    expression = ParseTree::node("Property", vec![expression, dot, name]);
                }

                TokenType::LEFT_BRACKET => {
                    let open = self.leaf();
                    let key = self.expression()?;
                    let close = self.consume(TokenType::RIGHT_BRACKET)?;

                    expression =
                        ParseTree::node("MemberExpression", vec![expression, open, key, close]);
                }

                TokenType::COLON => {
                    let colon = self.leaf();
                    let name = self.name()?;
                    let args = self.arguments()?;

                    expression =
                        ParseTree::node("FunctionCall", vec![expression, colon, name, args]);
                }

                TokenType::LEFT_PAREN | TokenType::LEFT_BRACE | TokenType::STRING => {
                    let args = self.arguments()?;

                    expression = ParseTree::node("FunctionCall", vec![expression, args]);
                }

                _ => return Ok(expression),
            }
        }
    }

    fn arguments(&mut self) -> Result<ParseTree> {
        match self.peek().token_type {
            TokenType::STRING => {
                let string = self.leaf();

                Ok(ParseTree::node("Args", vec![string]))
            }

            TokenType::LEFT_BRACE => {
                let table = self.table_constructor()?;

                Ok(ParseTree::node("Args", vec![table]))
            }

            _ => {
                let mut children = vec![self.consume(TokenType::LEFT_PAREN)?];

                if !self.check(TokenType::RIGHT_PAREN) {
                    children.push(self.expression()?);

                    while let Some(comma) = self.matches(TokenType::COMMA) {
                        children.push(comma);
                        children.push(self.expression()?);
                    }
                }

                children.push(self.consume(TokenType::RIGHT_PAREN)?);

                Ok(ParseTree::node("Args", children))
            }
        }
    }

    fn table_constructor(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.consume(TokenType::LEFT_BRACE)?];

        while !self.check(TokenType::RIGHT_BRACE) {
            children.push(self.field()?);

            match self.peek().token_type {
                TokenType::COMMA | TokenType::SEMICOLON => children.push(self.leaf()),

                _ => break,
            }
        }

        children.push(self.consume(TokenType::RIGHT_BRACE)?);

        Ok(ParseTree::node("TableConstructor", children))
    }

    fn field(&mut self) -> Result<ParseTree> {
        if self.check(TokenType::LEFT_BRACKET) {
            let open = self.leaf();
            let key = self.expression()?;
            let close = self.consume(TokenType::RIGHT_BRACKET)?;
            let equal = self.consume(TokenType::EQUAL)?;
            let value = self.expression()?;

            return Ok(ParseTree::node(
                "FieldDynamic",
                vec![open, key, close, equal, value],
            ));
        }

        if self.check(TokenType::IDENTIFIER) && self.peek_next().token_type == TokenType::EQUAL {
            let name = self.leaf();
            let equal = self.leaf();
            let value = self.expression()?;

            return Ok(ParseTree::node("FieldProp", vec![name, equal, value]));
        }

        let value = self.expression()?;

        Ok(ParseTree::node("FieldExp", vec![value]))
    }

    // ───────────────────────────── query ───────────────────────────────────

    fn query(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.leaf()];

        children.push(self.consume(TokenType::LEFT_BRACKET)?);
        children.push(self.consume(TokenType::LEFT_BRACKET)?);

        while !self.check(TokenType::RIGHT_BRACKET) {
            let clause = self.query_clause()?;

            children.push(ParseTree::node("QueryClause", vec![clause]));
        }

        children.push(self.consume(TokenType::RIGHT_BRACKET)?);
        children.push(self.consume(TokenType::RIGHT_BRACKET)?);

        Ok(ParseTree::node("Query", children))
    }

    fn query_clause(&mut self) -> Result<ParseTree> {
        debug!("Parsing query clause near '{}'", self.peek().lexeme);

        if self.check_word("from") {
            let keyword = self.consume_word("from")?;

            if self.check(TokenType::IDENTIFIER) && self.peek_next().token_type == TokenType::EQUAL
            {
                let name = self.leaf();
                let equal = self.leaf();
                let source = self.expression()?;

                return Ok(ParseTree::node("FromClause", vec![keyword, name, equal, source]));
            }

            let source = self.expression()?;

            return Ok(ParseTree::node("FromClause", vec![keyword, source]));
        }

        if self.check_word("where") {
            let keyword = self.consume_word("where")?;
            let condition = self.expression()?;

            return Ok(ParseTree::node("WhereClause", vec![keyword, condition]));
        }

        if self.check_word("order") {
            let mut children = vec![self.consume_word("order")?, self.consume_word("by")?];

            children.push(self.ordering()?);

            while let Some(comma) = self.matches(TokenType::COMMA) {
                children.push(comma);
                children.push(self.ordering()?);
            }

            return Ok(ParseTree::node("OrderByClause", children));
        }

        if self.check_word("limit") {
            let mut children = vec![self.consume_word("limit")?, self.expression()?];

            if let Some(comma) = self.matches(TokenType::COMMA) {
                children.push(comma);
                children.push(self.expression()?);
            }

            return Ok(ParseTree::node("LimitClause", children));
        }

        if self.check_word("select") {
            let keyword = self.consume_word("select")?;
            let projection = self.expression()?;

            return Ok(ParseTree::node("SelectClause", vec![keyword, projection]));
        }

        Err(self.unexpected())
    }

    fn ordering(&mut self) -> Result<ParseTree> {
        let mut children = vec![self.expression()?];

        for word in ["asc", "desc"] {
            if self.check_word(word) {
                children.push(self.consume_word(word)?);
                break;
            }
        }

        Ok(ParseTree::node("OrderBy", children))
    }
}
