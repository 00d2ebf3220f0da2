use std::cell::{Cell, RefCell};

use crate::{
    ast::{Block, Expression, FunctionDecl, InfixOperator, Program, Statement},
    span::Span,
    tokenizer::{Token, TokenType},
};

#[derive(Debug)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    context: ParseContext,
    pub found: Option<Token>,
}

impl ParseError {
    /// Where the offending token starts, `None` when the token stream ran out
    /// without an end-of-input marker.
    pub fn position(&self) -> Option<Span> {
        self.found.as_ref().map(|token| token.span)
    }

    pub fn expected(&self) -> Option<TokenType> {
        match self.kind {
            ParseErrorKind::Expected(token_type) => Some(token_type),
            _ => None,
        }
    }
}

impl std::error::Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "While parsing {}",
            self.context.stack.borrow().join(" > ")
        )?;
        write!(f, "{}", self.kind)?;
        match &self.found {
            Some(token) if token.token_type == TokenType::Eof => {
                write!(f, " at {} but found end of input", token.span)
            }
            Some(token) => write!(f, " at {} but found \"{}\"", token.span, token.lexeme),
            None => write!(f, " but found end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("Expected \"{0}\"")]
    Expected(TokenType),
    #[error("Expected one of {0:?}")]
    ExpectedOneOf(Vec<TokenType>),
    #[error("Unexpected {0}")]
    Unexpected(TokenType),
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Comparison operators cannot be chained")]
    ChainedComparison,
    #[error("Number literal {0} does not fit in a 64-bit integer")]
    InvalidNumber(String),
    #[error("Program nests more than {0} levels deep")]
    TooDeeplyNested(usize),
}

/// Deepest run of nested blocks, parentheses, call arguments and unary
/// minuses the parser accepts.
pub const MAX_NESTING: usize = 128;

/// Tallest expression tree the parser builds. Long operator chains fold into
/// left-leaning trees that both engines walk recursively.
pub const MAX_EXPRESSION_DEPTH: usize = 256;

#[derive(Debug, Clone)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
    nesting: Cell<usize>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
            nesting: Cell::new(0),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard<'_> {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    /// Enters one level of syntactic nesting, failing once `MAX_NESTING` is
    /// exceeded so deeply nested input cannot exhaust the native stack.
    fn nest(&self, tokens: &[Token]) -> Result<NestingGuard<'_>, ParseError> {
        let depth = self.nesting.get() + 1;
        if depth > MAX_NESTING {
            return Err(self.error(ParseErrorKind::TooDeeplyNested(MAX_NESTING), tokens));
        }
        self.nesting.set(depth);
        Ok(NestingGuard { context: self })
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn error(&self, kind: ParseErrorKind, tokens: &[Token]) -> ParseError {
        ParseError {
            kind,
            context: self.clone(),
            found: tokens.first().cloned(),
        }
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

struct NestingGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> Drop for NestingGuard<'a> {
    fn drop(&mut self) {
        let nesting = &self.context.nesting;
        nesting.set(nesting.get() - 1);
    }
}

type Parsed<'a, T> = Result<(T, &'a [Token]), ParseError>;

pub fn program(tokens: &[Token]) -> Result<Program, ParseError> {
    let context = ParseContext::new();
    let mut statements = Vec::new();
    let mut tokens = tokens;

    let _guard = context.push("program");

    while let Some(token) = tokens.first() {
        if token.token_type == TokenType::Eof {
            break;
        }
        let (stmt, rest) = statement(&context, tokens)?;
        statements.push(stmt);
        tokens = rest;
    }

    Ok(Program(statements))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Statement> {
    let _guard = context.push("statement");
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Print) => print_statement(context, &tokens[1..]),
        Some(TokenType::If) => if_statement(context, &tokens[1..]),
        Some(TokenType::While) => while_statement(context, &tokens[1..]),
        Some(TokenType::Func) => function(context, &tokens[1..]),
        Some(TokenType::Return) => return_statement(context, &tokens[1..]),
        Some(TokenType::Identifier)
            if tokens.get(1).map(Token::token_type) == Some(&TokenType::Equal) =>
        {
            assignment(context, tokens)
        }
        _ => expression_statement(context, tokens),
    }
}

fn print_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Statement> {
    let _guard = context.push("print_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen)?;
    let (expr, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen)?;
    Ok((Statement::Print(expr), tokens))
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Statement> {
    let _guard = context.push("assignment");
    let (name, tokens) = match_identifier(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::Equal)?;
    let (expr, tokens) = expression(context, tokens)?;
    Ok((Statement::Assign(name, expr), tokens))
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Statement> {
    let _guard = context.push("if_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen)?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen)?;
    let (then_branch, tokens) = block(context, tokens)?;
    if let Some(TokenType::Else) = tokens.first().map(Token::token_type) {
        let (else_branch, tokens) = block(context, &tokens[1..])?;
        Ok((
            Statement::If(condition, then_branch, Some(else_branch)),
            tokens,
        ))
    } else {
        Ok((Statement::If(condition, then_branch, None), tokens))
    }
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Statement> {
    let _guard = context.push("while_statement");
    let tokens = consume(context, tokens, TokenType::LeftParen)?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::RightParen)?;
    let (body, tokens) = block(context, tokens)?;
    Ok((Statement::While(condition, body), tokens))
}

fn function<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Statement> {
    let _guard = context.push("function");
    let (name, tokens) = match_identifier(context, tokens)?;
    let mut tokens = consume(context, tokens, TokenType::LeftParen)?;
    let mut params = vec![];

    if let Some(TokenType::RightParen) = tokens.first().map(Token::token_type) {
        tokens = &tokens[1..];
    } else {
        loop {
            let (param, rest) = match_identifier(context, tokens)?;
            params.push(param);
            tokens = rest;

            match tokens.first().map(Token::token_type) {
                Some(TokenType::Comma) => tokens = &tokens[1..],
                Some(TokenType::RightParen) => {
                    tokens = &tokens[1..];
                    break;
                }
                _ => {
                    return Err(context.error(
                        ParseErrorKind::ExpectedOneOf(vec![
                            TokenType::Comma,
                            TokenType::RightParen,
                        ]),
                        tokens,
                    ))
                }
            }
        }
    }

    let (body, tokens) = block(context, tokens)?;
    Ok((Statement::Function(FunctionDecl { name, params, body }), tokens))
}

fn return_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Statement> {
    let _guard = context.push("return_statement");
    let (expr, tokens) = expression(context, tokens)?;
    Ok((Statement::Return(expr), tokens))
}

fn block<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Block> {
    let _guard = context.push("block");
    let _nesting = context.nest(tokens)?;
    let mut tokens = consume(context, tokens, TokenType::LeftBrace)?;
    let mut statements = Vec::new();

    loop {
        match tokens.first().map(Token::token_type) {
            Some(TokenType::RightBrace) => return Ok((Block(statements), &tokens[1..])),
            None | Some(TokenType::Eof) => {
                return Err(context.error(ParseErrorKind::Expected(TokenType::RightBrace), tokens))
            }
            _ => {
                let (stmt, rest) = statement(context, tokens)?;
                statements.push(stmt);
                tokens = rest;
            }
        }
    }
}

fn expression_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Statement> {
    let _guard = context.push("expression_statement");
    let (expr, tokens) = expression(context, tokens)?;
    Ok((Statement::Expression(expr), tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let _guard = context.push("expression");
    let _nesting = context.nest(tokens)?;
    comparison(context, tokens)
}

fn comparison_operator(token: &Token) -> Option<InfixOperator> {
    match token.token_type() {
        TokenType::EqualEqual => Some(InfixOperator::Eq),
        TokenType::BangEqual => Some(InfixOperator::Ne),
        TokenType::Less => Some(InfixOperator::Lt),
        TokenType::Greater => Some(InfixOperator::Gt),
        TokenType::LessEqual => Some(InfixOperator::Le),
        TokenType::GreaterEqual => Some(InfixOperator::Ge),
        _ => None,
    }
}

/// A single comparison level: `a < b < c` is rejected rather than folded.
fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let _guard = context.push("comparison");
    let (left, tokens) = term(context, tokens)?;

    let Some(op) = tokens.first().and_then(comparison_operator) else {
        return Ok((left, tokens));
    };

    let (right, tokens) = term(context, &tokens[1..])?;

    if tokens.first().and_then(comparison_operator).is_some() {
        return Err(context.error(ParseErrorKind::ChainedComparison, tokens));
    }

    Ok((Expression::binary(left, op, right), tokens))
}

fn binary<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> Parsed<'a, Expression>,
    operator: impl Fn(&Token) -> Option<InfixOperator>,
    tokens: &'a [Token],
) -> Parsed<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;
    let mut depth = expr.depth();

    while let Some(token) = tokens.first() {
        let op = match operator(token) {
            Some(op) => op,
            None => break,
        };
        tokens = &tokens[1..];
        let (right, rest) = precedence(context, tokens)?;
        depth = depth.max(right.depth()) + 1;
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(context.error(
                ParseErrorKind::TooDeeplyNested(MAX_EXPRESSION_DEPTH),
                tokens,
            ));
        }
        expr = Expression::binary(expr, op, right);
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |token| match token.token_type() {
            TokenType::Plus => Some(InfixOperator::Add),
            TokenType::Minus => Some(InfixOperator::Sub),
            _ => None,
        },
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let _guard = context.push("factor");
    binary(
        context,
        unary,
        |token| match token.token_type() {
            TokenType::Star => Some(InfixOperator::Mult),
            TokenType::Slash => Some(InfixOperator::Div),
            _ => None,
        },
        tokens,
    )
}

/// `-x` becomes `0 - x`.
fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let _guard = context.push("unary");

    if let Some(TokenType::Minus) = tokens.first().map(Token::token_type) {
        let _nesting = context.nest(tokens)?;
        let (right, rest) = unary(context, &tokens[1..])?;
        return Ok((
            Expression::binary(Expression::Number(0), InfixOperator::Sub, right),
            rest,
        ));
    }

    primary(context, tokens)
}

fn call<'a>(
    context: &ParseContext,
    name: String,
    tokens: &'a [Token],
) -> Parsed<'a, Expression> {
    let _guard = context.push("call");
    let mut tokens = consume(context, tokens, TokenType::LeftParen)?;
    let mut args = Vec::new();

    if let Some(TokenType::RightParen) = tokens.first().map(Token::token_type) {
        return Ok((Expression::Call(name, args), &tokens[1..]));
    }

    loop {
        let (arg, rest) = expression(context, tokens)?;
        args.push(arg);
        tokens = rest;
        match tokens.first().map(Token::token_type) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightParen) => {
                tokens = &tokens[1..];
                break;
            }
            _ => {
                return Err(context.error(
                    ParseErrorKind::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightParen]),
                    tokens,
                ))
            }
        }
    }

    Ok((Expression::Call(name, args), tokens))
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseErrorKind::Unexpected(TokenType::Eof), tokens));
    };

    match token.token_type() {
        TokenType::Number => match token.lexeme.parse::<i64>() {
            Ok(n) => Ok((Expression::Number(n), &tokens[1..])),
            Err(_) => Err(context.error(
                ParseErrorKind::InvalidNumber(token.lexeme.clone()),
                tokens,
            )),
        },
        TokenType::String => {
            let text = &token.lexeme[1..token.lexeme.len() - 1];
            Ok((Expression::String(text.to_string()), &tokens[1..]))
        }
        TokenType::Identifier => {
            if tokens.get(1).map(Token::token_type) == Some(&TokenType::LeftParen) {
                call(context, token.lexeme.clone(), &tokens[1..])
            } else {
                Ok((Expression::Variable(token.lexeme.clone()), &tokens[1..]))
            }
        }
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(context, rest, TokenType::RightParen)?;
            Ok((expr, tokens))
        }
        token_type => Err(context.error(ParseErrorKind::Unexpected(*token_type), tokens)),
    }
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
) -> Result<&'a [Token], ParseError> {
    match tokens.first().map(Token::token_type) {
        Some(t) if t == &token_type => Ok(&tokens[1..]),
        _ => Err(context.error(ParseErrorKind::Expected(token_type), tokens)),
    }
}

fn match_identifier<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, String> {
    match tokens.first() {
        Some(token) if token.token_type == TokenType::Identifier => {
            Ok((token.lexeme.clone(), &tokens[1..]))
        }
        _ => Err(context.error(ParseErrorKind::ExpectedIdentifier, tokens)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> Result<Program, ParseError> {
        program(&tokens(source).unwrap())
    }

    fn number(n: i64) -> Expression {
        Expression::Number(n)
    }

    fn variable(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    #[test]
    fn test_precedence() {
        let program = parse("x = 1 + 2 * 3").unwrap();
        let expected = Program(vec![Statement::Assign(
            "x".to_string(),
            Expression::binary(
                number(1),
                InfixOperator::Add,
                Expression::binary(number(2), InfixOperator::Mult, number(3)),
            ),
        )]);
        assert_eq!(program, expected);
    }

    #[test]
    fn test_left_associativity() {
        let program = parse("10 - 2 - 3").unwrap();
        let expected = Program(vec![Statement::Expression(Expression::binary(
            Expression::binary(number(10), InfixOperator::Sub, number(2)),
            InfixOperator::Sub,
            number(3),
        ))]);
        assert_eq!(program, expected);
        assert_eq!(program.0[0].to_string(), "(- (- 10 2) 3)");
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let program = parse("(1 + 2) * 3 / 4").unwrap();
        assert_eq!(program.0[0].to_string(), "(/ (* (+ 1 2) 3) 4)");
    }

    #[test]
    fn test_comparison_binds_loosest() {
        let program = parse("print(a + 1 <= b * 2)").unwrap();
        assert_eq!(program.0[0].to_string(), "print((<= (+ a 1) (* b 2)))");
    }

    #[test]
    fn test_chained_comparison_is_rejected() {
        let err = parse("a < b < c").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ChainedComparison);
        assert_eq!(err.position(), Some(Span { line: 1, column: 7 }));

        let err = parse("a == b == c").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ChainedComparison);
    }

    #[test]
    fn test_unary_minus() {
        let program = parse("(-7) / 2").unwrap();
        let expected = Expression::binary(
            Expression::binary(number(0), InfixOperator::Sub, number(7)),
            InfixOperator::Div,
            number(2),
        );
        assert_eq!(program.0, vec![Statement::Expression(expected)]);
    }

    #[test]
    fn test_call_versus_variable() {
        let program = parse("f(x, 1 + 2) f").unwrap();
        let expected = vec![
            Statement::Expression(Expression::Call(
                "f".to_string(),
                vec![
                    variable("x"),
                    Expression::binary(number(1), InfixOperator::Add, number(2)),
                ],
            )),
            Statement::Expression(variable("f")),
        ];
        assert_eq!(program.0, expected);
    }

    #[test]
    fn test_function_declaration() {
        let program = parse("func add(a, b) { return a + b }").unwrap();
        let expected = Statement::Function(FunctionDecl {
            name: "add".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            body: Block(vec![Statement::Return(Expression::binary(
                variable("a"),
                InfixOperator::Add,
                variable("b"),
            ))]),
        });
        assert_eq!(program.0, vec![expected]);

        let program = parse("func noop() { }").unwrap();
        assert_eq!(
            program.0,
            vec![Statement::Function(FunctionDecl {
                name: "noop".to_string(),
                params: vec![],
                body: Block(vec![]),
            })]
        );
    }

    #[test]
    fn test_if_else_and_while() {
        let program = parse(
            r#"
            if (x) { print("yes") } else { print("no") }
            while (x > 0) { x = x - 1 }
            "#,
        )
        .unwrap();
        let expected = vec![
            Statement::If(
                variable("x"),
                Block(vec![Statement::Print(Expression::String("yes".to_string()))]),
                Some(Block(vec![Statement::Print(Expression::String(
                    "no".to_string(),
                ))])),
            ),
            Statement::While(
                Expression::binary(variable("x"), InfixOperator::Gt, number(0)),
                Block(vec![Statement::Assign(
                    "x".to_string(),
                    Expression::binary(variable("x"), InfixOperator::Sub, number(1)),
                )]),
            ),
        ];
        assert_eq!(program.0, expected);
    }

    #[test]
    fn test_keyword_prefixed_identifier_assignment() {
        let program = parse("ifValue = 1").unwrap();
        assert_eq!(
            program.0,
            vec![Statement::Assign("ifValue".to_string(), number(1))]
        );
    }

    #[test]
    fn test_missing_paren() {
        let err = parse("print(1 + 2").unwrap_err();
        assert_eq!(err.expected(), Some(TokenType::RightParen));
        assert_eq!(
            err.found.as_ref().map(|t| t.token_type),
            Some(TokenType::Eof)
        );
        assert!(err.to_string().contains("print_statement"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("while (1) { print(1)").unwrap_err();
        assert_eq!(err.expected(), Some(TokenType::RightBrace));
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse("x = )").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Unexpected(TokenType::RightParen));
        assert_eq!(err.position(), Some(Span { line: 1, column: 5 }));
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let source = format!("print({})", vec!["1"; 10_000].join(" + "));
        let err = parse(&source).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::TooDeeplyNested(MAX_EXPRESSION_DEPTH)
        );

        let source = format!("x = {}", vec!["2"; 100].join(" * "));
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse(&parens).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested(MAX_NESTING));

        let minuses = format!("x = {}1", "-".repeat(10_000));
        let err = parse(&minuses).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested(MAX_NESTING));

        let blocks = format!("{}{}", "if (1) { ".repeat(10_000), "}".repeat(10_000));
        let err = parse(&blocks).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested(MAX_NESTING));

        let nested = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(parse(&nested).is_ok());
    }

    #[test]
    fn test_number_too_large() {
        let err = parse("x = 99999999999999999999").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::InvalidNumber("99999999999999999999".to_string())
        );
    }
}
