use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Literals
    Number,
    String,
    Identifier,

    // Keywords
    Print,
    Func,
    If,
    Else,
    While,
    Return,

    // Two character operators
    EqualEqual,
    BangEqual,
    LessEqual,
    GreaterEqual,

    // Single-character tokens
    Less,
    Greater,
    Equal,
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,

    // End of file
    Eof,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenType::Number => "number",
            TokenType::String => "string",
            TokenType::Identifier => "identifier",
            TokenType::Print => "print",
            TokenType::Func => "func",
            TokenType::If => "if",
            TokenType::Else => "else",
            TokenType::While => "while",
            TokenType::Return => "return",
            TokenType::EqualEqual => "==",
            TokenType::BangEqual => "!=",
            TokenType::LessEqual => "<=",
            TokenType::GreaterEqual => ">=",
            TokenType::Less => "<",
            TokenType::Greater => ">",
            TokenType::Equal => "=",
            TokenType::Plus => "+",
            TokenType::Minus => "-",
            TokenType::Star => "*",
            TokenType::Slash => "/",
            TokenType::LeftParen => "(",
            TokenType::RightParen => ")",
            TokenType::LeftBrace => "{",
            TokenType::RightBrace => "}",
            TokenType::Comma => ",",
            TokenType::Eof => "end of input",
        };
        write!(f, "{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("Unexpected character '{character}' at {span}")]
    UnexpectedCharacter { character: char, span: Span },
}

pub fn tokens(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut remaining = source;
    let mut span = Span::start();

    loop {
        let (token, rest) = token(remaining, &mut span)?;
        remaining = rest;
        let done = token.token_type == TokenType::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }

    Ok(tokens)
}

type Rule = fn(&str) -> Option<(TokenType, usize)>;

const SKIPPED: &[fn(&str) -> Option<usize>] = &[whitespace, comment];

/// Tried in order at each position, the first match wins. Keywords come
/// before identifiers and only match on a word boundary.
const RULES: &[Rule] = &[
    // literals
    number,
    string,
    // keywords
    print_,
    func,
    if_,
    else_,
    while_,
    return_,
    // two character operators
    equal_equal,
    bang_equal,
    less_equal,
    greater_equal,
    // single-character tokens
    less,
    greater,
    equal,
    plus,
    minus,
    star,
    slash,
    left_paren,
    right_paren,
    left_brace,
    right_brace,
    comma,
    // identifiers
    identifier,
];

fn token<'a>(mut source: &'a str, span: &mut Span) -> Result<(Token, &'a str), TokenizeError> {
    while let Some(len) = SKIPPED.iter().find_map(|skip| skip(source)) {
        *span = span.advance(&source[..len]);
        source = &source[len..];
    }

    let Some(first) = source.chars().next() else {
        return Ok((
            Token {
                token_type: TokenType::Eof,
                lexeme: String::new(),
                span: *span,
            },
            source,
        ));
    };

    let (token_type, len) = first_match(RULES, source).ok_or(
        TokenizeError::UnexpectedCharacter {
            character: first,
            span: *span,
        },
    )?;

    let lexeme = &source[..len];
    let token = Token {
        token_type,
        lexeme: lexeme.to_string(),
        span: *span,
    };
    *span = span.advance(lexeme);

    Ok((token, &source[len..]))
}

fn first_match(rules: &[Rule], source: &str) -> Option<(TokenType, usize)> {
    rules.iter().find_map(|rule| rule(source))
}

fn whitespace(source: &str) -> Option<usize> {
    let len = source
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(len)
    } else {
        None
    }
}

fn comment(source: &str) -> Option<usize> {
    if source.starts_with("//") {
        Some(
            source
                .chars()
                .take_while(|c| *c != '\n')
                .map(char::len_utf8)
                .sum(),
        )
    } else {
        None
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(TokenType, usize)> {
            if source.starts_with($word) {
                Some(($token, $word.len()))
            } else {
                None
            }
        }
    };
}

macro_rules! match_keyword {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(TokenType, usize)> {
            let rest = source.strip_prefix($word)?;
            if rest.starts_with(is_word_char) {
                None
            } else {
                Some(($token, $word.len()))
            }
        }
    };
}

match_keyword! { print_, "print", TokenType::Print }
match_keyword! { func, "func", TokenType::Func }
match_keyword! { if_, "if", TokenType::If }
match_keyword! { else_, "else", TokenType::Else }
match_keyword! { while_, "while", TokenType::While }
match_keyword! { return_, "return", TokenType::Return }
match_literal! { equal_equal, "==", TokenType::EqualEqual }
match_literal! { bang_equal, "!=", TokenType::BangEqual }
match_literal! { less_equal, "<=", TokenType::LessEqual }
match_literal! { greater_equal, ">=", TokenType::GreaterEqual }
match_literal! { less, "<", TokenType::Less }
match_literal! { greater, ">", TokenType::Greater }
match_literal! { equal, "=", TokenType::Equal }
match_literal! { plus, "+", TokenType::Plus }
match_literal! { minus, "-", TokenType::Minus }
match_literal! { star, "*", TokenType::Star }
match_literal! { slash, "/", TokenType::Slash }
match_literal! { left_paren, "(", TokenType::LeftParen }
match_literal! { right_paren, ")", TokenType::RightParen }
match_literal! { left_brace, "{", TokenType::LeftBrace }
match_literal! { right_brace, "}", TokenType::RightBrace }
match_literal! { comma, ",", TokenType::Comma }

fn identifier(source: &str) -> Option<(TokenType, usize)> {
    let mut chars = source.chars();

    let first = chars.next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }

    let len = first.len_utf8()
        + chars
            .take_while(|c| is_word_char(*c))
            .map(char::len_utf8)
            .sum::<usize>();

    Some((TokenType::Identifier, len))
}

fn string(source: &str) -> Option<(TokenType, usize)> {
    if !source.starts_with('"') {
        return None;
    }

    let mut chars = source.chars().skip(1);
    let mut len = 1;
    while let Some(c) = chars.next() {
        len += c.len_utf8();
        match c {
            '"' => return Some((TokenType::String, len)),
            '\\' => len += chars.next()?.len_utf8(),
            _ => {}
        }
    }
    None
}

fn number(source: &str) -> Option<(TokenType, usize)> {
    let len = source.chars().take_while(char::is_ascii_digit).count();
    if len > 0 {
        Some((TokenType::Number, len))
    } else {
        None
    }
}
