//! The claims expression language.
//!
//! A small boolean predicate over a JWT claims map:
//!
//! ```text
//! Equals(`email_verified`,`true`) && OneOf(`user.role`,`admin`,`user`)
//! ```
//!
//! Primitives are `Equals`, `Prefix`, `Contains` and `OneOf` over
//! backtick-quoted dot-paths and values, combined with `!`, `&&`, `||`
//! (precedence low to high: `||` < `&&` < `!`) and parentheses. Evaluation
//! short-circuits. Expressions are parsed once, when the middleware is
//! built; parse errors never reach request time.

use serde_json::Value;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Call(Primitive),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Primitive {
    Equals { path: String, value: String },
    Prefix { path: String, prefix: String },
    Contains { path: String, values: Vec<String> },
    OneOf { path: String, values: Vec<String> },
}

// ---- lexer -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Quoted(String),
    LParen,
    RParen,
    Comma,
    Not,
    And,
    Or,
}

fn lex(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '!' => tokens.push(Token::Not),
            '&' => match chars.next() {
                Some((_, '&')) => tokens.push(Token::And),
                _ => return Err(parse_error(pos, "expected '&&'")),
            },
            '|' => match chars.next() {
                Some((_, '|')) => tokens.push(Token::Or),
                _ => return Err(parse_error(pos, "expected '||'")),
            },
            '`' => {
                let mut value = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '`' {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(parse_error(pos, "unterminated backtick string"));
                }
                tokens.push(Token::Quoted(value));
            }
            c if c.is_ascii_alphabetic() => {
                let mut ident = String::new();
                ident.push(c);
                while let Some((_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' {
                        ident.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(parse_error(pos, &format!("unexpected character {other:?}"))),
        }
    }
    Ok(tokens)
}

fn parse_error(position: usize, message: &str) -> Error {
    Error::config(format!("claims expression at {position}: {message}"))
}

// ---- parser ----------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

pub(crate) fn parse(input: &str) -> Result<Expr, Error> {
    let mut parser = Parser { tokens: lex(input)?, cursor: 0 };
    let expr = parser.parse_or()?;
    if parser.cursor != parser.tokens.len() {
        return Err(Error::config("claims expression: trailing input".to_string()));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, wanted: &Token, what: &str) -> Result<(), Error> {
        match self.next() {
            Some(ref token) if token == wanted => Ok(()),
            other => Err(Error::config(format!(
                "claims expression: expected {what}, found {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Error> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        match self.peek() {
            Some(Token::Not) => {
                self.next();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                self.next();
                let inner = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(_)) => self.parse_call(),
            other => Err(Error::config(format!(
                "claims expression: expected a primitive, found {other:?}"
            ))),
        }
    }

    fn parse_call(&mut self) -> Result<Expr, Error> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(Error::config(format!(
                    "claims expression: expected a primitive name, found {other:?}"
                )))
            }
        };
        self.expect(&Token::LParen, "'('")?;

        let mut args = vec![self.parse_quoted()?];
        while self.peek() == Some(&Token::Comma) {
            self.next();
            args.push(self.parse_quoted()?);
        }
        self.expect(&Token::RParen, "')'")?;

        let arity = args.len();
        let mut args = args.into_iter();
        let path = args.next().unwrap_or_default();

        let primitive = match name.as_str() {
            "Equals" => {
                if arity != 2 {
                    return Err(Error::config("claims expression: Equals takes two arguments"));
                }
                Primitive::Equals { path, value: args.next().unwrap_or_default() }
            }
            "Prefix" => {
                if arity != 2 {
                    return Err(Error::config("claims expression: Prefix takes two arguments"));
                }
                Primitive::Prefix { path, prefix: args.next().unwrap_or_default() }
            }
            "Contains" => {
                if arity < 2 {
                    return Err(Error::config(
                        "claims expression: Contains needs at least one value",
                    ));
                }
                Primitive::Contains { path, values: args.collect() }
            }
            "OneOf" => {
                if arity < 2 {
                    return Err(Error::config(
                        "claims expression: OneOf needs at least one value",
                    ));
                }
                Primitive::OneOf { path, values: args.collect() }
            }
            other => {
                return Err(Error::config(format!(
                    "claims expression: unknown primitive {other:?}"
                )))
            }
        };
        Ok(Expr::Call(primitive))
    }

    fn parse_quoted(&mut self) -> Result<String, Error> {
        match self.next() {
            Some(Token::Quoted(value)) => Ok(value),
            other => Err(Error::config(format!(
                "claims expression: expected a backtick string, found {other:?}"
            ))),
        }
    }
}

// ---- evaluation ------------------------------------------------------------

impl Expr {
    pub(crate) fn evaluate(&self, claims: &Value) -> bool {
        match self {
            Expr::Or(left, right) => left.evaluate(claims) || right.evaluate(claims),
            Expr::And(left, right) => left.evaluate(claims) && right.evaluate(claims),
            Expr::Not(inner) => !inner.evaluate(claims),
            Expr::Call(primitive) => primitive.evaluate(claims),
        }
    }
}

impl Primitive {
    fn evaluate(&self, claims: &Value) -> bool {
        match self {
            Primitive::Equals { path, value } => match lookup(claims, path) {
                Some(Value::Array(items)) => items.iter().any(|item| scalar_eq(item, value)),
                Some(claim) => scalar_eq(claim, value),
                None => false,
            },
            Primitive::Prefix { path, prefix } => match lookup(claims, path) {
                Some(Value::String(s)) => s.starts_with(prefix),
                _ => false,
            },
            Primitive::Contains { path, values } => match lookup(claims, path) {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| values.iter().any(|value| scalar_eq(item, value))),
                Some(Value::String(s)) => {
                    if values.len() == 1 {
                        s.contains(&values[0])
                    } else {
                        values.iter().any(|value| s.contains(value))
                    }
                }
                _ => false,
            },
            Primitive::OneOf { path, values } => match lookup(claims, path) {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| values.iter().any(|value| scalar_eq(item, value))),
                Some(claim) => values.iter().any(|value| scalar_eq(claim, value)),
                None => false,
            },
        }
    }
}

fn lookup<'a>(claims: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = claims;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn scalar_eq(claim: &Value, expected: &str) -> bool {
    match claim {
        Value::String(s) => s == expected,
        Value::Bool(b) => b.to_string() == expected,
        Value::Number(n) => n.to_string() == expected,
        _ => false,
    }
}
