//! Translation of record filter expressions into parameterized SQL.
//!
//! Supported syntax: `field op literal` terms combined with `&&`, `||` and
//! parentheses, where `op` is one of `= != > >= < <= ~ !~`. `~` is a
//! case-insensitive "contains". Literals are quoted strings or numbers.

use rusqlite::types::Value;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<Value>,
}

impl SqlFilter {
    /// Returns ` WHERE <clause>` or an empty string for the match-all filter.
    pub fn where_sql(&self) -> String {
        if self.clause.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clause)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Real(f64),
    Op(&'static str),
    And,
    Or,
    LParen,
    RParen,
}

fn invalid(msg: impl std::fmt::Display) -> AppError {
    AppError::Store(format!("invalid filter: {msg}"))
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(invalid(format!("expected '{c}{c}' at {i}")));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(invalid("unterminated string")),
                        Some('\\') if chars.get(i + 1) == Some(&quote) => {
                            value.push(quote);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '=' => {
                tokens.push(Token::Op("="));
                i += 1;
            }
            '~' => {
                tokens.push(Token::Op("~"));
                i += 1;
            }
            '!' | '>' | '<' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('!', Some('=')) => ("!=", 2),
                    ('!', Some('~')) => ("!~", 2),
                    ('>', Some('=')) => (">=", 2),
                    ('<', Some('=')) => ("<=", 2),
                    ('>', _) => (">", 1),
                    ('<', _) => ("<", 1),
                    _ => return Err(invalid(format!("unexpected '!' at {i}"))),
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if let Ok(n) = text.parse::<i64>() {
                    tokens.push(Token::Int(n));
                } else if let Ok(n) = text.parse::<f64>() {
                    tokens.push(Token::Real(n));
                } else {
                    return Err(invalid(format!("bad number '{text}'")));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(invalid(format!("unexpected '{other}' at {i}"))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    fields: &'a [&'a str],
    params: Vec<Value>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<String> {
        let mut sql = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            sql = format!("{sql} OR {rhs}");
        }
        Ok(sql)
    }

    fn parse_and(&mut self) -> Result<String> {
        let mut sql = self.parse_term()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_term()?;
            sql = format!("{sql} AND {rhs}");
        }
        Ok(sql)
    }

    fn parse_term(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(format!("({inner})")),
                    _ => Err(invalid("missing ')'")),
                }
            }
            Some(Token::Ident(field)) => {
                if !self.fields.contains(&field.as_str()) {
                    return Err(invalid(format!("unknown field '{field}'")));
                }
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    _ => return Err(invalid(format!("expected operator after '{field}'"))),
                };
                let value = match self.next() {
                    Some(Token::Str(s)) => Value::Text(s),
                    Some(Token::Int(n)) => Value::Integer(n),
                    Some(Token::Real(n)) => Value::Real(n),
                    _ => return Err(invalid(format!("expected literal after '{field} {op}'"))),
                };
                Ok(self.comparison(&field, op, value))
            }
            Some(other) => Err(invalid(format!("unexpected token {other:?}"))),
            None => Err(invalid("unexpected end of filter")),
        }
    }

    fn comparison(&mut self, field: &str, op: &str, value: Value) -> String {
        match op {
            "~" | "!~" => {
                let needle = match value {
                    Value::Text(s) => s,
                    Value::Integer(n) => n.to_string(),
                    Value::Real(n) => n.to_string(),
                    _ => String::new(),
                };
                let escaped = needle
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                self.params.push(Value::Text(format!("%{escaped}%")));
                let not = if op == "!~" { "NOT " } else { "" };
                format!("{field} {not}LIKE ? ESCAPE '\\'")
            }
            _ => {
                self.params.push(value);
                format!("{field} {op} ?")
            }
        }
    }
}

/// Parses `filter` against the given column whitelist.
pub fn parse_filter(filter: &str, fields: &[&str]) -> Result<SqlFilter> {
    let tokens = tokenize(filter)?;
    if tokens.is_empty() {
        return Ok(SqlFilter {
            clause: String::new(),
            params: Vec::new(),
        });
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        fields,
        params: Vec::new(),
    };
    let clause = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(invalid(format!(
            "unexpected trailing token {:?}",
            parser.tokens[parser.pos]
        )));
    }

    Ok(SqlFilter {
        clause,
        params: parser.params,
    })
}
