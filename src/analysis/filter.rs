//! Safe expression language for `query` filters and `custom` evaluation.
//!
//! A small, closed grammar over column references, literals, comparison and
//! arithmetic operators, and/or/not, and a fixed set of aggregate functions.
//! Expressions compile to a polars `Expr`; no caller-supplied text is ever
//! evaluated outside this grammar.
//!
//! ```text
//! expr    := and ( ("or" | "|") and )*
//! and     := not ( ("and" | "&") not )*
//! not     := ("not" | "!") not | cmp
//! cmp     := add ( ("==" | "!=" | "<" | "<=" | ">" | ">=") add )?
//! add     := mul ( ("+" | "-") mul )*
//! mul     := unary ( ("*" | "/" | "%") unary )*
//! unary   := "-" unary | primary
//! primary := number | string | "true" | "false"
//!          | ident "(" expr ")" | ident | "(" expr ")"
//! ```

use polars::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

/// Parse an expression into a polars `Expr`.
pub fn parse(input: &str) -> Result<Expr, FilterError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(FilterError::UnexpectedToken(format!("{tok:?}")));
    }
    Ok(expr)
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '&' => {
                tokens.push(Token::And);
                i += if chars.get(i + 1) == Some(&'&') { 2 } else { 1 };
            }
            '|' => {
                tokens.push(Token::Or);
                i += if chars.get(i + 1) == Some(&'|') { 2 } else { 1 };
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(FilterError::UnexpectedChar { ch: '=', pos: i });
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(FilterError::UnexpectedEnd);
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '+' || chars[i] == '-')
                            && matches!(chars.get(i.wrapping_sub(1)), Some('e') | Some('E'))))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FilterError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(FilterError::UnexpectedChar { ch: other, pos: i }),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::Or) {
            expr = expr.or(self.parse_and()?);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_not()?;
        while self.eat(&Token::And) {
            expr = expr.and(self.parse_not()?);
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&Token::Not) {
            Ok(self.parse_not()?.not())
        } else {
            self.parse_cmp()
        }
    }

    fn parse_cmp(&mut self) -> Result<Expr, FilterError> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => Token::Eq,
            Some(Token::Ne) => Token::Ne,
            Some(Token::Lt) => Token::Lt,
            Some(Token::Le) => Token::Le,
            Some(Token::Gt) => Token::Gt,
            Some(Token::Ge) => Token::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_add()?;
        Ok(match op {
            Token::Eq => lhs.eq(rhs),
            Token::Ne => lhs.neq(rhs),
            Token::Lt => lhs.lt(rhs),
            Token::Le => lhs.lt_eq(rhs),
            Token::Gt => lhs.gt(rhs),
            _ => lhs.gt_eq(rhs),
        })
    }

    fn parse_add(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_mul()?;
        loop {
            if self.eat(&Token::Plus) {
                expr = expr + self.parse_mul()?;
            } else if self.eat(&Token::Minus) {
                expr = expr - self.parse_mul()?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, FilterError> {
        let mut expr = self.parse_unary()?;
        loop {
            if self.eat(&Token::Star) {
                expr = expr * self.parse_unary()?;
            } else if self.eat(&Token::Slash) {
                expr = expr / self.parse_unary()?;
            } else if self.eat(&Token::Percent) {
                expr = expr % self.parse_unary()?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.eat(&Token::Minus) {
            Ok(lit(0.0) - self.parse_unary()?)
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(lit(v)),
            Some(Token::Str(s)) => Ok(lit(s)),
            Some(Token::True) => Ok(lit(true)),
            Some(Token::False) => Ok(lit(false)),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                if self.eat(&Token::RParen) {
                    Ok(expr)
                } else {
                    Err(FilterError::UnexpectedEnd)
                }
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let arg = self.parse_or()?;
                    if !self.eat(&Token::RParen) {
                        return Err(FilterError::UnexpectedEnd);
                    }
                    apply_function(&name, arg)
                } else {
                    Ok(col(name.as_str()))
                }
            }
            Some(tok) => Err(FilterError::UnexpectedToken(format!("{tok:?}"))),
            None => Err(FilterError::UnexpectedEnd),
        }
    }
}

/// Whitelisted aggregate and scalar functions.
fn apply_function(name: &str, arg: Expr) -> Result<Expr, FilterError> {
    match name.to_lowercase().as_str() {
        "mean" => Ok(arg.mean()),
        "sum" => Ok(arg.sum()),
        "min" => Ok(arg.min()),
        "max" => Ok(arg.max()),
        "count" => Ok(arg.count()),
        "median" => Ok(arg.median()),
        "std" => Ok(arg.std(1)),
        "abs" => Ok(arg.abs()),
        _ => Err(FilterError::UnknownFunction(name.to_string())),
    }
}
