//! Interpreter for the store's expression language, used by the in-memory
//! store to execute key conditions, filters, and put conditions. Placeholder
//! tokens are resolved through the request's name/value maps at lex time.

use crate::error::StoreError;
use crate::value::{AttributeValue, Item};
use indexmap::IndexMap;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
pub(crate) enum Cond {
    Cmp { path: String, op: CmpOp, value: AttributeValue },
    Between { path: String, low: AttributeValue, high: AttributeValue },
    BeginsWith { path: String, prefix: AttributeValue },
    Contains { path: String, needle: AttributeValue },
    Exists { path: String },
    NotExists { path: String },
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Path(String),
    Value(AttributeValue),
    Word(String),
    Cmp(CmpOp),
    LParen,
    RParen,
    Comma,
}

pub(crate) fn parse(
    expression: &str,
    names: &IndexMap<String, String>,
    values: &IndexMap<String, AttributeValue>,
) -> Result<Cond, StoreError> {
    let tokens = lex(expression, names, values)?;
    let mut parser = Parser { tokens, pos: 0 };
    let cond = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(StoreError::validation(format!("trailing tokens in expression \"{}\"", expression)));
    }
    Ok(cond)
}

pub(crate) fn eval(cond: &Cond, item: &Item) -> bool {
    match cond {
        Cond::Cmp { path, op, value } => {
            let Some(actual) = item.get(path) else { return false };
            match op {
                CmpOp::Eq => actual == value,
                CmpOp::Ne => actual != value,
                CmpOp::Lt => actual.compare(value) == Some(Ordering::Less),
                CmpOp::Le => matches!(actual.compare(value), Some(Ordering::Less | Ordering::Equal)),
                CmpOp::Gt => actual.compare(value) == Some(Ordering::Greater),
                CmpOp::Ge => matches!(actual.compare(value), Some(Ordering::Greater | Ordering::Equal)),
            }
        }
        Cond::Between { path, low, high } => {
            let Some(actual) = item.get(path) else { return false };
            matches!(actual.compare(low), Some(Ordering::Greater | Ordering::Equal))
                && matches!(actual.compare(high), Some(Ordering::Less | Ordering::Equal))
        }
        Cond::BeginsWith { path, prefix } => match (item.get(path), prefix) {
            (Some(AttributeValue::S(s)), AttributeValue::S(p)) => s.starts_with(p.as_str()),
            _ => false,
        },
        Cond::Contains { path, needle } => match item.get(path) {
            Some(AttributeValue::S(s)) => needle.as_s().is_some_and(|n| s.contains(n)),
            Some(AttributeValue::L(list)) => list.contains(needle),
            _ => false,
        },
        Cond::Exists { path } => item.contains_key(path),
        Cond::NotExists { path } => !item.contains_key(path),
        Cond::Not(inner) => !eval(inner, item),
        Cond::And(a, b) => eval(a, item) && eval(b, item),
        Cond::Or(a, b) => eval(a, item) || eval(b, item),
    }
}

/// First attribute path referenced by the condition; names the offending
/// attribute when a conditional write fails.
pub(crate) fn first_path(cond: &Cond) -> Option<&str> {
    match cond {
        Cond::Cmp { path, .. }
        | Cond::Between { path, .. }
        | Cond::BeginsWith { path, .. }
        | Cond::Contains { path, .. }
        | Cond::Exists { path }
        | Cond::NotExists { path } => Some(path),
        Cond::Not(inner) => first_path(inner),
        Cond::And(a, b) | Cond::Or(a, b) => first_path(a).or_else(|| first_path(b)),
    }
}

fn lex(
    expression: &str,
    names: &IndexMap<String, String>,
    values: &IndexMap<String, AttributeValue>,
) -> Result<Vec<Tok>, StoreError> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Tok::Cmp(CmpOp::Eq));
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Tok::Cmp(CmpOp::Le));
                    }
                    Some('>') => {
                        chars.next();
                        tokens.push(Tok::Cmp(CmpOp::Ne));
                    }
                    _ => tokens.push(Tok::Cmp(CmpOp::Lt)),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Tok::Cmp(CmpOp::Ge));
                } else {
                    tokens.push(Tok::Cmp(CmpOp::Gt));
                }
            }
            '#' | ':' => {
                let sigil = c;
                chars.next();
                let mut ident = String::new();
                while chars.peek().is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
                    if let Some(c) = chars.next() {
                        ident.push(c);
                    }
                }
                let placeholder = format!("{}{}", sigil, ident);
                if sigil == '#' {
                    let name = names
                        .get(&placeholder)
                        .ok_or_else(|| StoreError::validation(format!("unresolved name placeholder \"{}\"", placeholder)))?;
                    tokens.push(Tok::Path(name.clone()));
                } else {
                    let value = values
                        .get(&placeholder)
                        .ok_or_else(|| StoreError::validation(format!("unresolved value placeholder \"{}\"", placeholder)))?;
                    tokens.push(Tok::Value(value.clone()));
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::new();
                while chars.peek().is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    if let Some(c) = chars.next() {
                        word.push(c);
                    }
                }
                tokens.push(Tok::Word(word));
            }
            other => {
                return Err(StoreError::validation(format!("unexpected character '{}' in expression", other)));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> { self.tokens.get(self.pos) }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Tok) -> Result<(), StoreError> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            other => Err(StoreError::validation(format!("expected {:?}, got {:?}", expected, other))),
        }
    }

    fn word_is(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn expr(&mut self) -> Result<Cond, StoreError> {
        let mut left = self.and_expr()?;
        while self.word_is("OR") {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Cond::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Cond, StoreError> {
        let mut left = self.unary()?;
        while self.word_is("AND") {
            self.pos += 1;
            let right = self.unary()?;
            left = Cond::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Cond, StoreError> {
        if self.word_is("NOT") {
            self.pos += 1;
            return Ok(Cond::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Cond, StoreError> {
        match self.next() {
            Some(Tok::LParen) => {
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Word(word)) => self.function(&word),
            Some(Tok::Path(path)) => self.comparison(path),
            other => Err(StoreError::validation(format!("unexpected token {:?}", other))),
        }
    }

    fn function(&mut self, word: &str) -> Result<Cond, StoreError> {
        match word.to_ascii_lowercase().as_str() {
            "begins_with" => {
                let (path, value) = self.path_value_args()?;
                Ok(Cond::BeginsWith { path, prefix: value })
            }
            "contains" => {
                let (path, value) = self.path_value_args()?;
                Ok(Cond::Contains { path, needle: value })
            }
            "attribute_exists" => {
                let path = self.path_arg()?;
                Ok(Cond::Exists { path })
            }
            "attribute_not_exists" => {
                let path = self.path_arg()?;
                Ok(Cond::NotExists { path })
            }
            other => Err(StoreError::validation(format!("unknown function \"{}\"", other))),
        }
    }

    fn comparison(&mut self, path: String) -> Result<Cond, StoreError> {
        if self.word_is("BETWEEN") {
            self.pos += 1;
            let low = self.value()?;
            match self.next() {
                Some(Tok::Word(w)) if w.eq_ignore_ascii_case("AND") => {}
                other => return Err(StoreError::validation(format!("expected AND in BETWEEN, got {:?}", other))),
            }
            let high = self.value()?;
            return Ok(Cond::Between { path, low, high });
        }
        match self.next() {
            Some(Tok::Cmp(op)) => {
                let value = self.value()?;
                Ok(Cond::Cmp { path, op, value })
            }
            other => Err(StoreError::validation(format!("expected comparison operator, got {:?}", other))),
        }
    }

    fn value(&mut self) -> Result<AttributeValue, StoreError> {
        match self.next() {
            Some(Tok::Value(v)) => Ok(v),
            other => Err(StoreError::validation(format!("expected value placeholder, got {:?}", other))),
        }
    }

    fn path_arg(&mut self) -> Result<String, StoreError> {
        self.expect(Tok::LParen)?;
        let path = match self.next() {
            Some(Tok::Path(p)) => p,
            other => return Err(StoreError::validation(format!("expected name placeholder, got {:?}", other))),
        };
        self.expect(Tok::RParen)?;
        Ok(path)
    }

    fn path_value_args(&mut self) -> Result<(String, AttributeValue), StoreError> {
        self.expect(Tok::LParen)?;
        let path = match self.next() {
            Some(Tok::Path(p)) => p,
            other => return Err(StoreError::validation(format!("expected name placeholder, got {:?}", other))),
        };
        self.expect(Tok::Comma)?;
        let value = self.value()?;
        self.expect(Tok::RParen)?;
        Ok((path, value))
    }
}
