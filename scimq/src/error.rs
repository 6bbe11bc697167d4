use crate::grammar::Rule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("empty filter expression")]
    Empty,
    #[error("expected {expected}, got {got:?}")]
    UnexpectedRule { expected: &'static str, got: Rule },
    #[error("missing right operand for \"{0}\"")]
    MissingRight(&'static str),
    #[error("operator \"{op}\" does not accept a {value} value")]
    InvalidOperand { op: &'static str, value: &'static str },
    #[error("invalid number literal: {0}")]
    InvalidNumber(String),
}
