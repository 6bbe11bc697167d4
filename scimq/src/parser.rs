use crate::ast::{CompareOp, Filter};
use crate::error::ParseError;
use crate::grammar::{Rule, ScimqParser};
use crate::value::{Number, Value};
use pest::iterators::Pair;
use pest::Parser;

/// Parse the textual filter form into a [`Filter`] tree.
///
/// The parser enforces the operand typing rules, so every tree it returns
/// satisfies the AST invariants: `sw`/`co` carry strings, the ordering
/// operators carry strings or numbers, `pr` carries nothing.
pub fn parse_filter(input: &str) -> Result<Filter, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let mut pairs =
        ScimqParser::parse(Rule::Filter, input).map_err(|e| ParseError::Syntax(e.to_string()))?;
    let filter = pairs.next().ok_or(ParseError::Empty)?;
    let expr = filter.into_inner().next().ok_or(ParseError::Empty)?;
    parse_expr(expr)
}

fn parse_expr(pair: Pair<Rule>) -> Result<Filter, ParseError> {
    expect_rule(&pair, Rule::Expr, "Expr")?;
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or(ParseError::Empty)?;
    let mut result = parse_and_group(first)?;
    while let Some(op) = inner.next() {
        expect_rule(&op, Rule::Or, "or")?;
        let right = inner.next().ok_or(ParseError::MissingRight("or"))?;
        result = result.or(parse_and_group(right)?);
    }
    Ok(result)
}

fn parse_and_group(pair: Pair<Rule>) -> Result<Filter, ParseError> {
    expect_rule(&pair, Rule::AndGroup, "AndGroup")?;
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or(ParseError::Empty)?;
    let mut result = parse_unary(first)?;
    while let Some(op) = inner.next() {
        expect_rule(&op, Rule::And, "and")?;
        let right = inner.next().ok_or(ParseError::MissingRight("and"))?;
        result = result.and(parse_unary(right)?);
    }
    Ok(result)
}

fn parse_unary(pair: Pair<Rule>) -> Result<Filter, ParseError> {
    expect_rule(&pair, Rule::Unary, "Unary")?;
    let mut inner = pair.into_inner();
    let first = inner.next().ok_or(ParseError::Empty)?;
    match first.as_rule() {
        Rule::NotOp => {
            let operand = inner.next().ok_or(ParseError::MissingRight("not"))?;
            Ok(parse_unary(operand)?.not())
        }
        Rule::Primary => parse_primary(first),
        other => Err(ParseError::UnexpectedRule { expected: "not or Primary", got: other }),
    }
}

fn parse_primary(pair: Pair<Rule>) -> Result<Filter, ParseError> {
    let inner = pair.into_inner().next().ok_or(ParseError::Empty)?;
    match inner.as_rule() {
        Rule::Parens => {
            let expr = inner.into_inner().next().ok_or(ParseError::Empty)?;
            parse_expr(expr)
        }
        Rule::Predicate => parse_predicate(inner),
        other => Err(ParseError::UnexpectedRule { expected: "Parens or Predicate", got: other }),
    }
}

fn parse_predicate(pair: Pair<Rule>) -> Result<Filter, ParseError> {
    let mut inner = pair.into_inner();
    let attr_pair = inner.next().ok_or(ParseError::Empty)?;
    expect_rule(&attr_pair, Rule::Attribute, "Attribute")?;
    let attr = attr_pair.as_str().to_string();

    let next = inner.next().ok_or(ParseError::MissingRight("attribute"))?;
    match next.as_rule() {
        Rule::Present => Ok(Filter::pr(attr)),
        Rule::CompOp => {
            let op = compare_op(next.as_str())?;
            let literal = inner.next().ok_or(ParseError::MissingRight(op.keyword()))?;
            let value = parse_literal(literal)?;
            check_operand(op, &value)?;
            Ok(Filter::Compare { attr, op, value })
        }
        other => Err(ParseError::UnexpectedRule { expected: "operator or pr", got: other }),
    }
}

fn compare_op(keyword: &str) -> Result<CompareOp, ParseError> {
    match keyword.to_ascii_lowercase().as_str() {
        "eq" => Ok(CompareOp::Eq),
        "ne" => Ok(CompareOp::Ne),
        "lt" => Ok(CompareOp::Lt),
        "le" => Ok(CompareOp::Le),
        "gt" => Ok(CompareOp::Gt),
        "ge" => Ok(CompareOp::Ge),
        "sw" => Ok(CompareOp::Sw),
        "co" => Ok(CompareOp::Co),
        other => Err(ParseError::Syntax(format!("unknown operator \"{}\"", other))),
    }
}

fn check_operand(op: CompareOp, value: &Value) -> Result<(), ParseError> {
    let ok = match op {
        CompareOp::Eq | CompareOp::Ne => true,
        CompareOp::Sw | CompareOp::Co => matches!(value, Value::Str(_)),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => value.is_ordered(),
    };
    if ok {
        Ok(())
    } else {
        Err(ParseError::InvalidOperand { op: op.keyword(), value: value.type_name() })
    }
}

fn parse_literal(pair: Pair<Rule>) -> Result<Value, ParseError> {
    expect_rule(&pair, Rule::Literal, "Literal")?;
    let inner = pair.into_inner().next().ok_or(ParseError::Empty)?;
    match inner.as_rule() {
        Rule::String => {
            let raw = inner.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            Ok(Value::Str(unescape(raw)))
        }
        Rule::Number => {
            let text = inner.as_str();
            let number =
                Number::parse(text).ok_or_else(|| ParseError::InvalidNumber(text.to_string()))?;
            Ok(Value::Num(number))
        }
        Rule::Boolean => Ok(Value::Bool(inner.as_str().eq_ignore_ascii_case("true"))),
        Rule::Null => Ok(Value::Null),
        other => Err(ParseError::UnexpectedRule { expected: "literal", got: other }),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn expect_rule(pair: &Pair<Rule>, rule: Rule, expected: &'static str) -> Result<(), ParseError> {
    if pair.as_rule() == rule {
        Ok(())
    } else {
        Err(ParseError::UnexpectedRule { expected, got: pair.as_rule() })
    }
}
