//! Rendering plans into the store's request syntax. Placeholder names are
//! deterministic (`#attr` for names, `:attr_N` with N starting at 1 per
//! attribute), so two renders of the same plan compare equal field for field.

use crate::error::ExecError;
use dynaq_planner::{IndexQueryKey, Residual, SortOperator};
use dynaq_store::{AttributeValue, QueryRequest, ScanRequest, Select};
use indexmap::IndexMap;
use scimq::{CompareOp, Filter, Product, Term, TermOp, Value};
use std::collections::HashMap;

/// Lower a filter value into the store's attribute-value format.
pub fn attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Str(s) => AttributeValue::S(s.clone()),
        Value::Num(n) => AttributeValue::N(n.as_str().to_string()),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Null => AttributeValue::Null,
    }
}

/// Accumulates expression text and the placeholder maps for one request.
#[derive(Default)]
pub struct ExpressionBuilder {
    names: IndexMap<String, String>,
    values: IndexMap<String, AttributeValue>,
    counters: HashMap<String, u32>,
}

impl ExpressionBuilder {
    pub fn new() -> Self { Self::default() }

    fn name(&mut self, attribute: &str) -> String {
        let placeholder = format!("#{}", attribute);
        self.names.insert(placeholder.clone(), attribute.to_string());
        placeholder
    }

    fn value(&mut self, attribute: &str, value: AttributeValue) -> String {
        let counter = self.counters.entry(attribute.to_string()).or_insert(0);
        *counter += 1;
        let placeholder = format!(":{}_{}", attribute, counter);
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Render the key condition: `#pk = :pk_1`, optionally
    /// `AND <sortOp>(#sk, :sk_1)`.
    pub fn key_condition(&mut self, key: &IndexQueryKey) -> Result<String, ExecError> {
        let partition = self.name(&key.partition_attribute);
        let value = self.value(&key.partition_attribute, attribute_value(&key.partition_value));
        let mut expression = format!("{} = {}", partition, value);

        if let Some(sort) = &key.sort {
            let attribute = self.name(&sort.attribute);
            let first = self.value(&sort.attribute, attribute_value(&sort.first));
            let clause = match sort.operator {
                SortOperator::Eq => format!("{} = {}", attribute, first),
                SortOperator::Lt => format!("{} < {}", attribute, first),
                SortOperator::Le => format!("{} <= {}", attribute, first),
                SortOperator::Gt => format!("{} > {}", attribute, first),
                SortOperator::Ge => format!("{} >= {}", attribute, first),
                SortOperator::BeginsWith => format!("begins_with({}, {})", attribute, first),
                SortOperator::Between => {
                    let second = sort
                        .second
                        .as_ref()
                        .ok_or_else(|| ExecError::MalformedPlan("BETWEEN sort condition without an upper bound".to_string()))?;
                    let second = self.value(&sort.attribute, attribute_value(second));
                    format!("{} BETWEEN {} AND {}", attribute, first, second)
                }
            };
            expression = format!("{} AND {}", expression, clause);
        }
        Ok(expression)
    }

    /// Render a residual filter. The empty string means no filtering; a
    /// single conjunction renders bare, multiple OR-merged conjunctions are
    /// each parenthesised.
    pub fn residual(&mut self, residual: &Residual) -> Result<String, ExecError> {
        if residual.is_always() {
            return Ok(String::new());
        }
        let groups: Vec<String> = residual.groups().map(|group| self.product(group)).collect::<Result<_, _>>()?;
        Ok(match groups.len() {
            1 => groups.into_iter().next().unwrap_or_default(),
            _ => groups.iter().map(|group| format!("({})", group)).collect::<Vec<_>>().join(" OR "),
        })
    }

    fn product(&mut self, product: &Product) -> Result<String, ExecError> {
        let terms: Vec<String> = product.terms().map(|term| self.term(term)).collect::<Result<_, _>>()?;
        Ok(terms.join(" AND "))
    }

    fn term(&mut self, term: &Term) -> Result<String, ExecError> {
        let name = self.name(&term.attr);
        if !term.op.takes_value() {
            return Ok(match term.op {
                TermOp::NotPr => format!("attribute_not_exists({})", name),
                _ => format!("attribute_exists({})", name),
            });
        }
        let value = term
            .value
            .as_ref()
            .ok_or_else(|| ExecError::MalformedPlan(format!("term on \"{}\" is missing its value", term.attr)))?;
        let value = self.value(&term.attr, attribute_value(value));
        Ok(match term.op {
            TermOp::Eq => format!("{} = {}", name, value),
            TermOp::Ne => format!("{} <> {}", name, value),
            TermOp::Lt => format!("{} < {}", name, value),
            TermOp::Le => format!("{} <= {}", name, value),
            TermOp::Gt => format!("{} > {}", name, value),
            TermOp::Ge => format!("{} >= {}", name, value),
            TermOp::Sw => format!("begins_with({}, {})", name, value),
            TermOp::NotSw => format!("NOT begins_with({}, {})", name, value),
            TermOp::Co => format!("contains({}, {})", name, value),
            TermOp::NotCo => format!("NOT contains({}, {})", name, value),
            TermOp::Pr | TermOp::NotPr => unreachable!("presence operators carry no value"),
        })
    }

    /// Render an arbitrary filter tree (the scan path). OR groups and NOT
    /// bodies are parenthesised; AND chains render flat.
    pub fn filter(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::Compare { attr, op, value } => {
                let name = self.name(attr);
                let value = self.value(attr, attribute_value(value));
                match op {
                    CompareOp::Eq => format!("{} = {}", name, value),
                    CompareOp::Ne => format!("{} <> {}", name, value),
                    CompareOp::Lt => format!("{} < {}", name, value),
                    CompareOp::Le => format!("{} <= {}", name, value),
                    CompareOp::Gt => format!("{} > {}", name, value),
                    CompareOp::Ge => format!("{} >= {}", name, value),
                    CompareOp::Sw => format!("begins_with({}, {})", name, value),
                    CompareOp::Co => format!("contains({}, {})", name, value),
                }
            }
            Filter::Present { attr } => format!("attribute_exists({})", self.name(attr)),
            Filter::And(left, right) => format!("{} AND {}", self.filter(left), self.filter(right)),
            Filter::Or(left, right) => format!("({} OR {})", self.filter(left), self.filter(right)),
            Filter::Not(inner) => format!("NOT ({})", self.filter(inner)),
        }
    }

    pub fn into_maps(self) -> (IndexMap<String, String>, IndexMap<String, AttributeValue>) {
        (self.names, self.values)
    }
}

/// Render one planned index query into a store request. The key condition is
/// rendered before the residual so `:pk_1` numbering is stable.
pub fn build_query(
    table_name: String,
    key: &IndexQueryKey,
    residual: &Residual,
    limit: Option<u32>,
    select: Select,
) -> Result<QueryRequest, ExecError> {
    let mut builder = ExpressionBuilder::new();
    let key_condition_expression = builder.key_condition(key)?;
    let filter_expression = builder.residual(residual)?;
    let (expression_attribute_names, expression_attribute_values) = builder.into_maps();
    Ok(QueryRequest {
        table_name,
        index_name: key.index.clone(),
        key_condition_expression,
        filter_expression,
        expression_attribute_names,
        expression_attribute_values,
        limit,
        select,
        exclusive_start_key: None,
    })
}

/// Render a scan carrying the original filter.
pub fn build_scan(table_name: String, filter: &Filter, limit: Option<u32>, select: Select) -> Result<ScanRequest, ExecError> {
    let mut builder = ExpressionBuilder::new();
    let filter_expression = builder.filter(filter);
    let (expression_attribute_names, expression_attribute_values) = builder.into_maps();
    Ok(ScanRequest {
        table_name,
        filter_expression,
        expression_attribute_names,
        expression_attribute_values,
        limit,
        select,
        exclusive_start_key: None,
    })
}
