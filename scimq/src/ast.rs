use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Comparison operators usable in a binary filter term.
///
/// `sw` (starts-with) and `co` (contains) only accept string values; the
/// ordering operators only accept totally ordered primitives. Presence (`pr`)
/// is its own [`Filter`] variant because it takes no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Sw,
    Co,
}

impl CompareOp {
    pub fn keyword(self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Sw => "sw",
            CompareOp::Co => "co",
        }
    }
}

/// An attribute filter expression tree. Immutable after construction;
/// structural equality and hashing make trees usable in canonical sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Filter {
    Compare { attr: String, op: CompareOp, value: Value },
    Present { attr: String },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(attr: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare { attr: attr.into(), op, value: value.into() }
    }

    pub fn eq(attr: impl Into<String>, value: impl Into<Value>) -> Self { Filter::compare(attr, CompareOp::Eq, value) }

    pub fn ne(attr: impl Into<String>, value: impl Into<Value>) -> Self { Filter::compare(attr, CompareOp::Ne, value) }

    pub fn lt(attr: impl Into<String>, value: impl Into<Value>) -> Self { Filter::compare(attr, CompareOp::Lt, value) }

    pub fn le(attr: impl Into<String>, value: impl Into<Value>) -> Self { Filter::compare(attr, CompareOp::Le, value) }

    pub fn gt(attr: impl Into<String>, value: impl Into<Value>) -> Self { Filter::compare(attr, CompareOp::Gt, value) }

    pub fn ge(attr: impl Into<String>, value: impl Into<Value>) -> Self { Filter::compare(attr, CompareOp::Ge, value) }

    /// Starts-with. The signature restricts the value to strings.
    pub fn sw(attr: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::compare(attr, CompareOp::Sw, Value::Str(prefix.into()))
    }

    /// Contains. The signature restricts the value to strings.
    pub fn co(attr: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::compare(attr, CompareOp::Co, Value::Str(needle.into()))
    }

    /// Presence test; takes no value.
    pub fn pr(attr: impl Into<String>) -> Self { Filter::Present { attr: attr.into() } }

    pub fn and(self, other: Filter) -> Self { Filter::And(Box::new(self), Box::new(other)) }

    pub fn or(self, other: Filter) -> Self { Filter::Or(Box::new(self), Box::new(other)) }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self { Filter::Not(Box::new(self)) }

    /// The set of attribute names referenced anywhere in the tree.
    pub fn attributes(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Filter::Compare { attr, .. } | Filter::Present { attr } => {
                out.insert(attr.as_str());
            }
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.collect_attributes(out);
                b.collect_attributes(out);
            }
            Filter::Not(inner) => inner.collect_attributes(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_attributes_across_the_tree() {
        let filter = Filter::eq("userName", "jane")
            .and(Filter::sw("email", "jane.").or(Filter::pr("phone")))
            .and(Filter::eq("userName", "janedoe").not());
        let attrs: Vec<&str> = filter.attributes().into_iter().collect();
        assert_eq!(attrs, vec!["email", "phone", "userName"]);
    }

    #[test]
    fn structural_equality_is_exact() {
        let a = Filter::eq("a", 1i64).and(Filter::eq("b", 2i64));
        let b = Filter::eq("a", 1i64).and(Filter::eq("b", 2i64));
        let c = Filter::eq("b", 2i64).and(Filter::eq("a", 1i64));
        assert_eq!(a, b);
        assert_ne!(a, c); // commuted trees are distinct until normalized
    }
}
