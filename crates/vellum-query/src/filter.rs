use std::cmp::Ordering;

use serde_json::Value;

use crate::operator::Operator;
use crate::value::{self, FieldRef};

/// A single `(field, operator, value)` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: Operator, value: Value) -> Self {
        Filter {
            field: field.into(),
            op,
            value,
        }
    }

    /// Operand list for `in`, `not-in` and `array-contains-any`.
    pub fn operands(&self) -> &[Value] {
        match &self.value {
            Value::Array(items) if self.op.is_disjunctive() => items,
            _ => std::slice::from_ref(&self.value),
        }
    }

    /// Evaluate against a document. A missing field never matches, which
    /// mirrors index scans: documents without the field have no entry.
    pub fn matches(&self, id: &str, data: &Value) -> bool {
        match value::field_value(id, data, &self.field) {
            Some(found) => self.matches_value(&found.to_value()),
            None => false,
        }
    }

    pub fn matches_field(&self, found: Option<FieldRef<'_>>) -> bool {
        found.is_some_and(|f| self.matches_value(&f.to_value()))
    }

    fn matches_value(&self, v: &Value) -> bool {
        let ord = || value::compare(v, &self.value);
        match self.op {
            Operator::Eq => ord() == Ordering::Equal,
            Operator::Ne => ord() != Ordering::Equal,
            Operator::Lt => ord() == Ordering::Less,
            Operator::Lte => ord() != Ordering::Greater,
            Operator::Gt => ord() == Ordering::Greater,
            Operator::Gte => ord() != Ordering::Less,
            Operator::In => self.operands().iter().any(|o| value::equals(v, o)),
            Operator::NotIn => !self.operands().iter().any(|o| value::equals(v, o)),
            Operator::ArrayContains => match v {
                Value::Array(items) => items.iter().any(|i| value::equals(i, &self.value)),
                _ => false,
            },
            Operator::ArrayContainsAny => match v {
                Value::Array(items) => items
                    .iter()
                    .any(|i| self.operands().iter().any(|o| value::equals(i, o))),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bob() -> Value {
        json!({"name": "Bob", "age": 20, "letters": ["b", "o"]})
    }

    #[test]
    fn comparison_operators() {
        let doc = bob();
        assert!(Filter::new("age", Operator::Eq, json!(20.0)).matches("Bob", &doc));
        assert!(Filter::new("age", Operator::Ne, json!(30)).matches("Bob", &doc));
        assert!(Filter::new("age", Operator::Gte, json!(20)).matches("Bob", &doc));
        assert!(!Filter::new("age", Operator::Gt, json!(20)).matches("Bob", &doc));
        assert!(Filter::new("age", Operator::Lt, json!(21)).matches("Bob", &doc));
    }

    #[test]
    fn list_operators() {
        let doc = bob();
        assert!(Filter::new("age", Operator::In, json!([20, 30])).matches("Bob", &doc));
        assert!(!Filter::new("age", Operator::NotIn, json!([20, 30])).matches("Bob", &doc));
        assert!(Filter::new("letters", Operator::ArrayContains, json!("b")).matches("Bob", &doc));
        assert!(
            Filter::new("letters", Operator::ArrayContainsAny, json!(["x", "o"]))
                .matches("Bob", &doc)
        );
    }

    #[test]
    fn missing_field_never_matches() {
        let doc = bob();
        assert!(!Filter::new("height", Operator::Ne, json!(1)).matches("Bob", &doc));
        assert!(!Filter::new("height", Operator::NotIn, json!([1])).matches("Bob", &doc));
    }

    #[test]
    fn id_field() {
        let doc = bob();
        assert!(Filter::new("__id__", Operator::Eq, json!("Bob")).matches("Bob", &doc));
    }
}
