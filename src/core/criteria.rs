// Criteria model - value objects describing one query predicate
// A FilterExpression is the AND of its criteria; an empty expression
// matches every row.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::core::field_spec::{FieldSpec, Operator};

/// A typed field value as seen by the predicate evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Long(i64),
    Text(String),
    Boolean(bool),
    Instant(DateTime<Utc>),
    Enumeration(String),
}

impl FieldValue {
    /// Natural total order within one kind. Values of different kinds
    /// never reach here because operands are coerced to the field's kind.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Long(a), FieldValue::Long(b)) => Some(a.cmp(b)),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            // chrono compares at full precision, well past milliseconds
            (FieldValue::Instant(a), FieldValue::Instant(b)) => Some(a.cmp(b)),
            (FieldValue::Enumeration(a), FieldValue::Enumeration(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Operand of a criterion. `specified` carries only a boolean flag and
/// never a value lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Specified(bool),
    Scalar(FieldValue),
    List(Vec<FieldValue>),
}

/// One field-scoped constraint.
#[derive(Debug, Clone)]
pub struct Criterion {
    pub field: FieldSpec,
    pub operator: Operator,
    pub operand: Operand,
}

impl Criterion {
    /// Evaluate against the field's value, where `None` is a true null or
    /// absent value. Only `specified=false` is satisfied by null; every
    /// other operator fails on null, including the negated ones.
    pub fn evaluate(&self, value: Option<&FieldValue>) -> bool {
        if let Operand::Specified(wanted) = &self.operand {
            return *wanted == value.is_some();
        }
        let value = match value {
            Some(v) => v,
            None => return false,
        };
        match (&self.operator, &self.operand) {
            (Operator::Equals, Operand::Scalar(rhs)) => value == rhs,
            (Operator::NotEquals, Operand::Scalar(rhs)) => value != rhs,
            // Set semantics: duplicates in the operand list are harmless
            (Operator::In, Operand::List(list)) => list.contains(value),
            (Operator::NotIn, Operand::List(list)) => !list.contains(value),
            (Operator::Contains, Operand::Scalar(rhs)) => {
                substring_match(value, rhs).unwrap_or(false)
            }
            (Operator::DoesNotContain, Operand::Scalar(rhs)) => {
                substring_match(value, rhs).map(|m| !m).unwrap_or(false)
            }
            (Operator::GreaterThan, Operand::Scalar(rhs)) => {
                matches!(value.compare(rhs), Some(Ordering::Greater))
            }
            (Operator::GreaterThanOrEqual, Operand::Scalar(rhs)) => {
                matches!(value.compare(rhs), Some(Ordering::Greater | Ordering::Equal))
            }
            (Operator::LessThan, Operand::Scalar(rhs)) => {
                matches!(value.compare(rhs), Some(Ordering::Less))
            }
            (Operator::LessThanOrEqual, Operand::Scalar(rhs)) => {
                matches!(value.compare(rhs), Some(Ordering::Less | Ordering::Equal))
            }
            _ => false,
        }
    }
}

/// Case-sensitive literal substring test; the operand is never treated
/// as a wildcard pattern.
fn substring_match(value: &FieldValue, operand: &FieldValue) -> Option<bool> {
    Some(value.as_text()?.contains(operand.as_text()?))
}

/// Source of field values for predicate evaluation, decoupled from the
/// storage representation.
pub trait FieldSource {
    fn value_of(&self, spec: &FieldSpec) -> Option<FieldValue>;
}

/// Conjunction of criteria. Insertion order is kept for diagnostics but
/// does not affect the result.
#[derive(Debug, Clone, Default)]
pub struct FilterExpression {
    criteria: Vec<Criterion>,
}

impl FilterExpression {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// AND over zero conjuncts is true.
    pub fn matches<S: FieldSource>(&self, source: &S) -> bool {
        self.criteria
            .iter()
            .all(|c| c.evaluate(source.value_of(&c.field).as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field_spec::FieldKind;

    fn criterion(kind: FieldKind, op: Operator, operand: Operand) -> Criterion {
        Criterion {
            field: FieldSpec::new("f", kind),
            operator: op,
            operand,
        }
    }

    #[test]
    fn test_contains_is_case_sensitive_literal() {
        let c = criterion(
            FieldKind::Text,
            Operator::Contains,
            Operand::Scalar(FieldValue::Text("Hello".into())),
        );
        assert!(c.evaluate(Some(&FieldValue::Text("Hello world".into()))));
        assert!(!c.evaluate(Some(&FieldValue::Text("hello world".into()))));
        assert!(!c.evaluate(None));
    }

    #[test]
    fn test_specified_distinguishes_null_from_empty() {
        let c = criterion(FieldKind::Text, Operator::Specified, Operand::Specified(false));
        assert!(c.evaluate(None));
        // empty string and zero are present values, not nulls
        assert!(!c.evaluate(Some(&FieldValue::Text(String::new()))));

        let c = criterion(FieldKind::Long, Operator::Specified, Operand::Specified(false));
        assert!(!c.evaluate(Some(&FieldValue::Long(0))));
    }

    #[test]
    fn test_null_never_satisfies_negated_operators() {
        let ne = criterion(
            FieldKind::Text,
            Operator::NotEquals,
            Operand::Scalar(FieldValue::Text("x".into())),
        );
        assert!(!ne.evaluate(None));

        let not_in = criterion(
            FieldKind::Long,
            Operator::NotIn,
            Operand::List(vec![FieldValue::Long(1)]),
        );
        assert!(!not_in.evaluate(None));
    }

    #[test]
    fn test_range_operators_use_natural_order() {
        let gte = criterion(
            FieldKind::Long,
            Operator::GreaterThanOrEqual,
            Operand::Scalar(FieldValue::Long(2)),
        );
        assert!(!gte.evaluate(Some(&FieldValue::Long(1))));
        assert!(gte.evaluate(Some(&FieldValue::Long(2))));
        assert!(gte.evaluate(Some(&FieldValue::Long(3))));
    }

    #[test]
    fn test_in_has_set_semantics() {
        let c = criterion(
            FieldKind::Long,
            Operator::In,
            Operand::List(vec![
                FieldValue::Long(1),
                FieldValue::Long(1),
                FieldValue::Long(2),
            ]),
        );
        assert!(c.evaluate(Some(&FieldValue::Long(1))));
        assert!(!c.evaluate(Some(&FieldValue::Long(3))));
    }

    #[test]
    fn test_empty_expression_matches_everything() {
        struct Nothing;
        impl FieldSource for Nothing {
            fn value_of(&self, _spec: &FieldSpec) -> Option<FieldValue> {
                None
            }
        }
        assert!(FilterExpression::default().matches(&Nothing));
    }
}
