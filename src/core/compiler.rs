// Criteria compiler - turns raw `field.operator=value` parameters into a
// validated FilterExpression. Pure: never touches the storage layer, so the
// same compiled expression can be both listed and counted without reparsing.

use chrono::{DateTime, Utc};

use crate::core::criteria::{Criterion, FieldValue, FilterExpression, Operand};
use crate::core::field_spec::{FieldKind, FieldSpec, Operator};
use crate::entities::{registry, EntityKind};
use crate::error::{AppError, AppResult};

/// One raw filter triple as parsed from the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCriterion {
    pub field: String,
    pub operator: String,
    pub value: String,
}

/// Keys of the query string that belong to pagination, not filtering.
const RESERVED_KEYS: &[&str] = &["page", "size", "sort"];

/// Extract filter triples from raw query pairs. Keys without a
/// `field.operator` shape are rejected; pagination keys are skipped.
pub fn parse_filter_params(params: &[(String, String)]) -> AppResult<Vec<RawCriterion>> {
    let mut raw = Vec::new();
    for (key, value) in params {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let (field, operator) = key.split_once('.').ok_or_else(|| {
            AppError::Validation(format!(
                "filter parameter '{}' is not of the form field.operator",
                key
            ))
        })?;
        if field.is_empty() || operator.is_empty() {
            return Err(AppError::Validation(format!(
                "filter parameter '{}' is not of the form field.operator",
                key
            )));
        }
        raw.push(RawCriterion {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.clone(),
        });
    }
    Ok(raw)
}

/// Compile raw triples against the field registry of one entity kind.
pub fn compile(kind: EntityKind, raw: &[RawCriterion]) -> AppResult<FilterExpression> {
    let mut criteria = Vec::with_capacity(raw.len());
    for triple in raw {
        let spec = registry().lookup(kind, &triple.field)?;
        let operator = Operator::parse(&triple.operator).ok_or_else(|| {
            AppError::UnsupportedOperator(format!(
                "'{}' is not a recognized operator",
                triple.operator
            ))
        })?;
        if !spec.kind.supports(operator) {
            return Err(AppError::UnsupportedOperator(format!(
                "operator '{}' is not supported on field '{}'",
                operator.as_str(),
                spec.name
            )));
        }
        let operand = coerce_operand(spec, operator, &triple.value)?;
        criteria.push(Criterion {
            field: spec.clone(),
            operator,
            operand,
        });
    }
    Ok(FilterExpression::new(criteria))
}

fn coerce_operand(spec: &FieldSpec, operator: Operator, raw: &str) -> AppResult<Operand> {
    if operator == Operator::Specified {
        let flag = parse_bool(raw).ok_or_else(|| {
            AppError::OperandTypeMismatch(format!(
                "'specified' on field '{}' requires true or false, got '{}'",
                spec.name, raw
            ))
        })?;
        return Ok(Operand::Specified(flag));
    }
    if operator.takes_list() {
        if raw.is_empty() {
            return Err(AppError::OperandTypeMismatch(format!(
                "'{}' on field '{}' requires a non-empty list",
                operator.as_str(),
                spec.name
            )));
        }
        let values = raw
            .split(',')
            .map(|part| coerce_value(spec, part))
            .collect::<AppResult<Vec<_>>>()?;
        return Ok(Operand::List(values));
    }
    Ok(Operand::Scalar(coerce_value(spec, raw)?))
}

fn coerce_value(spec: &FieldSpec, raw: &str) -> AppResult<FieldValue> {
    let mismatch = |expected: &str| {
        AppError::OperandTypeMismatch(format!(
            "field '{}' expects {}, got '{}'",
            spec.name, expected, raw
        ))
    };
    match spec.kind {
        FieldKind::Long => raw
            .parse::<i64>()
            .map(FieldValue::Long)
            .map_err(|_| mismatch("an integer")),
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Boolean => parse_bool(raw)
            .map(FieldValue::Boolean)
            .ok_or_else(|| mismatch("true or false")),
        FieldKind::Instant => DateTime::parse_from_rfc3339(raw)
            .map(|dt| FieldValue::Instant(dt.with_timezone(&Utc)))
            .map_err(|_| mismatch("an RFC 3339 timestamp")),
        FieldKind::Enumeration => {
            let variants = spec.variants.unwrap_or(&[]);
            if variants.contains(&raw) {
                Ok(FieldValue::Enumeration(raw.to_string()))
            } else {
                Err(mismatch(&format!("one of {}", variants.join(", "))))
            }
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
