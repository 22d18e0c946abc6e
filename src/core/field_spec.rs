// Field specifications - per-entity declaration of filterable fields
// Each field names its semantic kind and the operator set that kind supports

use std::collections::HashMap;

use crate::entities::EntityKind;
use crate::error::{AppError, AppResult};

/// Semantic kind of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Long,
    Text,
    Boolean,
    Instant,
    Enumeration,
}

/// Closed operator set. Which operators apply is a function of the
/// field kind, checked once at compile time of the expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Contains,
    DoesNotContain,
    Specified,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Operator {
    pub fn parse(name: &str) -> Option<Operator> {
        match name {
            "equals" => Some(Operator::Equals),
            "notEquals" => Some(Operator::NotEquals),
            "in" => Some(Operator::In),
            "notIn" => Some(Operator::NotIn),
            "contains" => Some(Operator::Contains),
            "doesNotContain" => Some(Operator::DoesNotContain),
            "specified" => Some(Operator::Specified),
            "greaterThan" => Some(Operator::GreaterThan),
            "greaterThanOrEqual" => Some(Operator::GreaterThanOrEqual),
            "lessThan" => Some(Operator::LessThan),
            "lessThanOrEqual" => Some(Operator::LessThanOrEqual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Contains => "contains",
            Operator::DoesNotContain => "doesNotContain",
            Operator::Specified => "specified",
            Operator::GreaterThan => "greaterThan",
            Operator::GreaterThanOrEqual => "greaterThanOrEqual",
            Operator::LessThan => "lessThan",
            Operator::LessThanOrEqual => "lessThanOrEqual",
        }
    }

    /// Does this operator take a list operand?
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl FieldKind {
    /// Operator support table per field kind.
    pub fn supported_operators(&self) -> &'static [Operator] {
        use Operator::*;
        match self {
            FieldKind::Text => &[
                Equals,
                NotEquals,
                In,
                NotIn,
                Contains,
                DoesNotContain,
                Specified,
            ],
            FieldKind::Long | FieldKind::Instant => &[
                Equals,
                NotEquals,
                In,
                NotIn,
                GreaterThan,
                GreaterThanOrEqual,
                LessThan,
                LessThanOrEqual,
                Specified,
            ],
            FieldKind::Boolean | FieldKind::Enumeration => {
                &[Equals, NotEquals, In, NotIn, Specified]
            }
        }
    }

    pub fn supports(&self, op: Operator) -> bool {
        self.supported_operators().contains(&op)
    }
}

/// One filterable field of an entity kind. Declared once at startup,
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Allowed variants for Enumeration fields, None otherwise.
    pub variants: Option<&'static [&'static str]>,
}

impl FieldSpec {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            variants: None,
        }
    }

    pub fn enumeration(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self {
            name,
            kind: FieldKind::Enumeration,
            variants: Some(variants),
        }
    }
}

/// Per-entity-kind catalogue of filterable fields. Built once at process
/// start; no mutation API exists in the request path.
#[derive(Debug, Default)]
pub struct FieldSpecRegistry {
    specs: HashMap<EntityKind, HashMap<&'static str, FieldSpec>>,
}

impl FieldSpecRegistry {
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: EntityKind, fields: Vec<FieldSpec>) {
        let entry = self.specs.entry(kind).or_default();
        for field in fields {
            entry.insert(field.name, field);
        }
    }

    pub fn lookup(&self, kind: EntityKind, field_name: &str) -> AppResult<&FieldSpec> {
        self.specs
            .get(&kind)
            .and_then(|fields| fields.get(field_name))
            .ok_or_else(|| {
                AppError::UnknownField(format!(
                    "field '{}' is not declared for entity kind '{}'",
                    field_name,
                    kind.as_str()
                ))
            })
    }

    pub fn fields_of(&self, kind: EntityKind) -> impl Iterator<Item = &FieldSpec> {
        self.specs.get(&kind).into_iter().flat_map(|m| m.values())
    }
}
