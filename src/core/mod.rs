// Core query machinery: field declarations, the criteria model, the
// compiler from raw parameters, and the executor.

pub mod compiler;
pub mod criteria;
pub mod executor;
pub mod field_spec;
pub mod id_generator;

pub use compiler::{compile, parse_filter_params, RawCriterion};
pub use criteria::{Criterion, FieldSource, FieldValue, FilterExpression, Operand};
pub use executor::{Page, QueryExecutor, QueryResult, SortClause, SortDirection};
pub use field_spec::{FieldKind, FieldSpec, FieldSpecRegistry, Operator};
pub use id_generator::IdGenerator;
