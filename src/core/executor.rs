// Query executor - applies one compiled expression to a kind scan. The
// list items and the total come out of the same pass over the same
// expression, so a paired /count can never disagree with the page.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::core::criteria::{FieldSource, FilterExpression};
use crate::entities::{registry, EntityKind};
use crate::error::{AppError, AppResult};
use crate::storage::{StorageInterface, StoredEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

/// Pagination window. `sort` clauses apply in declared order; ties break
/// by primary key ascending.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub size: u32,
    pub sort: Vec<SortClause>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 0,
            size: 20,
            sort: Vec::new(),
        }
    }
}

impl Page {
    /// Parse `page`, `size` and repeatable `sort=field,asc|desc` from raw
    /// query pairs. Filter keys are someone else's business.
    pub fn from_params(params: &[(String, String)]) -> AppResult<Page> {
        let mut page = Page::default();
        for (key, value) in params {
            match key.as_str() {
                "page" => {
                    page.number = value.parse().map_err(|_| {
                        AppError::Validation(format!("invalid page number '{}'", value))
                    })?;
                }
                "size" => {
                    page.size = value.parse().map_err(|_| {
                        AppError::Validation(format!("invalid page size '{}'", value))
                    })?;
                    if page.size == 0 {
                        return Err(AppError::Validation(
                            "page size must be greater than zero".to_string(),
                        ));
                    }
                }
                "sort" => {
                    let (field, direction) = match value.split_once(',') {
                        Some((f, "asc")) => (f, SortDirection::Asc),
                        Some((f, "desc")) => (f, SortDirection::Desc),
                        Some((_, other)) => {
                            return Err(AppError::Validation(format!(
                                "invalid sort direction '{}'",
                                other
                            )))
                        }
                        None => (value.as_str(), SortDirection::Asc),
                    };
                    page.sort.push(SortClause {
                        field: field.to_string(),
                        direction,
                    });
                }
                _ => {}
            }
        }
        Ok(page)
    }
}

/// One page of results plus the exact total for the same expression.
#[derive(Debug)]
pub struct QueryResult {
    pub items: Vec<StoredEntity>,
    pub total: u64,
    pub page: Page,
}

/// Read-only execution of compiled filter expressions against the store.
pub struct QueryExecutor {
    storage: Arc<dyn StorageInterface>,
}

impl QueryExecutor {
    pub fn new(storage: Arc<dyn StorageInterface>) -> Self {
        Self { storage }
    }

    /// Filter, sort, then slice. Ordering is applied before the page is
    /// cut, never after.
    pub async fn list(
        &self,
        kind: EntityKind,
        expr: &FilterExpression,
        page: &Page,
    ) -> AppResult<QueryResult> {
        let mut matched = self.matching(kind, expr).await?;
        let total = matched.len() as u64;

        // Resolve sort fields against the registry before comparing
        let mut sort_specs = Vec::with_capacity(page.sort.len());
        for clause in &page.sort {
            let spec = registry().lookup(kind, &clause.field)?;
            sort_specs.push((spec.clone(), clause.direction));
        }

        matched.sort_by(|a, b| {
            for (spec, direction) in &sort_specs {
                let ord = compare_field(a, b, spec);
                let ord = match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id.cmp(&b.id)
        });

        let start = page.number as usize * page.size as usize;
        let items = matched
            .into_iter()
            .skip(start)
            .take(page.size as usize)
            .collect();

        Ok(QueryResult {
            items,
            total,
            page: page.clone(),
        })
    }

    /// Cardinality of the identical predicate, no sort, no slice.
    pub async fn count(&self, kind: EntityKind, expr: &FilterExpression) -> AppResult<u64> {
        Ok(self.matching(kind, expr).await?.len() as u64)
    }

    async fn matching(&self, kind: EntityKind, expr: &FilterExpression) -> AppResult<Vec<StoredEntity>> {
        let scanned = self.storage.scan_kind(kind).await?;
        Ok(scanned.into_iter().filter(|e| expr.matches(e)).collect())
    }
}

/// Absent values order before present ones ascending.
fn compare_field(
    a: &StoredEntity,
    b: &StoredEntity,
    spec: &crate::core::field_spec::FieldSpec,
) -> Ordering {
    let left = a.value_of(spec);
    let right = b.value_of(spec);
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => l.compare(&r).unwrap_or(Ordering::Equal),
    }
}
