// Service layer - the only writers of entities, mirrored associations and
// denormalized counters.

pub mod engagements;
pub mod entity_service;
pub mod relationships;

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub use engagements::{EngagementAggregator, EngagementType, SubjectKind};
pub use entity_service::EntityService;
pub use relationships::{AssocKind, RelationshipManager};

const TRANSIENT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Retry an idempotent operation once after a transient storage failure.
/// Validation and not-found errors pass through untouched; callers must
/// not route non-idempotent operations (create) through here.
pub(crate) async fn retry_transient<T, F, Fut>(mut attempt: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match attempt().await {
        Err(AppError::StorageUnavailable(msg)) => {
            tracing::warn!("transient storage failure, retrying once: {}", msg);
            tokio::time::sleep(TRANSIENT_RETRY_BACKOFF).await;
            attempt().await
        }
        other => other,
    }
}
