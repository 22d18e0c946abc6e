use std::sync::Arc;

use crate::config::Config;
use crate::core::{IdGenerator, QueryExecutor};
use crate::error::AppResult;
use crate::services::{EngagementAggregator, EntityService, RelationshipManager};
use crate::storage::{SqliteStorage, StorageInterface};

/// Shared application state: one storage handle behind the services that
/// own all writes, and the read-only executor beside them.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageInterface>,
    pub executor: Arc<QueryExecutor>,
    pub entities: Arc<EntityService>,
    pub relationships: Arc<RelationshipManager>,
    pub engagements: Arc<EngagementAggregator>,
}

impl AppState {
    pub async fn new(config: &Config) -> AppResult<Self> {
        let storage: Arc<dyn StorageInterface> =
            Arc::new(SqliteStorage::open(&config.database.url).await?);
        Ok(Self::with_storage(storage))
    }

    pub fn with_storage(storage: Arc<dyn StorageInterface>) -> Self {
        let ids = Arc::new(IdGenerator::default());
        Self {
            executor: Arc::new(QueryExecutor::new(storage.clone())),
            entities: Arc::new(EntityService::new(storage.clone(), ids)),
            relationships: Arc::new(RelationshipManager::new(storage.clone())),
            engagements: Arc::new(EngagementAggregator::new(storage.clone())),
            storage,
        }
    }
}
