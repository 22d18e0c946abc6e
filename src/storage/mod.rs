// Storage seam - the backing store is abstract beyond indexed lookups and
// atomic counter updates. Entity payloads are JSON documents; associations
// and engagements are plain rows addressed by id.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Sqlite, Transaction};

use crate::core::criteria::{FieldSource, FieldValue};
use crate::core::field_spec::{FieldKind, FieldSpec};
use crate::entities::EntityKind;
use crate::error::{AppError, AppResult};

pub use sqlite::SqliteStorage;

/// Current time in milliseconds since Unix epoch.
pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A persisted entity row.
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub id: i64,
    pub kind: EntityKind,
    pub data: JsonValue,
    pub created_time: i64,
    pub updated_time: i64,
    pub version: i64,
}

impl FieldSource for StoredEntity {
    fn value_of(&self, spec: &FieldSpec) -> Option<FieldValue> {
        if spec.name == "id" {
            return Some(FieldValue::Long(self.id));
        }
        let raw = self.data.get(spec.name)?;
        if raw.is_null() {
            return None;
        }
        match spec.kind {
            FieldKind::Long => raw.as_i64().map(FieldValue::Long),
            FieldKind::Text => raw.as_str().map(|s| FieldValue::Text(s.to_string())),
            FieldKind::Boolean => raw.as_bool().map(FieldValue::Boolean),
            FieldKind::Instant => raw
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| FieldValue::Instant(dt.with_timezone(&Utc))),
            FieldKind::Enumeration => raw.as_str().map(|s| FieldValue::Enumeration(s.to_string())),
        }
    }
}

/// Unit-of-work wrapper. A mutation that spans mirrored state must run
/// entirely inside one of these and either commit or roll back whole.
pub struct StorageTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl StorageTransaction {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub(crate) fn inner(&mut self) -> &mut Transaction<'static, Sqlite> {
        &mut self.tx
    }

    pub async fn commit(self) -> AppResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("failed to commit transaction", e))
    }

    pub async fn rollback(self) -> AppResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("failed to rollback transaction", e))
    }
}

/// Low-level storage operations. Association and engagement writes come in
/// `_tx` variants so the managers can pair them with counter updates in a
/// single unit of work.
#[async_trait]
pub trait StorageInterface: Send + Sync {
    async fn begin_transaction(&self) -> AppResult<StorageTransaction>;

    // Entity rows
    async fn insert_entity(&self, id: i64, kind: EntityKind, data: &JsonValue) -> AppResult<()>;
    async fn insert_entity_tx(
        &self,
        tx: &mut StorageTransaction,
        id: i64,
        kind: EntityKind,
        data: &JsonValue,
    ) -> AppResult<()>;
    async fn fetch_entity(&self, kind: EntityKind, id: i64) -> AppResult<Option<StoredEntity>>;
    async fn replace_entity(&self, kind: EntityKind, id: i64, data: &JsonValue) -> AppResult<()>;
    async fn remove_entity_tx(
        &self,
        tx: &mut StorageTransaction,
        kind: EntityKind,
        id: i64,
    ) -> AppResult<bool>;
    async fn entity_exists(&self, kind: EntityKind, id: i64) -> AppResult<bool>;
    async fn scan_kind(&self, kind: EntityKind) -> AppResult<Vec<StoredEntity>>;

    // Association link rows (directed; the manager writes both directions)
    async fn links_from(&self, src: i64, atype: &str) -> AppResult<Vec<i64>>;
    async fn link_exists(&self, src: i64, atype: &str, dst: i64) -> AppResult<bool>;
    async fn insert_link_tx(
        &self,
        tx: &mut StorageTransaction,
        src: i64,
        atype: &str,
        dst: i64,
    ) -> AppResult<bool>;
    async fn delete_link_tx(
        &self,
        tx: &mut StorageTransaction,
        src: i64,
        atype: &str,
        dst: i64,
    ) -> AppResult<bool>;
    async fn delete_links_of_tx(&self, tx: &mut StorageTransaction, id: i64) -> AppResult<()>;

    // Engagement rows, unique per (subject, user, type)
    async fn insert_engagement_tx(
        &self,
        tx: &mut StorageTransaction,
        subject_id: i64,
        subject_kind: EntityKind,
        user_id: i64,
        etype: &str,
    ) -> AppResult<bool>;
    async fn delete_engagement_tx(
        &self,
        tx: &mut StorageTransaction,
        subject_id: i64,
        user_id: i64,
        etype: &str,
    ) -> AppResult<bool>;
    async fn delete_engagements_of_tx(
        &self,
        tx: &mut StorageTransaction,
        subject_id: i64,
    ) -> AppResult<()>;
    /// Delete every engagement held by a user, returning the
    /// (subject, type) pairs that were active so the caller can move the
    /// subjects' counters in the same transaction.
    async fn delete_user_engagements_tx(
        &self,
        tx: &mut StorageTransaction,
        user_id: i64,
    ) -> AppResult<Vec<(i64, String)>>;
    async fn delete_comments_of_tx(
        &self,
        tx: &mut StorageTransaction,
        project_id: i64,
    ) -> AppResult<()>;
    async fn count_engagements(&self, subject_id: i64, etype: &str) -> AppResult<i64>;
    async fn count_comments_for(&self, project_id: i64) -> AppResult<i64>;

    // Denormalized counters, adjusted atomically inside the caller's
    // transaction - never via read-modify-write in application code
    async fn adjust_counter_tx(
        &self,
        tx: &mut StorageTransaction,
        id: i64,
        field: &str,
        delta: i64,
    ) -> AppResult<()>;
    async fn set_counter_tx(
        &self,
        tx: &mut StorageTransaction,
        id: i64,
        field: &str,
        value: i64,
    ) -> AppResult<()>;
}

/// Transient infrastructure failures surface as `StorageUnavailable` so the
/// retry policy can tell them apart from hard storage errors.
pub(crate) fn map_sqlx_error(context: &str, e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            AppError::StorageUnavailable(format!("{}: {}", context, e))
        }
        other => AppError::Storage(format!("{}: {}", context, other)),
    }
}
