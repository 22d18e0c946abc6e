use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::entities::EntityKind;
use crate::error::{AppError, AppResult};
use crate::storage::{
    current_time_millis, map_sqlx_error, StorageInterface, StorageTransaction, StoredEntity,
};

/// SQLite implementation of the storage interface. Entity payloads live in
/// a JSON column so counters can be adjusted with a single `json_set`
/// UPDATE inside the owning transaction.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// In-memory database for tests. A single connection keeps every
    /// operation on the same memory instance.
    pub async fn new_in_memory() -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| map_sqlx_error("failed to connect to in-memory SQLite", e))?;

        let storage = Self { pool };
        storage.initialize().await?;
        Ok(storage)
    }

    /// File-backed database, created on first open.
    pub async fn open(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Storage(format!("invalid database url '{}': {}", url, e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("failed to open SQLite database", e))?;

        let storage = Self { pool };
        storage.initialize().await?;
        Ok(storage)
    }

    async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL,
                time_created INTEGER NOT NULL,
                time_updated INTEGER NOT NULL,
                version INTEGER DEFAULT 1,
                PRIMARY KEY (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("failed to create entities table", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                src_id INTEGER NOT NULL,
                atype TEXT NOT NULL,
                dst_id INTEGER NOT NULL,
                time_created INTEGER NOT NULL,
                PRIMARY KEY (src_id, atype, dst_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("failed to create links table", e))?;

        // The primary key is the idempotence mechanism: a second engage of
        // the same (subject, user, type) tuple inserts nothing.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS engagements (
                subject_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                etype TEXT NOT NULL,
                subject_kind TEXT NOT NULL,
                time_created INTEGER NOT NULL,
                PRIMARY KEY (subject_id, user_id, etype)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("failed to create engagements table", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(kind)")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("failed to create entities kind index", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_dst ON links(dst_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("failed to create links dst index", e))?;

        Ok(())
    }

    fn row_to_entity(row: &sqlx::sqlite::SqliteRow, kind: EntityKind) -> AppResult<StoredEntity> {
        let raw: String = row.get("data");
        let data = serde_json::from_str(&raw)
            .map_err(|e| AppError::Storage(format!("corrupt entity payload: {}", e)))?;
        Ok(StoredEntity {
            id: row.get("id"),
            kind,
            data,
            created_time: row.get("time_created"),
            updated_time: row.get("time_updated"),
            version: row.get("version"),
        })
    }

    fn counter_path(field: &str) -> String {
        // Counter field names come from the closed per-kind tables, never
        // from request input.
        format!("$.{}", field)
    }
}

#[async_trait]
impl StorageInterface for SqliteStorage {
    async fn begin_transaction(&self) -> AppResult<StorageTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("failed to begin transaction", e))?;
        Ok(StorageTransaction::new(tx))
    }

    async fn insert_entity(&self, id: i64, kind: EntityKind, data: &JsonValue) -> AppResult<()> {
        let now = current_time_millis();
        sqlx::query(
            "INSERT INTO entities (id, kind, data, time_created, time_updated) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(data.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("failed to insert entity {}", id), e))?;
        Ok(())
    }

    async fn insert_entity_tx(
        &self,
        tx: &mut StorageTransaction,
        id: i64,
        kind: EntityKind,
        data: &JsonValue,
    ) -> AppResult<()> {
        let now = current_time_millis();
        sqlx::query(
            "INSERT INTO entities (id, kind, data, time_created, time_updated) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(data.to_string())
        .bind(now)
        .bind(now)
        .execute(&mut **tx.inner())
        .await
        .map_err(|e| map_sqlx_error(&format!("failed to insert entity {} in transaction", id), e))?;
        Ok(())
    }

    async fn fetch_entity(&self, kind: EntityKind, id: i64) -> AppResult<Option<StoredEntity>> {
        let row = sqlx::query(
            "SELECT id, data, time_created, time_updated, version FROM entities WHERE id = ? AND kind = ?",
        )
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("failed to fetch entity {}", id), e))?;

        match row {
            Some(row) => Ok(Some(Self::row_to_entity(&row, kind)?)),
            None => Ok(None),
        }
    }

    async fn replace_entity(&self, kind: EntityKind, id: i64, data: &JsonValue) -> AppResult<()> {
        let now = current_time_millis();
        let result = sqlx::query(
            "UPDATE entities SET data = ?, time_updated = ?, version = version + 1 WHERE id = ? AND kind = ?",
        )
        .bind(data.to_string())
        .bind(now)
        .bind(id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("failed to update entity {}", id), e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "{} {} not found",
                kind.as_str(),
                id
            )));
        }
        Ok(())
    }

    async fn remove_entity_tx(
        &self,
        tx: &mut StorageTransaction,
        kind: EntityKind,
        id: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE id = ? AND kind = ?")
            .bind(id)
            .bind(kind.as_str())
            .execute(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error(&format!("failed to delete entity {}", id), e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn entity_exists(&self, kind: EntityKind, id: i64) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM entities WHERE id = ? AND kind = ?")
            .bind(id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&format!("failed to check entity {}", id), e))?;
        Ok(row.is_some())
    }

    async fn scan_kind(&self, kind: EntityKind) -> AppResult<Vec<StoredEntity>> {
        let rows = sqlx::query(
            "SELECT id, data, time_created, time_updated, version FROM entities WHERE kind = ? ORDER BY id",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&format!("failed to scan kind {}", kind.as_str()), e))?;

        rows.iter().map(|row| Self::row_to_entity(row, kind)).collect()
    }

    async fn links_from(&self, src: i64, atype: &str) -> AppResult<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT dst_id FROM links WHERE src_id = ? AND atype = ? ORDER BY time_created, dst_id",
        )
        .bind(src)
        .bind(atype)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("failed to read links", e))?;
        Ok(rows.into_iter().map(|row| row.get("dst_id")).collect())
    }

    async fn link_exists(&self, src: i64, atype: &str, dst: i64) -> AppResult<bool> {
        let row = sqlx::query("SELECT 1 FROM links WHERE src_id = ? AND atype = ? AND dst_id = ?")
            .bind(src)
            .bind(atype)
            .bind(dst)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("failed to check link existence", e))?;
        Ok(row.is_some())
    }

    async fn insert_link_tx(
        &self,
        tx: &mut StorageTransaction,
        src: i64,
        atype: &str,
        dst: i64,
    ) -> AppResult<bool> {
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO links (src_id, atype, dst_id, time_created) VALUES (?, ?, ?, ?)",
        )
        .bind(src)
        .bind(atype)
        .bind(dst)
        .bind(now)
        .execute(&mut **tx.inner())
        .await
        .map_err(|e| map_sqlx_error("failed to insert link", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_link_tx(
        &self,
        tx: &mut StorageTransaction,
        src: i64,
        atype: &str,
        dst: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM links WHERE src_id = ? AND atype = ? AND dst_id = ?")
            .bind(src)
            .bind(atype)
            .bind(dst)
            .execute(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error("failed to delete link", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_links_of_tx(&self, tx: &mut StorageTransaction, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM links WHERE src_id = ? OR dst_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error("failed to delete links of entity", e))?;
        Ok(())
    }

    async fn insert_engagement_tx(
        &self,
        tx: &mut StorageTransaction,
        subject_id: i64,
        subject_kind: EntityKind,
        user_id: i64,
        etype: &str,
    ) -> AppResult<bool> {
        let now = current_time_millis();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO engagements (subject_id, user_id, etype, subject_kind, time_created) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(subject_id)
        .bind(user_id)
        .bind(etype)
        .bind(subject_kind.as_str())
        .bind(now)
        .execute(&mut **tx.inner())
        .await
        .map_err(|e| map_sqlx_error("failed to insert engagement", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_engagement_tx(
        &self,
        tx: &mut StorageTransaction,
        subject_id: i64,
        user_id: i64,
        etype: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM engagements WHERE subject_id = ? AND user_id = ? AND etype = ?",
        )
        .bind(subject_id)
        .bind(user_id)
        .bind(etype)
        .execute(&mut **tx.inner())
        .await
        .map_err(|e| map_sqlx_error("failed to delete engagement", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_engagements_of_tx(
        &self,
        tx: &mut StorageTransaction,
        subject_id: i64,
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM engagements WHERE subject_id = ?")
            .bind(subject_id)
            .execute(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error("failed to delete engagements of subject", e))?;
        Ok(())
    }

    async fn delete_user_engagements_tx(
        &self,
        tx: &mut StorageTransaction,
        user_id: i64,
    ) -> AppResult<Vec<(i64, String)>> {
        let rows = sqlx::query("SELECT subject_id, etype FROM engagements WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error("failed to read engagements of user", e))?;
        let pairs: Vec<(i64, String)> = rows
            .iter()
            .map(|row| (row.get("subject_id"), row.get("etype")))
            .collect();

        sqlx::query("DELETE FROM engagements WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error("failed to delete engagements of user", e))?;
        Ok(pairs)
    }

    async fn delete_comments_of_tx(
        &self,
        tx: &mut StorageTransaction,
        project_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "DELETE FROM entities WHERE kind = 'comment' AND json_extract(data, '$.projectId') = ?",
        )
        .bind(project_id)
        .execute(&mut **tx.inner())
        .await
        .map_err(|e| map_sqlx_error("failed to delete comments of project", e))?;
        Ok(())
    }

    async fn count_engagements(&self, subject_id: i64, etype: &str) -> AppResult<i64> {
        let row =
            sqlx::query("SELECT COUNT(*) AS n FROM engagements WHERE subject_id = ? AND etype = ?")
                .bind(subject_id)
                .bind(etype)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("failed to count engagements", e))?;
        Ok(row.get("n"))
    }

    async fn count_comments_for(&self, project_id: i64) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM entities WHERE kind = 'comment' AND json_extract(data, '$.projectId') = ?",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("failed to count comments", e))?;
        Ok(row.get("n"))
    }

    async fn adjust_counter_tx(
        &self,
        tx: &mut StorageTransaction,
        id: i64,
        field: &str,
        delta: i64,
    ) -> AppResult<()> {
        // Single UPDATE: the increment happens inside the statement, so no
        // application-level read-modify-write can lose it.
        let path = Self::counter_path(field);
        let now = current_time_millis();
        let sql = format!(
            "UPDATE entities SET data = json_set(data, '{path}', COALESCE(json_extract(data, '{path}'), 0) + ?), time_updated = ? WHERE id = ?",
            path = path
        );
        sqlx::query(&sql)
            .bind(delta)
            .bind(now)
            .bind(id)
            .execute(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error(&format!("failed to adjust counter {}", field), e))?;
        Ok(())
    }

    async fn set_counter_tx(
        &self,
        tx: &mut StorageTransaction,
        id: i64,
        field: &str,
        value: i64,
    ) -> AppResult<()> {
        let path = Self::counter_path(field);
        let now = current_time_millis();
        let sql = format!(
            "UPDATE entities SET data = json_set(data, '{path}', ?), time_updated = ? WHERE id = ?",
            path = path
        );
        sqlx::query(&sql)
            .bind(value)
            .bind(now)
            .bind(id)
            .execute(&mut **tx.inner())
            .await
            .map_err(|e| map_sqlx_error(&format!("failed to set counter {}", field), e))?;
        Ok(())
    }
}
