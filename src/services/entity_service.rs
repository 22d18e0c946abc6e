// Generic entity CRUD over the arena store. Counter fields are derived
// state: create zeroes them, update and partial update carry them over
// from the stored entity, and only the aggregation paths move them.

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

use crate::core::id_generator::IdGenerator;
use crate::entities::{registry, EntityKind};
use crate::error::{AppError, AppResult};
use crate::services::engagements::EngagementType;
use crate::services::retry_transient;
use crate::storage::{StorageInterface, StoredEntity};

pub struct EntityService {
    storage: Arc<dyn StorageInterface>,
    ids: Arc<IdGenerator>,
}

impl EntityService {
    pub fn new(storage: Arc<dyn StorageInterface>, ids: Arc<IdGenerator>) -> Self {
        Self { storage, ids }
    }

    pub async fn find(&self, kind: EntityKind, id: i64) -> AppResult<StoredEntity> {
        self.storage
            .fetch_entity(kind, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind.as_str(), id)))
    }

    /// Create a new entity. Not retried internally: a transient failure
    /// after the commit would duplicate the row.
    pub async fn create(&self, kind: EntityKind, payload: JsonValue) -> AppResult<StoredEntity> {
        let mut data = as_object(kind, payload)?;
        if data.get("id").map(|v| !v.is_null()).unwrap_or(false) {
            return Err(AppError::Validation(format!(
                "a new {} cannot already have an id",
                kind.as_str()
            )));
        }
        require_fields(kind, &data)?;

        // Comments hang off a project; the project's comment counter moves
        // in the same unit of work as the comment row.
        let parent_project = match kind {
            EntityKind::Comment => Some(self.comment_project(&data).await?),
            _ => None,
        };

        let id = self.ids.next_id();
        data.insert("id".to_string(), json!(id));
        if registry().lookup(kind, "createdAt").is_ok()
            && data.get("createdAt").map(JsonValue::is_null).unwrap_or(true)
        {
            data.insert(
                "createdAt".to_string(),
                json!(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            );
        }
        for counter in kind.counter_fields() {
            data.insert(counter.to_string(), json!(0));
        }

        let data = JsonValue::Object(data);
        let mut tx = self.storage.begin_transaction().await?;
        self.storage.insert_entity_tx(&mut tx, id, kind, &data).await?;
        if let Some(project_id) = parent_project {
            self.storage
                .adjust_counter_tx(&mut tx, project_id, "totalComments", 1)
                .await?;
        }
        tx.commit().await?;

        info!("created {} {}", kind.as_str(), id);
        self.find(kind, id).await
    }

    /// Full replace. Counter fields are preserved from the stored entity
    /// regardless of what the payload claims.
    pub async fn update(
        &self,
        kind: EntityKind,
        id: i64,
        payload: JsonValue,
    ) -> AppResult<StoredEntity> {
        let mut data = as_object(kind, payload)?;
        if let Some(body_id) = data.get("id").and_then(JsonValue::as_i64) {
            if body_id != id {
                return Err(AppError::ConflictingIdentifier(format!(
                    "path id {} does not match body id {}",
                    id, body_id
                )));
            }
        }
        require_fields(kind, &data)?;

        let existing = self.find(kind, id).await?;
        data.insert("id".to_string(), json!(id));
        preserve_counters(kind, &mut data, &existing.data);

        self.storage
            .replace_entity(kind, id, &JsonValue::Object(data))
            .await?;
        self.find(kind, id).await
    }

    /// Merge-patch: only fields present in the patch are overwritten; an
    /// explicit null clears the field. Identifier and counters are never
    /// patched.
    pub async fn partial_update(
        &self,
        kind: EntityKind,
        id: i64,
        patch: JsonValue,
    ) -> AppResult<StoredEntity> {
        let patch = as_object(kind, patch)?;
        if let Some(body_id) = patch.get("id").and_then(JsonValue::as_i64) {
            if body_id != id {
                return Err(AppError::ConflictingIdentifier(format!(
                    "path id {} does not match body id {}",
                    id, body_id
                )));
            }
        }

        let existing = self.find(kind, id).await?;
        let mut data = match existing.data {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            if key == "id" || kind.counter_fields().contains(&key.as_str()) {
                continue;
            }
            data.insert(key, value);
        }

        self.storage
            .replace_entity(kind, id, &JsonValue::Object(data))
            .await?;
        self.find(kind, id).await
    }

    /// Delete the entity and everything hanging off it: link rows in both
    /// directions, engagement rows where it is the subject or the user, and
    /// (for projects) its comments. Deleting twice fails NotFound the second
    /// time.
    pub async fn delete(&self, kind: EntityKind, id: i64) -> AppResult<()> {
        retry_transient(|| self.try_delete(kind, id)).await
    }

    async fn try_delete(&self, kind: EntityKind, id: i64) -> AppResult<()> {
        let existing = self.find(kind, id).await?;

        let mut tx = self.storage.begin_transaction().await?;
        let removed = self.storage.remove_entity_tx(&mut tx, kind, id).await?;
        if !removed {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!(
                "{} {} not found",
                kind.as_str(),
                id
            )));
        }
        self.storage.delete_links_of_tx(&mut tx, id).await?;
        self.storage.delete_engagements_of_tx(&mut tx, id).await?;
        match kind {
            // The user's own engagements go too; each one releases its
            // subject's counter in the same transaction, so the rows never
            // outlive the user and reconcile stays truthful.
            EntityKind::UserProfile => {
                let released = self
                    .storage
                    .delete_user_engagements_tx(&mut tx, id)
                    .await?;
                for (subject_id, etype) in released {
                    if let Some(etype) = EngagementType::parse(&etype) {
                        self.storage
                            .adjust_counter_tx(&mut tx, subject_id, etype.counter_field(), -1)
                            .await?;
                    }
                }
            }
            // Comments cannot outlive their project
            EntityKind::Project => {
                self.storage.delete_comments_of_tx(&mut tx, id).await?;
            }
            EntityKind::Comment => {
                if let Some(project_id) =
                    existing.data.get("projectId").and_then(JsonValue::as_i64)
                {
                    // No-op when the project itself is already gone
                    self.storage
                        .adjust_counter_tx(&mut tx, project_id, "totalComments", -1)
                        .await?;
                }
            }
            _ => {}
        }
        tx.commit().await?;

        info!("deleted {} {}", kind.as_str(), id);
        Ok(())
    }

    async fn comment_project(&self, data: &Map<String, JsonValue>) -> AppResult<i64> {
        let project_id = data
            .get("projectId")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| {
                AppError::Validation("comment field 'projectId' must be an integer".to_string())
            })?;
        if !self
            .storage
            .entity_exists(EntityKind::Project, project_id)
            .await?
        {
            return Err(AppError::NotFound(format!(
                "project {} not found",
                project_id
            )));
        }
        Ok(project_id)
    }
}

fn as_object(kind: EntityKind, payload: JsonValue) -> AppResult<Map<String, JsonValue>> {
    match payload {
        JsonValue::Object(map) => Ok(map),
        _ => Err(AppError::Validation(format!(
            "{} payload must be a JSON object",
            kind.as_str()
        ))),
    }
}

fn require_fields(kind: EntityKind, data: &Map<String, JsonValue>) -> AppResult<()> {
    for field in kind.required_fields() {
        if data.get(*field).map(JsonValue::is_null).unwrap_or(true) {
            return Err(AppError::Validation(format!(
                "{} field '{}' is required",
                kind.as_str(),
                field
            )));
        }
    }
    Ok(())
}

fn preserve_counters(kind: EntityKind, data: &mut Map<String, JsonValue>, stored: &JsonValue) {
    for counter in kind.counter_fields() {
        let value = stored.get(*counter).cloned().unwrap_or(json!(0));
        data.insert(counter.to_string(), value);
    }
}
