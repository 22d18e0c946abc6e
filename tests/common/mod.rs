#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};

use hub_database::app_state::AppState;
use hub_database::core::{compile, parse_filter_params, FilterExpression};
use hub_database::entities::EntityKind;
use hub_database::storage::SqliteStorage;

pub async fn test_state() -> AppState {
    let storage = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
    AppState::with_storage(storage)
}

/// Compile a filter expression from `field.operator=value` pairs.
pub fn expr(kind: EntityKind, params: &[(&str, &str)]) -> FilterExpression {
    let pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let raw = parse_filter_params(&pairs).unwrap();
    compile(kind, &raw).unwrap()
}

pub async fn create_project(state: &AppState, name: &str) -> i64 {
    create(state, EntityKind::Project, json!({ "name": name })).await
}

pub async fn create_team(state: &AppState, name: &str) -> i64 {
    create(state, EntityKind::Team, json!({ "name": name })).await
}

pub async fn create_tag(state: &AppState, name: &str) -> i64 {
    create(state, EntityKind::Tag, json!({ "name": name })).await
}

pub async fn create_user(state: &AppState, login: &str) -> i64 {
    create(
        state,
        EntityKind::UserProfile,
        json!({ "login": login, "email": format!("{}@example.com", login) }),
    )
    .await
}

pub async fn create_comment(state: &AppState, project_id: i64, content: &str) -> i64 {
    create(
        state,
        EntityKind::Comment,
        json!({ "content": content, "projectId": project_id }),
    )
    .await
}

pub async fn create(state: &AppState, kind: EntityKind, payload: JsonValue) -> i64 {
    state.entities.create(kind, payload).await.unwrap().id
}

pub async fn counter_of(state: &AppState, kind: EntityKind, id: i64, field: &str) -> i64 {
    state
        .entities
        .find(kind, id)
        .await
        .unwrap()
        .data
        .get(field)
        .and_then(JsonValue::as_i64)
        .unwrap_or(0)
}
