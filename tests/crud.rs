mod common;

use serde_json::json;
use std::sync::Arc;

use common::*;
use hub_database::app_state::AppState;
use hub_database::entities::EntityKind;
use hub_database::error::AppError;
use hub_database::services::{AssocKind, EngagementType, SubjectKind};
use hub_database::storage::{SqliteStorage, StorageInterface};

#[tokio::test]
async fn create_assigns_id_defaults_and_zeroed_counters() {
    let state = test_state().await;
    let created = state
        .entities
        .create(EntityKind::Project, json!({ "name": "alpha" }))
        .await
        .unwrap();

    assert!(created.id > 0);
    assert_eq!(created.data.get("id").unwrap().as_i64(), Some(created.id));
    assert!(created.data.get("createdAt").unwrap().is_string());
    for counter in EntityKind::Project.counter_fields() {
        assert_eq!(created.data.get(*counter).unwrap().as_i64(), Some(0));
    }
}

#[tokio::test]
async fn create_rejects_payload_with_id_or_missing_required_fields() {
    let state = test_state().await;

    let err = state
        .entities
        .create(EntityKind::Project, json!({ "id": 1, "name": "alpha" }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = state
        .entities
        .create(EntityKind::Project, json!({ "description": "nameless" }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = state
        .entities
        .create(EntityKind::Comment, json!({ "content": "orphan" }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // comment against a project that does not exist
    let err = state
        .entities
        .create(
            EntityKind::Comment,
            json!({ "content": "x", "projectId": 424242 }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn update_replaces_fields_but_preserves_counters() {
    let state = test_state().await;
    let project = create_project(&state, "before").await;
    let user = create_user(&state, "u1").await;
    state
        .engagements
        .engage(SubjectKind::Project, project, user, EngagementType::Like)
        .await
        .unwrap();

    let updated = state
        .entities
        .update(
            EntityKind::Project,
            project,
            // the payload lies about the counter; the stored value wins
            json!({ "id": project, "name": "after", "totalLikes": 999 }),
        )
        .await
        .unwrap();

    assert_eq!(updated.data.get("name").unwrap().as_str(), Some("after"));
    assert_eq!(updated.data.get("totalLikes").unwrap().as_i64(), Some(1));
}

#[tokio::test]
async fn update_fails_on_conflicting_or_missing_target() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;

    let err = state
        .entities
        .update(
            EntityKind::Project,
            project,
            json!({ "id": project + 1, "name": "x" }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConflictingIdentifier(_)));

    let err = state
        .entities
        .update(EntityKind::Project, 424242, json!({ "name": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn partial_update_overwrites_only_present_fields() {
    let state = test_state().await;
    let project = create(
        &state,
        EntityKind::Project,
        json!({ "name": "alpha", "description": "original", "status": "DRAFT" }),
    )
    .await;

    let patched = state
        .entities
        .partial_update(
            EntityKind::Project,
            project,
            json!({ "status": "ACTIVE", "totalLikes": 50 }),
        )
        .await
        .unwrap();

    assert_eq!(patched.data.get("status").unwrap().as_str(), Some("ACTIVE"));
    // untouched fields survive; counters are never patched
    assert_eq!(patched.data.get("name").unwrap().as_str(), Some("alpha"));
    assert_eq!(
        patched.data.get("description").unwrap().as_str(),
        Some("original")
    );
    assert_eq!(patched.data.get("totalLikes").unwrap().as_i64(), Some(0));

    // an explicit null clears the field
    let patched = state
        .entities
        .partial_update(EntityKind::Project, project, json!({ "description": null }))
        .await
        .unwrap();
    assert!(patched.data.get("description").unwrap().is_null());

    let err = state
        .entities
        .partial_update(EntityKind::Project, 424242, json!({ "name": "x" }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delete_is_gone_on_the_second_attempt() {
    let state = test_state().await;
    let tag = create_tag(&state, "t").await;

    state.entities.delete(EntityKind::Tag, tag).await.unwrap();
    let err = state
        .entities
        .delete(EntityKind::Tag, tag)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delete_cascades_links_and_engagements() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    let tag = create_tag(&state, "t").await;
    let user = create_user(&state, "u1").await;

    state
        .relationships
        .add(AssocKind::ProjectTags, project, tag)
        .await
        .unwrap();
    state
        .engagements
        .engage(SubjectKind::Project, project, user, EngagementType::Like)
        .await
        .unwrap();

    state
        .entities
        .delete(EntityKind::Project, project)
        .await
        .unwrap();

    // no orphaned half-link remains on the surviving side
    assert!(state
        .relationships
        .members_of(AssocKind::TagProjects, tag)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        state
            .storage
            .count_engagements(project, "LIKE")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn deleting_a_user_releases_their_engagement_counters() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    let team = create_team(&state, "t").await;
    let fan = create_user(&state, "fan").await;
    let keeper = create_user(&state, "keeper").await;

    state
        .engagements
        .engage(SubjectKind::Project, project, fan, EngagementType::Like)
        .await
        .unwrap();
    state
        .engagements
        .engage(SubjectKind::Project, project, fan, EngagementType::Favorite)
        .await
        .unwrap();
    state
        .engagements
        .engage(SubjectKind::Team, team, fan, EngagementType::Like)
        .await
        .unwrap();
    state
        .engagements
        .engage(SubjectKind::Project, project, keeper, EngagementType::Like)
        .await
        .unwrap();

    state
        .entities
        .delete(EntityKind::UserProfile, fan)
        .await
        .unwrap();

    // no ghost rows survive and every subject counter drops with them
    assert_eq!(
        state.storage.count_engagements(project, "LIKE").await.unwrap(),
        1
    );
    assert_eq!(
        state
            .storage
            .count_engagements(project, "FAVORITE")
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        1
    );
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalFavorites").await,
        0
    );
    assert_eq!(
        counter_of(&state, EntityKind::Team, team, "totalLikes").await,
        0
    );

    // reconcile finds the same truth: the deleted user left nothing behind
    state
        .engagements
        .reconcile_counters(SubjectKind::Project, project)
        .await
        .unwrap();
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        1
    );
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalFavorites").await,
        0
    );
}

#[tokio::test]
async fn deleting_a_project_removes_its_comments() {
    let state = test_state().await;
    let doomed = create_project(&state, "doomed").await;
    let kept = create_project(&state, "kept").await;
    let orphan = create_comment(&state, doomed, "going away").await;
    let survivor = create_comment(&state, kept, "staying").await;

    state
        .entities
        .delete(EntityKind::Project, doomed)
        .await
        .unwrap();

    let err = state
        .entities
        .find(EntityKind::Comment, orphan)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    // the other project's comment is untouched
    assert!(state
        .entities
        .find(EntityKind::Comment, survivor)
        .await
        .is_ok());
    assert_eq!(
        counter_of(&state, EntityKind::Project, kept, "totalComments").await,
        1
    );
}

#[tokio::test]
async fn file_backed_storage_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hub.db");
    let url = format!("sqlite://{}", path.display());

    let storage = Arc::new(SqliteStorage::open(&url).await.unwrap());
    let state = AppState::with_storage(storage);
    let tag = create_tag(&state, "persisted").await;
    let fetched = state.entities.find(EntityKind::Tag, tag).await.unwrap();
    assert_eq!(fetched.data.get("name").unwrap().as_str(), Some("persisted"));
}
