mod common;

use common::*;
use hub_database::entities::EntityKind;
use hub_database::error::AppError;
use hub_database::services::{EngagementType, SubjectKind};
use hub_database::storage::StorageInterface;

#[tokio::test]
async fn engage_is_idempotent_and_moves_the_counter_once() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    let user = create_user(&state, "u1").await;
    let baseline = counter_of(&state, EntityKind::Project, project, "totalLikes").await;

    let first = state
        .engagements
        .engage(SubjectKind::Project, project, user, EngagementType::Like)
        .await
        .unwrap();
    let second = state
        .engagements
        .engage(SubjectKind::Project, project, user, EngagementType::Like)
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    // exactly one above baseline, not two
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        baseline + 1
    );
}

#[tokio::test]
async fn disengage_restores_the_pre_engage_counter() {
    let state = test_state().await;
    let team = create_team(&state, "t").await;
    let user = create_user(&state, "u1").await;

    state
        .engagements
        .engage(SubjectKind::Team, team, user, EngagementType::Favorite)
        .await
        .unwrap();
    assert_eq!(
        counter_of(&state, EntityKind::Team, team, "totalFavorites").await,
        1
    );

    let removed = state
        .engagements
        .disengage(SubjectKind::Team, team, user, EngagementType::Favorite)
        .await
        .unwrap();
    assert!(removed);
    assert_eq!(
        counter_of(&state, EntityKind::Team, team, "totalFavorites").await,
        0
    );

    // disengaging an absent tuple is a no-op
    let removed = state
        .engagements
        .disengage(SubjectKind::Team, team, user, EngagementType::Favorite)
        .await
        .unwrap();
    assert!(!removed);
    assert_eq!(
        counter_of(&state, EntityKind::Team, team, "totalFavorites").await,
        0
    );
}

#[tokio::test]
async fn engagement_types_drive_independent_counters() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    let user = create_user(&state, "u1").await;

    for etype in [
        EngagementType::Like,
        EngagementType::Share,
        EngagementType::View,
    ] {
        state
            .engagements
            .engage(SubjectKind::Project, project, user, etype)
            .await
            .unwrap();
    }

    assert_eq!(counter_of(&state, EntityKind::Project, project, "totalLikes").await, 1);
    assert_eq!(counter_of(&state, EntityKind::Project, project, "totalShares").await, 1);
    assert_eq!(counter_of(&state, EntityKind::Project, project, "totalViews").await, 1);
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalFavorites").await,
        0
    );
}

#[tokio::test]
async fn concurrent_engages_of_the_same_tuple_count_once() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    let user = create_user(&state, "u1").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            state
                .engagements
                .engage(SubjectKind::Project, project, user, EngagementType::Like)
                .await
        }));
    }
    let mut transitions = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            transitions += 1;
        }
    }

    assert_eq!(transitions, 1);
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        1
    );
}

#[tokio::test]
async fn distinct_users_each_count() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    for login in ["u1", "u2", "u3"] {
        let user = create_user(&state, login).await;
        state
            .engagements
            .engage(SubjectKind::Project, project, user, EngagementType::Like)
            .await
            .unwrap();
    }
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        3
    );
}

#[tokio::test]
async fn engage_fails_not_found_for_missing_subject_or_user() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    let user = create_user(&state, "u1").await;

    let err = state
        .engagements
        .engage(SubjectKind::Project, 424242, user, EngagementType::Like)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = state
        .engagements
        .engage(SubjectKind::Project, project, 424242, EngagementType::Like)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn reconcile_repairs_drift_and_is_a_fixed_point() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;
    for login in ["u1", "u2"] {
        let user = create_user(&state, login).await;
        state
            .engagements
            .engage(SubjectKind::Project, project, user, EngagementType::Like)
            .await
            .unwrap();
    }

    // simulate drift, e.g. a crash between the record write and the
    // counter write
    let mut tx = state.storage.begin_transaction().await.unwrap();
    state
        .storage
        .adjust_counter_tx(&mut tx, project, "totalLikes", 5)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        7
    );

    state
        .engagements
        .reconcile_counters(SubjectKind::Project, project)
        .await
        .unwrap();
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        2
    );

    // fixed point: running it again changes nothing
    state
        .engagements
        .reconcile_counters(SubjectKind::Project, project)
        .await
        .unwrap();
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalLikes").await,
        2
    );
}

#[tokio::test]
async fn comment_counter_follows_creation_and_deletion() {
    let state = test_state().await;
    let project = create_project(&state, "p").await;

    let first = create_comment(&state, project, "one").await;
    create_comment(&state, project, "two").await;
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalComments").await,
        2
    );

    state
        .entities
        .delete(EntityKind::Comment, first)
        .await
        .unwrap();
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalComments").await,
        1
    );

    // reconcile agrees with the live comment count
    state
        .engagements
        .reconcile_counters(SubjectKind::Project, project)
        .await
        .unwrap();
    assert_eq!(
        counter_of(&state, EntityKind::Project, project, "totalComments").await,
        1
    );
}
