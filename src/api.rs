// HTTP surface - thin controllers over the core. Every list endpoint and
// its /count twin run the same compiled expression; the controllers only
// parse, dispatch and map typed errors to status codes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value as JsonValue;

use crate::app_state::AppState;
use crate::core::{compile, parse_filter_params, Page};
use crate::entities::EntityKind;
use crate::error::{AppError, AppResult};
use crate::services::{AssocKind, EngagementType, SubjectKind};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/{kinds}",
            get(list_entities)
                .post(create_entity)
                .put(update_without_id)
                .patch(update_without_id),
        )
        .route("/api/{kinds}/count", get(count_entities))
        .route(
            "/api/{kinds}/{id}",
            get(get_entity)
                .put(update_entity)
                .patch(patch_entity)
                .delete(delete_entity),
        )
        .route(
            "/api/associations/{atype}/{owner}",
            get(list_members).put(replace_members),
        )
        .route(
            "/api/associations/{atype}/{owner}/{member}",
            post(add_member).delete(remove_member),
        )
        .route(
            "/api/engagements/{subjects}/{id}/reconcile",
            post(reconcile),
        )
        .route(
            "/api/engagements/{subjects}/{id}/{etype}/{user}",
            post(engage).delete(disengage),
        )
        .with_state(state)
}

fn parse_kind(segment: &str) -> AppResult<EntityKind> {
    EntityKind::from_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown entity collection '{}'", segment)))
}

fn parse_assoc(segment: &str) -> AppResult<AssocKind> {
    AssocKind::from_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown association '{}'", segment)))
}

fn parse_subject(segment: &str) -> AppResult<SubjectKind> {
    SubjectKind::from_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("'{}' cannot be engaged with", segment)))
}

fn parse_engagement(segment: &str) -> AppResult<EngagementType> {
    EngagementType::from_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("unknown engagement type '{}'", segment)))
}

async fn list_entities(
    State(state): State<AppState>,
    Path(kinds): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Response> {
    let kind = parse_kind(&kinds)?;
    let raw = parse_filter_params(&params)?;
    let expr = compile(kind, &raw)?;
    let page = Page::from_params(&params)?;

    let result = state.executor.list(kind, &expr, &page).await?;
    let items: Vec<JsonValue> = result.items.into_iter().map(|e| e.data).collect();

    let total = HeaderValue::from_str(&result.total.to_string())
        .map_err(|e| AppError::Internal(format!("invalid total-count header: {}", e)))?;
    let mut response = Json(items).into_response();
    response.headers_mut().insert("X-Total-Count", total);
    Ok(response)
}

async fn count_entities(
    State(state): State<AppState>,
    Path(kinds): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> AppResult<Json<u64>> {
    let kind = parse_kind(&kinds)?;
    let raw = parse_filter_params(&params)?;
    let expr = compile(kind, &raw)?;
    Ok(Json(state.executor.count(kind, &expr).await?))
}

async fn create_entity(
    State(state): State<AppState>,
    Path(kinds): Path<String>,
    Json(payload): Json<JsonValue>,
) -> AppResult<Response> {
    let kind = parse_kind(&kinds)?;
    let created = state.entities.create(kind, payload).await?;
    Ok((StatusCode::CREATED, Json(created.data)).into_response())
}

async fn get_entity(
    State(state): State<AppState>,
    Path((kinds, id)): Path<(String, i64)>,
) -> AppResult<Json<JsonValue>> {
    let kind = parse_kind(&kinds)?;
    Ok(Json(state.entities.find(kind, id).await?.data))
}

async fn update_entity(
    State(state): State<AppState>,
    Path((kinds, id)): Path<(String, i64)>,
    Json(payload): Json<JsonValue>,
) -> AppResult<Json<JsonValue>> {
    let kind = parse_kind(&kinds)?;
    Ok(Json(state.entities.update(kind, id, payload).await?.data))
}

async fn patch_entity(
    State(state): State<AppState>,
    Path((kinds, id)): Path<(String, i64)>,
    Json(payload): Json<JsonValue>,
) -> AppResult<Json<JsonValue>> {
    let kind = parse_kind(&kinds)?;
    Ok(Json(
        state.entities.partial_update(kind, id, payload).await?.data,
    ))
}

async fn delete_entity(
    State(state): State<AppState>,
    Path((kinds, id)): Path<(String, i64)>,
) -> AppResult<StatusCode> {
    let kind = parse_kind(&kinds)?;
    state.entities.delete(kind, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT/PATCH against the collection route has no target id.
async fn update_without_id(Path(kinds): Path<String>) -> AppResult<StatusCode> {
    parse_kind(&kinds)?;
    Err(AppError::MissingIdentifier(format!(
        "update of '{}' requires an id in the path",
        kinds
    )))
}

async fn list_members(
    State(state): State<AppState>,
    Path((atype, owner)): Path<(String, i64)>,
) -> AppResult<Json<Vec<i64>>> {
    let assoc = parse_assoc(&atype)?;
    Ok(Json(state.relationships.members_of(assoc, owner).await?))
}

async fn add_member(
    State(state): State<AppState>,
    Path((atype, owner, member)): Path<(String, i64, i64)>,
) -> AppResult<StatusCode> {
    let assoc = parse_assoc(&atype)?;
    state.relationships.add(assoc, owner, member).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_member(
    State(state): State<AppState>,
    Path((atype, owner, member)): Path<(String, i64, i64)>,
) -> AppResult<StatusCode> {
    let assoc = parse_assoc(&atype)?;
    state.relationships.remove(assoc, owner, member).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_members(
    State(state): State<AppState>,
    Path((atype, owner)): Path<(String, i64)>,
    Json(members): Json<Vec<i64>>,
) -> AppResult<StatusCode> {
    let assoc = parse_assoc(&atype)?;
    state.relationships.replace(assoc, owner, &members).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn engage(
    State(state): State<AppState>,
    Path((subjects, id, etype, user)): Path<(String, i64, String, i64)>,
) -> AppResult<StatusCode> {
    let subject = parse_subject(&subjects)?;
    let etype = parse_engagement(&etype)?;
    state.engagements.engage(subject, id, user, etype).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn disengage(
    State(state): State<AppState>,
    Path((subjects, id, etype, user)): Path<(String, i64, String, i64)>,
) -> AppResult<StatusCode> {
    let subject = parse_subject(&subjects)?;
    let etype = parse_engagement(&etype)?;
    state.engagements.disengage(subject, id, user, etype).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reconcile(
    State(state): State<AppState>,
    Path((subjects, id)): Path<(String, i64)>,
) -> AppResult<StatusCode> {
    let subject = parse_subject(&subjects)?;
    state.engagements.reconcile_counters(subject, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
