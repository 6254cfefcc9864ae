use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::Value;

use hirehub_core::document::Document;
use hirehub_core::filter::CandidateFilter;
use hirehub_core::types::{AttendanceRecord, Candidate, Requirement, Settings};

use crate::mutation::{CheckInRequest, CheckOutRequest, ReviewRequest};
use crate::problem::ProblemResponse;
use crate::router::AppState;

type ApiResult<T> = Result<T, ProblemResponse>;

pub async fn list<T: Document>(State(state): State<AppState>) -> ApiResult<Json<Vec<T>>> {
    let documents = state.storage().collection::<T>().list().await?;
    Ok(Json(documents))
}

pub async fn get_one<T: Document>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<T>> {
    let document = state.storage().collection::<T>().get(&id).await?;
    Ok(Json(document))
}

pub async fn create<T: Document>(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<T>)> {
    let Json(body) = body?;
    let document = state.mutations().create::<T>(body).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn update<T: Document>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    patch: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<T>> {
    let Json(patch) = patch?;
    let document = state.mutations().update::<T>(&id, patch).await?;
    Ok(Json(document))
}

pub async fn remove<T: Document>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.mutations().delete::<T>(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Candidate table: filters and sort order come from the query string.
pub async fn list_candidates(
    State(state): State<AppState>,
    filter: Result<Query<CandidateFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<Candidate>>> {
    let Query(filter) = filter?;
    let candidates = state.storage().candidates().list().await?;
    Ok(Json(filter.apply(candidates)))
}

pub async fn review_requirement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<Json<Requirement>> {
    let Json(request) = request?;
    let requirement = state.mutations().review_requirement(&id, request).await?;
    Ok(Json(requirement))
}

pub async fn check_in(
    State(state): State<AppState>,
    request: Result<Json<CheckInRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AttendanceRecord>)> {
    let Json(request) = request?;
    let record = state.mutations().check_in(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn check_out(
    State(state): State<AppState>,
    request: Result<Json<CheckOutRequest>, JsonRejection>,
) -> ApiResult<Json<AttendanceRecord>> {
    let Json(request) = request?;
    let record = state.mutations().check_out(request).await?;
    Ok(Json(record))
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    let settings = state.storage().settings().load().await?;
    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    patch: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Settings>> {
    let Json(patch) = patch?;
    let settings = state.mutations().update_settings(patch).await?;
    Ok(Json(settings))
}
