use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use clockface_store::{Department, DepartmentInput};
use serde_json::{json, Value};

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Department>>> {
    Ok(Json(state.store.all_departments().await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Department>> {
    state
        .store
        .department(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("department {id}")))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<DepartmentInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Department>)> {
    let Json(input) = payload?;
    let department = state.store.create_department(input).await?;
    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DepartmentInput>, JsonRejection>,
) -> ApiResult<Json<Department>> {
    let Json(input) = payload?;
    Ok(Json(state.store.update_department(&id, input).await?))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.store.delete_department(&id).await?;
    Ok(Json(json!({ "message": "department deleted", "id": id })))
}
