use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use clockface_store::{Employee, EmployeeUpdate, NewEmployee};
use serde_json::{json, Value};

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Employee>>> {
    Ok(Json(state.store.all_employees().await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Employee>> {
    state
        .store
        .employee(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("employee {id}")))
}

pub async fn get_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Employee>> {
    state
        .store
        .employee_by_code(&code)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("employee with code {code}")))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewEmployee>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Employee>)> {
    let Json(new) = payload?;
    let employee = state.store.create_employee(new).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<EmployeeUpdate>, JsonRejection>,
) -> ApiResult<Json<Employee>> {
    let Json(update) = payload?;
    Ok(Json(state.store.update_employee(&id, update).await?))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.store.delete_employee(&id).await?;
    Ok(Json(json!({ "message": "employee deleted", "id": id })))
}
