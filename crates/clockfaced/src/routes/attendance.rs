use crate::error::{ApiError, ApiResult};
use crate::routes::UploadForm;
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use clockface_core::MatchResult;
use clockface_store::time_fmt::format_hhmm;
use clockface_store::{
    Attendance, AttendanceEntry, AttendanceFilter, AttendanceUpdate, AuthMethod, Employee, Registration,
};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub message: String,
    pub attendance: Attendance,
}

pub async fn list(
    State(state): State<AppState>,
    filter: Result<Query<AttendanceFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<AttendanceEntry>>> {
    let Query(filter) = filter.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.store.list_attendance(filter).await?))
}

/// Terminal clock-in / clock-out.
///
/// The employee is taken from `employee_code`, else `employee_id`, else, for
/// `auth_method=face`, from the uploaded image.
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<RegistrationResponse>)> {
    let mut form = UploadForm::read(multipart).await?;
    let auth_method = match form.field("auth_method") {
        Some(text) => text.parse::<AuthMethod>()?,
        None => AuthMethod::default(),
    };
    let employee = resolve_employee(&state, &mut form, auth_method).await?;
    let observations = form.field("observations").map(str::to_string);

    let registration = state
        .store
        .register_attendance(&employee.id, auth_method, observations, state.now())
        .await?;

    let (status, body) = match registration {
        Registration::CheckIn(attendance) => (
            StatusCode::CREATED,
            RegistrationResponse {
                message: format!(
                    "Good morning {}! Check-in recorded at {}.",
                    employee.name,
                    format_hhmm(&attendance.check_in)
                ),
                attendance,
            },
        ),
        Registration::CheckOut(attendance) => (
            StatusCode::OK,
            RegistrationResponse {
                message: format!(
                    "See you tomorrow {}! Check-out recorded at {}.",
                    employee.name,
                    attendance
                        .check_out
                        .as_ref()
                        .map(format_hhmm)
                        .unwrap_or_default()
                ),
                attendance,
            },
        ),
    };
    Ok((status, Json(body)))
}

async fn resolve_employee(
    state: &AppState,
    form: &mut UploadForm,
    auth_method: AuthMethod,
) -> ApiResult<Employee> {
    if let Some(code) = form.field("employee_code") {
        return state
            .store
            .employee_by_code(code)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("employee with code {code}")));
    }
    if let Some(id) = form.field("employee_id") {
        return state
            .store
            .employee(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("employee {id}")));
    }
    if auth_method != AuthMethod::Face {
        return Err(ApiError::BadRequest(
            "employee_id or employee_code is required".into(),
        ));
    }

    let image = form.require_image()?;
    let employee_id = match state.faces.identify(image).await? {
        MatchResult::Identified { employee_id, .. } => employee_id,
        MatchResult::NoMatch => return Err(ApiError::NoFaceMatch),
    };
    state
        .store
        .employee(&employee_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("employee {employee_id}")))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AttendanceUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(update) = payload?;
    let attendance = state.store.update_attendance(&id, update).await?;
    Ok(Json(json!({
        "message": "attendance record updated",
        "attendance": attendance,
    })))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.store.delete_attendance(&id).await?;
    Ok(Json(json!({ "message": "attendance record deleted", "id": id })))
}
