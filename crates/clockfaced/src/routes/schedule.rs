use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use clockface_store::{ScheduleUpdate, WorkSchedule};

pub async fn get_schedule(State(state): State<AppState>) -> ApiResult<Json<WorkSchedule>> {
    state
        .store
        .schedule()
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("work schedule".into()))
}

pub async fn put_schedule(
    State(state): State<AppState>,
    payload: Result<Json<ScheduleUpdate>, JsonRejection>,
) -> ApiResult<Json<WorkSchedule>> {
    let Json(update) = payload?;
    Ok(Json(state.store.upsert_schedule(update).await?))
}
