use crate::error::ApiResult;
use crate::routes::UploadForm;
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use clockface_core::MatchResult;
use serde_json::{json, Value};

/// Enroll (or re-enroll) the face in the uploaded `image` for an employee.
pub async fn enroll(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let image = UploadForm::read(multipart).await?.require_image()?;
    let embedding = state.faces.enroll(&id, image).await?;
    Ok(Json(json!({
        "message": "face registered",
        "employee_id": id,
        "dimensions": embedding.dim(),
    })))
}

/// Identify the uploaded face. A miss is a normal result, not an error.
pub async fn identify(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<MatchResult>> {
    let image = UploadForm::read(multipart).await?.require_image()?;
    Ok(Json(state.faces.identify(image).await?))
}
