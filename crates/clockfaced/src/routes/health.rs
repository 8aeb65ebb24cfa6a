use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Liveness, plus whether the face model is loaded yet.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "clockfaced",
        "version": env!("CARGO_PKG_VERSION"),
        "models_loaded": state.faces.is_ready(),
        "match_threshold": state.faces.threshold(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
