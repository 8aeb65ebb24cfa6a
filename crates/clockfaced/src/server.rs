//! Router assembly and the serve loop.

use crate::config::Config;
use crate::routes::{self, attendance, departments, employees, face, health, schedule};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the API router over `state`.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/api/health", get(health::health))
        // Employees
        .route("/api/employees", get(employees::list).post(employees::create))
        .route(
            "/api/employees/{id}",
            get(employees::get).put(employees::update).delete(employees::delete),
        )
        .route("/api/employees/code/{code}", get(employees::get_by_code))
        // Departments
        .route("/api/departments", get(departments::list).post(departments::create))
        .route(
            "/api/departments/{id}",
            get(departments::get)
                .put(departments::update)
                .delete(departments::delete),
        )
        // Faces
        .route("/api/employees/{id}/face", post(face::enroll))
        .route("/api/face/identify", post(face::identify))
        // Attendance
        .route("/api/attendance", get(attendance::list))
        .route("/api/attendance/register", post(attendance::register))
        .route(
            "/api/attendance/{id}",
            put(attendance::update).delete(attendance::delete),
        )
        // Work schedule
        .route(
            "/api/work-schedule",
            get(schedule::get_schedule).put(schedule::put_schedule),
        )
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState, config: &Config) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        timeout_secs = config.request_timeout_secs,
        max_upload_mb = config.max_upload_mb,
        "clockfaced listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
