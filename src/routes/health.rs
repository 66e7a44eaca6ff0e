use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub database: String,
    pub bio_service: String,
    pub roster_service: String,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    // Check all services in parallel
    let (db_ok, bio_result, roster_result) = tokio::join!(
        crate::db::health_check(&state.db),
        state.bio.health_check(),
        state.roster.health_check(),
    );

    let db_status = if db_ok { "ok" } else { "error" };
    let bio_status = if bio_result.is_ok() { "ok" } else { "error" };
    let roster_status = if roster_result.is_ok() { "ok" } else { "error" };

    // Determine overall status
    let status = if db_ok && bio_result.is_ok() && roster_result.is_ok() {
        "healthy"
    } else if db_ok {
        // DB is critical, the collaborators only degrade the batch importer
        "degraded"
    } else {
        "unhealthy"
    };

    // Return 503 if unhealthy (critical service down)
    let status_code = if status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                database: db_status.to_string(),
                bio_service: bio_status.to_string(),
                roster_service: roster_status.to_string(),
            },
        }),
    )
}
