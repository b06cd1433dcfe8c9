//! Health check for load balancers and monitoring.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::{ok, ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub migrations_applied: usize,
    pub migrations_total: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<HealthStatus>>> {
    if !state.db.health_check().await {
        return Err(ApiError::Unavailable("database unreachable".to_string()));
    }
    let (total, applied) = state.db.migration_status().await?;

    Ok(ok(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        migrations_applied: applied,
        migrations_total: total,
    }))
}
