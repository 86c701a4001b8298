use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument};

use super::MaintenanceReport;
use crate::{auth::AuthUser, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/maintenance/run", post(run_maintenance))
}

#[instrument(skip(state))]
pub async fn run_maintenance(
    State(state): State<AppState>,
    AuthUser(username): AuthUser,
) -> Result<Json<MaintenanceReport>, (StatusCode, String)> {
    info!(%username, "manual maintenance pass requested");
    let report = state.maintenance.perform_maintenance().await;
    Ok(Json(report))
}
