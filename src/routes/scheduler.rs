use axum::{extract::State, Json};

use crate::{
    dto::content_dto::RunReportResponse, services::scheduler_service::SchedulerStatus, AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/scheduler/status",
    responses((status = 200, description = "Publication scheduler state", body = SchedulerStatus)),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

#[utoipa::path(
    post,
    path = "/api/admin/scheduler/run",
    responses((status = 200, description = "One publication slot run immediately", body = RunReportResponse)),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn run_scheduler(State(state): State<AppState>) -> Json<RunReportResponse> {
    Json(state.scheduler.run_now().await.into())
}
