use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::content_dto::{
        ContentDetailResponse, CreateContentRequest, NextScheduledResponse, PublishedQuery,
        ScheduleRequest,
    },
    error::Result,
    middleware::auth::Claims,
    models::content_item::ContentItem,
    AppState,
};

const DEFAULT_PUBLISHED_LIMIT: i64 = 20;
const MAX_PUBLISHED_LIMIT: i64 = 100;

#[utoipa::path(
    post,
    path = "/api/admin/content",
    request_body = CreateContentRequest,
    responses(
        (status = 201, description = "Draft created", body = ContentItem),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Slug already taken")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn create_content(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateContentRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let item = state
        .publication
        .create_draft(payload.into(), &claims.sub)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(
    get,
    path = "/api/admin/content/{id}",
    params(("id" = Uuid, Path, description = "Content item ID")),
    responses(
        (status = 200, description = "Item with its revision log", body = ContentDetailResponse),
        (status = 404, description = "Item not found")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContentDetailResponse>> {
    let detail = state.publication.get(id).await?;
    Ok(Json(detail.into()))
}

#[utoipa::path(
    post,
    path = "/api/admin/content/{id}/schedule",
    params(("id" = Uuid, Path, description = "Content item ID")),
    request_body = ScheduleRequest,
    responses(
        (status = 200, description = "Item scheduled", body = ContentItem),
        (status = 400, description = "Scheduled time is not in the future"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Item cannot be scheduled from its current status")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn schedule_content(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScheduleRequest>,
) -> Result<Json<ContentItem>> {
    let item = state
        .publication
        .schedule_item(id, payload.scheduled_for, &claims.sub)
        .await?;
    Ok(Json(item))
}

#[utoipa::path(
    post,
    path = "/api/admin/content/{id}/cancel-schedule",
    params(("id" = Uuid, Path, description = "Content item ID")),
    responses(
        (status = 200, description = "Item returned to draft", body = ContentItem),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Item is not scheduled")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn cancel_schedule(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContentItem>> {
    let item = state.publication.cancel_schedule(id, &claims.sub).await?;
    Ok(Json(item))
}

#[utoipa::path(
    get,
    path = "/api/admin/content/scheduled",
    responses((status = 200, description = "Scheduled items, earliest first", body = [ContentItem])),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn list_scheduled(State(state): State<AppState>) -> Result<Json<Vec<ContentItem>>> {
    Ok(Json(state.publication.list_scheduled().await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/content/scheduled/next",
    responses((status = 200, description = "Next item due for publication", body = NextScheduledResponse)),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn next_scheduled(State(state): State<AppState>) -> Result<Json<NextScheduledResponse>> {
    let item = state.publication.get_next().await?;
    Ok(Json(NextScheduledResponse { item }))
}

#[utoipa::path(
    get,
    path = "/api/public/content",
    params(PublishedQuery),
    responses((status = 200, description = "Published items, newest first", body = [ContentItem]))
)]
#[axum::debug_handler]
pub async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<PublishedQuery>,
) -> Result<Json<Vec<ContentItem>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PUBLISHED_LIMIT)
        .clamp(1, MAX_PUBLISHED_LIMIT);
    Ok(Json(state.publication.list_published(limit).await?))
}
