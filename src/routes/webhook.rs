use axum::{body::Bytes, extract::State, http::HeaderMap, Json};

use crate::{
    dto::payment_dto::WebhookAck,
    error::Result,
    utils::{signature::SIGNATURE_HEADER, time},
    AppState,
};

/// Provider webhook. The body is taken raw because the signature covers the
/// exact bytes sent.
#[utoipa::path(
    post,
    path = "/api/donations/webhook",
    request_body(content = String, description = "Raw provider event", content_type = "application/json"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Invalid signature or payload"),
        (status = 500, description = "Event could not be stored; the provider will retry")
    )
)]
#[axum::debug_handler]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let event = state
        .reconciler
        .verify(&body, signature, time::now().timestamp())
        .map_err(|e| {
            tracing::warn!(error = %e, "Rejected webhook delivery");
            e
        })?;

    state.reconciler.handle(&event).await?;
    Ok(Json(WebhookAck { received: true }))
}
