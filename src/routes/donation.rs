use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    dto::payment_dto::{CheckoutRequest, CheckoutResponse, DonationStatusResponse},
    error::Result,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/donations/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Invalid donation details"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
#[axum::debug_handler]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse> {
    let response = state.checkout.checkout(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/donations/{id}/status",
    params(("id" = Uuid, Path, description = "Donation record ID")),
    responses(
        (status = 200, description = "Current donation status", body = DonationStatusResponse),
        (status = 404, description = "Donation not found")
    )
)]
#[axum::debug_handler]
pub async fn donation_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DonationStatusResponse>> {
    Ok(Json(state.checkout.status(id).await?))
}
