pub mod content;
pub mod donation;
pub mod health;
pub mod scheduler;
pub mod webhook;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{
    dto::{
        content_dto::{
            ContentDetailResponse, CreateContentRequest, NextScheduledResponse, RunReportResponse,
            ScheduleRequest,
        },
        payment_dto::{CheckoutRequest, CheckoutResponse, DonationStatusResponse, WebhookAck},
    },
    middleware::{
        auth::require_admin,
        cors::cors_layer,
        rate_limit::{rps_middleware, RateLimiter},
    },
    models::{
        content_item::{ContentItem, ContentStatus, Revision},
        payment_record::{DonationType, PaymentStatus},
    },
    services::scheduler_service::SchedulerStatus,
    AppState,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        content::create_content,
        content::get_content,
        content::schedule_content,
        content::cancel_schedule,
        content::list_scheduled,
        content::next_scheduled,
        content::list_published,
        donation::create_checkout,
        donation::donation_status,
        webhook::stripe_webhook,
        scheduler::scheduler_status,
        scheduler::run_scheduler,
    ),
    components(schemas(
        ContentItem,
        ContentStatus,
        Revision,
        CreateContentRequest,
        ScheduleRequest,
        ContentDetailResponse,
        NextScheduledResponse,
        RunReportResponse,
        SchedulerStatus,
        CheckoutRequest,
        CheckoutResponse,
        DonationStatusResponse,
        DonationType,
        PaymentStatus,
        WebhookAck,
    )),
    modifiers(&SecurityAddon),
    tags((name = "harmony-backend", description = "Content publication and donation reconciliation"))
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let public_api = Router::new()
        .route("/api/donations/checkout", post(donation::create_checkout))
        .route("/api/donations/:id/status", get(donation::donation_status))
        .route("/api/public/content", get(content::list_published))
        .layer(from_fn_with_state(
            RateLimiter::new(config.public_rps),
            rps_middleware,
        ));

    let admin_api = Router::new()
        .route("/api/admin/content", post(content::create_content))
        .route("/api/admin/content/scheduled", get(content::list_scheduled))
        .route(
            "/api/admin/content/scheduled/next",
            get(content::next_scheduled),
        )
        .route("/api/admin/content/:id", get(content::get_content))
        .route(
            "/api/admin/content/:id/schedule",
            post(content::schedule_content),
        )
        .route(
            "/api/admin/content/:id/cancel-schedule",
            post(content::cancel_schedule),
        )
        .route(
            "/api/admin/scheduler/status",
            get(scheduler::scheduler_status),
        )
        .route("/api/admin/scheduler/run", post(scheduler::run_scheduler))
        .layer(from_fn_with_state(state.clone(), require_admin))
        .layer(from_fn_with_state(
            RateLimiter::new(config.admin_rps),
            rps_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/donations/webhook", post(webhook::stripe_webhook))
        .route("/api/openapi.json", get(openapi_json))
        .merge(public_api)
        .merge(admin_api)
        .with_state(state)
        .layer(cors_layer(config.frontend_url.as_deref()))
        .layer(TraceLayer::new_for_http())
}
