use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Restricted to the frontend origin when one is configured.
pub fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    match frontend_url.map(|url| url.trim_end_matches('/')) {
        Some(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => base.allow_origin(value),
            Err(_) => {
                tracing::warn!(origin, "FRONTEND_URL is not a valid origin, allowing any");
                base.allow_origin(Any)
            }
        },
        None => base.allow_origin(Any),
    }
}
