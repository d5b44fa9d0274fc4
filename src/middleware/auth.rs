use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;

pub const ADMIN_ROLES: [&str; 2] = ["admin", "editor"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

fn bearer_token(req: &Request) -> Result<&str, Response> {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Err(reject(StatusCode::UNAUTHORIZED, "missing_authorization"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(reject(StatusCode::UNAUTHORIZED, "bad_authorization"));
    };
    auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "unsupported_scheme"))
}

pub fn decode_claims(token: &str, secret: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .ok()
    .map(|data| data.claims)
}

/// Admin and editor tokens only. The verified claims are inserted as a
/// request extension so handlers can record `sub` as the actor.
pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = match bearer_token(&req) {
        Ok(token) => decode_claims(token, &state.config.jwt_secret),
        Err(rejection) => return rejection,
    };
    let Some(claims) = claims else {
        return reject(StatusCode::UNAUTHORIZED, "invalid_token");
    };

    let role = claims.role.clone().unwrap_or_default();
    if !ADMIN_ROLES.iter().any(|r| r.eq_ignore_ascii_case(&role)) {
        tracing::warn!(sub = %claims.sub, role = %role, "Rejected admin request");
        return reject(StatusCode::FORBIDDEN, "forbidden");
    }
    req.extensions_mut().insert(claims);
    next.run(req).await
}
