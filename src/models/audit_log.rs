use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// Trail of applied payment status transitions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub action: String,
    pub changes: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}
