use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Archived,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Scheduled => "scheduled",
            ContentStatus::Published => "published",
            ContentStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "scheduled" => Ok(ContentStatus::Scheduled),
            "published" => Ok(ContentStatus::Published),
            "archived" => Ok(ContentStatus::Archived),
            other => Err(format!("unknown content status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentItem {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub body: String,
    pub author: Option<String>,
    pub status: ContentStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn is_publicly_visible(&self) -> bool {
        self.status == ContentStatus::Published && self.is_active
    }
}

/// One entry of an item's append-only revision log.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Revision {
    pub id: Uuid,
    pub content_id: Uuid,
    pub revised_at: DateTime<Utc>,
    pub actor: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub body: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRevision {
    pub revised_at: DateTime<Utc>,
    pub actor: String,
    pub description: String,
}

/// Field updates applied together with a guarded status change.
/// `scheduled_for: Some(None)` clears the column, `None` leaves it alone.
#[derive(Debug, Clone)]
pub struct ContentTransition {
    pub allowed_from: Vec<ContentStatus>,
    pub to: ContentStatus,
    pub scheduled_for: Option<Option<DateTime<Utc>>>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub revision: NewRevision,
}
