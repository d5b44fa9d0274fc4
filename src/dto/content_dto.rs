use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::content_item::{ContentItem, Revision};
use crate::services::publication_service::{ContentWithRevisions, DraftInput, SweepReport};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateContentRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(length(min = 1, max = 300))]
    pub slug: Option<String>,
    pub summary: Option<String>,
    #[validate(length(min = 1))]
    pub body: String,
    pub author: Option<String>,
}

impl From<CreateContentRequest> for DraftInput {
    fn from(req: CreateContentRequest) -> Self {
        Self {
            title: req.title,
            slug: req.slug,
            summary: req.summary,
            body: req.body,
            author: req.author,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleRequest {
    /// RFC 3339 instant; must be in the future.
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentDetailResponse {
    #[serde(flatten)]
    pub item: ContentItem,
    pub revisions: Vec<Revision>,
}

impl From<ContentWithRevisions> for ContentDetailResponse {
    fn from(value: ContentWithRevisions) -> Self {
        Self {
            item: value.item,
            revisions: value.revisions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NextScheduledResponse {
    pub item: Option<ContentItem>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PublishedQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunReportResponse {
    pub candidates: usize,
    pub published: Vec<uuid::Uuid>,
    pub skipped: Vec<uuid::Uuid>,
    pub failed: usize,
}

impl From<SweepReport> for RunReportResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            candidates: report.candidates,
            published: report.published,
            skipped: report.skipped,
            failed: report.failed.len(),
        }
    }
}
