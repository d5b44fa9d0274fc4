use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::content_item::{
    ContentItem, ContentStatus, ContentTransition, NewContentItem, NewRevision, Revision,
};
use crate::services::fanout::{self, FanOutReport, NotificationTask};
use crate::services::notification_service::ContentNotifier;
use crate::store::ContentStore;
use crate::utils::{slug::slugify, time};

pub const SCHEDULER_ACTOR: &str = "scheduler";
const AUTO_PUBLISH_NOTE: &str = "Auto-published by scheduler";

#[derive(Debug, Clone)]
pub struct DraftInput {
    pub title: String,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub body: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Published {
        item: ContentItem,
        notifications: Option<FanOutReport>,
    },
    /// Item was not `scheduled` anymore: another sweep got there first, or
    /// it was cancelled.
    AlreadyHandled,
}

#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub candidates: usize,
    pub published: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
    pub failed: Vec<(Uuid, String)>,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.candidates += other.candidates;
        self.published.extend(other.published);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

#[derive(Debug, Clone)]
pub struct ContentWithRevisions {
    pub item: ContentItem,
    pub revisions: Vec<Revision>,
}

/// Stateless processor over the content store: every call reads, applies one
/// guarded transition, and fans out notifications after the commit.
#[derive(Clone)]
pub struct PublicationService {
    store: Arc<dyn ContentStore>,
    notifier: Arc<dyn ContentNotifier>,
    timezone: Tz,
    notify_on_publish: bool,
}

impl PublicationService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        notifier: Arc<dyn ContentNotifier>,
        timezone: Tz,
        notify_on_publish: bool,
    ) -> Self {
        Self {
            store,
            notifier,
            timezone,
            notify_on_publish,
        }
    }

    pub async fn create_draft(&self, input: DraftInput, actor: &str) -> Result<ContentItem> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::BadRequest("title must not be empty".into()));
        }
        let slug = slugify(input.slug.as_deref().unwrap_or(&title));
        if slug.is_empty() {
            return Err(Error::BadRequest("slug must contain letters or digits".into()));
        }
        let item = self
            .store
            .create(
                NewContentItem {
                    title,
                    slug,
                    summary: input.summary,
                    body: input.body,
                    author: input.author,
                },
                NewRevision {
                    revised_at: time::now(),
                    actor: actor.to_string(),
                    description: "Created".into(),
                },
            )
            .await?;
        tracing::info!(content_id = %item.id, slug = %item.slug, "Content draft created");
        Ok(item)
    }

    pub async fn get(&self, id: Uuid) -> Result<ContentWithRevisions> {
        let item = self.require(id).await?;
        let revisions = self.store.revisions(id).await?;
        Ok(ContentWithRevisions { item, revisions })
    }

    /// Moves one `scheduled` item to `published`. Safe to call twice: the
    /// second call finds the guard closed and reports `AlreadyHandled`.
    pub async fn publish(&self, id: Uuid, now: DateTime<Utc>) -> Result<PublishOutcome> {
        let transition = ContentTransition {
            allowed_from: vec![ContentStatus::Scheduled],
            to: ContentStatus::Published,
            scheduled_for: None,
            published_at: Some(now),
            is_active: Some(true),
            revision: NewRevision {
                revised_at: now,
                actor: SCHEDULER_ACTOR.to_string(),
                description: AUTO_PUBLISH_NOTE.to_string(),
            },
        };

        let Some(item) = self.store.transition(id, transition).await? else {
            tracing::info!(content_id = %id, "Item no longer scheduled, skipping publish");
            return Ok(PublishOutcome::AlreadyHandled);
        };

        tracing::info!(
            content_id = %item.id,
            title = %item.title,
            scheduled_for = ?item.scheduled_for.map(|at| time::format_local(at, &self.timezone)),
            published_at = %time::format_local(now, &self.timezone),
            "Published scheduled item"
        );

        let notifications = if self.notify_on_publish {
            Some(self.fan_out_published(&item).await)
        } else {
            None
        };
        Ok(PublishOutcome::Published {
            item,
            notifications,
        })
    }

    async fn fan_out_published(&self, item: &ContentItem) -> FanOutReport {
        let notifier = &self.notifier;
        let tasks = vec![
            NotificationTask::new("subscribers_email", notifier.notify_all_subscribers(item)),
            NotificationTask::new("external_webhook", notifier.notify_external_webhook(item)),
        ];
        fanout::dispatch(&item.id.to_string(), tasks).await
    }

    /// Publishes every inactive item scheduled within the local day of `now`.
    pub async fn sweep_today(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let (start, end) = time::local_day_range(now, &self.timezone)?;
        tracing::info!(
            day = %now.with_timezone(&self.timezone).date_naive(),
            "Checking for items scheduled today"
        );
        let candidates = self.store.find_scheduled_between(start, end).await?;
        Ok(self.publish_all(candidates, now).await)
    }

    /// Publishes every inactive item whose scheduled time has passed,
    /// whichever day it was meant for.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.store.find_overdue(now).await?;
        if !candidates.is_empty() {
            tracing::warn!(count = candidates.len(), "Found overdue scheduled items");
        }
        Ok(self.publish_all(candidates, now).await)
    }

    /// One timer fire: today's slot, then the overdue recovery pass.
    pub async fn run_slot(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        match self.sweep_today(now).await {
            Ok(today) => report.merge(today),
            Err(e) => tracing::error!(error = ?e, "Scheduled sweep query failed"),
        }
        match self.sweep_overdue(now).await {
            Ok(overdue) => report.merge(overdue),
            Err(e) => tracing::error!(error = ?e, "Overdue sweep query failed"),
        }
        tracing::info!(
            candidates = report.candidates,
            published = report.published.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Publication sweep finished"
        );
        report
    }

    async fn publish_all(&self, candidates: Vec<ContentItem>, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let mut seen = HashSet::new();
        for item in candidates {
            if !seen.insert(item.id) {
                continue;
            }
            report.candidates += 1;
            match self.publish(item.id, now).await {
                Ok(PublishOutcome::Published { item, .. }) => report.published.push(item.id),
                Ok(PublishOutcome::AlreadyHandled) => report.skipped.push(item.id),
                Err(e) => {
                    tracing::error!(content_id = %item.id, error = ?e, "Failed to publish item");
                    report.failed.push((item.id, e.to_string()));
                }
            }
        }
        report
    }

    pub async fn schedule_item(
        &self,
        id: Uuid,
        when: DateTime<Utc>,
        actor: &str,
    ) -> Result<ContentItem> {
        self.schedule_item_at(id, when, actor, time::now()).await
    }

    /// `now` is the reference point for the must-be-in-the-future rule.
    pub async fn schedule_item_at(
        &self,
        id: Uuid,
        when: DateTime<Utc>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<ContentItem> {
        if when <= now {
            return Err(Error::BadRequest(
                "scheduled time must be in the future".into(),
            ));
        }
        let local = time::format_local(when, &self.timezone);
        let transition = ContentTransition {
            allowed_from: vec![ContentStatus::Draft, ContentStatus::Scheduled],
            to: ContentStatus::Scheduled,
            scheduled_for: Some(Some(when)),
            published_at: None,
            is_active: Some(false),
            revision: NewRevision {
                revised_at: now,
                actor: actor.to_string(),
                description: format!(
                    "Scheduled for publication on {} ({})",
                    local,
                    self.timezone.name()
                ),
            },
        };
        let item = self.apply(id, transition, "schedule").await?;
        tracing::info!(content_id = %item.id, scheduled_for = %local, "Item scheduled");
        Ok(item)
    }

    pub async fn cancel_schedule(&self, id: Uuid, actor: &str) -> Result<ContentItem> {
        let transition = ContentTransition {
            allowed_from: vec![ContentStatus::Scheduled],
            to: ContentStatus::Draft,
            scheduled_for: Some(None),
            published_at: None,
            is_active: None,
            revision: NewRevision {
                revised_at: time::now(),
                actor: actor.to_string(),
                description: "Scheduled publication cancelled".into(),
            },
        };
        let item = self.apply(id, transition, "cancel schedule of").await?;
        tracing::info!(content_id = %item.id, "Scheduled publication cancelled");
        Ok(item)
    }

    pub async fn list_scheduled(&self) -> Result<Vec<ContentItem>> {
        self.store.list_scheduled().await
    }

    pub async fn get_next(&self) -> Result<Option<ContentItem>> {
        self.store.next_scheduled(time::now()).await
    }

    pub async fn list_published(&self, limit: i64) -> Result<Vec<ContentItem>> {
        self.store.list_published(limit).await
    }

    async fn apply(&self, id: Uuid, transition: ContentTransition, verb: &str) -> Result<ContentItem> {
        let allowed = transition.allowed_from.clone();
        match self.store.transition(id, transition).await? {
            Some(item) => Ok(item),
            None => {
                let current = self.require(id).await?;
                Err(Error::Conflict(format!(
                    "cannot {} item in status {} (allowed: {})",
                    verb,
                    current.status,
                    allowed
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
        }
    }

    async fn require(&self, id: Uuid) -> Result<ContentItem> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("content item {} not found", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notification_service::MockContentNotifier;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn service(notifier: MockContentNotifier) -> (PublicationService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = PublicationService::new(
            store.clone(),
            Arc::new(notifier),
            chrono_tz::America::New_York,
            true,
        );
        (service, store)
    }

    fn draft(title: &str) -> DraftInput {
        DraftInput {
            title: title.into(),
            slug: None,
            summary: Some("summary".into()),
            body: "body".into(),
            author: Some("Ada".into()),
        }
    }

    #[tokio::test]
    async fn notifications_fire_once_per_applied_publish() {
        let mut notifier = MockContentNotifier::new();
        notifier
            .expect_notify_all_subscribers()
            .times(1)
            .returning(|_| Ok(()));
        notifier
            .expect_notify_external_webhook()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("relay unavailable")));
        let (service, _store) = service(notifier);

        let now = Utc::now();
        let item = service.create_draft(draft("Spring Concert"), "editor").await.unwrap();
        service
            .schedule_item_at(item.id, now + Duration::minutes(5), "editor", now)
            .await
            .unwrap();

        let later = now + Duration::minutes(10);
        let first = service.publish(item.id, later).await.unwrap();
        match first {
            PublishOutcome::Published { item, notifications } => {
                assert!(item.is_active);
                assert_eq!(item.published_at, Some(later));
                let report = notifications.unwrap();
                assert_eq!(report.delivered, vec!["subscribers_email"]);
                assert_eq!(report.failed, vec!["external_webhook"]);
            }
            other => panic!("expected publish, got {:?}", other),
        }

        let second = service.publish(item.id, later).await.unwrap();
        assert!(matches!(second, PublishOutcome::AlreadyHandled));
    }

    #[tokio::test]
    async fn schedule_rejects_past_time_and_published_items() {
        let (service, _store) = service(MockContentNotifier::new());
        let now = Utc::now();
        let item = service.create_draft(draft("Recital"), "editor").await.unwrap();

        let err = service
            .schedule_item_at(item.id, now - Duration::seconds(1), "editor", now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let err = service
            .schedule_item_at(Uuid::new_v4(), now + Duration::hours(1), "editor", now)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_requires_scheduled_status() {
        let (service, _store) = service(MockContentNotifier::new());
        let item = service.create_draft(draft("Workshop"), "editor").await.unwrap();
        let err = service.cancel_schedule(item.id, "editor").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn create_draft_derives_slug_and_records_revision() {
        let (service, _store) = service(MockContentNotifier::new());
        let item = service
            .create_draft(draft("  Music for All!  "), "editor")
            .await
            .unwrap();
        assert_eq!(item.slug, "music-for-all");
        assert_eq!(item.status, ContentStatus::Draft);
        assert!(!item.is_active);

        let loaded = service.get(item.id).await.unwrap();
        assert_eq!(loaded.revisions.len(), 1);
        assert_eq!(loaded.revisions[0].actor, "editor");
    }
}
