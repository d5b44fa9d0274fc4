use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ContentStore, PaymentStore, ReceiptLedger, SubscriberDirectory};
use crate::error::{Error, Result};
use crate::models::{
    audit_log::AuditLog,
    content_item::{
        ContentItem, ContentStatus, ContentTransition, NewContentItem, NewRevision, Revision,
    },
    payment_record::{NewPaymentRecord, PaymentRecord, PaymentStatus, PaymentTransition},
    subscriber::Subscriber,
};
use crate::services::receipt_service::parse_sequence;

#[derive(Default)]
struct State {
    content: HashMap<Uuid, ContentItem>,
    revisions: HashMap<Uuid, Vec<Revision>>,
    payments: HashMap<Uuid, PaymentRecord>,
    audit: HashMap<Uuid, Vec<AuditLog>>,
    subscribers: Vec<Subscriber>,
}

/// Single-process store. Each operation runs under one lock, so guarded
/// transitions are atomic the same way the Postgres conditional update is.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_subscriber(&self, email: &str, name: Option<&str>, is_active: bool) {
        let mut state = self.state.lock().await;
        state.subscribers.push(Subscriber {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.map(str::to_string),
            is_active,
            subscribed_at: Utc::now(),
        });
    }

    /// Inserts an item exactly as given; used to seed fixtures.
    pub async fn insert_content(&self, item: ContentItem) {
        let mut state = self.state.lock().await;
        state.revisions.entry(item.id).or_default();
        state.content.insert(item.id, item);
    }
}

fn is_due_candidate(item: &ContentItem) -> bool {
    item.status == ContentStatus::Scheduled && !item.is_active
}

fn sorted_by_schedule(mut items: Vec<ContentItem>) -> Vec<ContentItem> {
    items.sort_by_key(|i| (i.scheduled_for, i.created_at));
    items
}

fn revision_row(content_id: Uuid, revision: NewRevision) -> Revision {
    Revision {
        id: Uuid::new_v4(),
        content_id,
        revised_at: revision.revised_at,
        actor: revision.actor,
        description: revision.description,
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create(&self, item: NewContentItem, revision: NewRevision) -> Result<ContentItem> {
        let mut state = self.state.lock().await;
        if state.content.values().any(|c| c.slug == item.slug) {
            return Err(Error::Conflict(format!("slug already exists: {}", item.slug)));
        }
        let now = revision.revised_at;
        let created = ContentItem {
            id: Uuid::new_v4(),
            title: item.title,
            slug: item.slug,
            summary: item.summary,
            body: item.body,
            author: item.author,
            status: ContentStatus::Draft,
            scheduled_for: None,
            published_at: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        state
            .revisions
            .entry(created.id)
            .or_default()
            .push(revision_row(created.id, revision));
        state.content.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>> {
        Ok(self.state.lock().await.content.get(&id).cloned())
    }

    async fn revisions(&self, id: Uuid) -> Result<Vec<Revision>> {
        Ok(self
            .state
            .lock()
            .await
            .revisions
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>> {
        let state = self.state.lock().await;
        let items = state
            .content
            .values()
            .filter(|i| is_due_candidate(i))
            .filter(|i| matches!(i.scheduled_for, Some(at) if at >= start && at <= end))
            .cloned()
            .collect();
        Ok(sorted_by_schedule(items))
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<ContentItem>> {
        let state = self.state.lock().await;
        let items = state
            .content
            .values()
            .filter(|i| is_due_candidate(i))
            .filter(|i| matches!(i.scheduled_for, Some(at) if at < now))
            .cloned()
            .collect();
        Ok(sorted_by_schedule(items))
    }

    async fn list_scheduled(&self) -> Result<Vec<ContentItem>> {
        let state = self.state.lock().await;
        let items = state
            .content
            .values()
            .filter(|i| i.status == ContentStatus::Scheduled)
            .cloned()
            .collect();
        Ok(sorted_by_schedule(items))
    }

    async fn next_scheduled(&self, after: DateTime<Utc>) -> Result<Option<ContentItem>> {
        let state = self.state.lock().await;
        Ok(state
            .content
            .values()
            .filter(|i| i.status == ContentStatus::Scheduled)
            .filter(|i| matches!(i.scheduled_for, Some(at) if at > after))
            .min_by_key(|i| i.scheduled_for)
            .cloned())
    }

    async fn list_published(&self, limit: i64) -> Result<Vec<ContentItem>> {
        let state = self.state.lock().await;
        let mut items: Vec<ContentItem> = state
            .content
            .values()
            .filter(|i| i.is_publicly_visible())
            .cloned()
            .collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: ContentTransition,
    ) -> Result<Option<ContentItem>> {
        let mut state = self.state.lock().await;
        let Some(item) = state.content.get_mut(&id) else {
            return Ok(None);
        };
        if !transition.allowed_from.contains(&item.status) {
            return Ok(None);
        }
        item.status = transition.to;
        if let Some(scheduled_for) = transition.scheduled_for {
            item.scheduled_for = scheduled_for;
        }
        if let Some(published_at) = transition.published_at {
            item.published_at = Some(published_at);
        }
        if let Some(is_active) = transition.is_active {
            item.is_active = is_active;
        }
        item.updated_at = transition.revision.revised_at;
        let updated = item.clone();
        state
            .revisions
            .entry(id)
            .or_default()
            .push(revision_row(id, transition.revision));
        Ok(Some(updated))
    }
}

#[async_trait]
impl ReceiptLedger for MemoryStore {
    async fn last_receipt_number(&self, prefix: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .filter_map(|p| parse_sequence(prefix, &p.receipt_number).map(|seq| (seq, p)))
            .max_by_key(|(seq, _)| *seq)
            .map(|(_, p)| p.receipt_number.clone()))
    }

    async fn receipt_exists(&self, receipt_number: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .any(|p| p.receipt_number == receipt_number))
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecord> {
        let mut state = self.state.lock().await;
        if state
            .payments
            .values()
            .any(|p| p.receipt_number == record.receipt_number)
        {
            return Err(Error::Conflict(format!(
                "receipt number already issued: {}",
                record.receipt_number
            )));
        }
        let now = Utc::now();
        let created = PaymentRecord {
            id: Uuid::new_v4(),
            donor_name: record.donor_name,
            email: record.email,
            phone: record.phone,
            amount: record.amount,
            currency: record.currency,
            donation_type: record.donation_type,
            designation: record.designation,
            is_anonymous: record.is_anonymous,
            message: record.message,
            status: PaymentStatus::Pending,
            external_transaction_ref: None,
            checkout_session_id: None,
            receipt_number: record.receipt_number,
            submitted_at: now,
            updated_at: now,
        };
        state.payments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentRecord>> {
        Ok(self.state.lock().await.payments.get(&id).cloned())
    }

    async fn find_by_transaction_ref(&self, reference: &str) -> Result<Option<PaymentRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.external_transaction_ref.as_deref() == Some(reference))
            .cloned())
    }

    async fn attach_checkout_session(
        &self,
        id: Uuid,
        session_id: &str,
        external_transaction_ref: Option<&str>,
    ) -> Result<Option<PaymentRecord>> {
        let mut state = self.state.lock().await;
        let Some(record) = state.payments.get_mut(&id) else {
            return Ok(None);
        };
        record.checkout_session_id = Some(session_id.to_string());
        if let Some(reference) = external_transaction_ref {
            record.external_transaction_ref = Some(reference.to_string());
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: PaymentTransition,
    ) -> Result<Option<PaymentRecord>> {
        let mut state = self.state.lock().await;
        let Some(record) = state.payments.get_mut(&id) else {
            return Ok(None);
        };
        if !transition.allowed_from.contains(&record.status) {
            return Ok(None);
        }
        let from = record.status;
        record.status = transition.to;
        if let Some(reference) = transition.external_transaction_ref {
            record.external_transaction_ref = Some(reference);
        }
        record.updated_at = Utc::now();
        let updated = record.clone();
        state.audit.entry(id).or_default().push(AuditLog {
            id: Uuid::new_v4(),
            entity_id: id,
            action: format!("status:{}->{}", from, transition.to),
            changes: Some(json!({
                "event_id": transition.event_id,
                "event_type": transition.event_type,
            })),
            created_at: updated.updated_at,
        });
        Ok(Some(updated))
    }

    async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLog>> {
        Ok(self
            .state
            .lock()
            .await
            .audit
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SubscriberDirectory for MemoryStore {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        let state = self.state.lock().await;
        Ok(state
            .subscribers
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }
}
