//! Persistence seams. The scheduler and the reconciler never hold entity
//! state between calls; every status change goes through a guarded
//! transition that writes the status and its revision/audit row atomically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    audit_log::AuditLog,
    content_item::{ContentItem, ContentTransition, NewContentItem, NewRevision, Revision},
    payment_record::{NewPaymentRecord, PaymentRecord, PaymentTransition},
    subscriber::Subscriber,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create(&self, item: NewContentItem, revision: NewRevision) -> Result<ContentItem>;

    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>>;

    async fn revisions(&self, id: Uuid) -> Result<Vec<Revision>>;

    /// `scheduled`, inactive items with `scheduled_for` in `[start, end]`.
    async fn find_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>>;

    /// `scheduled`, inactive items with `scheduled_for < now`.
    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<ContentItem>>;

    /// All `scheduled` items, earliest `scheduled_for` first.
    async fn list_scheduled(&self) -> Result<Vec<ContentItem>>;

    async fn next_scheduled(&self, after: DateTime<Utc>) -> Result<Option<ContentItem>>;

    /// `published` and active, most recent first.
    async fn list_published(&self, limit: i64) -> Result<Vec<ContentItem>>;

    /// Applies `transition` only if the item's current status is one of
    /// `transition.allowed_from`. Returns `None` when the item is missing or
    /// the guard rejects the change.
    async fn transition(&self, id: Uuid, transition: ContentTransition)
        -> Result<Option<ContentItem>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiptLedger: Send + Sync {
    /// Receipt carrying the highest sequence issued under `prefix`.
    async fn last_receipt_number(&self, prefix: &str) -> Result<Option<String>>;

    async fn receipt_exists(&self, receipt_number: &str) -> Result<bool>;
}

#[async_trait]
pub trait PaymentStore: ReceiptLedger {
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecord>;

    async fn get(&self, id: Uuid) -> Result<Option<PaymentRecord>>;

    async fn find_by_transaction_ref(&self, reference: &str) -> Result<Option<PaymentRecord>>;

    async fn attach_checkout_session(
        &self,
        id: Uuid,
        session_id: &str,
        external_transaction_ref: Option<&str>,
    ) -> Result<Option<PaymentRecord>>;

    /// Guarded like [`ContentStore::transition`]; an applied change also
    /// appends an audit row.
    async fn transition(&self, id: Uuid, transition: PaymentTransition)
        -> Result<Option<PaymentRecord>>;

    async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLog>>;
}

#[async_trait]
pub trait SubscriberDirectory: Send + Sync {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>>;
}
