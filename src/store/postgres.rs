use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{ContentStore, PaymentStore, ReceiptLedger, SubscriberDirectory};
use crate::error::{Error, Result};
use crate::models::{
    audit_log::AuditLog,
    content_item::{ContentItem, ContentTransition, NewContentItem, NewRevision, Revision},
    payment_record::{NewPaymentRecord, PaymentRecord, PaymentTransition},
    subscriber::Subscriber,
};

const CONTENT_COLUMNS: &str = "id, title, slug, summary, body, author, status, scheduled_for, \
     published_at, is_active, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, donor_name, email, phone, amount, currency, donation_type, \
     designation, is_anonymous, message, status, external_transaction_ref, checkout_session_id, \
     receipt_number, submitted_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct ContentItemRow {
    id: Uuid,
    title: String,
    slug: String,
    summary: Option<String>,
    body: String,
    author: Option<String>,
    status: String,
    scheduled_for: Option<DateTime<Utc>>,
    published_at: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ContentItemRow> for ContentItem {
    type Error = Error;

    fn try_from(row: ContentItemRow) -> Result<Self> {
        Ok(ContentItem {
            id: row.id,
            title: row.title,
            slug: row.slug,
            summary: row.summary,
            body: row.body,
            author: row.author,
            status: row.status.parse().map_err(Error::Internal)?,
            scheduled_for: row.scheduled_for,
            published_at: row.published_at,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RevisionRow {
    id: Uuid,
    content_id: Uuid,
    revised_at: DateTime<Utc>,
    actor: String,
    description: String,
}

impl From<RevisionRow> for Revision {
    fn from(row: RevisionRow) -> Self {
        Revision {
            id: row.id,
            content_id: row.content_id,
            revised_at: row.revised_at,
            actor: row.actor,
            description: row.description,
        }
    }
}

#[derive(Debug, FromRow)]
struct PaymentRecordRow {
    id: Uuid,
    donor_name: String,
    email: String,
    phone: Option<String>,
    amount: Decimal,
    currency: String,
    donation_type: String,
    designation: String,
    is_anonymous: bool,
    message: Option<String>,
    status: String,
    external_transaction_ref: Option<String>,
    checkout_session_id: Option<String>,
    receipt_number: String,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRecordRow> for PaymentRecord {
    type Error = Error;

    fn try_from(row: PaymentRecordRow) -> Result<Self> {
        Ok(PaymentRecord {
            id: row.id,
            donor_name: row.donor_name,
            email: row.email,
            phone: row.phone,
            amount: row.amount,
            currency: row.currency,
            donation_type: row.donation_type.parse().map_err(Error::Internal)?,
            designation: row.designation,
            is_anonymous: row.is_anonymous,
            message: row.message,
            status: row.status.parse().map_err(Error::Internal)?,
            external_transaction_ref: row.external_transaction_ref,
            checkout_session_id: row.checkout_session_id,
            receipt_number: row.receipt_number,
            submitted_at: row.submitted_at,
            updated_at: row.updated_at,
        })
    }
}

fn content_items(rows: Vec<ContentItemRow>) -> Result<Vec<ContentItem>> {
    rows.into_iter().map(ContentItem::try_from).collect()
}

async fn insert_revision(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    content_id: Uuid,
    revision: &NewRevision,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO content_revisions (id, content_id, revised_at, actor, description)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(Uuid::new_v4())
    .bind(content_id)
    .bind(revision.revised_at)
    .bind(&revision.actor)
    .bind(&revision.description)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl ContentStore for PgStore {
    async fn create(&self, item: NewContentItem, revision: NewRevision) -> Result<ContentItem> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ContentItemRow>(&format!(
            r#"INSERT INTO content_items (id, title, slug, summary, body, author, status, is_active, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, 'draft', FALSE, $7, $7)
               RETURNING {}"#,
            CONTENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&item.title)
        .bind(&item.slug)
        .bind(&item.summary)
        .bind(&item.body)
        .bind(&item.author)
        .bind(revision.revised_at)
        .fetch_one(&mut *tx)
        .await?;
        insert_revision(&mut tx, row.id, &revision).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentItemRow>(&format!(
            "SELECT {} FROM content_items WHERE id = $1",
            CONTENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ContentItem::try_from).transpose()
    }

    async fn revisions(&self, id: Uuid) -> Result<Vec<Revision>> {
        let rows = sqlx::query_as::<_, RevisionRow>(
            r#"SELECT id, content_id, revised_at, actor, description
               FROM content_revisions WHERE content_id = $1 ORDER BY seq ASC"#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Revision::from).collect())
    }

    async fn find_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentItemRow>(&format!(
            r#"SELECT {} FROM content_items
               WHERE status = 'scheduled'
                 AND scheduled_for >= $1 AND scheduled_for <= $2
                 AND is_active = FALSE
               ORDER BY scheduled_for ASC"#,
            CONTENT_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        content_items(rows)
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentItemRow>(&format!(
            r#"SELECT {} FROM content_items
               WHERE status = 'scheduled' AND scheduled_for < $1 AND is_active = FALSE
               ORDER BY scheduled_for ASC"#,
            CONTENT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        content_items(rows)
    }

    async fn list_scheduled(&self) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentItemRow>(&format!(
            "SELECT {} FROM content_items WHERE status = 'scheduled' ORDER BY scheduled_for ASC, created_at ASC",
            CONTENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        content_items(rows)
    }

    async fn next_scheduled(&self, after: DateTime<Utc>) -> Result<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentItemRow>(&format!(
            r#"SELECT {} FROM content_items
               WHERE status = 'scheduled' AND scheduled_for > $1
               ORDER BY scheduled_for ASC LIMIT 1"#,
            CONTENT_COLUMNS
        ))
        .bind(after)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ContentItem::try_from).transpose()
    }

    async fn list_published(&self, limit: i64) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentItemRow>(&format!(
            r#"SELECT {} FROM content_items
               WHERE status = 'published' AND is_active = TRUE
               ORDER BY published_at DESC LIMIT $1"#,
            CONTENT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        content_items(rows)
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: ContentTransition,
    ) -> Result<Option<ContentItem>> {
        let allowed: Vec<&str> = transition.allowed_from.iter().map(|s| s.as_str()).collect();
        let (set_schedule, scheduled_for) = match transition.scheduled_for {
            Some(value) => (true, value),
            None => (false, None),
        };

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ContentItemRow>(&format!(
            r#"UPDATE content_items
               SET status = $3,
                   scheduled_for = CASE WHEN $4 THEN $5 ELSE scheduled_for END,
                   published_at = COALESCE($6, published_at),
                   is_active = COALESCE($7, is_active),
                   updated_at = $8
               WHERE id = $1 AND status = ANY($2)
               RETURNING {}"#,
            CONTENT_COLUMNS
        ))
        .bind(id)
        .bind(&allowed)
        .bind(transition.to.as_str())
        .bind(set_schedule)
        .bind(scheduled_for)
        .bind(transition.published_at)
        .bind(transition.is_active)
        .bind(transition.revision.revised_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        insert_revision(&mut tx, id, &transition.revision).await?;
        tx.commit().await?;
        row.try_into().map(Some)
    }
}

#[async_trait]
impl ReceiptLedger for PgStore {
    async fn last_receipt_number(&self, prefix: &str) -> Result<Option<String>> {
        let pattern = format!("^{}-[0-9]{{8}}-[0-9]+$", regex_escape(prefix));
        let receipt = sqlx::query_scalar::<_, String>(
            r#"SELECT receipt_number FROM payment_records
               WHERE receipt_number ~ $1
               ORDER BY CAST(substring(receipt_number from '([0-9]+)$') AS BIGINT) DESC
               LIMIT 1"#,
        )
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await?;
        Ok(receipt)
    }

    async fn receipt_exists(&self, receipt_number: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM payment_records WHERE receipt_number = $1)",
        )
        .bind(receipt_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

fn regex_escape(raw: &str) -> String {
    raw.chars()
        .flat_map(|c| {
            let escape = !c.is_ascii_alphanumeric() && c != '_';
            escape.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect()
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecord> {
        let row = sqlx::query_as::<_, PaymentRecordRow>(&format!(
            r#"INSERT INTO payment_records (
                   id, donor_name, email, phone, amount, currency, donation_type,
                   designation, is_anonymous, message, status, receipt_number
               ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11)
               RETURNING {}"#,
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&record.donor_name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.donation_type.as_str())
        .bind(&record.designation)
        .bind(record.is_anonymous)
        .bind(&record.message)
        .bind(&record.receipt_number)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRecordRow>(&format!(
            "SELECT {} FROM payment_records WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn find_by_transaction_ref(&self, reference: &str) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRecordRow>(&format!(
            r#"SELECT {} FROM payment_records
               WHERE external_transaction_ref = $1
               ORDER BY submitted_at DESC LIMIT 1"#,
            PAYMENT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn attach_checkout_session(
        &self,
        id: Uuid,
        session_id: &str,
        external_transaction_ref: Option<&str>,
    ) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query_as::<_, PaymentRecordRow>(&format!(
            r#"UPDATE payment_records
               SET checkout_session_id = $2,
                   external_transaction_ref = COALESCE($3, external_transaction_ref),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(session_id)
        .bind(external_transaction_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentRecord::try_from).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: PaymentTransition,
    ) -> Result<Option<PaymentRecord>> {
        let allowed: Vec<&str> = transition.allowed_from.iter().map(|s| s.as_str()).collect();

        let mut tx = self.pool.begin().await?;
        let previous = sqlx::query_scalar::<_, String>(
            "SELECT status FROM payment_records WHERE id = $1 AND status = ANY($2) FOR UPDATE",
        )
        .bind(id)
        .bind(&allowed)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(previous) = previous else {
            tx.rollback().await?;
            return Ok(None);
        };

        let row = sqlx::query_as::<_, PaymentRecordRow>(&format!(
            r#"UPDATE payment_records
               SET status = $2,
                   external_transaction_ref = COALESCE($3, external_transaction_ref),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(transition.to.as_str())
        .bind(&transition.external_transaction_ref)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO payment_audit_logs (id, entity_id, action, changes)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(format!("status:{}->{}", previous, transition.to))
        .bind(json!({
            "event_id": transition.event_id,
            "event_type": transition.event_type,
        }))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into().map(Some)
    }

    async fn audit_trail(&self, id: Uuid) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query_as::<_, AuditLog>(
            r#"SELECT id, entity_id, action, changes, created_at
               FROM payment_audit_logs WHERE entity_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SubscriberDirectory for PgStore {
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query_as::<_, Subscriber>(
            r#"SELECT id, email, name, is_active, subscribed_at
               FROM newsletter_subscribers WHERE is_active = TRUE ORDER BY subscribed_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
