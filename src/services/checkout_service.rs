use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::StripeConfig;
use crate::dto::payment_dto::{CheckoutRequest, CheckoutResponse, DonationStatusResponse};
use crate::dto::stripe_dto::CreatedCheckoutSession;
use crate::error::{Error, Result};
use crate::models::payment_record::{DonationType, NewPaymentRecord, PaymentRecord};
use crate::services::receipt_service::ReceiptAllocator;
use crate::store::PaymentStore;
use crate::utils::{time, validation::validate};

const MAX_CREATE_ATTEMPTS: u32 = 3;
const DEFAULT_DESIGNATION: &str = "general";

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub record_id: Uuid,
    pub receipt_number: String,
    pub email: String,
    pub amount_minor: i64,
    pub currency: String,
    pub donation_type: DonationType,
    pub designation: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<CreatedCheckoutSession>;
}

/// Stripe Checkout over its form-encoded REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(client: Client, config: &StripeConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        }
    }

    fn session_form(request: &SessionRequest) -> Vec<(String, String)> {
        let recurring = request.donation_type.recurring_interval();
        let mut form = vec![
            (
                "mode".to_string(),
                if recurring.is_some() { "subscription" } else { "payment" }.to_string(),
            ),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("customer_email".into(), request.email.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("line_items[0][price_data][currency]".into(), request.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount_minor.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                format!("Donation - {}", request.designation),
            ),
            ("metadata[record_id]".into(), request.record_id.to_string()),
            ("metadata[receipt_number]".into(), request.receipt_number.clone()),
            (
                "metadata[donation_type]".into(),
                request.donation_type.as_str().to_string(),
            ),
        ];
        match recurring {
            Some((interval, count)) => {
                form.push((
                    "line_items[0][price_data][recurring][interval]".into(),
                    interval.to_string(),
                ));
                form.push((
                    "line_items[0][price_data][recurring][interval_count]".into(),
                    count.to_string(),
                ));
                form.push((
                    "subscription_data[metadata][record_id]".into(),
                    request.record_id.to_string(),
                ));
            }
            None => form.push((
                "payment_intent_data[metadata][record_id]".into(),
                request.record_id.to_string(),
            )),
        }
        form
    }
}

#[async_trait]
impl CheckoutGateway for StripeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<CreatedCheckoutSession> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&Self::session_form(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(record_id = %request.record_id, %status, body = %body, "Checkout session creation rejected");
            return Err(Error::Gateway(format!(
                "Checkout provider returned {}",
                status
            )));
        }
        Ok(response.json::<CreatedCheckoutSession>().await?)
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn CheckoutGateway>,
    receipts: ReceiptAllocator,
    currency: String,
    timezone: Tz,
    success_url: String,
    cancel_url: String,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn CheckoutGateway>,
        receipts: ReceiptAllocator,
        currency: String,
        timezone: Tz,
        (success_url, cancel_url): (String, String),
    ) -> Self {
        Self {
            store,
            gateway,
            receipts,
            currency,
            timezone,
            success_url,
            cancel_url,
        }
    }

    pub async fn checkout(&self, req: CheckoutRequest) -> Result<CheckoutResponse> {
        validate(&req)?;
        let amount_minor = to_minor_units(req.amount)?;
        let record = self.create_record(&req).await?;

        let session_request = SessionRequest {
            record_id: record.id,
            receipt_number: record.receipt_number.clone(),
            email: record.email.clone(),
            amount_minor,
            currency: record.currency.clone(),
            donation_type: record.donation_type,
            designation: record.designation.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
        };
        let session = match self.gateway.create_session(&session_request).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(record_id = %record.id, error = ?e, "Checkout session creation failed, record left pending");
                return Err(match e {
                    Error::Gateway(msg) => Error::Gateway(msg),
                    other => Error::Gateway(other.to_string()),
                });
            }
        };

        let reference = session
            .subscription
            .as_deref()
            .or(session.payment_intent.as_deref());
        self.store
            .attach_checkout_session(record.id, &session.id, reference)
            .await?;

        tracing::info!(
            record_id = %record.id,
            receipt = %record.receipt_number,
            session_id = %session.id,
            "Checkout session created"
        );
        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
            record_id: record.id,
            receipt_number: record.receipt_number,
        })
    }

    /// Allocates a receipt and inserts the pending record. A unique-index
    /// conflict on insert triggers a fresh allocation.
    async fn create_record(&self, req: &CheckoutRequest) -> Result<PaymentRecord> {
        let today = time::now().with_timezone(&self.timezone).date_naive();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let receipt_number = self.receipts.allocate(&*self.store, today).await?;
            let new_record = NewPaymentRecord {
                donor_name: req.donor_name.trim().to_string(),
                email: req.email.trim().to_string(),
                phone: req.phone.clone().filter(|p| !p.trim().is_empty()),
                amount: req.amount,
                currency: self.currency.clone(),
                donation_type: req.donation_type,
                designation: req
                    .designation
                    .clone()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DESIGNATION.to_string()),
                is_anonymous: req.is_anonymous,
                message: req.message.clone(),
                receipt_number,
            };
            match self.store.create(new_record).await {
                Ok(record) => return Ok(record),
                Err(Error::Conflict(msg)) if attempt < MAX_CREATE_ATTEMPTS => {
                    tracing::warn!(attempt, conflict = %msg, "Receipt number taken on insert, reallocating");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn status(&self, id: Uuid) -> Result<DonationStatusResponse> {
        self.store
            .get(id)
            .await?
            .map(DonationStatusResponse::from)
            .ok_or_else(|| Error::NotFound(format!("donation {} not found", id)))
    }
}

fn to_minor_units(amount: Decimal) -> Result<i64> {
    (amount.round_dp(2) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| Error::BadRequest("amount is out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReceiptConfig;
    use crate::models::payment_record::PaymentStatus;
    use crate::store::{MemoryStore, ReceiptLedger};

    fn request(amount: Decimal, donation_type: DonationType) -> CheckoutRequest {
        CheckoutRequest {
            donor_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: None,
            amount,
            donation_type,
            designation: None,
            is_anonymous: false,
            message: None,
        }
    }

    fn service(store: Arc<MemoryStore>, gateway: MockCheckoutGateway) -> CheckoutService {
        CheckoutService::new(
            store,
            Arc::new(gateway),
            ReceiptAllocator::new(&ReceiptConfig {
                prefix: "H4A".into(),
                start_sequence: 44210,
            }),
            "usd".into(),
            chrono_tz::America::New_York,
            ("https://site/success".into(), "https://site/cancel".into()),
        )
    }

    #[test]
    fn minor_units_round_to_cents() {
        assert_eq!(to_minor_units(Decimal::new(5000, 2)).unwrap(), 5000);
        assert_eq!(to_minor_units(Decimal::new(12345, 3)).unwrap(), 1234);
    }

    #[test]
    fn recurring_sessions_use_subscription_mode() {
        let form = StripeGateway::session_form(&SessionRequest {
            record_id: Uuid::nil(),
            receipt_number: "H4A-20261015-44210".into(),
            email: "ada@example.com".into(),
            amount_minor: 2500,
            currency: "usd".into(),
            donation_type: DonationType::Quarterly,
            designation: "general".into(),
            success_url: "s".into(),
            cancel_url: "c".into(),
        });
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("mode"), Some("subscription"));
        assert_eq!(get("line_items[0][price_data][recurring][interval]"), Some("month"));
        assert_eq!(get("line_items[0][price_data][recurring][interval_count]"), Some("3"));
        assert_eq!(get("metadata[record_id]"), Some(Uuid::nil().to_string().as_str()));
    }

    #[tokio::test]
    async fn checkout_creates_pending_record_with_receipt() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockCheckoutGateway::new();
        gateway.expect_create_session().times(1).returning(|req| {
            assert_eq!(req.amount_minor, 5000);
            Ok(CreatedCheckoutSession {
                id: "cs_test_1".into(),
                url: Some("https://checkout/cs_test_1".into()),
                payment_intent: Some("pi_1".into()),
                subscription: None,
            })
        });

        let response = service(store.clone(), gateway)
            .checkout(request(Decimal::new(5000, 2), DonationType::OneTime))
            .await
            .unwrap();
        assert!(response.receipt_number.starts_with("H4A-"));
        assert!(response.receipt_number.ends_with("-44210"));

        let record = PaymentStore::get(&*store, response.record_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.checkout_session_id.as_deref(), Some("cs_test_1"));
        assert_eq!(record.external_transaction_ref.as_deref(), Some("pi_1"));
        assert_eq!(record.designation, "general");
    }

    #[tokio::test]
    async fn gateway_failure_is_bad_gateway_and_keeps_record() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockCheckoutGateway::new();
        gateway
            .expect_create_session()
            .returning(|_| Err(Error::Gateway("provider down".into())));

        let err = service(store.clone(), gateway)
            .checkout(request(Decimal::new(1000, 2), DonationType::Monthly))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Gateway(_)));
        assert_eq!(
            store.last_receipt_number("H4A").await.unwrap().as_deref().map(|r| r.ends_with("-44210")),
            Some(true)
        );
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected_before_any_write() {
        let store = Arc::new(MemoryStore::new());
        let err = service(store.clone(), MockCheckoutGateway::new())
            .checkout(request(Decimal::ZERO, DonationType::OneTime))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.last_receipt_number("H4A").await.unwrap(), None);
    }
}
