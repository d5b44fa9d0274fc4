use std::sync::Arc;

use uuid::Uuid;

use crate::dto::stripe_dto::{
    ChargeObject, CheckoutSessionObject, DisputeObject, InvoiceObject, PaymentIntentObject,
    StripeEvent, SubscriptionObject,
};
use crate::error::{Error, Result};
use crate::models::payment_record::{PaymentRecord, PaymentStatus, PaymentTransition};
use crate::services::fanout::{self, NotificationTask};
use crate::services::notification_service::PaymentNotifier;
use crate::store::PaymentStore;
use crate::utils::signature::verify_stripe_signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    CheckoutExpired,
    PaymentSucceeded,
    PaymentFailed,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    SubscriptionTrialWillEnd,
    ChargeSucceeded,
    ChargeFailed,
    ChargeRefunded,
    DisputeCreated,
    Unknown,
}

impl EventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => EventKind::CheckoutCompleted,
            "checkout.session.expired" => EventKind::CheckoutExpired,
            "payment_intent.succeeded" => EventKind::PaymentSucceeded,
            "payment_intent.payment_failed" => EventKind::PaymentFailed,
            "invoice.payment_succeeded" => EventKind::InvoicePaymentSucceeded,
            "invoice.payment_failed" => EventKind::InvoicePaymentFailed,
            "customer.subscription.created" => EventKind::SubscriptionCreated,
            "customer.subscription.updated" => EventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted,
            "customer.subscription.trial_will_end" => EventKind::SubscriptionTrialWillEnd,
            "charge.succeeded" => EventKind::ChargeSucceeded,
            "charge.failed" => EventKind::ChargeFailed,
            "charge.refunded" => EventKind::ChargeRefunded,
            "charge.dispute.created" => EventKind::DisputeCreated,
            _ => EventKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied { record_id: Uuid, status: PaymentStatus },
    /// The record exists but its status is outside the guard: a duplicate or
    /// out-of-order delivery.
    Unchanged { record_id: Uuid },
    NotFound,
    Ignored,
    Unhandled,
}

/// Applies verified provider events to payment records. Holds no per-event
/// state; idempotence comes from the guarded store transition.
#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn PaymentStore>,
    notifier: Arc<dyn PaymentNotifier>,
    webhook_secret: String,
    tolerance_secs: i64,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        notifier: Arc<dyn PaymentNotifier>,
        webhook_secret: String,
        tolerance_secs: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            webhook_secret,
            tolerance_secs,
        }
    }

    /// Checks the signature header and decodes the event.
    pub fn verify(&self, payload: &[u8], header: Option<&str>, now_unix: i64) -> Result<StripeEvent> {
        let header =
            header.ok_or_else(|| Error::InvalidSignature("missing signature header".into()))?;
        verify_stripe_signature(
            payload,
            header,
            &self.webhook_secret,
            now_unix,
            self.tolerance_secs,
        )?;
        serde_json::from_slice(payload)
            .map_err(|e| Error::BadRequest(format!("invalid event payload: {}", e)))
    }

    pub async fn handle(&self, event: &StripeEvent) -> Result<EventOutcome> {
        let kind = EventKind::parse(&event.event_type);
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing payment event");

        let outcome = match kind {
            EventKind::CheckoutCompleted => self.checkout_completed(event).await?,
            EventKind::CheckoutExpired => self.checkout_expired(event).await?,
            EventKind::PaymentSucceeded => {
                let intent: PaymentIntentObject = decode(event)?;
                self.transition_by_ref(
                    event,
                    &intent.id,
                    &[PaymentStatus::Pending],
                    PaymentStatus::Completed,
                )
                .await?
            }
            EventKind::PaymentFailed => {
                let intent: PaymentIntentObject = decode(event)?;
                if let Some(error) = &intent.last_payment_error {
                    tracing::warn!(payment_intent = %intent.id, error = %error, "Payment failed");
                }
                self.transition_by_ref(
                    event,
                    &intent.id,
                    &[PaymentStatus::Pending],
                    PaymentStatus::Failed,
                )
                .await?
            }
            EventKind::InvoicePaymentSucceeded | EventKind::InvoicePaymentFailed => {
                let invoice: InvoiceObject = decode(event)?;
                tracing::info!(
                    invoice_id = %invoice.id,
                    subscription = ?invoice.subscription,
                    amount_paid = ?invoice.amount_paid,
                    event_type = %event.event_type,
                    "Invoice event recorded"
                );
                EventOutcome::Ignored
            }
            EventKind::SubscriptionUpdated => {
                let subscription: SubscriptionObject = decode(event)?;
                match subscription.status.as_str() {
                    "active" => {
                        self.transition_by_ref(
                            event,
                            &subscription.id,
                            &[PaymentStatus::Pending, PaymentStatus::Failed],
                            PaymentStatus::Completed,
                        )
                        .await?
                    }
                    "canceled" => {
                        self.transition_by_ref(
                            event,
                            &subscription.id,
                            &[PaymentStatus::Pending, PaymentStatus::Completed],
                            PaymentStatus::Cancelled,
                        )
                        .await?
                    }
                    other => {
                        tracing::info!(subscription = %subscription.id, status = other, "Subscription status change needs no action");
                        EventOutcome::Ignored
                    }
                }
            }
            EventKind::SubscriptionDeleted => {
                let subscription: SubscriptionObject = decode(event)?;
                self.transition_by_ref(
                    event,
                    &subscription.id,
                    &[PaymentStatus::Pending, PaymentStatus::Completed],
                    PaymentStatus::Cancelled,
                )
                .await?
            }
            EventKind::SubscriptionCreated | EventKind::SubscriptionTrialWillEnd => {
                let subscription: SubscriptionObject = decode(event)?;
                tracing::info!(subscription = %subscription.id, event_type = %event.event_type, "Subscription event recorded");
                EventOutcome::Ignored
            }
            EventKind::ChargeSucceeded | EventKind::ChargeFailed => {
                let charge: ChargeObject = decode(event)?;
                tracing::info!(charge_id = %charge.id, event_type = %event.event_type, "Charge event recorded");
                EventOutcome::Ignored
            }
            EventKind::ChargeRefunded => {
                let charge: ChargeObject = decode(event)?;
                tracing::info!(charge_id = %charge.id, amount_refunded = ?charge.amount_refunded, "Charge refunded");
                match charge.payment_intent.as_deref() {
                    Some(intent) => {
                        self.transition_by_ref(
                            event,
                            intent,
                            &[PaymentStatus::Completed, PaymentStatus::Pending],
                            PaymentStatus::Refunded,
                        )
                        .await?
                    }
                    None => {
                        tracing::warn!(charge_id = %charge.id, "Refunded charge carries no payment intent");
                        EventOutcome::NotFound
                    }
                }
            }
            EventKind::DisputeCreated => self.dispute_created(event).await?,
            EventKind::Unknown => {
                tracing::info!(event_type = %event.event_type, "Unhandled event type");
                EventOutcome::Unhandled
            }
        };

        tracing::info!(event_id = %event.id, outcome = ?outcome, "Payment event processed");
        Ok(outcome)
    }

    async fn checkout_completed(&self, event: &StripeEvent) -> Result<EventOutcome> {
        let session: CheckoutSessionObject = decode(event)?;
        let Some(record_id) = session.record_id() else {
            tracing::warn!(session_id = %session.id, "Checkout session has no record id in metadata");
            return Ok(EventOutcome::NotFound);
        };
        let transition = PaymentTransition {
            allowed_from: vec![PaymentStatus::Pending, PaymentStatus::Failed],
            to: PaymentStatus::Completed,
            external_transaction_ref: session.transaction_ref().map(str::to_string),
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
        };
        let (outcome, applied) = self.apply(record_id, transition).await?;
        if let Some(record) = applied {
            self.notify_completed(&record).await;
        }
        Ok(outcome)
    }

    async fn checkout_expired(&self, event: &StripeEvent) -> Result<EventOutcome> {
        let session: CheckoutSessionObject = decode(event)?;
        let Some(record_id) = session.record_id() else {
            tracing::warn!(session_id = %session.id, "Expired session has no record id in metadata");
            return Ok(EventOutcome::NotFound);
        };
        let transition = PaymentTransition {
            allowed_from: vec![PaymentStatus::Pending],
            to: PaymentStatus::Cancelled,
            external_transaction_ref: None,
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
        };
        Ok(self.apply(record_id, transition).await?.0)
    }

    async fn dispute_created(&self, event: &StripeEvent) -> Result<EventOutcome> {
        let dispute: DisputeObject = decode(event)?;
        let record = match dispute.payment_intent.as_deref() {
            Some(intent) => self.store.find_by_transaction_ref(intent).await?,
            None => None,
        };
        match record {
            Some(record) => tracing::warn!(
                record_id = %record.id,
                receipt = %record.receipt_number,
                dispute_id = %dispute.id,
                reason = ?dispute.reason,
                amount = ?dispute.amount,
                "Dispute opened against donation"
            ),
            None => tracing::warn!(dispute_id = %dispute.id, amount = ?dispute.amount, "Dispute opened for unknown payment"),
        }
        Ok(EventOutcome::Ignored)
    }

    async fn transition_by_ref(
        &self,
        event: &StripeEvent,
        reference: &str,
        allowed_from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<EventOutcome> {
        let Some(record) = self.store.find_by_transaction_ref(reference).await? else {
            tracing::warn!(reference, event_type = %event.event_type, "No payment record for reference");
            return Ok(EventOutcome::NotFound);
        };
        let transition = PaymentTransition {
            allowed_from: allowed_from.to_vec(),
            to,
            external_transaction_ref: None,
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
        };
        Ok(self.apply(record.id, transition).await?.0)
    }

    /// Returns the updated record alongside `Applied`.
    async fn apply(
        &self,
        record_id: Uuid,
        transition: PaymentTransition,
    ) -> Result<(EventOutcome, Option<PaymentRecord>)> {
        let to = transition.to;
        let event_type = transition.event_type.clone();
        match self.store.transition(record_id, transition).await? {
            Some(record) => {
                tracing::info!(record_id = %record.id, status = %record.status, event_type = %event_type, "Payment status updated");
                Ok((
                    EventOutcome::Applied {
                        record_id,
                        status: to,
                    },
                    Some(record),
                ))
            }
            None => match self.store.get(record_id).await? {
                Some(current) => {
                    tracing::info!(
                        record_id = %record_id,
                        status = %current.status,
                        event_type = %event_type,
                        "Transition not allowed from current status, leaving record unchanged"
                    );
                    Ok((EventOutcome::Unchanged { record_id }, None))
                }
                None => {
                    tracing::warn!(record_id = %record_id, event_type = %event_type, "Payment record not found");
                    Ok((EventOutcome::NotFound, None))
                }
            },
        }
    }

    async fn notify_completed(&self, record: &PaymentRecord) {
        let notifier = &self.notifier;
        let tasks = vec![
            NotificationTask::new("donor_email", notifier.send_donor_confirmation(record)),
            NotificationTask::new("admin_email", notifier.send_admin_notification(record)),
            NotificationTask::new("donor_sms", notifier.send_donor_sms(record)),
        ];
        let report = fanout::dispatch(&record.id.to_string(), tasks).await;
        if !report.all_delivered() {
            tracing::warn!(record_id = %record.id, failed = ?report.failed, "Some donation notifications failed");
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &StripeEvent) -> Result<T> {
    event.object().map_err(|e| {
        Error::BadRequest(format!(
            "invalid {} object: {}",
            event.event_type, e
        ))
    })
}
