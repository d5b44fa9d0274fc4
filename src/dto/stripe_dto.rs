use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope of a provider event. Only the fields the reconciler reads are
/// modelled; `data.object` is decoded per event type.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn object<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// Metadata keys the checkout session may carry the record id under.
pub const RECORD_ID_KEYS: [&str; 3] = ["record_id", "recordId", "donationId"];

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub payment_intent: Option<String>,
    pub subscription: Option<String>,
}

impl CheckoutSessionObject {
    pub fn record_id(&self) -> Option<Uuid> {
        RECORD_ID_KEYS
            .iter()
            .find_map(|key| self.metadata.get(*key))
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }

    /// Subscription id for recurring checkouts, payment intent otherwise.
    pub fn transaction_ref(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .or(self.payment_intent.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub last_payment_error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount_refunded: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub subscription: Option<String>,
    pub amount_paid: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeObject {
    pub id: String,
    pub payment_intent: Option<String>,
    pub reason: Option<String>,
    pub amount: Option<i64>,
}

/// Subset of the checkout session returned on creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_intent: Option<String>,
    pub subscription: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_id_falls_back_to_legacy_keys() {
        let id = Uuid::new_v4();
        let session: CheckoutSessionObject = serde_json::from_value(json!({
            "id": "cs_1",
            "metadata": { "donationId": id.to_string() },
            "payment_intent": "pi_1",
            "subscription": null
        }))
        .unwrap();
        assert_eq!(session.record_id(), Some(id));
        assert_eq!(session.transaction_ref(), Some("pi_1"));
    }

    #[test]
    fn subscription_wins_over_payment_intent() {
        let session: CheckoutSessionObject = serde_json::from_value(json!({
            "id": "cs_2",
            "metadata": { "record_id": "not-a-uuid" },
            "payment_intent": "pi_2",
            "subscription": "sub_2"
        }))
        .unwrap();
        assert_eq!(session.record_id(), None);
        assert_eq!(session.transaction_ref(), Some("sub_2"));
    }

    #[test]
    fn refund_and_dispute_amounts_are_optional() {
        let charge: ChargeObject = serde_json::from_value(json!({
            "id": "ch_1",
            "payment_intent": "pi_1",
            "amount_refunded": 2500
        }))
        .unwrap();
        assert_eq!(charge.amount_refunded, Some(2500));

        let dispute: DisputeObject =
            serde_json::from_value(json!({ "id": "dp_1", "payment_intent": null })).unwrap();
        assert_eq!(dispute.amount, None);
        assert_eq!(dispute.reason, None);
    }
}
