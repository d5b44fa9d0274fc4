use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum DonationType {
    #[serde(rename = "one-time")]
    OneTime,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "quarterly")]
    Quarterly,
    #[serde(rename = "yearly")]
    Yearly,
}

impl DonationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationType::OneTime => "one-time",
            DonationType::Monthly => "monthly",
            DonationType::Quarterly => "quarterly",
            DonationType::Yearly => "yearly",
        }
    }

    /// Billing interval and count for recurring donations.
    pub fn recurring_interval(&self) -> Option<(&'static str, u32)> {
        match self {
            DonationType::OneTime => None,
            DonationType::Monthly => Some(("month", 1)),
            DonationType::Quarterly => Some(("month", 3)),
            DonationType::Yearly => Some(("year", 1)),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring_interval().is_some()
    }
}

impl FromStr for DonationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-time" => Ok(DonationType::OneTime),
            "monthly" => Ok(DonationType::Monthly),
            "quarterly" => Ok(DonationType::Quarterly),
            "yearly" => Ok(DonationType::Yearly),
            other => Err(format!("unknown donation type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub donor_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub donation_type: DonationType,
    pub designation: String,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub status: PaymentStatus,
    pub external_transaction_ref: Option<String>,
    pub checkout_session_id: Option<String>,
    pub receipt_number: String,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn display_name(&self) -> &str {
        if self.is_anonymous {
            "Anonymous"
        } else {
            &self.donor_name
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub donor_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub donation_type: DonationType,
    pub designation: String,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub receipt_number: String,
}

/// A guarded status change driven by a provider event.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub allowed_from: Vec<PaymentStatus>,
    pub to: PaymentStatus,
    pub external_transaction_ref: Option<String>,
    pub event_id: String,
    pub event_type: String,
}
