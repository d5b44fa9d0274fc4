use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::payment_record::{DonationType, PaymentRecord, PaymentStatus};
use crate::utils::validation::validate_positive_amount;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 200, message = "Donor name is required"))]
    pub donor_name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(custom(function = "validate_positive_amount"))]
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    pub donation_type: DonationType,
    #[validate(length(max = 200))]
    pub designation: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    #[validate(length(max = 2000))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
    pub record_id: Uuid,
    pub receipt_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DonationStatusResponse {
    pub id: Uuid,
    pub status: PaymentStatus,
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    pub donation_type: DonationType,
    pub receipt_number: String,
}

impl From<PaymentRecord> for DonationStatusResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            amount: record.amount,
            donation_type: record.donation_type,
            receipt_number: record.receipt_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}
