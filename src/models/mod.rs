pub mod audit_log;
pub mod content_item;
pub mod payment_record;
pub mod subscriber;
