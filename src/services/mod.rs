pub mod checkout_service;
pub mod fanout;
pub mod notification_service;
pub mod publication_service;
pub mod receipt_service;
pub mod reconciler_service;
pub mod scheduler_service;
