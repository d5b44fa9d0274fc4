pub mod content_dto;
pub mod payment_dto;
pub mod stripe_dto;
