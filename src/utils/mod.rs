pub mod signature;
pub mod slug;
pub mod time;
pub mod validation;
