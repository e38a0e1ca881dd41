pub mod api;
pub mod id;
pub mod models;
pub mod validate;

pub use id::RecordId;
pub use models::OrderStatus;
