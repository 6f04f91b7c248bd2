//! Gateway client fixtures for the services under test.

pub mod gateway;
pub mod moderation_client;
pub mod order_client;
pub mod product_client;
pub mod user_client;

pub use gateway::{GatewayClient, GatewayError, Page};
pub use moderation_client::ModerationClient;
pub use order_client::OrderClient;
pub use product_client::ProductClient;
pub use user_client::UserClient;
