//! WebSub hub: subscription admission and verification of intent.

pub mod admin;
pub mod blocklist;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod store;
pub mod subscription;
pub mod topics;

pub use config::schema::HubConfig;
pub use error::HubError;
pub use http::HubServer;
pub use lifecycle::Shutdown;
pub use subscription::{Admission, Admitter, SubscribeRequest, SubscribeStatus};
