//! Subscription admission core.
//!
//! # Data Flow
//! ```text
//! raw request
//!     → callback.rs (normalize callback URL)
//!     → validator.rs (classify: invalid topic / invalid callback / blocked / valid)
//!     → admitter.rs (upsert + dispatch on valid, map outcome to (message, status))
//! ```

pub mod admitter;
pub mod callback;
pub mod validator;

pub use admitter::{Admission, Admitter, SubscribeRequest};
pub use callback::normalize_url;
pub use validator::{validate, SubscribeStatus};
