//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Verification attempt fails (transport error, 5xx, 429)
//!     → backoff.rs (exponential delay with jitter)
//!     → next attempt, up to confirmation.max_attempts
//! ```
//!
//! # Design Decisions
//! - Every outbound call has a deadline (reqwest client timeout)
//! - Backoff is exponential with random jitter, capped at max_delay_ms
//! - Admissions never retry internally; infrastructure errors go to the caller

pub mod backoff;

pub use backoff::Backoff;
