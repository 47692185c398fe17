//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HubConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → blocklist and topic owners swapped atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the blocklist and owners hot-reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::AdminConfig;
pub use schema::BlocklistConfig;
pub use schema::ConfirmationConfig;
pub use schema::HubConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::SubscriptionConfig;
pub use schema::TopicsConfig;
