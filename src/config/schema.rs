//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the hub.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the hub.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HubConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Public identity of the hub (base URL, endpoint path).
    pub hub: HubSettings,

    /// Topic owners this hub accepts subscriptions for.
    pub topics: TopicsConfig,

    /// Callback hosts refused at admission.
    pub blocklist: BlocklistConfig,

    /// Subscription defaults and persistence.
    pub subscriptions: SubscriptionConfig,

    /// Confirmation queue and verification worker.
    pub confirmation: ConfirmationConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Public identity of the hub.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubSettings {
    /// Base URL topics are published under (e.g., "https://hub.example").
    pub base_url: String,

    /// Path of the subscription endpoint.
    pub path: String,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            path: "/hub".to_string(),
        }
    }
}

/// Known topic owners.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TopicsConfig {
    /// Owner names; each publishes `{base_url}/users/{name}.atom`.
    pub owners: Vec<String>,
}

/// Domain blocklist.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BlocklistConfig {
    /// Blocked hosts. Subdomains of a listed host are blocked too.
    pub domains: Vec<String>,
}

/// Subscription defaults and persistence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Lease used when a request omits `hub.lease_seconds`.
    pub default_lease_secs: u64,

    /// Snapshot file for the subscription store (none = memory only).
    pub persistence_path: Option<String>,

    /// Interval between snapshot flushes in seconds (0 = only on shutdown).
    pub flush_interval_secs: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            default_lease_secs: 86_400,
            persistence_path: None,
            flush_interval_secs: 60,
        }
    }
}

/// Confirmation dispatch and verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Capacity of the confirmation task queue.
    pub queue_capacity: usize,

    /// Maximum time an admission waits for queue space, in milliseconds.
    pub dispatch_timeout_ms: u64,

    /// Timeout for a single verification request in seconds.
    pub request_timeout_secs: u64,

    /// Maximum verification attempts per task.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Maximum concurrent verifications.
    pub workers: usize,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            dispatch_timeout_ms: 500,
            request_timeout_secs: 10,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            workers: 16,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Header carrying the verified domain of the subscriber.
    /// Only trust it when an authenticating proxy sets it.
    pub verified_domain_header: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024, // 64KB
            verified_domain_header: "x-verified-domain".to_string(),
        }
    }
}
