//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacities > 0)
//! - Check URLs and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HubConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::HubConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("hub.base_url '{0}' is not an absolute http(s) URL")]
    InvalidBaseUrl(String),

    #[error("hub.path '{0}' must start with '/'")]
    InvalidHubPath(String),

    #[error("topics.owners contains an invalid name '{0}'")]
    InvalidOwner(String),

    #[error("blocklist.domains contains an invalid entry '{0}'")]
    InvalidBlockedDomain(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("confirmation.base_delay_ms exceeds confirmation.max_delay_ms")]
    BackoffRange,

    #[error("observability.log_format '{0}' must be 'pretty' or 'json'")]
    InvalidLogFormat(String),

    #[error("admin.api_key must be changed when the admin API is enabled")]
    PlaceholderApiKey,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &HubConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    match Url::parse(&config.hub.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
        _ => errors.push(ValidationError::InvalidBaseUrl(config.hub.base_url.clone())),
    }

    if !config.hub.path.starts_with('/') {
        errors.push(ValidationError::InvalidHubPath(config.hub.path.clone()));
    }

    for owner in &config.topics.owners {
        let valid = !owner.is_empty()
            && owner
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
        if !valid {
            errors.push(ValidationError::InvalidOwner(owner.clone()));
        }
    }

    for domain in &config.blocklist.domains {
        let trimmed = domain.trim();
        if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
            errors.push(ValidationError::InvalidBlockedDomain(domain.clone()));
        }
    }

    let confirmation = &config.confirmation;
    if confirmation.queue_capacity == 0 {
        errors.push(ValidationError::Zero("confirmation.queue_capacity"));
    }
    if confirmation.dispatch_timeout_ms == 0 {
        errors.push(ValidationError::Zero("confirmation.dispatch_timeout_ms"));
    }
    if confirmation.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("confirmation.request_timeout_secs"));
    }
    if confirmation.max_attempts == 0 {
        errors.push(ValidationError::Zero("confirmation.max_attempts"));
    }
    if confirmation.workers == 0 {
        errors.push(ValidationError::Zero("confirmation.workers"));
    }
    if confirmation.base_delay_ms > confirmation.max_delay_ms {
        errors.push(ValidationError::BackoffRange);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::InvalidLogFormat(
            config.observability.log_format.clone(),
        ));
    }

    if config.admin.enabled && config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
        errors.push(ValidationError::PlaceholderApiKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&HubConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = HubConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.hub.base_url = "ftp://hub.example".into();
        config.confirmation.queue_capacity = 0;
        config.admin.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidBindAddress("nowhere".into())));
        assert!(errors.contains(&ValidationError::Zero("confirmation.queue_capacity")));
        assert!(errors.contains(&ValidationError::PlaceholderApiKey));
    }

    #[test]
    fn test_rejects_bad_blocklist_entries() {
        let mut config = HubConfig::default();
        config.blocklist.domains = vec!["ok.example".into(), "bad example".into(), "a/b".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
