//! Subscription request classification.
//!
//! # Decision order
//! First match wins, which fixes the precedence of user-visible errors:
//! ```text
//! owner missing                     → InvalidTopic
//! callback unparseable / not http(s) → InvalidCallback
//! callback host blocked             → CallbackNotAllowed
//! otherwise                         → Valid
//! ```
//!
//! Classification is pure: the same inputs and blocklist state always give
//! the same answer, and nothing is written anywhere.

use url::Url;

use crate::blocklist::DomainBlocklist;
use crate::subscription::callback::is_http_url;
use crate::topics::OwnerId;

/// Outcome of validating a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscribeStatus {
    InvalidTopic,
    InvalidCallback,
    CallbackNotAllowed,
    Valid,
}

impl SubscribeStatus {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscribeStatus::InvalidTopic => "invalid_topic",
            SubscribeStatus::InvalidCallback => "invalid_callback",
            SubscribeStatus::CallbackNotAllowed => "callback_not_allowed",
            SubscribeStatus::Valid => "valid",
        }
    }
}

/// Classify a request. `callback` is the normalized callback, `None` when
/// the raw value could not be parsed.
pub fn validate(
    owner: Option<&OwnerId>,
    callback: Option<&Url>,
    blocklist: &dyn DomainBlocklist,
) -> SubscribeStatus {
    if owner.is_none() {
        return SubscribeStatus::InvalidTopic;
    }

    let callback = match callback {
        Some(url) if is_http_url(url) => url,
        _ => return SubscribeStatus::InvalidCallback,
    };

    match callback.host_str() {
        Some(host) if blocklist.is_blocked(host) => SubscribeStatus::CallbackNotAllowed,
        _ => SubscribeStatus::Valid,
    }
}
