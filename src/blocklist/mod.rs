//! Domain blocklist.
//!
//! Hosts on the list are refused as callback destinations. A listed domain
//! also covers its subdomains, so `spam.example` blocks `cb.spam.example`.
//! Entries are canonicalized the same way callback hosts are (lowercase,
//! IDNA to punycode, no trailing dot).

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use url::Url;

/// Predicate over host names.
pub trait DomainBlocklist: Send + Sync {
    fn is_blocked(&self, host: &str) -> bool;
}

/// Blocklist loaded from configuration and swapped on reload.
pub struct DomainBlocks {
    domains: ArcSwap<HashSet<String>>,
}

impl DomainBlocks {
    pub fn new(domains: &[String]) -> Self {
        Self {
            domains: ArcSwap::from_pointee(domain_set(domains)),
        }
    }

    /// Replace the whole list.
    pub fn replace(&self, domains: &[String]) {
        let next = domain_set(domains);
        tracing::info!(domains = next.len(), "Domain blocklist updated");
        self.domains.store(Arc::new(next));
    }

    /// Blocked domains, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.domains.load().iter().cloned().collect();
        domains.sort();
        domains
    }

    pub fn len(&self) -> usize {
        self.domains.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.load().is_empty()
    }
}

impl Default for DomainBlocks {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl DomainBlocklist for DomainBlocks {
    fn is_blocked(&self, host: &str) -> bool {
        let domains = self.domains.load();
        if domains.is_empty() {
            return false;
        }

        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let mut candidate = host.as_str();
        loop {
            if domains.contains(candidate) {
                return true;
            }
            match candidate.split_once('.') {
                Some((_, parent)) if !parent.is_empty() => candidate = parent,
                _ => return false,
            }
        }
    }
}

/// Canonical host form of a configured entry.
fn canonical_domain(entry: &str) -> Option<String> {
    let entry = entry.trim().trim_end_matches('.');
    if entry.is_empty() {
        return None;
    }
    let url = Url::parse(&format!("http://{entry}/")).ok()?;
    url.host_str().map(str::to_owned)
}

fn domain_set(domains: &[String]) -> HashSet<String> {
    domains
        .iter()
        .filter_map(|entry| {
            let canonical = canonical_domain(entry);
            if canonical.is_none() {
                tracing::warn!(entry = %entry, "Ignoring invalid blocklist entry");
            }
            canonical
        })
        .collect()
}
