//! Domain scope filter
//!
//! Decides whether a host is in scope for capture. An unconfigured filter
//! captures everything; a configured one keeps exactly the listed hostnames
//! (exact match, no wildcard or subdomain logic).

use std::collections::HashSet;

/// Allow-list based host filter
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    allowed: HashSet<String>,
}

impl ScopeFilter {
    /// Build from the configured hostname list. An empty or absent list
    /// means unrestricted capture.
    pub fn new(allowed_domains: Option<&[String]>) -> Self {
        let allowed = allowed_domains
            .map(|domains| domains.iter().map(|d| d.to_string()).collect())
            .unwrap_or_default();
        Self { allowed }
    }

    /// Whether a host is in scope. The verdict depends only on the host, so
    /// a request and its response always agree.
    pub fn in_scope(&self, host: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(host)
    }

    /// True when no allow-list was configured
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Sorted list of configured hostnames, None when unrestricted.
    /// Recorded in the artifact metadata.
    pub fn configured_domains(&self) -> Option<Vec<String>> {
        if self.allowed.is_empty() {
            return None;
        }
        let mut domains: Vec<String> = self.allowed.iter().cloned().collect();
        domains.sort();
        Some(domains)
    }
}
