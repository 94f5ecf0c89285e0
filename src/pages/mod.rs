//! Page correlation
//!
//! Assigns each request a logical page identity using only referer headers
//! and arrival order; no session or tab identifier exists at this layer, so
//! the grouping is approximate by construction. A refererless request starts
//! a new page and registers its own URL as that page's root, so later
//! requests whose referer is that URL join the page. A referer that was
//! never seen as a page root falls back to the most recently minted page
//! rather than orphaning the exchange.

use ahash::{HashMap, HashMapExt};
use chrono::Utc;

/// Stateful URL -> page identity mapping for one run
#[derive(Debug)]
pub struct PageCorrelator {
    /// Page-root URL -> identity
    page_map: HashMap<String, String>,

    /// Most recently minted identity, the fallback for unknown referers
    last_page_id: Option<String>,

    /// Millisecond stamp of the last minted identity, bumped on collision so
    /// identities stay unique within a run
    last_minted_ms: i64,
}

impl PageCorrelator {
    pub fn new() -> Self {
        Self {
            page_map: HashMap::new(),
            last_page_id: None,
            last_minted_ms: 0,
        }
    }

    /// Assign a page identity at request time.
    ///
    /// No referer: this is a top-level navigation — mint a fresh identity
    /// and remember this URL as its root. With a referer: resolve through
    /// the root map, falling back to the last minted identity. Returns None
    /// only when a referer is present, unknown, and nothing was minted yet.
    pub fn assign(&mut self, url: &str, referer: Option<&str>) -> Option<String> {
        match referer {
            None => {
                let page_id = self.mint();
                self.page_map.insert(url.to_string(), page_id.clone());
                self.last_page_id = Some(page_id.clone());
                Some(page_id)
            }
            Some(referer) => self.resolve(Some(referer)),
        }
    }

    /// Resolve an identity without minting. Used when synthesizing a record
    /// for a response whose request was never bookkept.
    pub fn resolve(&self, referer: Option<&str>) -> Option<String> {
        referer
            .and_then(|r| self.page_map.get(r).cloned())
            .or_else(|| self.last_page_id.clone())
    }

    /// Number of distinct page roots seen so far
    pub fn page_count(&self) -> usize {
        self.page_map.len()
    }

    fn mint(&mut self) -> String {
        let now_ms = Utc::now().timestamp_millis();
        let stamp = now_ms.max(self.last_minted_ms + 1);
        self.last_minted_ms = stamp;
        format!("p-{}", stamp)
    }
}

impl Default for PageCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
