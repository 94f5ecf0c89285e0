//! Correlation engine
//!
//! Owns all mutable capture state for one run: the scope filter, the page
//! map, the pending-record table, and the ledger of closed exchanges. The
//! engine is a plain state machine; callers are responsible for serializing
//! access (the pipeline worker owns exactly one engine).

use crate::correlator::builder::ExchangeBuilder;
use crate::error::Result;
use crate::exchange::{BodyLimits, Exchange};
use crate::flow::{RequestEvent, ResponseEvent};
use crate::pages::PageCorrelator;
use crate::scope::ScopeFilter;
use crate::signals::FingerprintCatalogue;
use chrono::{DateTime, Utc};

/// Static options for one capture run
#[derive(Debug, Clone, Default)]
pub struct CorrelatorOptions {
    /// Hostname allow-list; None or empty means capture everything
    pub allowed_domains: Option<Vec<String>>,
    /// Body capture budgets
    pub limits: BodyLimits,
}

/// Everything one finished run produced, ready for assembly
#[derive(Debug)]
pub struct CapturedRun {
    pub created_at: DateTime<Utc>,
    pub exchanges: Vec<Exchange>,
    pub allowed_domains: Option<Vec<String>>,
}

pub struct Correlator {
    scope: ScopeFilter,
    pages: PageCorrelator,
    builder: ExchangeBuilder,
    ledger: Vec<Exchange>,
    created_at: DateTime<Utc>,
}

impl Correlator {
    pub fn new(options: CorrelatorOptions) -> Result<Self> {
        let catalogue = FingerprintCatalogue::new()?;
        Ok(Self {
            scope: ScopeFilter::new(options.allowed_domains.as_deref()),
            pages: PageCorrelator::new(),
            builder: ExchangeBuilder::new(catalogue, options.limits),
            ledger: Vec::new(),
            created_at: Utc::now(),
        })
    }

    /// Handle a request event. Out-of-scope traffic is a silent no-op.
    /// Page identity is assigned eagerly, before the response is known.
    pub fn on_request(&mut self, req: &RequestEvent) {
        if !self.scope.in_scope(&req.host) {
            return;
        }
        let page_id = self.pages.assign(&req.url, req.referer());
        self.builder.open(req, page_id);
    }

    /// Handle a response event. Out-of-scope traffic is a silent no-op;
    /// the verdict derives from the request's host, so both phases agree.
    pub fn on_response(&mut self, resp: &ResponseEvent) {
        if !self.scope.in_scope(&resp.request.host) {
            return;
        }
        let fallback_page_id = self.pages.resolve(resp.request.referer());
        let exchange = self.builder.close(resp, fallback_page_id);
        self.ledger.push(exchange);
    }

    /// Finish the run: drain still-pending requests into the ledger and hand
    /// everything over for assembly. Consumes the engine, so a run finalizes
    /// exactly once.
    pub fn finalize(mut self) -> CapturedRun {
        let flushed = self.builder.drain_pending();
        if !flushed.is_empty() {
            tracing::info!(
                count = flushed.len(),
                "Flushing requests that never saw a response"
            );
            self.ledger.extend(flushed);
        }

        CapturedRun {
            created_at: self.created_at,
            exchanges: self.ledger,
            allowed_domains: self.scope.configured_domains(),
        }
    }

    /// Closed exchanges so far
    pub fn exchange_count(&self) -> usize {
        self.ledger.len()
    }

    /// Requests still awaiting their response
    pub fn pending_count(&self) -> usize {
        self.builder.pending_count()
    }

    /// Whether capture is unrestricted (no allow-list configured)
    pub fn is_unrestricted(&self) -> bool {
        self.scope.is_unrestricted()
    }
}
