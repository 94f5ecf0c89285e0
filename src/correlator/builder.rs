//! Exchange builder: the pending-record table
//!
//! A record opens when a request arrives and closes when its response does.
//! Records still open at finalization are drained in arrival order so every
//! observed request leaves a trace. A response with no pending record is
//! synthesized on the spot from the response's own request metadata;
//! responses are never dropped because request-phase bookkeeping missed them.

use crate::exchange::{BodyLimits, Exchange};
use crate::flow::{RequestEvent, ResponseEvent};
use crate::signals::FingerprintCatalogue;
use ahash::{HashMap, HashMapExt};

pub struct ExchangeBuilder {
    catalogue: FingerprintCatalogue,
    limits: BodyLimits,

    /// Flow id -> opened record
    pending: HashMap<String, Exchange>,

    /// Flow ids in arrival order; ids already closed are skipped at drain
    arrival_order: Vec<String>,
}

impl ExchangeBuilder {
    pub fn new(catalogue: FingerprintCatalogue, limits: BodyLimits) -> Self {
        Self {
            catalogue,
            limits,
            pending: HashMap::new(),
            arrival_order: Vec::new(),
        }
    }

    /// Open a pending record for a request. Each flow id opens at most one
    /// record; a duplicate id replaces the earlier record.
    pub fn open(&mut self, req: &RequestEvent, page_id: Option<String>) {
        let record = Exchange::open(req, page_id);
        if self.pending.insert(req.flow_id.clone(), record).is_none() {
            self.arrival_order.push(req.flow_id.clone());
        }
        tracing::trace!(flow_id = %req.flow_id, url = %req.url, "Opened pending record");
    }

    /// Close the pending record for a response, or synthesize one when no
    /// pending record exists. `fallback_page_id` is the page identity a
    /// synthesized record should carry.
    pub fn close(&mut self, resp: &ResponseEvent, fallback_page_id: Option<String>) -> Exchange {
        let mut record = match self.pending.remove(&resp.request.flow_id) {
            Some(record) => record,
            None => {
                tracing::warn!(
                    flow_id = %resp.request.flow_id,
                    url = %resp.request.url,
                    "Response without pending record, synthesizing"
                );
                Exchange::open(&resp.request, fallback_page_id)
            }
        };

        record.close(resp, &self.catalogue, &self.limits);
        record
    }

    /// Drain every still-open record in arrival order. Drained records keep
    /// their null status code and empty derived fields.
    pub fn drain_pending(&mut self) -> Vec<Exchange> {
        let drained: Vec<Exchange> = self
            .arrival_order
            .drain(..)
            .filter_map(|flow_id| self.pending.remove(&flow_id))
            .collect();
        drained
    }

    /// Number of requests still awaiting their response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::HeaderMap;

    fn builder() -> ExchangeBuilder {
        ExchangeBuilder::new(FingerprintCatalogue::new().unwrap(), BodyLimits::default())
    }

    fn request(flow_id: &str, url: &str) -> RequestEvent {
        RequestEvent {
            flow_id: flow_id.to_string(),
            host: "example.com".to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            path: url.to_string(),
            headers: HeaderMap::new(),
            cookies: vec![],
            body: None,
            timestamp_start: None,
        }
    }

    fn response(req: RequestEvent, status: u16) -> ResponseEvent {
        ResponseEvent {
            request: req,
            status,
            headers: HeaderMap::new(),
            body: None,
            timestamp_end: None,
        }
    }

    #[test]
    fn test_open_then_close() {
        let mut builder = builder();
        builder.open(&request("f1", "/a"), Some("p-1".to_string()));
        assert_eq!(builder.pending_count(), 1);

        let closed = builder.close(&response(request("f1", "/a"), 200), None);
        assert_eq!(closed.status_code, Some(200));
        assert_eq!(closed.page_id.as_deref(), Some("p-1"));
        assert_eq!(builder.pending_count(), 0);
    }

    #[test]
    fn test_close_without_pending_synthesizes() {
        let mut builder = builder();
        let closed = builder.close(
            &response(request("ghost", "/b"), 404),
            Some("p-9".to_string()),
        );
        assert_eq!(closed.status_code, Some(404));
        assert_eq!(closed.page_id.as_deref(), Some("p-9"));
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let mut builder = builder();
        builder.open(&request("f1", "/first"), None);
        builder.open(&request("f2", "/second"), None);
        builder.open(&request("f3", "/third"), None);

        // f2 closes normally, the others stay pending
        builder.close(&response(request("f2", "/second"), 200), None);

        let drained = builder.drain_pending();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].url, "/first");
        assert_eq!(drained[1].url, "/third");
        assert!(drained.iter().all(|e| e.is_pending()));
        assert_eq!(builder.pending_count(), 0);
    }
}
