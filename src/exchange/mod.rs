//! Exchange records
//!
//! An exchange is one correlated request/response pair plus the signals
//! derived from it. A record opens when its request is observed and closes
//! when the matching response arrives; a record still open at finalization
//! is flushed with a null status code so every observed request leaves a
//! trace.

pub mod body;
pub mod params;

pub use body::{BodyLimits, BodyRepr};
pub use params::{derive_params, ParamMap, MULTIPART_SENTINEL};

use crate::flow::{RequestEvent, ResponseEvent};
use crate::signals::{
    infer_auth_indicator, list_set_cookies, reflected_params, AuthIndicator, FingerprintCatalogue,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One correlated request/response pair with derived security signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    /// Unique record id
    pub id: Uuid,

    /// Logical page this exchange belongs to; absent when the referer chain
    /// never resolved
    pub page_id: Option<String>,

    pub url: String,
    pub path: String,
    pub method: String,

    pub request_headers: HashMap<String, String>,
    pub request_cookies: HashMap<String, String>,
    pub request_content_type: String,

    /// Merged parameters: query fields plus body-derived fields,
    /// body winning on collision
    pub params: ParamMap,

    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp_start: Option<f64>,

    /// Null until the matching response is observed; a null status in the
    /// final artifact means the response never arrived
    pub status_code: Option<u16>,

    pub response_headers: HashMap<String, String>,
    pub response_content_type: String,
    pub response_body: BodyRepr,

    /// Parameter names whose value reappears in the response body
    pub reflected_params: Vec<String>,

    /// Matched error-fingerprint patterns
    pub error_fingerprints: Vec<String>,

    pub auth_indicator: AuthIndicator,
    pub location_header: Option<String>,
    pub set_cookies: Vec<String>,
    pub timestamp_end: Option<f64>,
}

impl Exchange {
    /// Open a record from a request event, with its page identity already
    /// assigned. Response-side fields start empty.
    pub fn open(req: &RequestEvent, page_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_id,
            url: req.url.clone(),
            path: req.path.clone(),
            method: req.method.clone(),
            request_headers: req.headers.to_flat_map().into_iter().collect(),
            request_cookies: req.cookies.iter().cloned().collect(),
            request_content_type: req.content_type().to_string(),
            params: derive_params(req),
            referer: req.referer().map(|r| r.to_string()),
            user_agent: req.headers.get("user-agent").map(|ua| ua.to_string()),
            timestamp_start: req.timestamp_start,
            status_code: None,
            response_headers: HashMap::new(),
            response_content_type: String::new(),
            response_body: BodyRepr::empty_text(),
            reflected_params: Vec::new(),
            error_fingerprints: Vec::new(),
            auth_indicator: AuthIndicator::None,
            location_header: None,
            set_cookies: Vec::new(),
            timestamp_end: None,
        }
    }

    /// Merge the response into this record and run the signal extractors.
    /// Binary bodies yield no reflection or fingerprint signals.
    pub fn close(
        &mut self,
        resp: &ResponseEvent,
        catalogue: &FingerprintCatalogue,
        limits: &BodyLimits,
    ) {
        let body = resp.body_bytes();

        self.status_code = Some(resp.status);
        self.response_headers = resp.headers.to_flat_map().into_iter().collect();
        self.response_content_type = resp.content_type().to_string();
        self.response_body = BodyRepr::for_response(&body, resp.content_type(), limits);
        self.location_header = resp.headers.get("location").map(|l| l.to_string());
        self.set_cookies = list_set_cookies(&resp.headers);
        self.auth_indicator = infer_auth_indicator(resp.status, &resp.headers);
        self.timestamp_end = resp.timestamp_end;

        let excerpt = self.response_body.excerpt().unwrap_or("");
        self.reflected_params = reflected_params(excerpt, &self.params);
        self.error_fingerprints = catalogue.matches(excerpt);
    }

    /// Whether this record is still waiting for its response
    pub fn is_pending(&self) -> bool {
        self.status_code.is_none()
    }
}
