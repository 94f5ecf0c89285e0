//! Interception-boundary data model
//!
//! Flow events mirror what a passthrough proxy observes: one event per
//! request and one per response, tied together by a proxy-assigned flow id.
//! A response event always carries its own request's metadata, so a response
//! can be recorded even when request-phase bookkeeping missed it.

use ahash::HashMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Ordered multi-map of header name to values.
///
/// This is the single enumeration contract for headers throughout the crate:
/// names compare case-insensitively, insertion order is preserved, and a name
/// may appear any number of times (`Set-Cookie` in particular).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeaderMap(Vec<(String, String)>);

impl HeaderMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// Append a header, keeping any existing values for the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for a name, case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for a name, in insertion order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Iterate all pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Collapse into a plain name -> value map (last writer wins).
    /// Used where the record format wants a flat mapping.
    pub fn to_flat_map(&self) -> HashMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Request-side flow event from the interception layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    /// Proxy-assigned flow identifier; the matching response reuses it
    pub flow_id: String,
    pub host: String,
    pub method: String,
    /// Full URL as the proxy saw it
    pub url: String,
    pub path: String,
    pub headers: HeaderMap,
    #[serde(default)]
    pub cookies: Vec<(String, String)>,
    /// Raw request body, base64-encoded on the wire
    #[serde(default)]
    pub body: Option<String>,
    /// Epoch seconds when the request was observed
    #[serde(default)]
    pub timestamp_start: Option<f64>,
}

/// Response-side flow event from the interception layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEvent {
    /// The request this response answers, as the proxy recorded it
    pub request: RequestEvent,
    pub status: u16,
    pub headers: HeaderMap,
    /// Raw response body, base64-encoded on the wire
    #[serde(default)]
    pub body: Option<String>,
    /// Epoch seconds when the response completed
    #[serde(default)]
    pub timestamp_end: Option<f64>,
}

impl RequestEvent {
    /// Declared request content type, empty string when absent
    pub fn content_type(&self) -> &str {
        self.headers.get("content-type").unwrap_or("")
    }

    /// Referer header value, if any
    pub fn referer(&self) -> Option<&str> {
        self.headers.get("referer")
    }

    /// Decode the wire body. Undecodable payloads degrade to empty.
    pub fn body_bytes(&self) -> Vec<u8> {
        decode_wire_body(self.body.as_deref())
    }
}

impl ResponseEvent {
    /// Declared response content type, empty string when absent
    pub fn content_type(&self) -> &str {
        self.headers.get("content-type").unwrap_or("")
    }

    /// Decode the wire body. Undecodable payloads degrade to empty.
    pub fn body_bytes(&self) -> Vec<u8> {
        decode_wire_body(self.body.as_deref())
    }
}

fn decode_wire_body(body: Option<&str>) -> Vec<u8> {
    match body {
        Some(b64) => BASE64.decode(b64).unwrap_or_else(|e| {
            tracing::warn!("Undecodable wire body, treating as empty: {}", e);
            Vec::new()
        }),
        None => Vec::new(),
    }
}
