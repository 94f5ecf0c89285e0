//! Merged parameter derivation
//!
//! An exchange's parameters are the union of its query-string fields and its
//! body-derived fields (JSON top-level keys or URL-encoded form fields), with
//! body fields overriding query fields on key collision. Multipart bodies are
//! not parsed; they are marked with a sentinel key instead.

use crate::flow::RequestEvent;
use serde_json::Value;
use std::collections::BTreeMap;
use url::form_urlencoded;
use url::Url;

/// Sentinel key marking an unparsed multipart body
pub const MULTIPART_SENTINEL: &str = "__multipart__";

/// Merged parameter map. Values keep their JSON shape: query and form fields
/// are strings (or arrays of strings for repeated keys), JSON body fields are
/// whatever the body declared.
pub type ParamMap = BTreeMap<String, Value>;

/// Derive the merged parameter map for a request.
///
/// A malformed declared-JSON body skips body extraction for this request
/// only; the query-side fields are still returned.
pub fn derive_params(req: &RequestEvent) -> ParamMap {
    let mut params = query_params(req);

    let content_type = req.content_type().to_ascii_lowercase();
    let body = req.body_bytes();

    if content_type.contains("application/json") {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => {
                for (key, value) in map {
                    params.insert(key, value);
                }
            }
            Ok(_) => {
                tracing::debug!("JSON body is not an object, skipping body params");
            }
            Err(e) => {
                tracing::debug!("Malformed JSON body, skipping body params: {}", e);
            }
        }
    } else if content_type.contains("application/x-www-form-urlencoded") {
        let pairs = form_urlencoded::parse(&body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        for (key, value) in collapse_pairs(pairs) {
            params.insert(key, value);
        }
    } else if content_type.contains("multipart/form-data") {
        params.insert(MULTIPART_SENTINEL.to_string(), Value::Bool(true));
    }

    params
}

/// Query-string fields alone, repeated keys collapsed per [`collapse_pairs`]
pub fn query_params(req: &RequestEvent) -> ParamMap {
    let pairs: Vec<(String, String)> = match Url::parse(&req.url) {
        Ok(url) => url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        // Proxy-relative URLs: fall back to whatever follows '?'
        Err(_) => match req.url.split_once('?') {
            Some((_, query)) => form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            None => Vec::new(),
        },
    };

    collapse_pairs(pairs).into_iter().collect()
}

/// Collapse repeated keys: a single-valued key becomes a scalar string,
/// a multi-valued key stays a sequence.
fn collapse_pairs(pairs: Vec<(String, String)>) -> Vec<(String, Value)> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();

    for (key, value) in pairs {
        if !grouped.contains_key(&key) {
            order.push(key.clone());
        }
        grouped.entry(key).or_default().push(value);
    }

    order
        .into_iter()
        .map(|key| {
            let mut values = grouped.remove(&key).unwrap_or_default();
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            (key, value)
        })
        .collect()
}
