//! Reflected-parameter detection
//!
//! A parameter is reflected when its value reappears in the response body,
//! verbatim or HTML-escaped. Detection checks three forms: the raw excerpt,
//! an entity-unescaped copy of the excerpt, and an entity-escaped copy of
//! the value itself, so `<b>` is found whether the body contains `<b>` or
//! `&lt;b&gt;`.

use super::{html_escape, html_unescape};
use crate::exchange::params::ParamMap;
use serde_json::Value;

/// Names of parameters whose value appears in the response excerpt.
/// Only scalar values participate; lists and objects are skipped, and an
/// empty value never matches.
pub fn reflected_params(excerpt: &str, params: &ParamMap) -> Vec<String> {
    if excerpt.is_empty() || params.is_empty() {
        return Vec::new();
    }

    let unescaped = html_unescape(excerpt);
    let mut reflected = Vec::new();

    for (name, value) in params {
        let Some(scalar) = scalar_value(value) else {
            continue;
        };
        if scalar.is_empty() {
            continue;
        }

        if excerpt.contains(&scalar)
            || unescaped.contains(&scalar)
            || excerpt.contains(&html_escape(&scalar))
        {
            reflected.push(name.clone());
        }
    }

    reflected
}

/// Textual form of a scalar parameter value; None for lists, objects, null
fn scalar_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
