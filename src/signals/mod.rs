//! Security signal extraction
//!
//! Pure, order-independent extractors applied to a closed exchange:
//! - reflection: request parameter values reappearing in the response body
//! - fingerprints: vendor/error phrases in the response body
//! - auth: coarse authentication-state classification from status and headers
//!
//! Extractors only ever see the bounded text excerpt of a response, so their
//! work is bounded regardless of the original body size. Binary bodies yield
//! no reflection or fingerprint signals.

mod auth;
mod fingerprints;
mod reflection;

pub use auth::{infer_auth_indicator, list_set_cookies, AuthIndicator};
pub use fingerprints::FingerprintCatalogue;
pub use reflection::reflected_params;

/// HTML-escape a parameter value the way a templating layer would,
/// for detecting escaped reflections
pub(crate) fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Undo the common HTML entity encodings found in response bodies.
/// Ampersand is folded last so double-encoded values resolve one level.
pub(crate) fn html_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
