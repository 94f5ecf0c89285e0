//! Bounded response-body representation
//!
//! Response bodies are never stored whole. Textual bodies keep a UTF-8
//! excerpt capped at a configured character budget; small binary bodies are
//! inlined as base64; anything larger leaves only a size note. The budgets
//! bound both memory and artifact size regardless of what the server sends.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Marker appended to excerpts cut at the character budget
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Content-type fragments that indicate a textual body
const TEXT_TYPES: [&str; 5] = ["text/", "json", "xml", "javascript", "html"];

/// Size budgets for body capture
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    /// Maximum characters kept from a textual body
    pub max_text_excerpt: usize,
    /// Maximum byte length of a binary body inlined as base64
    pub max_binary_inline: usize,
}

impl Default for BodyLimits {
    fn default() -> Self {
        Self {
            max_text_excerpt: 2000,
            max_binary_inline: 16384,
        }
    }
}

/// How a response body is represented on the exchange record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BodyRepr {
    Text {
        excerpt: Option<String>,
    },
    Binary {
        base64: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl BodyRepr {
    /// Representation for a request that never saw its response
    pub fn empty_text() -> Self {
        BodyRepr::Text { excerpt: None }
    }

    /// Build the bounded representation of a response body.
    ///
    /// A body counts as text when the declared content type matches a known
    /// textual family, or when the leading byte sniffs as JSON (`{`) or
    /// markup (`<`). Undecodable bytes in a textual body are replaced, not
    /// fatal.
    pub fn for_response(body: &[u8], content_type: &str, limits: &BodyLimits) -> Self {
        let ctype = content_type.to_ascii_lowercase();
        let looks_textual = TEXT_TYPES.iter().any(|t| ctype.contains(t))
            || body.starts_with(b"{")
            || body.starts_with(b"<");

        if looks_textual {
            return BodyRepr::Text {
                excerpt: text_excerpt(body, limits.max_text_excerpt),
            };
        }

        if body.len() <= limits.max_binary_inline {
            return BodyRepr::Binary {
                base64: Some(BASE64.encode(body)),
                note: None,
            };
        }

        BodyRepr::Binary {
            base64: None,
            note: Some(format!(
                "binary too large ({} bytes), not inlined",
                body.len()
            )),
        }
    }

    /// The artifact's one-letter kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            BodyRepr::Text { .. } => "text",
            BodyRepr::Binary { .. } => "binary",
        }
    }

    /// Textual excerpt, if this is a text body that had content
    pub fn excerpt(&self) -> Option<&str> {
        match self {
            BodyRepr::Text { excerpt } => excerpt.as_deref(),
            BodyRepr::Binary { .. } => None,
        }
    }
}

/// Decode and truncate a textual body. Empty bodies yield None.
fn text_excerpt(body: &[u8], max_chars: usize) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > max_chars {
        let mut excerpt: String = text.chars().take(max_chars).collect();
        excerpt.push_str(TRUNCATION_MARKER);
        Some(excerpt)
    } else {
        Some(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(text: usize, binary: usize) -> BodyLimits {
        BodyLimits {
            max_text_excerpt: text,
            max_binary_inline: binary,
        }
    }

    #[test]
    fn test_text_by_content_type() {
        let repr = BodyRepr::for_response(b"hello world", "text/plain", &BodyLimits::default());
        assert_eq!(repr.excerpt(), Some("hello world"));
        assert_eq!(repr.kind(), "text");
    }

    #[test]
    fn test_text_by_leading_byte_sniff() {
        let json = BodyRepr::for_response(b"{\"a\":1}", "application/octet-stream", &BodyLimits::default());
        assert_eq!(json.kind(), "text");

        let markup = BodyRepr::for_response(b"<html>", "", &BodyLimits::default());
        assert_eq!(markup.kind(), "text");
    }

    #[test]
    fn test_excerpt_bounded_with_marker() {
        let body = "a".repeat(5000);
        let repr = BodyRepr::for_response(body.as_bytes(), "text/html", &limits(100, 16384));

        let excerpt = repr.excerpt().unwrap();
        assert!(excerpt.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            excerpt.chars().count(),
            100 + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_excerpt_under_budget_untouched() {
        let repr = BodyRepr::for_response(b"short", "text/html", &limits(100, 16384));
        assert_eq!(repr.excerpt(), Some("short"));
    }

    #[test]
    fn test_small_binary_inlined() {
        let body = [0u8, 159, 146, 150];
        let repr = BodyRepr::for_response(&body, "application/octet-stream", &BodyLimits::default());
        match repr {
            BodyRepr::Binary { base64, note } => {
                assert_eq!(base64.as_deref(), Some(BASE64.encode(body).as_str()));
                assert!(note.is_none());
            }
            _ => panic!("expected binary"),
        }
    }

    #[test]
    fn test_large_binary_size_note_only() {
        let body = vec![0u8; 200];
        let repr = BodyRepr::for_response(&body, "application/octet-stream", &limits(2000, 100));
        match repr {
            BodyRepr::Binary { base64, note } => {
                assert!(base64.is_none());
                assert_eq!(note.as_deref(), Some("binary too large (200 bytes), not inlined"));
            }
            _ => panic!("expected binary"),
        }
    }

    #[test]
    fn test_empty_text_body() {
        let repr = BodyRepr::for_response(b"", "text/html", &BodyLimits::default());
        assert_eq!(repr, BodyRepr::Text { excerpt: None });
    }

    #[test]
    fn test_invalid_utf8_degrades() {
        let repr = BodyRepr::for_response(&[0xff, 0xfe, b'<'], "text/html", &BodyLimits::default());
        assert!(repr.excerpt().is_some());
    }
}
