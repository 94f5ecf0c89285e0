//! Error-fingerprint matching
//!
//! A fixed catalogue of vendor and error phrases matched case-insensitively
//! against response excerpts. Every matching pattern is collected, not just
//! the first; downstream consumers weigh the combination.

use crate::error::Result;
use regex::Regex;

/// Phrases that fingerprint server-side errors: SQL engine names,
/// stack-trace markers, fatal/syntax-error phrasing.
const ERROR_PATTERNS: [&str; 13] = [
    r"sql syntax",
    r"mysql",
    r"psql",
    r"postgres",
    r"sqlite",
    r"odbc",
    r"syntax error",
    r"unterminated string",
    r"exception",
    r"stack trace",
    r"warning: ",
    r"fatal error",
    r"line \d+",
];

/// Pre-compiled fingerprint catalogue
#[derive(Debug, Clone)]
pub struct FingerprintCatalogue {
    patterns: Vec<(String, Regex)>,
}

impl FingerprintCatalogue {
    /// Compile the built-in catalogue
    pub fn new() -> Result<Self> {
        let mut patterns = Vec::with_capacity(ERROR_PATTERNS.len());
        for source in ERROR_PATTERNS {
            let regex = Regex::new(&format!("(?i){}", source)).map_err(|e| {
                crate::error::FlowlensError::Config(format!(
                    "Invalid fingerprint pattern '{}': {}",
                    source, e
                ))
            })?;
            patterns.push((source.to_string(), regex));
        }
        Ok(Self { patterns })
    }

    /// Every catalogue pattern matching the excerpt, in catalogue order.
    /// The recorded value is the pattern source, which is the stable name
    /// consumers key on.
    pub fn matches(&self, excerpt: &str) -> Vec<String> {
        if excerpt.is_empty() {
            return Vec::new();
        }
        self.patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(excerpt))
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// Number of compiled patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
