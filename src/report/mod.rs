//! Artifact assembly and serialization
//!
//! Groups a finished run's exchanges by page, renumbers each page's
//! endpoints as a dense zero-based index, and writes the compact page-batch
//! document. The abbreviated field names are a fixed contract with
//! downstream consumers; `meta.compact_keys` documents the mapping inside
//! the artifact itself.

use crate::correlator::CapturedRun;
use crate::error::{FlowlensError, Result};
use crate::exchange::{Exchange, ParamMap};
use crate::signals::AuthIndicator;
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Schema tag stamped on every artifact
pub const SCHEMA_VERSION: &str = "page_batch_v1";

/// Page identity used for exchanges whose referer chain never resolved
const UNKNOWN_PAGE_ID: &str = "p-unknown";

/// Artifact metadata block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub schema: String,
    pub created_at: String,
    pub entries_count: usize,
    /// Sorted configured scope, null when capture was unrestricted
    pub allowed_domains: Option<Vec<String>>,
    /// The grouping is inferred from referer chains, not a session boundary
    pub page_grouping: String,
    /// Abbreviation -> meaning, the documented field-name contract
    pub compact_keys: BTreeMap<String, String>,
}

/// Compact response-body projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactBody {
    #[serde(rename = "t")]
    pub kind: String,
    #[serde(rename = "x")]
    pub excerpt: Option<String>,
}

/// Compact per-exchange record: the field set downstream signal consumers
/// need, nothing more
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactEndpoint {
    /// Dense zero-based index within the page, the stable downstream
    /// reference for this endpoint
    #[serde(rename = "i")]
    pub index: usize,
    #[serde(rename = "m")]
    pub method: String,
    #[serde(rename = "p")]
    pub path_or_url: String,
    #[serde(rename = "sc")]
    pub status_code: Option<u16>,
    #[serde(rename = "ct")]
    pub content_type: String,
    #[serde(rename = "rb")]
    pub body: CompactBody,
    #[serde(rename = "prms")]
    pub params: ParamMap,
    #[serde(rename = "x")]
    pub reflected_params: Vec<String>,
    #[serde(rename = "ek")]
    pub error_fingerprints: Vec<String>,
    #[serde(rename = "ai")]
    pub auth_indicator: AuthIndicator,
    #[serde(rename = "loc")]
    pub location: Option<String>,
    #[serde(rename = "setc")]
    pub set_cookies: Vec<String>,
}

/// One page with its endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    #[serde(rename = "pid")]
    pub page_id: String,
    /// Canonical URL: the first refererless exchange's URL, else the first
    /// exchange's URL, else null for an empty page
    #[serde(rename = "u")]
    pub url: Option<String>,
    #[serde(rename = "eps")]
    pub endpoints: Vec<CompactEndpoint>,
}

/// The whole serialized run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub meta: ArtifactMeta,
    pub pages: Vec<PageEntry>,
}

/// Assemble the artifact from a finished run. Pages appear in first-seen
/// order; endpoints keep arrival order and get their dense index here.
pub fn build_artifact(run: &CapturedRun) -> Artifact {
    let mut page_order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<&Exchange>> = HashMap::new();

    for exchange in &run.exchanges {
        let pid = exchange
            .page_id
            .clone()
            .unwrap_or_else(|| UNKNOWN_PAGE_ID.to_string());
        if !buckets.contains_key(&pid) {
            page_order.push(pid.clone());
        }
        buckets.entry(pid).or_default().push(exchange);
    }

    let pages = page_order
        .into_iter()
        .map(|pid| {
            let exchanges = buckets.remove(&pid).unwrap_or_default();
            let url = canonical_url(&exchanges);
            let endpoints = exchanges
                .into_iter()
                .enumerate()
                .map(|(index, e)| compact_endpoint(index, e))
                .collect();
            PageEntry {
                page_id: pid,
                url,
                endpoints,
            }
        })
        .collect();

    Artifact {
        meta: ArtifactMeta {
            schema: SCHEMA_VERSION.to_string(),
            created_at: run.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            entries_count: run.exchanges.len(),
            allowed_domains: run.allowed_domains.clone(),
            page_grouping: "referer-heuristic (approximate)".to_string(),
            compact_keys: compact_keys(),
        },
        pages,
    }
}

fn canonical_url(exchanges: &[&Exchange]) -> Option<String> {
    exchanges
        .iter()
        .find(|e| e.referer.is_none())
        .or_else(|| exchanges.first())
        .map(|e| e.url.clone())
}

fn compact_endpoint(index: usize, e: &Exchange) -> CompactEndpoint {
    let path_or_url = if e.path.is_empty() {
        e.url.clone()
    } else {
        e.path.clone()
    };

    CompactEndpoint {
        index,
        method: e.method.clone(),
        path_or_url,
        status_code: e.status_code,
        content_type: e.response_content_type.clone(),
        body: CompactBody {
            kind: e.response_body.kind().to_string(),
            excerpt: e.response_body.excerpt().map(|x| x.to_string()),
        },
        params: e.params.clone(),
        reflected_params: e.reflected_params.clone(),
        error_fingerprints: e.error_fingerprints.clone(),
        auth_indicator: e.auth_indicator,
        location: e.location_header.clone(),
        set_cookies: e.set_cookies.clone(),
    }
}

fn compact_keys() -> BTreeMap<String, String> {
    [
        ("pid", "page_id"),
        ("u", "page_url"),
        ("eps", "endpoints"),
        ("i", "index"),
        ("m", "method"),
        ("p", "path_or_url"),
        ("sc", "status_code"),
        ("ct", "content_type"),
        ("rb.t", "response_body.type"),
        ("rb.x", "response_body.excerpt"),
        ("prms", "params(merged)"),
        ("x", "reflected_param_names"),
        ("ek", "error_keywords"),
        ("ai", "auth_indicator"),
        ("loc", "location_header"),
        ("setc", "set_cookie_list"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Writes one artifact per run into the configured output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    out_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Assemble and write the run's artifact. A write failure is fatal:
    /// the whole run's value is in this one file.
    pub fn write(&self, run: &CapturedRun) -> Result<PathBuf> {
        let artifact = build_artifact(run);
        let path = self
            .out_dir
            .join(format!("pages_{}.json", run.created_at.format("%Y-%m-%d_%H%M%S")));

        std::fs::create_dir_all(&self.out_dir).map_err(|e| FlowlensError::Io {
            source: e,
            context: format!("Failed to create output directory: {:?}", self.out_dir),
        })?;

        let content = serde_json::to_string_pretty(&artifact).map_err(|e| FlowlensError::Json {
            source: e,
            context: "Failed to serialize artifact".to_string(),
        })?;

        std::fs::write(&path, content).map_err(|e| FlowlensError::Artifact {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!(
            entries = artifact.meta.entries_count,
            pages = artifact.pages.len(),
            path = %path.display(),
            "Wrote page-batch artifact"
        );

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::{Correlator, CorrelatorOptions};
    use crate::flow::{HeaderMap, RequestEvent, ResponseEvent};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;

    fn request(flow_id: &str, url: &str, referer: Option<&str>) -> RequestEvent {
        let mut headers = HeaderMap::new();
        if let Some(r) = referer {
            headers.append("Referer", r);
        }
        RequestEvent {
            flow_id: flow_id.to_string(),
            host: "example.com".to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            path: url.to_string(),
            headers,
            cookies: vec![],
            body: None,
            timestamp_start: None,
        }
    }

    fn response(req: RequestEvent, status: u16, body: &str) -> ResponseEvent {
        ResponseEvent {
            request: req,
            status,
            headers: HeaderMap::from_pairs(vec![(
                "Content-Type".to_string(),
                "text/html".to_string(),
            )]),
            body: Some(BASE64.encode(body.as_bytes())),
            timestamp_end: None,
        }
    }

    fn sample_run() -> CapturedRun {
        let mut c = Correlator::new(CorrelatorOptions::default()).unwrap();

        let root = request("f1", "https://example.com/login", None);
        let child = request(
            "f2",
            "https://example.com/api/check",
            Some("https://example.com/login"),
        );
        c.on_request(&root);
        c.on_response(&response(root, 200, "<form>"));
        c.on_request(&child);
        c.on_response(&response(child, 200, "{}"));
        // A request that never sees its response
        c.on_request(&request("f3", "https://example.com/api/slow", Some("https://example.com/login")));

        c.finalize()
    }

    #[test]
    fn test_grouping_and_dense_index() {
        let run = sample_run();
        let artifact = build_artifact(&run);

        assert_eq!(artifact.pages.len(), 1);
        let page = &artifact.pages[0];
        assert_eq!(page.endpoints.len(), 3);
        let indices: Vec<usize> = page.endpoints.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_canonical_url_is_refererless_root() {
        let run = sample_run();
        let artifact = build_artifact(&run);
        assert_eq!(
            artifact.pages[0].url.as_deref(),
            Some("https://example.com/login")
        );
    }

    #[test]
    fn test_meta_counts_pending_entries() {
        let run = sample_run();
        let artifact = build_artifact(&run);

        assert_eq!(artifact.meta.entries_count, 3);
        assert_eq!(artifact.meta.schema, SCHEMA_VERSION);
        // The pending exchange is present with a null status
        let pending = artifact.pages[0]
            .endpoints
            .iter()
            .find(|e| e.status_code.is_none());
        assert!(pending.is_some());
    }

    #[test]
    fn test_compact_field_names_on_the_wire() {
        let run = sample_run();
        let artifact = build_artifact(&run);
        let value = serde_json::to_value(&artifact).unwrap();

        let page = &value["pages"][0];
        assert!(page.get("pid").is_some());
        assert!(page.get("u").is_some());
        let ep = &page["eps"][0];
        for key in ["i", "m", "p", "sc", "ct", "rb", "prms", "x", "ek", "ai", "loc", "setc"] {
            assert!(ep.get(key).is_some(), "missing compact key {}", key);
        }
        assert!(ep["rb"].get("t").is_some());
        assert_eq!(value["meta"]["compact_keys"]["ek"], "error_keywords");
    }

    #[test]
    fn test_writer_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = ArtifactWriter::new(dir.path().join("out"));

        let run = sample_run();
        let path = writer.write(&run).unwrap();
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Artifact = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.meta.entries_count, 3);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        // Use a regular file where the output directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let writer = ArtifactWriter::new(&blocker);
        let run = sample_run();
        assert!(writer.write(&run).is_err());
    }
}
