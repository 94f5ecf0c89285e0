use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flowlens::correlator::{Correlator, CorrelatorOptions};
use flowlens::flow::{HeaderMap, RequestEvent, ResponseEvent};
use flowlens::report::{build_artifact, ArtifactWriter, SCHEMA_VERSION};
use tempfile::TempDir;

fn request(flow_id: &str, url: &str, referer: Option<&str>) -> RequestEvent {
    let parsed = url::Url::parse(url).unwrap();
    let mut headers = HeaderMap::new();
    if let Some(r) = referer {
        headers.append("Referer", r);
    }
    RequestEvent {
        flow_id: flow_id.to_string(),
        host: parsed.host_str().unwrap().to_string(),
        method: "GET".to_string(),
        url: url.to_string(),
        path: parsed.path().to_string(),
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

/// Two root navigations with children, plus one exchange whose referer never
/// resolves before any page exists
fn multi_page_run() -> flowlens::correlator::CapturedRun {
    let mut c = Correlator::new(CorrelatorOptions::default()).unwrap();

    let home = request("f1", "https://site.example/home", None);
    c.on_request(&home);
    c.on_response(&response(home, 200, "<html>home</html>"));

    let home_api = request(
        "f2",
        "https://site.example/api/feed",
        Some("https://site.example/home"),
    );
    c.on_request(&home_api);
    c.on_response(&response(home_api, 200, "{}"));

    let settings = request("f3", "https://site.example/settings", None);
    c.on_request(&settings);
    c.on_response(&response(settings, 200, "<html>settings</html>"));

    let settings_api = request(
        "f4",
        "https://site.example/api/profile",
        Some("https://site.example/settings"),
    );
    c.on_request(&settings_api);
    c.on_response(&response(settings_api, 200, "{}"));

    c.finalize()
}

#[test]
fn test_pages_in_first_seen_order() {
    let artifact = build_artifact(&multi_page_run());

    assert_eq!(artifact.pages.len(), 2);
    assert_eq!(
        artifact.pages[0].url.as_deref(),
        Some("https://site.example/home")
    );
    assert_eq!(
        artifact.pages[1].url.as_deref(),
        Some("https://site.example/settings")
    );
}

#[test]
fn test_indices_dense_per_page() {
    let artifact = build_artifact(&multi_page_run());

    for page in &artifact.pages {
        let indices: Vec<usize> = page.endpoints.iter().map(|e| e.index).collect();
        let expected: Vec<usize> = (0..page.endpoints.len()).collect();
        assert_eq!(indices, expected, "page {}", page.page_id);
    }
}

#[test]
fn test_meta_block() {
    let run = multi_page_run();
    let artifact = build_artifact(&run);

    assert_eq!(artifact.meta.schema, SCHEMA_VERSION);
    assert_eq!(artifact.meta.entries_count, 4);
    assert_eq!(artifact.meta.allowed_domains, None);
    assert_eq!(artifact.meta.page_grouping, "referer-heuristic (approximate)");
    assert_eq!(
        artifact.meta.compact_keys.get("x").map(String::as_str),
        Some("reflected_param_names")
    );
    // created_at is ISO8601 with a Z suffix
    assert!(artifact.meta.created_at.ends_with('Z'));
    assert!(artifact.meta.created_at.contains('T'));
}

#[test]
fn test_orphan_exchange_lands_in_unknown_bucket() {
    let mut c = Correlator::new(CorrelatorOptions::default()).unwrap();

    // Referer present, never seen as a page root, nothing minted yet:
    // no identity can be resolved
    let orphan = request(
        "f1",
        "https://site.example/api/poll",
        Some("https://site.example/gone"),
    );
    c.on_request(&orphan);
    c.on_response(&response(orphan, 200, "{}"));

    let artifact = build_artifact(&c.finalize());
    assert_eq!(artifact.pages.len(), 1);
    assert_eq!(artifact.pages[0].page_id, "p-unknown");
    assert_eq!(
        artifact.pages[0].url.as_deref(),
        Some("https://site.example/api/poll")
    );
}

#[test]
fn test_artifact_file_name_and_content() {
    let dir = TempDir::new().unwrap();
    let writer = ArtifactWriter::new(dir.path().to_path_buf());

    let run = multi_page_run();
    let path = writer.write(&run).unwrap();

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("pages_"));
    assert!(name.ends_with(".json"));

    let content = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["meta"]["schema"], SCHEMA_VERSION);
    assert_eq!(value["pages"].as_array().unwrap().len(), 2);
}

#[test]
fn test_write_failure_reported_not_swallowed() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file in the way").unwrap();

    let writer = ArtifactWriter::new(&blocker);
    let err = writer.write(&multi_page_run()).unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains("not-a-dir") || message.to_lowercase().contains("directory"),
        "unexpected error: {}",
        message
    );
}
