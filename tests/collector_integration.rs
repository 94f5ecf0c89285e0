use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flowlens::config::Config;
use flowlens::correlator::{Collector, FlowMessage, IngestClient};
use flowlens::flow::{HeaderMap, RequestEvent, ResponseEvent};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn test_config(base: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.capture.socket_path = base.join("ingest.sock");
    config.capture.buffer_size = 100;
    config.output.directory = base.join("artifacts");
    config.scope.allowed_domains = Some(vec!["target.example".to_string()]);
    config
}

fn request(flow_id: &str, url: &str, referer: Option<&str>) -> RequestEvent {
    let mut headers = HeaderMap::new();
    if let Some(r) = referer {
        headers.append("Referer", r);
    }
    RequestEvent {
        flow_id: flow_id.to_string(),
        host: "target.example".to_string(),
        method: "GET".to_string(),
        url: url.to_string(),
        path: url.trim_start_matches("https://target.example").to_string(),
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

#[tokio::test]
async fn test_collector_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let socket_path = config.capture.socket_path.clone();
    let out_dir = config.output.directory.clone();

    let mut collector = Collector::new(config);
    let collector_handle = tokio::spawn(async move { collector.run().await });

    // Wait for the socket to come up
    sleep(Duration::from_millis(100)).await;

    let client = IngestClient::new(socket_path);

    // Status probe
    let ack = client
        .send(&FlowMessage::Status)
        .await
        .expect("Failed to send status probe");
    assert!(ack.success, "Status probe should succeed");

    // Stream a root navigation and one child call over one connection
    let mut conn = client.connect().await.expect("Failed to connect");

    let root = request("f1", "https://target.example/home", None);
    let ack = conn
        .send(&FlowMessage::Request(root.clone()))
        .await
        .unwrap();
    assert!(ack.success);

    let ack = conn
        .send(&FlowMessage::Response(response(root, 200, "<html>home</html>")))
        .await
        .unwrap();
    assert!(ack.success);

    let child = request(
        "f2",
        "https://target.example/api/items",
        Some("https://target.example/home"),
    );
    conn.send(&FlowMessage::Request(child.clone())).await.unwrap();
    conn.send(&FlowMessage::Response(response(child, 200, "{\"items\":[]}")))
        .await
        .unwrap();

    // End the session
    let ack = conn.send(&FlowMessage::Done).await.unwrap();
    assert!(ack.success);

    // The collector finalizes and returns the artifact path
    let artifact_path = collector_handle
        .await
        .expect("Collector task panicked")
        .expect("Collector run failed");

    assert!(artifact_path.starts_with(&out_dir));
    assert!(artifact_path.exists());

    let content = std::fs::read_to_string(&artifact_path).unwrap();
    let artifact: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert_eq!(artifact["meta"]["schema"], "page_batch_v1");
    assert_eq!(artifact["meta"]["entries_count"], 2);
    assert_eq!(
        artifact["meta"]["allowed_domains"],
        serde_json::json!(["target.example"])
    );

    let pages = artifact["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["u"], "https://target.example/home");
    assert_eq!(pages[0]["eps"].as_array().unwrap().len(), 2);
    assert_eq!(pages[0]["eps"][0]["i"], 0);
    assert_eq!(pages[0]["eps"][1]["i"], 1);
}

#[tokio::test]
async fn test_collector_drops_out_of_scope_traffic() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let socket_path = config.capture.socket_path.clone();

    let mut collector = Collector::new(config);
    let collector_handle = tokio::spawn(async move { collector.run().await });
    sleep(Duration::from_millis(100)).await;

    let client = IngestClient::new(socket_path);
    let mut conn = client.connect().await.unwrap();

    let mut outside = request("f1", "https://elsewhere.example/", None);
    outside.host = "elsewhere.example".to_string();
    conn.send(&FlowMessage::Request(outside.clone())).await.unwrap();
    conn.send(&FlowMessage::Response(response(outside, 200, "<html>")))
        .await
        .unwrap();
    conn.send(&FlowMessage::Done).await.unwrap();

    let artifact_path = collector_handle.await.unwrap().unwrap();
    let content = std::fs::read_to_string(&artifact_path).unwrap();
    let artifact: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert_eq!(artifact["meta"]["entries_count"], 0);
    assert!(artifact["pages"].as_array().unwrap().is_empty());
}
