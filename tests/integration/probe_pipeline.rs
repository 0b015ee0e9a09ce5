//! Probe pipeline tests against a mock HTTP server

use std::sync::Arc;

use chrono::DateTime;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use webwatch::Metric;
use webwatch::services::pinger::probe_target;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{CollectingProducer, resolved_target};

async fn mock_server_with_body(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn successful_probe_emits_one_metric() {
    let server = mock_server_with_body("<html><title>Bing</title></html>").await;
    let producer = Arc::new(CollectingProducer::default());

    probe_target(
        reqwest::Client::new(),
        resolved_target(&server.uri(), "<title>Bing</title>", 60),
        Arc::clone(&producer) as Arc<dyn webwatch::stream::StreamProducer>,
        String::from("test_topic"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    )
    .await;

    let sent = producer.sent();
    assert_eq!(sent.len(), 1);
    let (topic, payload) = &sent[0];
    assert_eq!(topic, "test_topic");

    let metric: Metric = serde_json::from_slice(payload).unwrap();
    assert_eq!(metric.status, 200);
    assert!(metric.matched);
    assert_eq!(metric.url, server.uri());
    assert_eq!(metric.source, "192.168.1.6");
    assert!(metric.elapsed_us > 0);
    // The timestamp is a parseable RFC 3339 instant.
    assert!(DateTime::parse_from_rfc3339(&metric.timestamp).is_ok());
}

#[tokio::test]
async fn absent_pattern_reports_matched_false() {
    let server = mock_server_with_body("<html><title>Nope</title></html>").await;
    let producer = Arc::new(CollectingProducer::default());

    probe_target(
        reqwest::Client::new(),
        resolved_target(&server.uri(), "<title>Bing</title>", 60),
        Arc::clone(&producer) as _,
        String::from("test_topic"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    )
    .await;

    let sent = producer.sent();
    assert_eq!(sent.len(), 1);
    let metric: Metric = serde_json::from_slice(&sent[0].1).unwrap();
    assert!(!metric.matched);
    assert_eq!(metric.status, 200);
}

#[tokio::test]
async fn error_status_still_produces_a_metric() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;
    let producer = Arc::new(CollectingProducer::default());

    probe_target(
        reqwest::Client::new(),
        resolved_target(&server.uri(), "<title>Bing</title>", 60),
        Arc::clone(&producer) as _,
        String::from("test_topic"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    )
    .await;

    let sent = producer.sent();
    assert_eq!(sent.len(), 1);
    let metric: Metric = serde_json::from_slice(&sent[0].1).unwrap();
    assert_eq!(metric.status, 404);
    assert!(!metric.matched);
}

#[tokio::test]
async fn fetch_failure_is_suppressed_and_emits_nothing() {
    let producer = Arc::new(CollectingProducer::default());

    // Nothing listens on this port; the fetch fails, the pipeline logs
    // and suppresses, and no metric is enqueued.
    probe_target(
        reqwest::Client::new(),
        resolved_target("http://127.0.0.1:1", "", 60),
        Arc::clone(&producer) as _,
        String::from("test_topic"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    )
    .await;

    assert!(producer.sent().is_empty());
}

#[tokio::test]
async fn one_failing_target_does_not_block_another() {
    let server = mock_server_with_body("<html><title>Bing</title></html>").await;
    let producer = Arc::new(CollectingProducer::default());

    // Both probes launched in the same tick: one fetch raises, one
    // succeeds. Exactly one metric comes out and nothing panics.
    let failing = probe_target(
        reqwest::Client::new(),
        resolved_target("http://127.0.0.1:1", "", 60),
        Arc::clone(&producer) as _,
        String::from("test_topic"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    );
    let succeeding = probe_target(
        reqwest::Client::new(),
        resolved_target(&server.uri(), "<title>Bing</title>", 60),
        Arc::clone(&producer) as _,
        String::from("test_topic"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    );
    futures::join!(failing, succeeding);

    let sent = producer.sent();
    assert_eq!(sent.len(), 1);
    let metric: Metric = serde_json::from_slice(&sent[0].1).unwrap();
    assert_eq!(metric.url, server.uri());
}

#[tokio::test]
async fn cancelled_probe_discards_its_metric() {
    let server = mock_server_with_body("<html></html>").await;
    let producer = Arc::new(CollectingProducer::default());

    let token = CancellationToken::new();
    token.cancel();

    probe_target(
        reqwest::Client::new(),
        resolved_target(&server.uri(), "", 60),
        Arc::clone(&producer) as _,
        String::from("test_topic"),
        String::from("192.168.1.6"),
        token,
    )
    .await;

    assert!(producer.sent().is_empty());
}
