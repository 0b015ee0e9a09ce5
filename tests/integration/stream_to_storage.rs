//! End-to-end flow: probe -> stream -> batch insert pipeline
//!
//! Exercises the full path with the in-process transport and a capturing
//! store: a metric built by the probe pipeline, serialized to the stream,
//! decoded by the insert pipeline, lands as a parameter tuple in insert
//! bind order.

use chrono::DateTime;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use webwatch::services::inserter::process_batch;
use webwatch::services::pinger::probe_target;
use webwatch::stream::channel_stream;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{CapturingStore, resolved_target};

#[tokio::test]
async fn probed_metric_round_trips_into_a_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Bing</title> and more"))
        .mount(&server)
        .await;

    let (producer, consumer) = channel_stream("metrics", 8);
    let store = CapturingStore::default();

    probe_target(
        reqwest::Client::new(),
        resolved_target(&server.uri(), "<title>Bing</title>", 60),
        producer,
        String::from("metrics"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    )
    .await;

    process_batch(consumer.as_ref(), "default_table", &store)
        .await
        .unwrap();

    let inserted = store.inserted();
    assert_eq!(inserted.len(), 1);
    let (table, rows) = &inserted[0];
    assert_eq!(table, "default_table");
    assert_eq!(rows.len(), 1);

    // Parameter tuple order: timestamp, source, target, elapsed_us,
    // status, matched.
    let row = &rows[0];
    assert!(row.time_stamp <= chrono::Utc::now());
    assert_eq!(row.source, "192.168.1.6");
    assert_eq!(row.target, server.uri());
    assert!(row.elapsed_us > 0);
    assert_eq!(row.status, 200);
    assert!(row.matched);
}

#[tokio::test]
async fn three_records_with_one_malformed_insert_two_rows() {
    let (producer, consumer) = channel_stream("metrics", 8);
    let store = CapturingStore::default();

    let good = |url: &str| {
        serde_json::to_vec(&webwatch::Metric {
            timestamp: String::from("2023-04-16T09:02:42.068288+00:00"),
            source: String::from("192.168.1.6"),
            url: url.to_string(),
            elapsed_us: 42_000,
            status: 200,
            matched: true,
        })
        .unwrap()
    };

    use webwatch::stream::StreamProducer;
    producer.send("metrics", good("https://google.com")).await.unwrap();
    producer.send("metrics", b"definitely not json".to_vec()).await.unwrap();
    producer.send("metrics", good("https://bing.com")).await.unwrap();

    process_batch(consumer.as_ref(), "default_table", &store)
        .await
        .unwrap();

    let inserted = store.inserted();
    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].1.len(), 2);

    let expected_ts = DateTime::parse_from_rfc3339("2023-04-16T09:02:42.068288+00:00")
        .unwrap()
        .with_timezone(&chrono::Utc);
    assert!(inserted[0].1.iter().all(|row| row.time_stamp == expected_ts));
}

#[tokio::test]
async fn bing_scenario_produces_expected_metric_values() {
    // Concrete scenario from the design discussion: status 200, body
    // containing the pattern, response measured in microseconds.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><title>Bing</title></html>")
                .set_delay(std::time::Duration::from_millis(42)),
        )
        .mount(&server)
        .await;

    let (producer, consumer) = channel_stream("metrics", 8);

    probe_target(
        reqwest::Client::new(),
        resolved_target(&server.uri(), "<title>Bing</title>", 60),
        producer,
        String::from("metrics"),
        String::from("192.168.1.6"),
        CancellationToken::new(),
    )
    .await;

    use webwatch::stream::StreamConsumer;
    let batch = consumer.poll().await;
    let payloads = super::helpers::flatten(batch);
    assert_eq!(payloads.len(), 1);

    let metric: webwatch::Metric = serde_json::from_slice(&payloads[0]).unwrap();
    assert_eq!(metric.status, 200);
    assert!(metric.matched);
    // 42 ms of server delay puts the elapsed time at 42000 µs or above.
    assert!(metric.elapsed_us >= 42_000);
}
