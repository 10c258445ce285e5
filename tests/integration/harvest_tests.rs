//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to stand in for a vendor site and run the full
//! discover, fetch, extract, dedup and save cycle end-to-end.

use firmharvest::config::{parse_config, Config};
use firmharvest::harvest::{run_harvest_until, HarvestOptions};
use firmharvest::record::{FirmwareRecord, WorkItem};
use firmharvest::storage::{JsonStore, RecordStore};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Settings shared by every test: JSON responses, fast retries, a save
/// after every record and every item
fn common_sections(records_path: &Path) -> String {
    format!(
        r#"
[harvest]
vendor = "TestVendor"
records-path = "{}"
max-concurrent = 2

[fetch]
format = "json"
max-attempts = 2
backoff-unit-ms = 1
backoff-cap-ms = 5

[checkpoint]
every-records = 1
every-items = 1
retry-delay-ms = 1

[store]
initial-backoff-ms = 1
jitter-ms = 0

[extract]
kind = "json"
items = "/firmware"
required = ["Model"]

[extract.fields]
Model = "/model"
Download = "/url"
Version = "/version"
"#,
        records_path.display()
    )
}

/// A config harvesting three static model pages
fn static_config(server: &MockServer, records_path: &Path) -> Config {
    let text = format!(
        r#"{}
[[work]]
url = "{uri}/models/a"
label = "A"

[[work]]
url = "{uri}/models/b"
label = "B"

[[work]]
url = "{uri}/models/c"
label = "C"
"#,
        common_sections(records_path),
        uri = server.uri()
    );
    parse_config(&text).expect("test config should parse")
}

fn firmware(rows: &[(&str, &str)]) -> ResponseTemplate {
    let rows: Vec<_> = rows
        .iter()
        .map(|(model, url)| json!({"model": model, "url": url, "version": "1.0"}))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "firmware": rows }))
}

/// A and B overlap on one record; C is always unavailable
async fn mount_models(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/models/a"))
        .respond_with(firmware(&[
            ("M1", "https://dl.test/m1-u1.bin"),
            ("M1", "https://dl.test/m1-u2.bin"),
        ]))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/models/b"))
        .respond_with(firmware(&[("M1", "https://dl.test/m1-u1.bin")]))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/models/c"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_harvest_dedups_and_survives_failing_items() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("firmware.json");
    let config = static_config(&server, &records_path);

    let report = run_harvest_until(&config, HarvestOptions::default(), std::future::pending())
        .await
        .expect("harvest should succeed");

    assert!(!report.interrupted);
    assert_eq!(report.items_total, 3);
    assert_eq!(report.items_completed, 3);
    assert_eq!(report.rows_found, 3);
    assert_eq!(report.rows_accepted, 2);
    assert_eq!(report.rows_total, 2);
    assert_eq!(report.empty_items, vec!["C".to_string()]);
    assert!(report.checkpoints_written >= 2);

    let store: JsonStore<FirmwareRecord> = JsonStore::new(&records_path);
    let records = store.load();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.model.as_deref() == Some("M1") && r.vendor.as_deref() == Some("TestVendor")));

    let mut downloads: Vec<_> = records.iter().filter_map(|r| r.download.clone()).collect();
    downloads.sort();
    assert_eq!(
        downloads,
        vec![
            "https://dl.test/m1-u1.bin".to_string(),
            "https://dl.test/m1-u2.bin".to_string()
        ]
    );
}

#[tokio::test]
async fn test_second_run_adds_nothing() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("firmware.json");
    let config = static_config(&server, &records_path);

    let first = run_harvest_until(&config, HarvestOptions::default(), std::future::pending())
        .await
        .unwrap();
    let saved = std::fs::read_to_string(&records_path).unwrap();

    let second = run_harvest_until(&config, HarvestOptions::default(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(first.rows_accepted, 2);
    assert_eq!(second.rows_accepted, 0);
    assert_eq!(second.rows_total, 2);
    assert_eq!(std::fs::read_to_string(&records_path).unwrap(), saved);
}

#[tokio::test]
async fn test_existing_records_are_kept() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("firmware.json");
    let earlier = FirmwareRecord::new("OLD-1", "https://dl.test/old.bin")
        .with_vendor("TestVendor")
        .with_extra("Checksum", "abc123");
    let store: JsonStore<FirmwareRecord> = JsonStore::new(&records_path);
    store.save(&[earlier.clone()]).unwrap();

    let config = static_config(&server, &records_path);
    let report = run_harvest_until(&config, HarvestOptions::default(), std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.rows_total, 3);

    let records = store.load();
    assert_eq!(records[0], earlier);
}

#[tokio::test]
async fn test_shutdown_before_start_still_saves() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("firmware.json");
    let config = static_config(&server, &records_path);

    let report = run_harvest_until(&config, HarvestOptions::default(), std::future::ready(()))
        .await
        .unwrap();

    assert!(report.interrupted);
    assert!(records_path.exists());
}

/// A config that discovers model pages from a paged listing
fn discovery_config(server: &MockServer, dir: &Path) -> Config {
    let text = format!(
        r#"{}
[discovery]
strategy = "pages"
url-template = "{uri}/products?page={{page}}"
work-list-path = "{work}"
empty-page-limit = 1

[discovery.extract]
kind = "json"
items = "/products"

[discovery.extract.fields]
url = "/link"
label = "/name"
"#,
        common_sections(&dir.join("firmware.json")),
        uri = server.uri(),
        work = dir.join("work.json").display()
    );
    parse_config(&text).expect("test config should parse")
}

#[tokio::test]
async fn test_discovery_then_harvest() {
    let server = MockServer::start().await;
    mount_models(&server).await;

    // Links are relative and resolve against the listing page
    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": [
                {"name": "B", "link": "/models/b"},
                {"name": "A", "link": "/models/a"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "products": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = discovery_config(&server, dir.path());

    let first = run_harvest_until(&config, HarvestOptions::default(), std::future::pending())
        .await
        .unwrap();
    assert_eq!(first.items_total, 2);
    assert_eq!(first.rows_total, 2);

    let work_store: JsonStore<WorkItem> = JsonStore::new(dir.path().join("work.json"));
    let work = work_store.load();
    let urls: Vec<_> = work.iter().map(|w| w.url.clone()).collect();
    assert_eq!(
        urls,
        vec![
            format!("{}/models/b", server.uri()),
            format!("{}/models/a", server.uri())
        ]
    );

    // The work list is reused, so the listing is not fetched again
    let second = run_harvest_until(&config, HarvestOptions::default(), std::future::pending())
        .await
        .unwrap();
    assert_eq!(second.items_total, 2);
    assert_eq!(second.rows_accepted, 0);
}
