mod common;

use axum::http::StatusCode;
use common::{app_with, memory_app, memory_app_with, upload_form, SigningStore, MD5};
use bytes::Bytes;
use pail_catalog::{BlobStore, MemoryStore, PackageRecord, PutCondition, UnparsedFilenamePolicy};
use pail_server::server::XMLRPC_BODY_LIMIT;
use pail_server::Config;
use serde_json::Value;
use std::sync::Arc;

const TARBALL: &[u8] = b"fake sdist content";

fn record(name: &str, version: &str, summary: &str) -> PackageRecord {
    PackageRecord {
        name: name.to_string(),
        file_name: format!("{name}-{version}.tar.gz"),
        version: version.to_string(),
        python_tag: String::new(),
        location: format!("{name}/{name}-{version}.tar.gz"),
        checksum: String::new(),
        summary: summary.to_string(),
    }
}

fn search_call(method: &str, term: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<methodCall>
  <methodName>{method}</methodName>
  <params>
    <param><value><struct>
      <member><name>name</name><value><array><data><value><string>{term}</string></value></data></array></value></member>
      <member><name>summary</name><value><array><data><value><string>{term}</string></value></data></array></value></member>
    </struct></value></param>
    <param><value><string>or</string></value></param>
  </params>
</methodCall>"#
    )
}

#[tokio::test]
async fn test_upload_is_listed_and_stored() {
    let (app, store) = memory_app();

    let response = app
        .server
        .post("/simple/")
        .multipart(upload_form("requests-2.25.1.tar.gz", "requests", "2.25.1", TARBALL))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert!(body["message"].is_string());

    assert_eq!(
        store.peek("requests/requests-2.25.1.tar.gz").as_deref(),
        Some(TARBALL)
    );

    let document = store.peek("packages.json").expect("catalog written");
    let document: Value = serde_json::from_slice(&document).expect("catalog is JSON");
    let entry = &document["requests"][0];
    assert_eq!(entry["name"], "requests");
    assert_eq!(entry["filename"], "requests-2.25.1.tar.gz");
    assert_eq!(entry["version"], "2.25.1");
    assert_eq!(entry["pyver"], "");
    assert_eq!(entry["url"], "requests/requests-2.25.1.tar.gz");
    assert_eq!(entry["md5_digest"], MD5);
    assert_eq!(entry["summary"], "requests summary");

    let index = app.server.get("/simple/").await;
    assert_eq!(index.status_code(), StatusCode::OK);
    assert!(index.text().contains("requests"));

    let package = app.server.get("/simple/requests/").await;
    assert_eq!(package.status_code(), StatusCode::OK);
    let html = package.text();
    assert!(html.contains("requests-2.25.1.tar.gz"));
    assert!(html.contains(&format!("#md5={MD5}")));

    let without_slash = app.server.get("/simple/requests").await;
    assert_eq!(without_slash.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_without_trailing_slash() {
    let (app, _store) = memory_app();
    let response = app
        .server
        .post("/simple")
        .multipart(upload_form("foo-1.0-py3.7.whl", "foo", "1.0", TARBALL))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let records = app.state.catalog.package("foo").expect("foo recorded");
    assert_eq!(records[0].python_tag, "3.7");
}

#[tokio::test]
async fn test_duplicate_upload_conflicts_and_keeps_artifact() {
    let (app, store) = memory_app();
    let first = app
        .server
        .post("/simple/")
        .multipart(upload_form("requests-2.25.1.tar.gz", "requests", "2.25.1", TARBALL))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = app
        .server
        .post("/simple/")
        .multipart(upload_form(
            "requests-2.25.1.tar.gz",
            "requests",
            "2.25.1",
            b"different content",
        ))
        .await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);
    let body: Value = second.json();
    assert_eq!(body["code"], "conflict");
    assert_eq!(body["details"]["package"], "requests");
    assert_eq!(body["details"]["version"], "2.25.1");

    assert_eq!(
        store.peek("requests/requests-2.25.1.tar.gz").as_deref(),
        Some(TARBALL)
    );
}

#[tokio::test]
async fn test_reused_file_name_with_new_version_conflicts() {
    let (app, store) = memory_app();
    let first = app
        .server
        .post("/simple/")
        .multipart(upload_form("foo-1.0.tar.gz", "foo", "1.0", TARBALL))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = app
        .server
        .post("/simple/")
        .multipart(upload_form("foo-1.0.tar.gz", "foo", "1.1", b"other bytes"))
        .await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);

    assert_eq!(store.peek("foo/foo-1.0.tar.gz").as_deref(), Some(TARBALL));
    assert!(!app.state.catalog.snapshot().contains("foo", "1.1"));
}

#[tokio::test]
async fn test_unrecognized_filename_is_rejected() {
    let (app, store) = memory_app();
    let response = app
        .server
        .post("/simple/")
        .multipart(upload_form("notes.pdf", "notes", "1.0", TARBALL))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "validation_error");

    assert!(store.peek("notes/notes.pdf").is_none());
    assert!(store.peek("packages.json").is_none());
}

#[tokio::test]
async fn test_unrecognized_filename_accepted_by_policy() {
    let mut config = Config::default();
    config.uploads.unparsed_filename = UnparsedFilenamePolicy::AcceptDeclared;
    let (app, store) = memory_app_with(config);

    let response = app
        .server
        .post("/simple/")
        .multipart(upload_form("notes.pdf", "notes", "1.0", TARBALL))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(store.peek("notes/notes.pdf").is_some());

    let records = app.state.catalog.package("notes").expect("notes recorded");
    assert_eq!(records[0].version, "1.0");
}

#[tokio::test]
async fn test_unsafe_filename_is_rejected() {
    let (app, store) = memory_app();
    let response = app
        .server
        .post("/simple/")
        .multipart(upload_form("..evil-1.0.tar.gz", "evil", "1.0", TARBALL))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_upload_action_is_required() {
    let (app, _store) = memory_app();

    let other_action = upload_form("foo-1.0.tar.gz", "foo", "1.0", TARBALL)
        .add_text(":action", "remove_pkg");
    let response = app.server.post("/simple/").multipart(other_action).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let no_content = axum_test::multipart::MultipartForm::new()
        .add_text(":action", "file_upload")
        .add_text("name", "foo");
    let response = app.server.post("/simple/").multipart(no_content).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    assert!(app.state.catalog.snapshot().is_empty());
}

#[tokio::test]
async fn test_oversized_upload() {
    let mut config = Config::default();
    config.uploads.max_upload_size = 8;
    let (app, store) = memory_app_with(config);

    let response = app
        .server
        .post("/simple/")
        .multipart(upload_form("foo-1.0.tar.gz", "foo", "1.0", TARBALL))
        .await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unknown_package_is_not_found() {
    let (app, _store) = memory_app();
    let response = app.server.get("/simple/nope/").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["code"], "not_found");

    let detail = app.server.get("/package/nope").await;
    assert_eq!(detail.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_streams_when_store_cannot_sign() {
    let (app, _store) = memory_app();
    app.server
        .post("/simple/")
        .multipart(upload_form("requests-2.25.1.tar.gz", "requests", "2.25.1", TARBALL))
        .await;

    let response = app.server.get("/api/requests/requests-2.25.1.tar.gz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"requests-2.25.1.tar.gz\""
    );
    assert_eq!(response.as_bytes().as_ref(), TARBALL);

    let missing = app.server.get("/api/requests/requests-9.9.9.tar.gz").await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_redirects_to_signed_url() {
    let mut config = Config::default();
    config.downloads.presign_ttl_secs = 120;
    let app = app_with(
        Arc::new(SigningStore {
            inner: MemoryStore::new(),
        }),
        config,
    );
    app.state
        .catalog
        .add(record("foo", "1.0", "a foo"))
        .await
        .expect("add record");

    let response = app.server.get("/api/foo/foo-1.0.tar.gz").await;
    assert_eq!(response.status_code(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.header("location"),
        "https://storage.test/foo/foo-1.0.tar.gz?expires=120"
    );
}

#[tokio::test]
async fn test_download_of_legacy_catalog_url() {
    let (app, store) = memory_app();
    let document = br#"{"foo": [{"name": "foo", "filename": "foo-1.0.tar.gz", "version": "1.0",
        "pyver": "", "url": "/api/foo/foo-1.0.tar.gz", "md5_digest": "", "summary": ""}]}"#;
    store
        .put("packages.json", Bytes::from_static(document), PutCondition::Always)
        .await
        .expect("seed catalog");
    store
        .put("foo/foo-1.0.tar.gz", Bytes::from_static(TARBALL), PutCondition::Always)
        .await
        .expect("seed artifact");
    app.state.catalog.load().await.expect("load catalog");

    let response = app.server.get("/api/foo/foo-1.0.tar.gz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.as_bytes().as_ref(), TARBALL);
}

#[tokio::test]
async fn test_xmlrpc_search() {
    let (app, _store) = memory_app();
    for (name, version, summary) in [
        ("reqs", "1.0.0", "http client"),
        ("reqs", "2.0.0", "http client"),
        ("flask-http", "0.1.0", "web"),
        ("unrelated", "1.0.0", "nothing to see"),
    ] {
        app.state
            .catalog
            .add(record(name, version, summary))
            .await
            .expect("add record");
    }

    for path in ["/pypi", "/RPC2"] {
        let response = app.server.post(path).text(search_call("search", "http")).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.header("content-type"), "text/xml");

        let xml = response.text();
        assert!(xml.contains("<methodResponse><params>"));
        assert!(xml.contains("<string>reqs</string>"));
        assert!(xml.contains("<string>2.0.0</string>"));
        assert!(xml.contains("<string>flask-http</string>"));
        assert!(!xml.contains("unrelated"));
    }
}

#[tokio::test]
async fn test_xmlrpc_faults() {
    let (app, _store) = memory_app();

    let unknown = app
        .server
        .post("/pypi")
        .text(search_call("list_packages", "x"))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::OK);
    let xml = unknown.text();
    assert!(xml.contains("<fault>"));
    assert!(xml.contains("<int>-32601</int>"));

    let garbage = app.server.post("/pypi").text("<methodCall>").await;
    assert_eq!(garbage.status_code(), StatusCode::OK);
    assert!(garbage.text().contains("<int>-32700</int>"));
}

#[tokio::test]
async fn test_xmlrpc_deeply_nested_request_faults() {
    let (app, _store) = memory_app();
    let levels = 1_000;
    let nested = format!(
        "<methodCall><methodName>search</methodName><params><param>{}<value>x</value>{}</param></params></methodCall>",
        "<value><array><data>".repeat(levels),
        "</data></array></value>".repeat(levels),
    );
    assert!(nested.len() < XMLRPC_BODY_LIMIT);

    let response = app.server.post("/pypi").text(nested).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let xml = response.text();
    assert!(xml.contains("<fault>"));
    assert!(xml.contains("<int>-32700</int>"));
}

#[tokio::test]
async fn test_xmlrpc_body_limit() {
    let (app, _store) = memory_app();
    let oversized = "x".repeat(XMLRPC_BODY_LIMIT + 1);
    let response = app.server.post("/RPC2").text(oversized).await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_pages_show_latest_version() {
    let (app, _store) = memory_app();
    for version in ["1.0.0", "2.0.0", "1.5.0"] {
        app.state
            .catalog
            .add(record("widget", version, &format!("widget {version}")))
            .await
            .expect("add record");
    }

    let home = app.server.get("/").await;
    assert_eq!(home.status_code(), StatusCode::OK);
    let html = home.text();
    assert!(html.contains("widget"));
    assert!(html.contains("widget 2.0.0"));

    let detail = app.server.get("/package/widget").await;
    assert_eq!(detail.status_code(), StatusCode::OK);
    let html = detail.text();
    let newest = html.find("<h2>2.0.0</h2>").expect("2.0.0 listed");
    let middle = html.find("<h2>1.5.0</h2>").expect("1.5.0 listed");
    let oldest = html.find("<h2>1.0.0</h2>").expect("1.0.0 listed");
    assert!(newest < middle && middle < oldest);
}

#[tokio::test]
async fn test_health_and_status() {
    let (app, _store) = memory_app();
    app.state
        .catalog
        .add(record("foo", "1.0", ""))
        .await
        .expect("add record");

    let health = app.server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);
    let body: Value = health.json();
    assert_eq!(body["status"], "healthy");

    let status = app.server.get("/status").await;
    assert_eq!(status.status_code(), StatusCode::OK);
    let body: Value = status.json();
    assert_eq!(body["service"], "pail");
    assert_eq!(body["packages"], 1);
    assert_eq!(body["files"], 1);
    assert_eq!(body["catalog_key"], "packages.json");
}
