// crates/exam-catalog-server/tests/http_api.rs
// ============================================================================
// Module: HTTP API Tests
// Description: End-to-end requests against a live server on loopback.
// Purpose: Verify routing, status mapping, and request guards.
// Dependencies: exam-catalog-server, reqwest, tempfile, tokio
// ============================================================================

//! ## Overview
//! Each test boots a [`CatalogServer`] on an ephemeral port backed by a fresh
//! `SQLite` file, then drives it with a real HTTP client. Guards (CSRF, bearer
//! auth, rate limits, body limits) run exactly as in production.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    missing_docs,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use exam_catalog_config::AuthMode;
use exam_catalog_config::CatalogConfig;
use exam_catalog_config::RateLimitConfig;
use exam_catalog_server::CatalogServer;
use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::StatusCode;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ============================================================================
// SECTION: Harness
// ============================================================================

const CSRF_HEADER: &str = "X-CSRF-Token";

struct Harness {
    _dir: TempDir,
    base: String,
    client: Client,
    csrf: Option<String>,
    bearer: Option<String>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(configure: impl FnOnce(&mut CatalogConfig)) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let mut config = CatalogConfig::default();
        config.database.path = dir.path().join("catalog.db");
        config.server.audit.enabled = false;
        configure(&mut config);
        let server = CatalogServer::from_config(config).await.expect("server");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.await;
            };
            server.serve_with_listener(listener, shutdown).await.expect("serve");
        });
        Self {
            _dir: dir,
            base: format!("http://{addr}"),
            client: Client::new(),
            csrf: None,
            bearer: None,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn csrf_token(&mut self) -> String {
        if let Some(token) = &self.csrf {
            return token.clone();
        }
        let response = self.authed(self.client.get(self.url("/csrf"))).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        let token = body["token"].as_str().expect("token").to_string();
        self.csrf = Some(token.clone());
        token
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.authed(self.client.get(self.url(path))).send().await.unwrap();
        read(response).await
    }

    async fn send(&mut self, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let token = self.csrf_token().await;
        let mut builder =
            self.authed(self.client.request(method, self.url(path))).header(CSRF_HEADER, token);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        read(builder.send().await.unwrap()).await
    }

    async fn post(&mut self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(body)).await
    }

    async fn put(&mut self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, Some(body)).await
    }

    async fn delete(&mut self, path: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::DELETE, path, None).await
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        }
    }
}

async fn read(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.bytes().await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn id(value: &Value) -> u64 {
    value["id"].as_u64().expect("id")
}

fn sample_university(name: &str) -> Value {
    json!({
        "name": name,
        "departments": [{
            "name": "工学部",
            "majors": [{
                "name": "情報工学科",
                "admission_schedules": [{
                    "name": "前期",
                    "display_order": 1,
                    "admission_infos": [{
                        "enrollment": 120,
                        "academic_year": 2026,
                        "valid_from": "2026-01-01T00:00:00Z",
                        "valid_until": "2026-03-31T00:00:00Z",
                        "status": "active"
                    }],
                    "test_types": [{
                        "name": "共通テスト",
                        "subjects": [
                            { "name": "英語", "score": 100, "display_order": 1 },
                            { "name": "数学", "score": 100, "display_order": 2 }
                        ]
                    }]
                }]
            }]
        }]
    })
}

struct Tree {
    university: u64,
    department: u64,
    major: u64,
    schedule: u64,
    test_type: u64,
    subjects: Vec<u64>,
}

fn tree(body: &Value) -> Tree {
    let department = &body["departments"][0];
    let major = &department["majors"][0];
    let schedule = &major["admission_schedules"][0];
    let test_type = &schedule["test_types"][0];
    Tree {
        university: id(body),
        department: id(department),
        major: id(major),
        schedule: id(schedule),
        test_type: id(test_type),
        subjects: test_type["subjects"].as_array().unwrap().iter().map(id).collect(),
    }
}

fn close(actual: &Value, expected: f64) -> bool {
    actual.as_f64().is_some_and(|value| (value - expected).abs() < 0.01)
}

// ============================================================================
// SECTION: Universities
// ============================================================================

#[tokio::test]
async fn created_tree_carries_ids_and_percentages() {
    let mut harness = Harness::start().await;
    let (status, body) = harness.post("/api/universities", sample_university("東京大学")).await;
    assert_eq!(status, StatusCode::CREATED);
    let ids = tree(&body);
    let subjects = &body["departments"][0]["majors"][0]["admission_schedules"][0]["test_types"][0]
        ["subjects"];
    assert!(close(&subjects[0]["percentage"], 50.0));
    assert!(close(&subjects[1]["percentage"], 50.0));

    let (status, fetched) = harness.get(&format!("/api/universities/{}", ids.university)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], json!("東京大学"));
    assert_eq!(fetched["version"], json!(1));

    let (status, list) = harness.get("/api/universities?offset=0&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    harness.stop().await;
}

#[tokio::test]
async fn markup_is_stripped_from_names() {
    let mut harness = Harness::start().await;
    let (status, body) = harness
        .post("/api/universities", json!({ "name": "<b>京都大学</b><script>x()</script>" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], json!("京都大学"));
    harness.stop().await;
}

#[tokio::test]
async fn search_matches_substrings() {
    let mut harness = Harness::start().await;
    harness.post("/api/universities", json!({ "name": "東京工業大学" })).await;
    harness.post("/api/universities", json!({ "name": "大阪大学" })).await;
    let (status, found) = harness.get("/api/universities/search?q=%E6%9D%B1%E4%BA%AC").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> =
        found.as_array().unwrap().iter().filter_map(|u| u["name"].as_str()).collect();
    assert_eq!(names, vec!["東京工業大学"]);
    harness.stop().await;
}

#[tokio::test]
async fn stale_version_is_a_conflict() {
    let mut harness = Harness::start().await;
    let (_, created) = harness.post("/api/universities", json!({ "name": "名古屋大学" })).await;
    let path = format!("/api/universities/{}", id(&created));
    let (status, updated) = harness.put(&path, json!({ "name": "名古屋大学", "version": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["version"], json!(2));
    let (status, body) = harness.put(&path, json!({ "name": "名大", "version": 1 })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("CONFLICT"));
    harness.stop().await;
}

#[tokio::test]
async fn soft_and_hard_deletes_hide_rows() {
    let mut harness = Harness::start().await;
    let (_, created) = harness.post("/api/universities", sample_university("北海道大学")).await;
    let ids = tree(&created);
    let department =
        format!("/api/universities/{}/departments/{}", ids.university, ids.department);
    let (status, _) = harness.delete(&department).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(harness.get(&department).await.0, StatusCode::NOT_FOUND);

    let university = format!("/api/universities/{}", ids.university);
    let (status, _) = harness.delete(&format!("{university}?soft=true")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(harness.get(&university).await.0, StatusCode::NOT_FOUND);
    harness.stop().await;
}

// ============================================================================
// SECTION: Nested Entities
// ============================================================================

#[tokio::test]
async fn duplicate_department_names_conflict() {
    let mut harness = Harness::start().await;
    let (_, created) = harness.post("/api/universities", sample_university("九州大学")).await;
    let path = format!("/api/universities/{}/departments", id(&created));
    let (status, body) = harness.post(&path, json!({ "name": "工学部" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!("DUPLICATE_NAME"));
    let (status, _) = harness.post(&path, json!({ "name": "理学部" })).await;
    assert_eq!(status, StatusCode::CREATED);
    harness.stop().await;
}

#[tokio::test]
async fn duplicate_names_in_one_payload_fail_validation() {
    let mut harness = Harness::start().await;
    let payload = json!({
        "name": "大阪大学",
        "departments": [{ "name": "理学部" }, { "name": "理学部" }]
    });
    let (status, body) = harness.post("/api/universities", payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("VALIDATION_ERROR"));
    let errors = body["details"]["errors"].as_array().unwrap();
    assert!(errors.iter().any(|error| {
        error["field_path"] == json!("departments[1].name")
            && error["code"] == json!("DUPLICATE_NAME")
    }));
    assert_eq!(harness.get("/api/universities").await.1, json!([]));
    harness.stop().await;
}

#[tokio::test]
async fn batch_subject_update_recomputes_percentages() {
    let mut harness = Harness::start().await;
    let (_, created) = harness.post("/api/universities", sample_university("東北大学")).await;
    let ids = tree(&created);
    let path = format!(
        "/api/universities/{}/departments/{}/subjects/batch",
        ids.university, ids.department
    );
    let body = json!({
        "test_type_id": ids.test_type,
        "subjects": [
            { "id": ids.subjects[0], "name": "英語", "score": 70, "display_order": 1 },
            { "id": ids.subjects[1], "name": "数学", "score": 30, "display_order": 2 }
        ]
    });
    let (status, subjects) = harness.put(&path, body).await;
    assert_eq!(status, StatusCode::OK);
    let subjects = subjects.as_array().unwrap();
    assert_eq!(subjects.len(), 2);
    let english = subjects.iter().find(|s| s["name"] == json!("英語")).unwrap();
    let math = subjects.iter().find(|s| s["name"] == json!("数学")).unwrap();
    assert!(close(&english["percentage"], 70.0));
    assert!(close(&math["percentage"], 30.0));
    harness.stop().await;
}

#[tokio::test]
async fn nested_routes_are_scoped_to_the_university() {
    let mut harness = Harness::start().await;
    let (_, first) = harness.post("/api/universities", sample_university("神戸大学")).await;
    let (_, second) = harness.post("/api/universities", json!({ "name": "広島大学" })).await;
    let ids = tree(&first);
    let other = id(&second);

    let own = format!(
        "/api/universities/{}/departments/{}/majors/{}",
        ids.university, ids.department, ids.major
    );
    assert_eq!(harness.get(&own).await.0, StatusCode::OK);
    let foreign =
        format!("/api/universities/{other}/departments/{}/majors/{}", ids.department, ids.major);
    assert_eq!(harness.get(&foreign).await.0, StatusCode::NOT_FOUND);

    let schedule = format!(
        "/api/universities/{other}/majors/{}/admission-schedules/{}",
        ids.major, ids.schedule
    );
    assert_eq!(harness.get(&schedule).await.0, StatusCode::NOT_FOUND);

    let subjects = format!("/api/universities/{other}/test-types/{}/subjects", ids.test_type);
    let (status, _) = harness.post(&subjects, json!({ "name": "国語", "score": 50 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let subjects = format!("/api/universities/{}/test-types/{}/subjects", ids.university, ids.test_type);
    let (status, created) = harness.post(&subjects, json!({ "name": "国語", "score": 50 })).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, fetched) = harness.get(&format!("{subjects}/{}", id(&created))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], json!("国語"));
    harness.stop().await;
}

// ============================================================================
// SECTION: Filter Options
// ============================================================================

#[tokio::test]
async fn filter_options_list_by_category() {
    let mut harness = Harness::start().await;
    let (status, _) = harness
        .post("/api/filter-options", json!({ "category": "REGION", "name": "関東", "display_order": 1 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, options) = harness.get("/api/filter-options?category=REGION").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(options.as_array().unwrap().len(), 1);
    let (status, options) = harness.get("/api/filter-options?category=PREFECTURE").await;
    assert_eq!(status, StatusCode::OK);
    assert!(options.as_array().unwrap().is_empty());
    let (status, body) = harness.get("/api/filter-options?category=PLANET").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVALID_INPUT"));
    harness.stop().await;
}

// ============================================================================
// SECTION: Request Guards
// ============================================================================

#[tokio::test]
async fn healthz_reports_ok() {
    let harness = Harness::start().await;
    let (status, body) = harness.get("/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
    harness.stop().await;
}

#[tokio::test]
async fn mutations_without_csrf_token_are_forbidden() {
    let harness = Harness::start().await;
    let response = harness
        .client
        .post(harness.url("/api/universities"))
        .json(&json!({ "name": "筑波大学" }))
        .send()
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("CSRF_TOKEN_INVALID"));
    harness.stop().await;
}

#[tokio::test]
async fn malformed_requests_map_to_client_errors() {
    let mut harness = Harness::start_with(|config| config.server.max_body_bytes = 1024).await;
    let token = harness.csrf_token().await;

    let response = harness
        .client
        .post(harness.url("/api/universities"))
        .header(CSRF_HEADER, token.as_str())
        .header("content-type", "text/plain")
        .body("name=東京大学")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let oversized = json!({ "name": "a".repeat(4096) });
    let (status, body) = harness.post("/api/universities", oversized).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], json!("PAYLOAD_TOO_LARGE"));

    let response = harness
        .client
        .post(harness.url("/api/universities"))
        .header(CSRF_HEADER, token.as_str())
        .header("content-type", "application/json")
        .body("{\"name\":")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, _) = harness.get("/api/universities/9223372036854775808").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = harness.get("/api/universities/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    harness.stop().await;
}

#[tokio::test]
async fn bearer_tokens_gate_reads_and_writes() {
    let mut harness = Harness::start_with(|config| {
        config.server.auth.mode = AuthMode::BearerToken;
        config.server.auth.bearer_tokens = vec!["rw-token".to_string()];
        config.server.auth.read_only_tokens = vec!["ro-token".to_string()];
    })
    .await;
    assert_eq!(harness.get("/api/universities").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.get("/healthz").await.0, StatusCode::OK);

    harness.bearer = Some("ro-token".to_string());
    assert_eq!(harness.get("/api/universities").await.0, StatusCode::OK);
    let (status, body) = harness.post("/api/universities", json!({ "name": "一橋大学" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!("FORBIDDEN"));

    harness.bearer = Some("rw-token".to_string());
    let (status, _) = harness.post("/api/universities", json!({ "name": "一橋大学" })).await;
    assert_eq!(status, StatusCode::CREATED);
    harness.stop().await;
}

#[tokio::test]
async fn rate_limit_refuses_excess_requests() {
    let harness = Harness::start_with(|config| {
        config.server.rate_limit = Some(RateLimitConfig {
            max_requests: 3,
            window: Duration::from_secs(60),
            max_entries: 16,
        });
    })
    .await;
    for _ in 0..3 {
        assert_eq!(harness.get("/healthz").await.0, StatusCode::OK);
    }
    let (status, body) = harness.get("/healthz").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], json!("RATE_LIMITED"));
    harness.stop().await;
}
