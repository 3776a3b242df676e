#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use faultline_event::cache::ActiveEventCache;
use faultline_event::engine::LifecycleEngine;
use faultline_event::silence::SilenceSet;
use faultline_notify::dispatcher::Dispatcher;
use faultline_notify::plugin::ChannelRegistry;
use faultline_server::app;
use faultline_server::config::ServerConfig;
use faultline_server::state::AppState;
use faultline_storage::AlertStore;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tower::util::ServiceExt;

/// Tenant and operator used by every test unless one is probing
/// isolation between tenants.
pub const TENANT: &str = "tenant-itest";
pub const OPERATOR: &str = "ops";

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

fn ensure_snowflake_init() {
    static ID_INIT: OnceLock<()> = OnceLock::new();
    ID_INIT.get_or_init(|| {
        faultline_common::id::init(1, 1);
    });
}

/// Build the exact app the binary serves, backed by a throwaway SQLite
/// file. The `TempDir` must stay alive as long as the context does.
pub async fn build_test_context() -> Result<TestContext> {
    ensure_snowflake_init();

    let temp_dir = tempfile::tempdir()?;
    let db_url = format!(
        "sqlite://{}/faultline.db?mode=rwc",
        temp_dir.path().display()
    );
    let store = Arc::new(AlertStore::new(&db_url).await?);

    let cache = Arc::new(ActiveEventCache::new());
    let silences = Arc::new(SilenceSet::new());
    let engine = Arc::new(LifecycleEngine::new(cache, silences));

    // Same channel setup the default server config produces: the webhook
    // channel active with no template, nothing else instantiated.
    let registry = Arc::new(ChannelRegistry::default());
    registry
        .configure("webhook", &json!({}))
        .expect("webhook channel should configure");
    let dispatcher = Arc::new(Dispatcher::new(registry));

    let state = AppState {
        store,
        engine,
        dispatcher,
        start_time: Utc::now(),
        config: Arc::new(ServerConfig::default()),
    };

    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

/// Send a JSON request. `tenant: Some(t)` attaches the identity headers
/// (`x-tenant-id: t`, `x-user: ops`); `None` leaves them off to exercise
/// the 401 path.
pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    tenant: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(tenant) = tenant {
        builder = builder
            .header("x-tenant-id", tenant)
            .header("x-user", OPERATOR);
    }
    builder = builder.header("Content-Type", "application/json");

    let req_body = body.unwrap_or(Value::Null).to_string();
    let req = builder
        .body(Body::from(req_body))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    read_response(resp).await
}

/// Send an arbitrary byte body, for probing how endpoints handle
/// payloads that are not valid JSON.
pub async fn request_raw(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    read_response(resp).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
    tenant: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(tenant) = tenant {
        builder = builder
            .header("x-tenant-id", tenant)
            .header("x-user", OPERATOR);
    }

    let req = builder.body(Body::empty()).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    read_response(resp).await
}

async fn read_response(resp: axum::response::Response) -> (StatusCode, Value, Option<String>) {
    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub fn assert_ok_envelope(json: &Value) {
    assert_eq!(json["err_code"], 0);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
}

pub fn assert_err_envelope(json: &Value, err_code: i32) {
    assert_eq!(json["err_code"], err_code);
    assert!(json["err_msg"].is_string());
    assert!(json.get("trace_id").is_some());
    assert!(json.get("data").is_some());
    assert!(json["data"].is_null());
}

pub fn decode_data<T: DeserializeOwned>(json: &Value) -> T {
    serde_json::from_value(json["data"].clone()).expect("data should decode")
}

/// Push a single firing occurrence and return its fingerprint. The
/// caller picks the fingerprint so follow-up requests can reference it.
pub async fn push_firing_event(
    app: &axum::Router,
    fault_center_id: &str,
    fingerprint: &str,
    severity: &str,
) -> Value {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([{
            "fault_center_id": fault_center_id,
            "fingerprint": fingerprint,
            "rule_id": "rule-itest",
            "rule_name": "集成测试规则",
            "datasource": "prometheus",
            "severity": severity,
            "labels": {"host": "db-01", "service": "mysql"},
            "annotations": "disk usage above threshold",
            "eval_value": 92.5
        }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    body["data"].clone()
}

/// Create a notification target over the API and return its id.
pub async fn create_webhook_target(app: &axum::Router, fault_center_id: &str, name: &str) -> String {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/targets",
        Some(TENANT),
        Some(json!({
            "fault_center_id": fault_center_id,
            "name": name,
            "channel_type": "webhook",
            "default_hook": "http://127.0.0.1:9/hook",
            "routes": []
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);
    body["data"]["id"]
        .as_str()
        .expect("target id should exist")
        .to_string()
}

/// Create a third-party webhook over the API and return `(internal id,
/// public token)`.
pub async fn create_intake_webhook(
    app: &axum::Router,
    fault_center_id: &str,
    name: &str,
    target_ids: Vec<String>,
) -> (String, String) {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/webhooks",
        Some(TENANT),
        Some(json!({
            "fault_center_id": fault_center_id,
            "name": name,
            "source_type": "grafana",
            "target_ids": target_ids
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);
    let id = body["data"]["id"]
        .as_str()
        .expect("webhook id should exist")
        .to_string();
    let token = body["data"]["webhook_id"]
        .as_str()
        .expect("webhook token should exist")
        .to_string();
    (id, token)
}
