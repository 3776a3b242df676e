mod common;

use axum::http::StatusCode;
use common::{
    assert_err_envelope, assert_ok_envelope, build_test_context, create_intake_webhook,
    create_webhook_target, push_firing_event, request_json, request_no_body, request_raw, TENANT,
};
use serde_json::json;

#[tokio::test]
async fn health_should_return_ok_envelope() {
    let ctx = build_test_context().await.expect("test context should build");
    let (status, body, trace) = request_no_body(&ctx.app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert!(body["data"]["version"].is_string());
    assert_eq!(body["data"]["active_events"], 0);
    assert!(body["trace_id"].as_str().is_some());
    assert!(trace.is_some());
}

#[tokio::test]
async fn identity_headers_should_gate_protected_routes() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/events?fault_center_id=fc-1", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_err_envelope(&body, 1002);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-1",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["total"], 0);
}

// ---- Event lifecycle: push / list / claim / resolve / history ----

#[tokio::test]
async fn event_push_claim_resolve_lifecycle() {
    let ctx = build_test_context().await.expect("test context should build");

    // Two firing occurrences, one with an explicit fingerprint.
    let summary = push_firing_event(&ctx.app, "fc-life", "fp-life-1", "P1").await;
    assert_eq!(summary["received"], 1);
    assert_eq!(summary["created"], 1);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([{
            "fault_center_id": "fc-life",
            "rule_id": "rule-cpu",
            "rule_name": "CPU 使用率过高",
            "severity": "P2",
            "labels": {"host": "web-01"},
            "eval_value": 97.0
        }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["created"], 1);

    // Same fingerprint again dedups into a refresh.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([{
            "fault_center_id": "fc-life",
            "fingerprint": "fp-life-1",
            "rule_id": "rule-itest",
            "annotations": "second occurrence",
            "eval_value": 93.0
        }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["refreshed"], 1);
    assert_eq!(body["data"]["created"], 0);

    // Refresh carried the newer annotation into the active record.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events/fp-life-1?fault_center_id=fc-life",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["annotations"], "second occurrence");
    assert_eq!(body["data"]["severity"], "P1");
    assert_eq!(body["data"]["resolved"], false);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-life",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    // Claim: explicit username beats the identity header; unknown
    // fingerprints are reported, not failed.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/claim",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-life",
            "fingerprints": ["fp-life-1", "fp-no-such"],
            "username": "zhangsan"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    let results = body["data"].as_array().expect("results should be array");
    assert_eq!(results.len(), 2);
    for result in results {
        match result["fingerprint"].as_str() {
            Some("fp-life-1") => {
                assert_eq!(result["outcome"], "claimed");
                assert_eq!(result["claimant"], "zhangsan");
            }
            Some("fp-no-such") => assert_eq!(result["outcome"], "not_found"),
            other => panic!("unexpected fingerprint in claim results: {other:?}"),
        }
    }

    // First claim wins; the second claimant is told who holds it.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/claim",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-life",
            "fingerprints": ["fp-life-1"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["outcome"], "already_claimed");
    assert_eq!(body["data"][0]["claimant"], "zhangsan");

    // Resolve archives the event and drops it from the active set.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/resolve",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-life",
            "fingerprints": ["fp-life-1", "fp-no-such"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["data"].as_array().expect("results should be array");
    let resolved = results
        .iter()
        .find(|r| r["fingerprint"] == "fp-life-1")
        .expect("fp-life-1 should be in results");
    assert_eq!(resolved["outcome"], "resolved");
    assert!(resolved["event_id"].as_str().is_some());
    let missing = results
        .iter()
        .find(|r| r["fingerprint"] == "fp-no-such")
        .expect("fp-no-such should be in results");
    assert_eq!(missing["outcome"], "not_found");

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events/fp-life-1?fault_center_id=fc-life",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-life",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    // The archive keeps the resolved record, claimant included.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events/history?fingerprint__eq=fp-life-1",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    let archived = &body["data"]["items"][0];
    assert_eq!(archived["resolved"], true);
    assert!(archived["resolved_time"].is_string());
    assert_eq!(archived["confirm"]["claimant"], "zhangsan");
}

#[tokio::test]
async fn push_validation_should_reject_bad_batches() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([{"rule_id": "r1"}])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
    assert!(body["err_msg"]
        .as_str()
        .unwrap_or_default()
        .contains("fault_center_id"));

    // Neither a fingerprint nor a rule to derive one from.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([{"fault_center_id": "fc-1", "annotations": "orphan"}])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);
}

#[tokio::test]
async fn push_should_derive_fingerprint_from_rule_and_labels() {
    let ctx = build_test_context().await.expect("test context should build");

    let occurrence = json!([{
        "fault_center_id": "fc-fp",
        "rule_id": "rule-mem",
        "labels": {"host": "cache-01", "zone": "cn-north"}
    }]);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(occurrence.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], 1);

    // Identical rule and labels reproduce the fingerprint: dedup hit.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(occurrence),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["refreshed"], 1);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-fp",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn events_should_be_isolated_per_tenant() {
    let ctx = build_test_context().await.expect("test context should build");

    push_firing_event(&ctx.app, "fc-iso", "fp-iso", "P2").await;

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-iso",
        Some("tenant-other"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    let (status, _, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events/fp-iso?fault_center_id=fc-iso",
        Some("tenant-other"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---- Silences ----

#[tokio::test]
async fn silence_crud_should_reject_bad_predicates_without_persisting() {
    let ctx = build_test_context().await.expect("test context should build");
    let ends_at = chrono::Utc::now() + chrono::Duration::hours(1);

    // Broken regex: rejected atomically.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/silences",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-sil",
            "name": "broken",
            "predicates": [
                {"label": "host", "pattern": "db-.*"},
                {"label": "service", "pattern": "my[sql"}
            ],
            "ends_at": ends_at
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1101);

    // An empty predicate list would match everything; also rejected.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/silences",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-sil",
            "name": "matches-everything",
            "predicates": [],
            "ends_at": ends_at
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1101);

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/silences", Some(TENANT)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    // Valid silence persists and reports its computed status.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/silences",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-sil",
            "name": "mysql maintenance",
            "comment": "周末例行维护",
            "predicates": [{"label": "service", "pattern": "mysql"}],
            "ends_at": ends_at
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["status"], "active");
    let silence_id = body["data"]["id"]
        .as_str()
        .expect("silence id should exist")
        .to_string();

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/silences/{silence_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "mysql maintenance");

    // Updating onto a broken regex is rejected; the stored rule survives.
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/silences/{silence_id}"),
        Some(TENANT),
        Some(json!({"predicates": [{"label": "host", "pattern": "(unclosed"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1101);

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/silences/{silence_id}"),
        Some(TENANT),
        Some(json!({"name": "mysql weekend maintenance"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "mysql weekend maintenance");

    let (status, _, _) = request_no_body(
        &ctx.app,
        "DELETE",
        &format!("/v1/silences/{silence_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "DELETE",
        &format!("/v1/silences/{silence_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
}

#[tokio::test]
async fn active_silence_should_suppress_matching_push() {
    let ctx = build_test_context().await.expect("test context should build");
    let ends_at = chrono::Utc::now() + chrono::Duration::hours(1);

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/silences",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-sup",
            "name": "silence db hosts",
            "predicates": [{"label": "host", "pattern": "db-.*"}],
            "ends_at": ends_at
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Matching occurrence: swallowed, never enters the active set.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([{
            "fault_center_id": "fc-sup",
            "fingerprint": "fp-sup-1",
            "rule_id": "rule-disk",
            "labels": {"host": "db-07"}
        }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["suppressed"], 1);
    assert_eq!(body["data"]["created"], 0);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-sup",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    // Non-matching host sails through.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/push",
        Some(TENANT),
        Some(json!([{
            "fault_center_id": "fc-sup",
            "fingerprint": "fp-sup-2",
            "rule_id": "rule-disk",
            "labels": {"host": "web-07"}
        }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], 1);
}

#[tokio::test]
async fn fingerprint_silence_should_auto_claim_active_events() {
    let ctx = build_test_context().await.expect("test context should build");

    push_firing_event(&ctx.app, "fc-ac", "fp-ac-target", "P1").await;
    push_firing_event(&ctx.app, "fc-ac", "fp-ac-other", "P1").await;

    let ends_at = chrono::Utc::now() + chrono::Duration::hours(1);
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/silences",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-ac",
            "name": "ack known flapping alert",
            "predicates": [{"label": "fingerprint", "pattern": "fp-ac-target"}],
            "ends_at": ends_at
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events/fp-ac-target?fault_center_id=fc-ac",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["confirm"]["claimed"], true);
    assert_eq!(body["data"]["confirm"]["claimant"], "ops");

    // The sibling event does not match the fingerprint predicate.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events/fp-ac-other?fault_center_id=fc-ac",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["confirm"]["claimed"], false);
}

// ---- Notification targets ----

#[tokio::test]
async fn target_crud_should_validate_channels_and_routes() {
    let ctx = build_test_context().await.expect("test context should build");

    let target_id = create_webhook_target(&ctx.app, "fc-tgt", "值班群机器人").await;

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/targets/{target_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "值班群机器人");
    assert_eq!(body["data"]["channel_type"], "webhook");

    // Unknown channel type: no plugin, no target.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/targets",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-tgt",
            "name": "carrier pigeon",
            "channel_type": "pigeon"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1103);

    // Duplicate route severities are ambiguous and rejected.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/targets",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-tgt",
            "name": "ambiguous routes",
            "channel_type": "webhook",
            "default_hook": "http://127.0.0.1:9/hook",
            "routes": [
                {"severity": "P0", "hook": "http://127.0.0.1:9/p0-a"},
                {"severity": "P0", "hook": "http://127.0.0.1:9/p0-b"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1103);

    // Target names are unique per tenant.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/targets",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-tgt",
            "name": "值班群机器人",
            "channel_type": "webhook",
            "default_hook": "http://127.0.0.1:9/other-hook"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1005);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/targets?fault_center_id=fc-tgt&name__contains=机器人",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    // channel_type is immutable; everything else merges.
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/targets/{target_id}"),
        Some(TENANT),
        Some(json!({
            "default_hook": "http://127.0.0.1:9/hook-v2",
            "routes": [{"severity": "P0", "recipients": ["oncall-primary"]}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["default_hook"], "http://127.0.0.1:9/hook-v2");
    assert_eq!(body["data"]["routes"][0]["severity"], "P0");

    let (status, _, _) = request_no_body(
        &ctx.app,
        "DELETE",
        &format!("/v1/targets/{target_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/targets/{target_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
}

#[tokio::test]
async fn target_creation_should_stop_at_tenant_quota() {
    let ctx = build_test_context().await.expect("test context should build");
    let quota = ctx.state.config.limits.max_targets_per_tenant;

    for i in 0..quota {
        create_webhook_target(&ctx.app, "fc-quota", &format!("target-{i}")).await;
    }

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/targets",
        Some(TENANT),
        Some(json!({
            "fault_center_id": "fc-quota",
            "name": "one too many",
            "channel_type": "webhook",
            "default_hook": "http://127.0.0.1:9/hook"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_err_envelope(&body, 1106);

    // Quotas are per tenant, not global.
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/targets",
        Some("tenant-other"),
        Some(json!({
            "fault_center_id": "fc-quota",
            "name": "other tenant target",
            "channel_type": "webhook",
            "default_hook": "http://127.0.0.1:9/hook"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn target_test_send_should_report_failures_without_erroring() {
    let ctx = build_test_context().await.expect("test context should build");

    // Nothing listens on port 9; delivery fails but the report comes back.
    let target_id = create_webhook_target(&ctx.app, "fc-test", "unreachable hook").await;

    let (status, body, _) = request_no_body(
        &ctx.app,
        "POST",
        &format!("/v1/targets/{target_id}/test"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["success"], false);
    assert_eq!(body["data"]["delivered"], 0);
    let failures = body["data"]["failures"]
        .as_array()
        .expect("failures should be array");
    assert!(!failures.is_empty());
    assert_eq!(failures[0]["channel_type"], "webhook");

    let (status, body, _) = request_no_body(
        &ctx.app,
        "POST",
        "/v1/targets/does-not-exist/test",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
}

// ---- Third-party webhooks and intake ----

#[tokio::test]
async fn webhook_crud_should_mint_and_protect_the_public_token() {
    let ctx = build_test_context().await.expect("test context should build");

    let (id, token) = create_intake_webhook(&ctx.app, "fc-wh", "grafana prod", vec![]).await;
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/webhooks/{id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["webhook_id"], token.as_str());
    assert_eq!(body["data"]["call_count"], 0);
    assert!(body["data"]["last_called_at"].is_null());

    // The update surface has no webhook_id field: the token is immutable.
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/webhooks/{id}"),
        Some(TENANT),
        Some(json!({"name": "grafana prod v2", "enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "grafana prod v2");
    assert_eq!(body["data"]["enabled"], false);
    assert_eq!(body["data"]["webhook_id"], token.as_str());

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/webhooks?enabled__eq=false",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let (status, _, _) = request_no_body(
        &ctx.app,
        "DELETE",
        &format!("/v1/webhooks/{id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/webhooks/{id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
}

#[tokio::test]
async fn webhook_intake_should_normalize_admit_and_audit() {
    let ctx = build_test_context().await.expect("test context should build");
    let (id, token) = create_intake_webhook(&ctx.app, "fc-intake", "grafana", vec![]).await;

    // A typical third-party payload: synonym keys, textual severity.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/webhook/{token}"),
        None,
        Some(json!({
            "title": "disk full",
            "severity": "critical",
            "host": "db-01",
            "description": "/dev/sda1 is at 98%"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "alert accepted");
    let alert_id = body["alertId"].as_str().expect("alertId should exist");
    assert!(!alert_id.is_empty());

    // The admitted event is active, normalized onto the canonical shape.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-intake",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    let event = &body["data"]["items"][0];
    assert_eq!(event["id"], alert_id);
    assert_eq!(event["severity"], "P0");
    assert_eq!(event["rule_name"], "disk full");
    assert_eq!(event["labels"]["host"], "db-01");
    assert_eq!(event["labels"]["source"], "grafana");

    // Same (source, host, title) dedups into a refresh.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/webhook/{token}"),
        None,
        Some(json!({
            "title": "disk full",
            "severity": "critical",
            "host": "db-01",
            "description": "/dev/sda1 is at 99%"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "alert merged into existing active event");

    // Both deliveries were audited, verbatim payload and all.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/webhooks/{id}/alerts"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    let items = body["data"]["items"].as_array().expect("items should be array");
    for item in items {
        assert_eq!(item["severity"], "P0");
        assert_eq!(item["status"], "firing");
        assert_eq!(item["source_type"], "grafana");
        assert!(item["raw_payload"]
            .as_str()
            .unwrap_or_default()
            .contains("disk full"));
    }
    let outcomes: Vec<&str> = items
        .iter()
        .filter_map(|i| i["outcome"].as_str())
        .collect();
    assert!(outcomes.contains(&"created"));
    assert!(outcomes.contains(&"refreshed"));

    // Every delivery bumps the call counter.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/webhooks/{id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["call_count"], 2);
    assert!(body["data"]["last_called_at"].is_string());
}

#[tokio::test]
async fn intake_should_reject_unknown_disabled_and_malformed() {
    let ctx = build_test_context().await.expect("test context should build");
    let (id, token) = create_intake_webhook(&ctx.app, "fc-rej", "zabbix", vec![]).await;

    // Unknown token: no audit record, no hint which part was wrong.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/webhook/ffffffffffffffffffffffffffffffff",
        None,
        Some(json!({"title": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "unknown webhook id");
    assert!(body["alertId"].is_null());

    // Disabled webhook keeps its token but refuses traffic.
    let (status, _, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/webhooks/{id}"),
        Some(TENANT),
        Some(json!({"enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/webhook/{token}"),
        None,
        Some(json!({"title": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "webhook is disabled");

    let (status, _, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/webhooks/{id}"),
        Some(TENANT),
        Some(json!({"enabled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Not JSON at all.
    let (status, body, _) = request_raw(
        &ctx.app,
        "POST",
        &format!("/webhook/{token}"),
        "definitely not json",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "request body is not valid JSON");

    // Neither rejection produced an audit record.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/webhooks/{id}/alerts"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn intake_recovery_for_unknown_fingerprint_should_be_audited_not_admitted() {
    let ctx = build_test_context().await.expect("test context should build");
    let (id, token) = create_intake_webhook(&ctx.app, "fc-rec", "grafana", vec![]).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/webhook/{token}"),
        None,
        Some(json!({
            "title": "transient blip",
            "host": "web-03",
            "status": "resolved"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "recovery for unknown alert ignored");
    // No event was admitted, so the id points at the audit record.
    assert!(body["alertId"].as_str().is_some());

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/events?fault_center_id=fc-rec",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/webhooks/{id}/alerts"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["outcome"], "suppressed");
    assert_eq!(body["data"]["items"][0]["status"], "resolved");
    assert!(body["data"]["items"][0]["event_id"].is_null());
}

// ---- Process traces ----

#[tokio::test]
async fn trace_creation_should_resolve_fingerprints_and_be_idempotent() {
    let ctx = build_test_context().await.expect("test context should build");
    push_firing_event(&ctx.app, "fc-tr", "fp-tr-1", "P1").await;

    // Neither an event id nor a fingerprint.
    let (status, body, _) =
        request_json(&ctx.app, "POST", "/v1/traces", Some(TENANT), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    // Unknown fingerprint resolves nowhere.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/traces",
        Some(TENANT),
        Some(json!({"fingerprint": "fp-no-such", "fault_center_id": "fc-tr"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);

    // Create by fingerprint: the server resolves it to the event id.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/traces",
        Some(TENANT),
        Some(json!({
            "fingerprint": "fp-tr-1",
            "fault_center_id": "fc-tr",
            "assigned_to": "lisi"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ok_envelope(&body);
    let event_id = body["data"]["event_id"]
        .as_str()
        .expect("event id should exist")
        .to_string();
    let trace_id = body["data"]["id"].as_str().expect("trace id").to_string();
    assert_eq!(body["data"]["status"], "Detected");
    assert_eq!(body["data"]["assigned_to"], "lisi");
    let steps = body["data"]["steps"].as_array().expect("steps");
    assert_eq!(steps.len(), 5);
    assert_eq!(steps[0]["name"], "故障检测");
    assert!(steps[0]["started_at"].is_string());
    assert_eq!(steps[0]["completed"], false);
    assert!(steps[1]["started_at"].is_null());

    // Second create for the same event returns the existing trace.
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/traces",
        Some(TENANT),
        Some(json!({"event_id": event_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], trace_id.as_str());

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/traces/{event_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], trace_id.as_str());

    // Resolving the underlying event closes the open detection step.
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/resolve",
        Some(TENANT),
        Some(json!({"fault_center_id": "fc-tr", "fingerprints": ["fp-tr-1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/traces/{event_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["steps"][0]["completed"], true);
    // The trace status machine is independent of event recovery.
    assert_eq!(body["data"]["status"], "Detected");

    // A resolved event can still gain a trace: fingerprint resolution
    // falls through to the archive.
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/resolve",
        Some(TENANT),
        Some(json!({"fault_center_id": "fc-tr", "fingerprints": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    push_firing_event(&ctx.app, "fc-tr", "fp-tr-2", "P2").await;
    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/events/resolve",
        Some(TENANT),
        Some(json!({"fault_center_id": "fc-tr", "fingerprints": ["fp-tr-2"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/traces",
        Some(TENANT),
        Some(json!({"fingerprint": "fp-tr-2", "fault_center_id": "fc-tr"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["data"]["event_id"].as_str().is_some());
}

#[tokio::test]
async fn trace_status_walk_should_enforce_the_transition_graph() {
    let ctx = build_test_context().await.expect("test context should build");
    push_firing_event(&ctx.app, "fc-walk", "fp-walk", "P0").await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/traces",
        Some(TENANT),
        Some(json!({"fingerprint": "fp-walk", "fault_center_id": "fc-walk"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = body["data"]["event_id"]
        .as_str()
        .expect("event id should exist")
        .to_string();
    let status_uri = format!("/v1/traces/{event_id}/status");

    // Jumping straight to completed is not in the graph.
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &status_uri,
        Some(TENANT),
        Some(json!({"status": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1102);

    // Unknown status strings are a caller bug, not a conflict.
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &status_uri,
        Some(TENANT),
        Some(json!({"status": "meditating"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    // Forward walk, including the one backward edge and case-insensitive
    // status spellings.
    for (next, expected) in [
        ("analyzing", "Analyzing"),
        ("correlated", "Correlated"),
        ("processing", "Processing"),
        ("Validated", "Validated"),
        ("processing", "Processing"),
        ("validated", "Validated"),
        ("completed", "Completed"),
    ] {
        let (status, body, _) = request_json(
            &ctx.app,
            "PUT",
            &status_uri,
            Some(TENANT),
            Some(json!({"status": next, "operator": "wangwu"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "transition to {next} should work");
        assert_eq!(body["data"]["status"], expected);
    }

    // Completed is terminal: every step closed, end time set once.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/traces/{event_id}"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["ended_at"].is_string());
    for step in body["data"]["steps"].as_array().expect("steps") {
        if step["started_at"].is_string() {
            assert_eq!(step["completed"], true);
        }
    }

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &status_uri,
        Some(TENANT),
        Some(json!({"status": "processing"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_err_envelope(&body, 1102);
}

#[tokio::test]
async fn trace_analysis_logs_and_stats_should_aggregate() {
    let ctx = build_test_context().await.expect("test context should build");
    push_firing_event(&ctx.app, "fc-agg", "fp-agg-1", "P1").await;
    push_firing_event(&ctx.app, "fc-agg", "fp-agg-2", "P2").await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/traces",
        Some(TENANT),
        Some(json!({"fingerprint": "fp-agg-1", "fault_center_id": "fc-agg"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = body["data"]["event_id"]
        .as_str()
        .expect("event id should exist")
        .to_string();

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/traces",
        Some(TENANT),
        Some(json!({"fingerprint": "fp-agg-2", "fault_center_id": "fc-agg"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Attach an analysis; a blank one is rejected.
    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/traces/{event_id}/analysis"),
        Some(TENANT),
        Some(json!({"analysis": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1001);

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        &format!("/v1/traces/{event_id}/analysis"),
        Some(TENANT),
        Some(json!({"analysis": "磁盘写满由备份任务引起"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["ai_analysis"], "磁盘写满由备份任务引起");

    // Walk the first trace to completion.
    for next in ["analyzing", "processing", "completed"] {
        let (status, _, _) = request_json(
            &ctx.app,
            "PUT",
            &format!("/v1/traces/{event_id}/status"),
            Some(TENANT),
            Some(json!({"status": next})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    // Operation logs read back oldest first: the create comes first,
    // every mutation after it in order.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        &format!("/v1/traces/{event_id}/logs"),
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 5);
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items[0]["action"], "create");
    assert_eq!(items[1]["action"], "update_analysis");
    assert_eq!(items[2]["action"], "update_status");
    assert!(items[2]["before_snapshot"].is_string());
    assert!(items[2]["after_snapshot"].is_string());
    assert_eq!(items[4]["action"], "update_status");
    assert_eq!(items[4]["operator"], "ops");

    let (status, body, _) =
        request_no_body(&ctx.app, "GET", "/v1/traces/stats", Some(TENANT)).await;
    assert_eq!(status, StatusCode::OK);
    assert_ok_envelope(&body);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["completed"], 1);
    assert!((body["data"]["completion_rate"].as_f64().unwrap() - 0.5).abs() < 1e-9);
    assert_eq!(body["data"]["by_status"]["Completed"], 1);
    assert_eq!(body["data"]["by_status"]["Detected"], 1);

    // A window in the far past sees nothing.
    let (status, body, _) = request_no_body(
        &ctx.app,
        "GET",
        "/v1/traces/stats?created__lte=2000-01-01T00:00:00Z",
        Some(TENANT),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 0);
}

// ---- OpenAPI surface ----

#[tokio::test]
async fn openapi_endpoints_should_be_accessible() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].is_object());
    assert!(body["paths"].get("/v1/events/push").is_some());
    assert!(body["paths"].get("/webhook/{webhook_id}").is_some());

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/openapi.yaml", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null() || body.is_object() || body.is_string());
    if let Some(raw) = body.as_str() {
        assert!(raw.contains("openapi:"));
    }
}
