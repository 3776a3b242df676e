use crate::dispatcher::Dispatcher;
use crate::error::NotifyError;
use crate::plugin::ChannelRegistry;
use crate::routing::{
    is_deliverable, resolve_delivery, validate_target, NotificationTarget, Route,
};
use crate::{Delivery, NotificationChannel, RecipientResult, SendReceipt};
use async_trait::async_trait;
use chrono::Utc;
use faultline_common::types::{AlertEvent, ConfirmState, Severity};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn make_target(channel_type: &str, default_hook: &str) -> NotificationTarget {
    let now = Utc::now();
    NotificationTarget {
        id: faultline_common::id::next_id(),
        tenant_id: "tenant-1".to_string(),
        fault_center_id: "fc-1".to_string(),
        name: "值班群通知".to_string(),
        channel_type: channel_type.to_string(),
        default_hook: default_hook.to_string(),
        default_sign: None,
        default_recipients: Vec::new(),
        routes: Vec::new(),
        duty_roster_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn make_event(severity: Severity) -> AlertEvent {
    let now = Utc::now();
    AlertEvent {
        id: faultline_common::id::next_id(),
        tenant_id: "tenant-1".to_string(),
        fault_center_id: "fc-1".to_string(),
        fingerprint: "fp-0001".to_string(),
        rule_id: "rule-1".to_string(),
        rule_name: "CPU 使用率过高".to_string(),
        datasource: "prometheus".to_string(),
        severity,
        labels: HashMap::new(),
        annotations: "CPU usage above 90% for 5 minutes".to_string(),
        eval_value: 93.5,
        first_trigger_time: now,
        last_eval_time: now,
        resolved: false,
        resolved_time: None,
        confirm: ConfirmState::default(),
    }
}

/// Test double that answers from a script: listed recipients fail, all
/// others succeed. Records every identifier it was asked to reach.
struct ScriptedChannel {
    channel_type: String,
    fail: Vec<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChannel {
    fn new(channel_type: &str) -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let channel = Arc::new(Self {
            channel_type: channel_type.to_string(),
            fail: Vec::new(),
            sent: sent.clone(),
        });
        (channel, sent)
    }

    fn failing(channel_type: &str, fail: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            channel_type: channel_type.to_string(),
            fail,
            sent: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl NotificationChannel for ScriptedChannel {
    async fn send(
        &self,
        _event: &AlertEvent,
        delivery: &Delivery,
    ) -> crate::error::Result<SendReceipt> {
        let mut recipients = Vec::new();
        if !delivery.hook.is_empty() {
            recipients.push(delivery.hook.clone());
        }
        recipients.extend(delivery.recipients.iter().cloned());

        let mut results = Vec::new();
        for recipient in recipients {
            self.sent.lock().unwrap().push(recipient.clone());
            if self.fail.contains(&recipient) {
                results.push(RecipientResult::failed(
                    &recipient,
                    "scripted failure".to_string(),
                ));
            } else {
                results.push(RecipientResult::ok(&recipient));
            }
        }
        Ok(SendReceipt {
            retry_count: 0,
            results,
        })
    }

    fn channel_type(&self) -> &str {
        &self.channel_type
    }
}

// ── Routing ──

#[test]
fn first_matching_route_wins() {
    let mut target = make_target("webhook", "https://hooks.example.com/default");
    target.routes.push(Route {
        severity: Severity::P0,
        hook: Some("https://hooks.example.com/oncall".to_string()),
        recipients: None,
        sign: None,
    });

    let p0 = resolve_delivery(&target, Severity::P0);
    assert_eq!(p0.hook, "https://hooks.example.com/oncall");

    // P1 has no route, so the defaults apply unchanged.
    let p1 = resolve_delivery(&target, Severity::P1);
    assert_eq!(p1.hook, "https://hooks.example.com/default");
}

#[test]
fn route_fields_fall_back_to_defaults_individually() {
    let mut target = make_target("dingtalk", "https://oapi.dingtalk.com/robot/send?access_token=t");
    target.default_sign = Some("SEC_default".to_string());
    target.routes.push(Route {
        severity: Severity::P0,
        hook: None,
        recipients: Some(vec!["https://oapi.dingtalk.com/robot/send?access_token=x".to_string()]),
        sign: None,
    });

    let delivery = resolve_delivery(&target, Severity::P0);
    // Recipients came from the route, hook and sign from the defaults.
    assert_eq!(delivery.recipients.len(), 1);
    assert_eq!(delivery.hook, target.default_hook);
    assert_eq!(delivery.sign.as_deref(), Some("SEC_default"));
}

#[test]
fn duplicate_route_severity_is_rejected() {
    let mut target = make_target("webhook", "https://hooks.example.com/a");
    for hook in ["https://x.example.com", "https://y.example.com"] {
        target.routes.push(Route {
            severity: Severity::P0,
            hook: Some(hook.to_string()),
            recipients: None,
            sign: None,
        });
    }

    let err = validate_target(&target).unwrap_err();
    assert!(err.to_string().contains("duplicate route severity"));
}

#[test]
fn empty_target_name_is_rejected() {
    let mut target = make_target("webhook", "https://hooks.example.com/a");
    target.name = "   ".to_string();
    assert!(validate_target(&target).is_err());
}

#[test]
fn sms_target_without_recipients_is_rejected_up_front() {
    let target = make_target("sms", "");
    let err = validate_target(&target).unwrap_err();
    assert!(matches!(err, NotifyError::NoDeliverableRoute(_)));

    // One route with phone numbers is enough to make it valid.
    let mut with_route = make_target("sms", "");
    with_route.routes.push(Route {
        severity: Severity::P0,
        hook: None,
        recipients: Some(vec!["+8613800138000".to_string()]),
        sign: None,
    });
    assert!(validate_target(&with_route).is_ok());
}

#[test]
fn deliverability_depends_on_channel_type() {
    let hook_only = Delivery {
        hook: "https://hooks.example.com/a".to_string(),
        recipients: Vec::new(),
        sign: None,
    };
    // Address-style channels need recipients; a hook is not enough.
    assert!(is_deliverable("webhook", &hook_only));
    assert!(is_deliverable("dingtalk", &hook_only));
    assert!(!is_deliverable("email", &hook_only));
    assert!(!is_deliverable("sms", &hook_only));

    let recipients_only = Delivery {
        hook: String::new(),
        recipients: vec!["ops@example.com".to_string()],
        sign: None,
    };
    assert!(is_deliverable("email", &recipients_only));
}

// ── Plugin registry ──

#[test]
fn registry_default_has_all_builtin_plugins() {
    let registry = ChannelRegistry::default();
    let mut names = registry.plugin_names();
    names.sort();
    assert_eq!(names, vec!["dingtalk", "email", "sms", "webhook"]);
}

#[test]
fn registry_rejects_unknown_channel_type() {
    let registry = ChannelRegistry::default();
    let err = registry
        .configure("pigeon", &serde_json::json!({}))
        .unwrap_err();
    assert!(matches!(err, NotifyError::UnknownChannelType(_)));
}

#[tokio::test]
async fn email_plugin_requires_smtp_settings() {
    let registry = ChannelRegistry::default();

    assert!(registry.configure("email", &serde_json::json!({})).is_err());

    let valid = serde_json::json!({
        "smtp_host": "smtp.example.com",
        "smtp_port": 587,
        "smtp_username": "alerts",
        "smtp_password": "secret",
        "from": "faultline <alerts@example.com>"
    });
    registry
        .configure("email", &valid)
        .expect("valid smtp config should configure an instance");
    assert!(registry.get("email").is_some());

    assert!(registry.remove("email"));
    assert!(registry.get("email").is_none());
}

#[test]
fn sms_plugin_requires_gateway_settings() {
    let registry = ChannelRegistry::default();

    assert!(registry.configure("sms", &serde_json::json!({})).is_err());

    let valid = serde_json::json!({
        "gateway_url": "https://sms.example.com/send",
        "api_key": "test-key"
    });
    assert!(registry.configure("sms", &valid).is_ok());
    assert!(registry.get("sms").is_some());
}

#[test]
fn hook_channels_accept_empty_config() {
    let registry = ChannelRegistry::default();
    assert!(registry
        .configure("webhook", &serde_json::json!({}))
        .is_ok());
    assert!(registry
        .configure("dingtalk", &serde_json::json!({}))
        .is_ok());
    assert!(registry.get("webhook").is_some());
    assert!(registry.get("dingtalk").is_some());
}

#[test]
fn instance_pool_set_get_remove() {
    let registry = ChannelRegistry::default();
    let (channel, _) = ScriptedChannel::new("webhook");
    registry.set("webhook", channel);

    let fetched = registry.get("webhook").expect("instance should exist");
    assert_eq!(fetched.channel_type(), "webhook");

    assert!(registry.remove("webhook"));
    assert!(!registry.remove("webhook"));
    assert!(registry.get("webhook").is_none());
}

#[test]
fn dingtalk_signed_url_carries_timestamp_and_signature() {
    use crate::channels::dingtalk::DingTalkChannel;

    let base = "https://oapi.dingtalk.com/robot/send?access_token=test";
    let signed = DingTalkChannel::sign_url(base, Some("SEC_test_secret"));
    assert!(signed.starts_with("https://oapi.dingtalk.com/robot/send?access_token=test&timestamp="));
    assert!(signed.contains("&sign="));

    // No secret means no signing at all.
    assert_eq!(DingTalkChannel::sign_url(base, None), base);
}

// ── Dispatcher ──

#[tokio::test]
async fn dispatch_reaches_every_target_despite_failures() {
    let registry = Arc::new(ChannelRegistry::default());
    registry.set(
        "webhook",
        ScriptedChannel::failing(
            "webhook",
            vec!["https://hooks.example.com/broken".to_string()],
        ),
    );
    let dispatcher = Dispatcher::new(registry);

    let broken = make_target("webhook", "https://hooks.example.com/broken");
    let healthy = make_target("webhook", "https://hooks.example.com/healthy");
    let report = dispatcher
        .dispatch(&make_event(Severity::P0), &[broken.clone(), healthy])
        .await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(!report.is_success());

    let failure = &report.failures[0];
    assert_eq!(failure.target_id, broken.id);
    // Reports carry masked identifiers, never the raw hook URL.
    assert_eq!(failure.recipient, "https://hooks.example.com/***");
    assert_eq!(failure.error, "scripted failure");
}

#[tokio::test]
async fn dispatch_reports_unconfigured_channel_instance() {
    let dispatcher = Dispatcher::new(Arc::new(ChannelRegistry::default()));
    let mut target = make_target("email", "");
    target.default_recipients = vec!["ops@example.com".to_string()];

    let report = dispatcher.dispatch(&make_event(Severity::P1), &[target]).await;

    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("not configured"));
}

#[tokio::test]
async fn dispatch_counts_undeliverable_route_as_failure() {
    let registry = Arc::new(ChannelRegistry::default());
    let (channel, sent) = ScriptedChannel::new("email");
    registry.set("email", channel);
    let dispatcher = Dispatcher::new(registry);

    // Email with no recipients anywhere: nothing to send to.
    let target = make_target("email", "");
    let report = dispatcher.dispatch(&make_event(Severity::P2), &[target]).await;

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("no deliverable configuration"));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_target_fails_fast_without_deliverable_config() {
    let dispatcher = Dispatcher::new(Arc::new(ChannelRegistry::default()));
    let target = make_target("sms", "");

    let err = dispatcher.test_target(&target).await.unwrap_err();
    assert!(matches!(err, NotifyError::NoDeliverableRoute(_)));
}

#[tokio::test]
async fn test_target_exercises_defaults_and_every_route() {
    let registry = Arc::new(ChannelRegistry::default());
    let (channel, sent) = ScriptedChannel::new("webhook");
    registry.set("webhook", channel);
    let dispatcher = Dispatcher::new(registry);

    let mut target = make_target("webhook", "https://hooks.example.com/default");
    target.routes.push(Route {
        severity: Severity::P0,
        hook: Some("https://hooks.example.com/oncall".to_string()),
        recipients: None,
        sign: None,
    });

    let report = dispatcher
        .test_target(&target)
        .await
        .expect("test send should run");

    assert_eq!(report.attempted, 2);
    assert!(report.is_success());
    let sent = sent.lock().unwrap();
    assert!(sent.contains(&"https://hooks.example.com/default".to_string()));
    assert!(sent.contains(&"https://hooks.example.com/oncall".to_string()));
}
