use chrono::{DateTime, TimeZone, Utc};
use faultline_common::fingerprint::intake_fingerprint;
use faultline_common::types::{AlertEvent, ConfirmState, Severity};
use serde_json::Value;
use std::collections::HashMap;

/// Ordered synonym lists per logical field. First present, non-empty key
/// wins. Extraction is best-effort: a missing field falls back to a safe
/// default, never an error.
const ID_KEYS: [&str; 6] = ["id", "alert_id", "alertId", "event_id", "eventId", "uuid"];
const TITLE_KEYS: [&str; 7] = [
    "title",
    "alert_name",
    "alertname",
    "alertName",
    "name",
    "summary",
    "subject",
];
const CONTENT_KEYS: [&str; 8] = [
    "content",
    "description",
    "message",
    "msg",
    "detail",
    "details",
    "text",
    "body",
];
const HOST_KEYS: [&str; 6] = ["host", "hostname", "instance", "ip", "server", "node"];
const SERVICE_KEYS: [&str; 5] = ["service", "app", "application", "job", "component"];
const SEVERITY_KEYS: [&str; 4] = ["severity", "level", "priority", "urgency"];
const STATUS_KEYS: [&str; 5] = ["status", "state", "event_type", "eventType", "action"];
const TIMESTAMP_KEYS: [&str; 8] = [
    "timestamp",
    "time",
    "occurred_at",
    "occurredAt",
    "start_time",
    "startTime",
    "created_at",
    "createdAt",
];

/// 第三方告警归一化结果：任意入站 JSON 映射为规范事件形态。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAlert {
    /// 外部系统自带的告警 ID（缺失时为 None）
    pub external_id: Option<String>,
    /// 标题
    pub title: String,
    /// 内容
    pub content: String,
    /// 主机
    pub host: String,
    /// 服务
    pub service: Option<String>,
    /// 归一化级别
    pub severity: Severity,
    /// 是否为恢复类状态
    pub resolved: bool,
    /// 事件时间（无法解析时取当前时间）
    pub timestamp: DateTime<Utc>,
    /// 基于 (source, host, title) 的去重指纹
    pub fingerprint: String,
}

/// Map an arbitrary inbound JSON object onto the canonical alert shape.
///
/// Tolerates any payload: non-object bodies, absent fields and unknown
/// severity/status spellings all normalize to defaults rather than failing.
pub fn normalize(source: &str, payload: &Value) -> NormalizedAlert {
    let external_id = extract_string(payload, &ID_KEYS);
    let title = extract_string(payload, &TITLE_KEYS).unwrap_or_else(|| "unknown alert".to_string());
    let content = extract_string(payload, &CONTENT_KEYS).unwrap_or_default();
    let host = extract_string(payload, &HOST_KEYS).unwrap_or_default();
    let service = extract_string(payload, &SERVICE_KEYS);
    let severity = extract_string(payload, &SEVERITY_KEYS)
        .map(|raw| normalize_severity(&raw))
        .unwrap_or_default();
    let resolved = extract_string(payload, &STATUS_KEYS)
        .map(|raw| is_resolved_status(&raw))
        .unwrap_or(false);
    let timestamp = extract_string(payload, &TIMESTAMP_KEYS)
        .and_then(|raw| parse_timestamp(&raw))
        .unwrap_or_else(Utc::now);
    let fingerprint = intake_fingerprint(source, &host, &title);

    NormalizedAlert {
        external_id,
        title,
        content,
        host,
        service,
        severity,
        resolved,
        timestamp,
        fingerprint,
    }
}

/// Map every known textual/numeric severity spelling onto the three-tier
/// scale. Unrecognized input is P2, never a rejection.
pub fn normalize_severity(raw: &str) -> Severity {
    match raw.trim().to_lowercase().as_str() {
        "p0" | "critical" | "fatal" | "emergency" | "disaster" | "0" | "5" => Severity::P0,
        "p1" | "error" | "major" | "high" | "1" | "4" => Severity::P1,
        "p2" | "warning" | "warn" | "info" | "notice" | "low" | "minor" | "2" | "3" => Severity::P2,
        _ => Severity::P2,
    }
}

/// True for the "resolved" keyword family; everything else means firing.
pub fn is_resolved_status(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "resolved" | "resolve" | "recovered" | "recovery" | "ok" | "closed" | "close"
    )
}

fn extract_string(payload: &Value, keys: &[&str]) -> Option<String> {
    let object = payload.as_object()?;
    for key in keys {
        if let Some(value) = object.get(*key) {
            if let Some(s) = value_to_string(value) {
                if !s.is_empty() {
                    return Some(s);
                }
            }
        }
    }
    None
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// RFC 3339 first, then unix epoch in seconds or milliseconds.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    let n: i64 = raw.parse().ok()?;
    let (secs, millis) = if n > 1_000_000_000_000 {
        (n / 1000, n % 1000)
    } else {
        (n, 0)
    };
    Utc.timestamp_opt(secs, (millis * 1_000_000) as u32).single()
}

impl NormalizedAlert {
    /// Build the canonical active-event form for one normalized intake.
    /// Lifecycle fields (id, trigger times, claim state) are finalized by
    /// the admission pipeline.
    pub fn to_event(&self, tenant_id: &str, fault_center_id: &str, source: &str) -> AlertEvent {
        let mut labels = HashMap::new();
        labels.insert("source".to_string(), source.to_string());
        if !self.host.is_empty() {
            labels.insert("host".to_string(), self.host.clone());
        }
        if let Some(service) = &self.service {
            labels.insert("service".to_string(), service.clone());
        }
        AlertEvent {
            id: String::new(),
            tenant_id: tenant_id.to_string(),
            fault_center_id: fault_center_id.to_string(),
            fingerprint: self.fingerprint.clone(),
            rule_id: String::new(),
            rule_name: self.title.clone(),
            datasource: source.to_string(),
            severity: self.severity,
            labels,
            annotations: self.content.clone(),
            eval_value: 0.0,
            first_trigger_time: self.timestamp,
            last_eval_time: self.timestamp,
            resolved: self.resolved,
            resolved_time: None,
            confirm: ConfirmState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_table_covers_known_spellings() {
        for raw in ["critical", "Fatal", "5", "disaster", "P0"] {
            assert_eq!(normalize_severity(raw), Severity::P0, "raw={raw}");
        }
        for raw in ["error", "MAJOR", "high", "4"] {
            assert_eq!(normalize_severity(raw), Severity::P1, "raw={raw}");
        }
        for raw in ["warning", "info", "unknown-xyz", ""] {
            assert_eq!(normalize_severity(raw), Severity::P2, "raw={raw}");
        }
    }

    #[test]
    fn status_defaults_to_firing() {
        assert!(is_resolved_status("RESOLVED"));
        assert!(is_resolved_status("recovery"));
        assert!(!is_resolved_status("firing"));
        assert!(!is_resolved_status("problem"));
        assert!(!is_resolved_status(""));
    }

    #[test]
    fn first_present_synonym_wins() {
        let payload = json!({
            "alertname": "DiskFull",
            "summary": "ignored, alertname comes first",
            "msg": "/dev/sda1 at 98%",
            "instance": "db-01",
        });
        let alert = normalize("zabbix", &payload);
        assert_eq!(alert.title, "DiskFull");
        assert_eq!(alert.content, "/dev/sda1 at 98%");
        assert_eq!(alert.host, "db-01");
    }

    #[test]
    fn empty_values_are_skipped() {
        let payload = json!({ "title": "", "name": "fallback title" });
        let alert = normalize("custom", &payload);
        assert_eq!(alert.title, "fallback title");
    }

    #[test]
    fn non_object_payload_normalizes_to_defaults() {
        let alert = normalize("custom", &json!("not an object"));
        assert_eq!(alert.title, "unknown alert");
        assert_eq!(alert.severity, Severity::P2);
        assert!(!alert.resolved);
        assert!(!alert.fingerprint.is_empty());
    }

    #[test]
    fn numeric_severity_is_accepted() {
        let payload = json!({ "level": 5 });
        let alert = normalize("custom", &payload);
        assert_eq!(alert.severity, Severity::P0);
    }

    #[test]
    fn timestamp_accepts_rfc3339_and_epoch() {
        assert!(parse_timestamp("2026-01-02T03:04:05Z").is_some());
        assert!(parse_timestamp("1767322800").is_some());
        assert!(parse_timestamp("1767322800123").is_some());
        assert!(parse_timestamp("not a time").is_none());
    }

    #[test]
    fn fingerprint_keyed_by_source_host_title() {
        let payload = json!({ "title": "disk full", "host": "db-01" });
        let a = normalize("zabbix", &payload);
        let b = normalize("zabbix", &payload);
        let c = normalize("nagios", &payload);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }
}
