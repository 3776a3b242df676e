use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Alert severity level, ordered from lowest to highest.
///
/// Variants are declared lowest-first so the derived `Ord` matches the
/// escalation order: `P2 < P1 < P0`.
///
/// # Examples
///
/// ```
/// use faultline_common::types::Severity;
///
/// let sev: Severity = "P0".parse().unwrap();
/// assert_eq!(sev, Severity::P0);
/// assert_eq!(sev.to_string(), "P0");
/// assert!(Severity::P0 > Severity::P2);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
pub enum Severity {
    P2,
    P1,
    P0,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::P2
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::P0 => write!(f, "P0"),
            Severity::P1 => write!(f, "P1"),
            Severity::P2 => write!(f, "P2"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "P0" => Ok(Severity::P0),
            "P1" => Ok(Severity::P1),
            "P2" => Ok(Severity::P2),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// 认领状态：记录活跃事件是否已被值班人员确认。
///
/// 首次认领生效后 `claimant` 与 `claim_time` 不再变化（first claim wins）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ConfirmState {
    /// 是否已认领
    pub claimed: bool,
    /// 认领人（用户名）
    pub claimant: Option<String>,
    /// 认领时间
    pub claim_time: Option<DateTime<Utc>>,
}

/// 告警事件（活跃集内的规范形态）。
///
/// 同一 (tenant_id, fault_center_id, fingerprint) 在活跃集中至多存在一条记录；
/// 事件被恢复并归档后才会离开活跃集。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AlertEvent {
    /// 内部事件 ID（雪花 ID，去重刷新时保持不变）
    pub id: String,
    /// 租户 ID
    pub tenant_id: String,
    /// 故障中心 ID
    pub fault_center_id: String,
    /// 内容指纹（租户 + 故障中心内唯一）
    pub fingerprint: String,
    /// 规则 ID（第三方接入事件为空字符串）
    pub rule_id: String,
    /// 规则名称或第三方事件标题
    pub rule_name: String,
    /// 事件来源（如 prometheus、loki 或第三方 webhook 名称）
    pub datasource: String,
    /// 告警级别
    pub severity: Severity,
    /// 标签集合（键值对，顺序无关）
    pub labels: HashMap<String, String>,
    /// 注释 / 告警详情文本
    pub annotations: String,
    /// 本次评估值
    pub eval_value: f64,
    /// 首次触发时间（去重刷新时保持不变）
    pub first_trigger_time: DateTime<Utc>,
    /// 最近一次评估时间
    pub last_eval_time: DateTime<Utc>,
    /// 是否已恢复
    pub resolved: bool,
    /// 恢复时间
    pub resolved_time: Option<DateTime<Utc>>,
    /// 认领状态
    pub confirm: ConfirmState,
}

impl AlertEvent {
    /// Partition key used by the active cache.
    pub fn partition(&self) -> (String, String) {
        (self.tenant_id.clone(), self.fault_center_id.clone())
    }
}

/// Format labels map into a human-readable string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use faultline_common::types::format_labels;
///
/// let mut labels = HashMap::new();
/// labels.insert("host".to_string(), "db-01".to_string());
/// labels.insert("service".to_string(), "mysql".to_string());
/// let s = format_labels(&labels);
/// assert!(s.contains("host=db-01"));
/// assert!(s.contains("service=mysql"));
/// ```
pub fn format_labels(labels: &HashMap<String, String>) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_escalation() {
        assert!(Severity::P0 > Severity::P1);
        assert!(Severity::P1 > Severity::P2);
        assert_eq!(Severity::default(), Severity::P2);
    }

    #[test]
    fn severity_parse_is_case_insensitive() {
        assert_eq!("p0".parse::<Severity>().unwrap(), Severity::P0);
        assert_eq!("P1".parse::<Severity>().unwrap(), Severity::P1);
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_serde_uses_tier_names() {
        let json = serde_json::to_string(&Severity::P0).unwrap();
        assert_eq!(json, "\"P0\"");
        let back: Severity = serde_json::from_str("\"P2\"").unwrap();
        assert_eq!(back, Severity::P2);
    }
}
