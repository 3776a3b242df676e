use crate::error::{NotifyError, Result};
use crate::Delivery;
use chrono::{DateTime, Utc};
use faultline_common::types::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 按级别覆盖的投递路由。
///
/// 未设置的字段回落到目标的默认值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Route {
    /// 匹配的告警级别（同一目标内唯一）
    pub severity: Severity,
    /// 覆盖的 hook 地址
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    /// 覆盖的接收人列表
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    /// 覆盖的签名密钥
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

/// 通知目标：一个渠道实例的投递配置，带按级别的路由表。
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NotificationTarget {
    /// 目标 ID
    pub id: String,
    /// 租户 ID
    pub tenant_id: String,
    /// 故障中心 ID（同一故障中心内的事件共享通知上下文）
    pub fault_center_id: String,
    /// 名称
    pub name: String,
    /// 渠道类型：webhook / email / sms / dingtalk
    pub channel_type: String,
    /// 默认 hook 地址
    pub default_hook: String,
    /// 默认签名密钥
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sign: Option<String>,
    /// 默认接收人列表
    #[serde(default)]
    pub default_recipients: Vec<String>,
    /// 按级别路由表（有序，首个匹配生效）
    #[serde(default)]
    pub routes: Vec<Route>,
    /// 值班表引用（可选，由上游排班系统解释）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_roster_id: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl NotificationTarget {
    /// The delivery parameters the target's defaults describe.
    pub fn default_delivery(&self) -> Delivery {
        Delivery {
            hook: self.default_hook.clone(),
            recipients: self.default_recipients.clone(),
            sign: self.default_sign.clone(),
        }
    }
}

/// Resolve delivery parameters for an event severity: the first route whose
/// severity matches wins, each unset route field falling back to the
/// target's default. No matching route means the defaults apply unchanged.
pub fn resolve_delivery(target: &NotificationTarget, severity: Severity) -> Delivery {
    match target.routes.iter().find(|r| r.severity == severity) {
        Some(route) => Delivery {
            hook: route
                .hook
                .clone()
                .unwrap_or_else(|| target.default_hook.clone()),
            recipients: route
                .recipients
                .clone()
                .unwrap_or_else(|| target.default_recipients.clone()),
            sign: route.sign.clone().or_else(|| target.default_sign.clone()),
        },
        None => target.default_delivery(),
    }
}

/// Whether a delivery can actually reach anyone on the given channel type.
/// Hook-style channels need a hook URL; address-style channels need at
/// least one recipient.
pub fn is_deliverable(channel_type: &str, delivery: &Delivery) -> bool {
    match channel_type {
        "email" | "sms" => !delivery.recipients.is_empty(),
        _ => !delivery.hook.is_empty() || !delivery.recipients.is_empty(),
    }
}

/// Validate a target before create/update: known channel type, no duplicate
/// route severities, and for SMS at least one deliverable configuration
/// (default or per-route) so a target that can never send is rejected
/// up front.
pub fn validate_target(target: &NotificationTarget) -> Result<()> {
    if target.name.trim().is_empty() {
        return Err(NotifyError::InvalidConfig(
            "target name must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for route in &target.routes {
        if !seen.insert(route.severity) {
            return Err(NotifyError::InvalidConfig(format!(
                "duplicate route severity {} in target '{}'",
                route.severity, target.name
            )));
        }
    }

    if target.channel_type == "sms" && !has_deliverable_route(target) {
        return Err(NotifyError::NoDeliverableRoute(format!(
            "sms target '{}' has neither default phone numbers nor a route with recipients",
            target.name
        )));
    }

    Ok(())
}

/// True when the defaults or at least one route can deliver.
pub fn has_deliverable_route(target: &NotificationTarget) -> bool {
    if is_deliverable(&target.channel_type, &target.default_delivery()) {
        return true;
    }
    target
        .routes
        .iter()
        .any(|r| is_deliverable(&target.channel_type, &resolve_delivery(target, r.severity)))
}
