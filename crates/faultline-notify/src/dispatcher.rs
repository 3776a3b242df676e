use crate::error::{NotifyError, Result};
use crate::plugin::ChannelRegistry;
use crate::routing::{
    has_deliverable_route, is_deliverable, resolve_delivery, validate_target, NotificationTarget,
};
use crate::utils::mask_recipient;
use crate::Delivery;
use chrono::Utc;
use faultline_common::types::{AlertEvent, ConfirmState, Severity};
use std::collections::HashMap;
use std::sync::Arc;
use tracing;

/// One failed delivery inside a batch. Recipient identifiers are masked
/// before they end up here, so reports never echo hook secrets back.
#[derive(Debug, Clone)]
pub struct DispatchFailure {
    pub target_id: String,
    pub target_name: String,
    pub channel_type: String,
    /// Which route produced the failure: a severity name or "default".
    pub route: String,
    pub recipient: String,
    pub error: String,
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} target '{}' route {} ({}): {}",
            self.channel_type, self.target_name, self.route, self.recipient, self.error
        )
    }
}

/// Aggregated outcome of a multi-target, multi-route dispatch. A failure on
/// one send never stops the others; everything that went wrong is listed
/// here instead.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Target/route sends attempted.
    pub attempted: usize,
    /// Recipients reached successfully.
    pub delivered: usize,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Compact description of what failed, for error envelopes and logs.
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            return format!("{} sends delivered", self.delivered);
        }
        let details: Vec<String> = self.failures.iter().map(|f| f.to_string()).collect();
        format!(
            "{} of {} sends failed: {}",
            self.failures.len(),
            self.attempted,
            details.join("; ")
        )
    }
}

/// Fans one event out to notification targets through the shared channel
/// instances in the [`ChannelRegistry`].
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Deliver `event` to every target, resolving each target's route table
    /// by the event severity. Failures are collected, never propagated.
    pub async fn dispatch(
        &self,
        event: &AlertEvent,
        targets: &[NotificationTarget],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for target in targets {
            let delivery = resolve_delivery(target, event.severity);
            let route = route_label(target, event.severity);
            self.send_one(event, target, &delivery, &route, &mut report)
                .await;
        }
        if !report.failures.is_empty() {
            tracing::warn!(
                fingerprint = %event.fingerprint,
                failed = report.failures.len(),
                attempted = report.attempted,
                "Dispatch finished with failures"
            );
        }
        report
    }

    async fn send_one(
        &self,
        event: &AlertEvent,
        target: &NotificationTarget,
        delivery: &Delivery,
        route: &str,
        report: &mut DispatchReport,
    ) {
        report.attempted += 1;

        let failure = |recipient: &str, error: String| DispatchFailure {
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            channel_type: target.channel_type.clone(),
            route: route.to_string(),
            recipient: recipient.to_string(),
            error,
        };

        if !is_deliverable(&target.channel_type, delivery) {
            report
                .failures
                .push(failure("-", "no deliverable configuration".to_string()));
            return;
        }

        let Some(channel) = self.registry.get(&target.channel_type) else {
            report.failures.push(failure(
                "-",
                NotifyError::ChannelUnavailable(target.channel_type.clone()).to_string(),
            ));
            return;
        };

        match channel.send(event, delivery).await {
            Ok(receipt) => {
                report.delivered += receipt.results.iter().filter(|r| r.error.is_none()).count();
                for result in receipt.failures() {
                    report.failures.push(failure(
                        &mask_recipient(&result.recipient),
                        result.error.clone().unwrap_or_default(),
                    ));
                }
            }
            Err(e) => {
                report.failures.push(failure("-", e.to_string()));
            }
        }
    }

    /// Send a synthetic event through every deliverable configuration of a
    /// target (defaults plus each route) without persisting anything.
    ///
    /// Precondition checks fail the whole call fast: a target with no
    /// deliverable configuration at all is a configuration error, not an
    /// empty report.
    pub async fn test_target(&self, target: &NotificationTarget) -> Result<DispatchReport> {
        validate_target(target)?;
        if !self.registry.has_plugin(&target.channel_type) {
            return Err(NotifyError::ChannelUnavailable(target.channel_type.clone()));
        }
        if !has_deliverable_route(target) {
            return Err(NotifyError::NoDeliverableRoute(format!(
                "target '{}' has no deliverable configuration",
                target.name
            )));
        }

        let mut report = DispatchReport::default();

        let default_delivery = target.default_delivery();
        if is_deliverable(&target.channel_type, &default_delivery) {
            let event = test_event(target, Severity::P2);
            self.send_one(&event, target, &default_delivery, "default", &mut report)
                .await;
        }

        for route in &target.routes {
            let delivery = resolve_delivery(target, route.severity);
            if is_deliverable(&target.channel_type, &delivery) {
                let event = test_event(target, route.severity);
                self.send_one(
                    &event,
                    target,
                    &delivery,
                    &route.severity.to_string(),
                    &mut report,
                )
                .await;
            }
        }

        Ok(report)
    }
}

fn route_label(target: &NotificationTarget, severity: Severity) -> String {
    if target.routes.iter().any(|r| r.severity == severity) {
        severity.to_string()
    } else {
        "default".to_string()
    }
}

fn test_event(target: &NotificationTarget, severity: Severity) -> AlertEvent {
    let now = Utc::now();
    let mut labels = HashMap::new();
    labels.insert("target".to_string(), target.name.clone());
    AlertEvent {
        id: faultline_common::id::next_id(),
        tenant_id: target.tenant_id.clone(),
        fault_center_id: target.fault_center_id.clone(),
        fingerprint: format!("test-{}", target.id),
        rule_id: String::new(),
        rule_name: "通知测试".to_string(),
        datasource: "faultline".to_string(),
        severity,
        labels,
        annotations: format!("这是一条测试通知，用于验证通知目标「{}」的投递配置。", target.name),
        eval_value: 0.0,
        first_trigger_time: now,
        last_eval_time: now,
        resolved: false,
        resolved_time: None,
        confirm: ConfirmState::default(),
    }
}
