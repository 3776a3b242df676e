use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::{Delivery, NotificationChannel, RecipientResult, SendReceipt};
use async_trait::async_trait;
use faultline_common::types::AlertEvent;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing;

pub struct WebhookChannel {
    instance_id: String,
    client: reqwest::Client,
    body_template: Option<String>,
}

impl WebhookChannel {
    pub fn new(instance_id: &str, body_template: Option<String>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            body_template,
        }
    }

    fn render_body(&self, event: &AlertEvent) -> String {
        let status = if event.resolved { "resolved" } else { "firing" };
        if let Some(template) = &self.body_template {
            template
                .replace("{{event_id}}", &event.id)
                .replace("{{tenant_id}}", &event.tenant_id)
                .replace("{{fault_center_id}}", &event.fault_center_id)
                .replace("{{fingerprint}}", &event.fingerprint)
                .replace("{{rule_name}}", &event.rule_name)
                .replace("{{datasource}}", &event.datasource)
                .replace("{{severity}}", &event.severity.to_string())
                .replace("{{annotations}}", &event.annotations)
                .replace("{{value}}", &format!("{:.2}", event.eval_value))
                .replace(
                    "{{labels}}",
                    &faultline_common::types::format_labels(&event.labels),
                )
                .replace("{{first_trigger_time}}", &event.first_trigger_time.to_rfc3339())
                .replace("{{status}}", status)
        } else {
            serde_json::json!({
                "event_id": event.id,
                "tenant_id": event.tenant_id,
                "fault_center_id": event.fault_center_id,
                "fingerprint": event.fingerprint,
                "rule_id": event.rule_id,
                "rule_name": event.rule_name,
                "datasource": event.datasource,
                "severity": event.severity.to_string(),
                "labels": event.labels,
                "annotations": event.annotations,
                "eval_value": event.eval_value,
                "first_trigger_time": event.first_trigger_time.to_rfc3339(),
                "last_eval_time": event.last_eval_time.to_rfc3339(),
                "status": status,
                "claimed": event.confirm.claimed,
                "claimant": event.confirm.claimant,
            })
            .to_string()
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, event: &AlertEvent, delivery: &Delivery) -> Result<SendReceipt> {
        let body = self.render_body(event);
        let mut receipt = SendReceipt::default();

        let mut urls: Vec<&str> = Vec::new();
        if !delivery.hook.is_empty() {
            urls.push(delivery.hook.as_str());
        }
        urls.extend(delivery.recipients.iter().map(|r| r.as_str()));

        for url in urls {
            let mut last_err = None;
            let mut attempts = 0u32;
            for attempt in 0..3u32 {
                attempts = attempt + 1;
                match self
                    .client
                    .post(url)
                    .header("Content-Type", "application/json")
                    .body(body.clone())
                    .send()
                    .await
                {
                    Ok(resp) if resp.status().is_success() => {
                        last_err = None;
                        break;
                    }
                    Ok(resp) => {
                        let status = resp.status();
                        tracing::warn!(
                            instance = %self.instance_id,
                            attempt = attempts,
                            status = %status,
                            "Webhook returned non-success status, retrying"
                        );
                        last_err = Some(NotifyError::ApiError {
                            service: "webhook".to_string(),
                            status: status.as_u16(),
                            body: resp.text().await.unwrap_or_default(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            instance = %self.instance_id,
                            attempt = attempts,
                            error = %e,
                            "Webhook send failed, retrying"
                        );
                        last_err = Some(e.into());
                    }
                }
                if attempt < 2 {
                    tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt)))
                        .await;
                }
            }

            receipt.retry_count += attempts.saturating_sub(1);

            if let Some(e) = last_err {
                tracing::error!(error = %e, "Webhook failed after 3 retries");
                receipt.results.push(RecipientResult::failed(url, e.to_string()));
            } else {
                receipt.results.push(RecipientResult::ok(url));
            }
        }

        Ok(receipt)
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }
}

// Plugin

#[derive(Deserialize)]
struct WebhookConfig {
    body_template: Option<String>,
}

pub struct WebhookPlugin;

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn recipient_type(&self) -> &str {
        "webhook_url"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<WebhookConfig>(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("webhook: {e}")))?;
        Ok(())
    }

    fn create_channel(
        &self,
        instance_id: &str,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>> {
        let cfg: WebhookConfig = serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("webhook: {e}")))?;
        Ok(Arc::new(WebhookChannel::new(instance_id, cfg.body_template)))
    }
}
