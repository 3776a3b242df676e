use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::truncate_string;
use crate::{Delivery, NotificationChannel, RecipientResult, SendReceipt};
use async_trait::async_trait;
use faultline_common::types::AlertEvent;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing;

/// SMS bodies are short; everything past this is cut.
const MAX_SMS_LENGTH: usize = 300;

pub struct SmsChannel {
    instance_id: String,
    client: reqwest::Client,
    gateway_url: String,
    api_key: String,
}

impl SmsChannel {
    pub fn new(instance_id: &str, gateway_url: &str, api_key: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            gateway_url: gateway_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn format_message(event: &AlertEvent) -> String {
        let status_tag = if event.resolved {
            "[RESOLVED]"
        } else if event.confirm.claimed {
            "[CLAIMED]"
        } else {
            ""
        };
        let message = format!(
            "[faultline][{severity}]{status_tag} {rule}: {annotations}",
            severity = event.severity,
            status_tag = status_tag,
            rule = event.rule_name,
            annotations = event.annotations,
        );
        truncate_string(&message, MAX_SMS_LENGTH)
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    async fn send(&self, event: &AlertEvent, delivery: &Delivery) -> Result<SendReceipt> {
        let message = Self::format_message(event);
        let mut receipt = SendReceipt::default();

        for phone in &delivery.recipients {
            let payload = serde_json::json!({
                "to": phone,
                "message": message,
            });

            let mut last_err = None;
            let mut attempts = 0u32;
            for attempt in 0..3u32 {
                attempts = attempt + 1;
                match self
                    .client
                    .post(&self.gateway_url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&payload)
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
                            "SMS gateway returned error, retrying"
                        );
                        last_err = Some(NotifyError::ApiError {
                            service: "sms".to_string(),
                            status: status.as_u16(),
                            body: resp.text().await.unwrap_or_default(),
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            instance = %self.instance_id,
                            attempt = attempts,
                            error = %e,
                            "SMS send failed, retrying"
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
                tracing::error!(error = %e, "SMS failed after 3 retries");
                receipt
                    .results
                    .push(RecipientResult::failed(phone, e.to_string()));
            } else {
                receipt.results.push(RecipientResult::ok(phone));
            }
        }

        Ok(receipt)
    }

    fn channel_type(&self) -> &str {
        "sms"
    }
}

// Plugin

#[derive(Deserialize)]
struct SmsConfig {
    gateway_url: String,
    api_key: String,
}

pub struct SmsPlugin;

impl ChannelPlugin for SmsPlugin {
    fn name(&self) -> &str {
        "sms"
    }

    fn recipient_type(&self) -> &str {
        "phone"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<SmsConfig>(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("sms: {e}")))?;
        Ok(())
    }

    fn create_channel(
        &self,
        instance_id: &str,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>> {
        let cfg: SmsConfig = serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("sms: {e}")))?;
        Ok(Arc::new(SmsChannel::new(
            instance_id,
            &cfg.gateway_url,
            &cfg.api_key,
        )))
    }
}
