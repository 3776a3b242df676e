use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::{Delivery, NotificationChannel, RecipientResult, SendReceipt};
use async_trait::async_trait;
use base64::Engine;
use faultline_common::types::AlertEvent;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tracing;

type HmacSha256 = Hmac<Sha256>;

struct UrlSendResult {
    retries: u32,
    error: Option<NotifyError>,
}

pub struct DingTalkChannel {
    instance_id: String,
    client: reqwest::Client,
}

impl DingTalkChannel {
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// DingTalk robot signature: HMAC-SHA256 over "timestamp\nsecret",
    /// base64 then URL-encoded, appended as query parameters.
    pub fn sign_url(base_url: &str, secret: Option<&str>) -> String {
        let Some(secret) = secret else {
            return base_url.to_string();
        };

        let timestamp = chrono::Utc::now().timestamp_millis();
        let string_to_sign = format!("{}\n{}", timestamp, secret);

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        let result = mac.finalize();
        let sign = base64::engine::general_purpose::STANDARD.encode(result.into_bytes());
        let sign_encoded = urlencoding::encode(&sign);

        format!("{}&timestamp={}&sign={}", base_url, timestamp, sign_encoded)
    }

    fn format_markdown(event: &AlertEvent) -> (String, String) {
        let status_tag = if event.resolved {
            "[RESOLVED]"
        } else if event.confirm.claimed {
            "[CLAIMED]"
        } else {
            ""
        };
        let title = format!(
            "[faultline][{}]{} {}",
            event.severity, status_tag, event.rule_name
        );
        let labels_str = faultline_common::types::format_labels(&event.labels);
        let labels_line = if labels_str.is_empty() {
            String::new()
        } else {
            format!("\n- **Labels**: {}", labels_str)
        };
        let claim_line = match &event.confirm.claimant {
            Some(claimant) if event.confirm.claimed => {
                format!("\n- **Claimed by**: {}", claimant)
            }
            _ => String::new(),
        };
        let text = format!(
            "### {title}\n\n\
             - **Severity**: {severity}\n\
             - **Datasource**: {datasource}{labels_line}\n\
             - **Value**: {value:.2}{claim_line}\n\
             - **First Triggered**: {time}\n\n\
             > {annotations}",
            title = title,
            severity = event.severity,
            datasource = event.datasource,
            labels_line = labels_line,
            value = event.eval_value,
            claim_line = claim_line,
            time = event.first_trigger_time.to_rfc3339(),
            annotations = event.annotations,
        );
        (title, text)
    }

    async fn send_to_url(&self, url: &str, payload: &Value) -> UrlSendResult {
        let mut last_err = None;
        let mut attempts = 0u32;

        for attempt in 0..3u32 {
            attempts = attempt + 1;
            match self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        match resp.json::<Value>().await {
                            Ok(body) => {
                                let errcode = body.get("errcode").and_then(|v| v.as_i64());
                                if errcode == Some(0) {
                                    return UrlSendResult {
                                        retries: attempts.saturating_sub(1),
                                        error: None,
                                    };
                                }
                                let errmsg = body
                                    .get("errmsg")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("unknown");
                                tracing::warn!(
                                    instance = %self.instance_id,
                                    attempt = attempts,
                                    errmsg = errmsg,
                                    "DingTalk API returned error, retrying"
                                );
                                last_err = Some(NotifyError::ApiError {
                                    service: "dingtalk".to_string(),
                                    status: status.as_u16(),
                                    body: truncate_string(errmsg, MAX_BODY_LENGTH),
                                });
                            }
                            Err(e) => {
                                tracing::warn!(
                                    instance = %self.instance_id,
                                    attempt = attempts,
                                    error = %e,
                                    "Failed to parse DingTalk response, retrying"
                                );
                                last_err = Some(e.into());
                            }
                        }
                    } else {
                        tracing::warn!(
                            instance = %self.instance_id,
                            attempt = attempts,
                            status = %status,
                            "DingTalk webhook returned HTTP error, retrying"
                        );
                        last_err = Some(NotifyError::ApiError {
                            service: "dingtalk".to_string(),
                            status: status.as_u16(),
                            body: resp.text().await.unwrap_or_default(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        instance = %self.instance_id,
                        attempt = attempts,
                        error = %e,
                        "DingTalk webhook request failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        if let Some(ref e) = last_err {
            tracing::error!(error = %e, "DingTalk notification failed after 3 retries");
        }

        UrlSendResult {
            retries: attempts.saturating_sub(1),
            error: last_err,
        }
    }
}

#[async_trait]
impl NotificationChannel for DingTalkChannel {
    async fn send(&self, event: &AlertEvent, delivery: &Delivery) -> Result<SendReceipt> {
        let (title, text) = Self::format_markdown(event);
        let payload = serde_json::json!({
            "msgtype": "markdown",
            "markdown": {
                "title": title,
                "text": text,
            }
        });

        let mut receipt = SendReceipt::default();

        let mut robots: Vec<&str> = Vec::new();
        if !delivery.hook.is_empty() {
            robots.push(delivery.hook.as_str());
        }
        robots.extend(delivery.recipients.iter().map(|r| r.as_str()));

        for robot in robots {
            let url = Self::sign_url(robot, delivery.sign.as_deref());
            let result = self.send_to_url(&url, &payload).await;
            receipt.retry_count += result.retries;
            match result.error {
                None => receipt.results.push(RecipientResult::ok(robot)),
                Some(e) => receipt
                    .results
                    .push(RecipientResult::failed(robot, e.to_string())),
            }
        }

        Ok(receipt)
    }

    fn channel_type(&self) -> &str {
        "dingtalk"
    }
}

// Plugin

#[derive(Deserialize)]
struct DingTalkConfig {}

pub struct DingTalkPlugin;

impl ChannelPlugin for DingTalkPlugin {
    fn name(&self) -> &str {
        "dingtalk"
    }

    fn recipient_type(&self) -> &str {
        "webhook_url"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<DingTalkConfig>(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("dingtalk: {e}")))?;
        Ok(())
    }

    fn create_channel(
        &self,
        instance_id: &str,
        _config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>> {
        Ok(Arc::new(DingTalkChannel::new(instance_id)))
    }
}
