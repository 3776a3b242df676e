use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::{Delivery, NotificationChannel, RecipientResult, SendReceipt};
use async_trait::async_trait;
use faultline_common::types::AlertEvent;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing;

pub struct EmailChannel {
    instance_id: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    pub fn new(
        instance_id: &str,
        smtp_host: &str,
        smtp_port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| NotifyError::Smtp(e.to_string()))?
            .port(smtp_port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        let from = from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidConfig(format!("email from address: {e}")))?;

        Ok(Self {
            instance_id: instance_id.to_string(),
            transport: builder.build(),
            from,
        })
    }

    fn format_subject(event: &AlertEvent) -> String {
        let status_tag = if event.resolved {
            "[RESOLVED]"
        } else if event.confirm.claimed {
            "[CLAIMED]"
        } else {
            ""
        };
        format!(
            "[faultline][{}]{} {}",
            event.severity, status_tag, event.rule_name
        )
    }

    fn format_body(event: &AlertEvent) -> String {
        let labels_str = faultline_common::types::format_labels(&event.labels);
        let labels_line = if labels_str.is_empty() {
            String::new()
        } else {
            format!("\nLabels: {}", labels_str)
        };
        let claim_line = match &event.confirm.claimant {
            Some(claimant) if event.confirm.claimed => format!("\nClaimed by: {}", claimant),
            _ => String::new(),
        };
        format!(
            "Severity: {severity}\nRule: {rule}\nDatasource: {datasource}{labels_line}\nValue: {value:.2}{claim_line}\nFirst triggered: {first}\nLast evaluated: {last}\n\n{annotations}",
            severity = event.severity,
            rule = event.rule_name,
            datasource = event.datasource,
            labels_line = labels_line,
            value = event.eval_value,
            claim_line = claim_line,
            first = event.first_trigger_time,
            last = event.last_eval_time,
            annotations = event.annotations,
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, event: &AlertEvent, delivery: &Delivery) -> Result<SendReceipt> {
        let subject = Self::format_subject(event);
        let body = Self::format_body(event);
        let mut receipt = SendReceipt::default();

        for recipient in &delivery.recipients {
            let to = match recipient.parse::<Mailbox>() {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    receipt.results.push(RecipientResult::failed(
                        recipient,
                        format!("invalid address: {e}"),
                    ));
                    continue;
                }
            };
            let email = match Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(&subject)
                .header(ContentType::TEXT_PLAIN)
                .body(body.clone())
            {
                Ok(email) => email,
                Err(e) => {
                    receipt
                        .results
                        .push(RecipientResult::failed(recipient, e.to_string()));
                    continue;
                }
            };

            let mut last_err = None;
            let mut attempts = 0u32;
            for attempt in 0..3 {
                attempts = attempt + 1;
                match self.transport.send(email.clone()).await {
                    Ok(_) => {
                        last_err = None;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            instance = %self.instance_id,
                            attempt = attempts,
                            recipient = %recipient,
                            error = %e,
                            "Email send failed, retrying"
                        );
                        last_err = Some(e);
                        if attempt < 2 {
                            tokio::time::sleep(std::time::Duration::from_millis(
                                100 * 2u64.pow(attempt),
                            ))
                            .await;
                        }
                    }
                }
            }

            receipt.retry_count += attempts.saturating_sub(1);

            if let Some(e) = last_err {
                tracing::error!(recipient = %recipient, error = %e, "Email send failed after 3 retries");
                receipt
                    .results
                    .push(RecipientResult::failed(recipient, e.to_string()));
            } else {
                receipt.results.push(RecipientResult::ok(recipient));
            }
        }

        Ok(receipt)
    }

    fn channel_type(&self) -> &str {
        "email"
    }
}

// Plugin

#[derive(Deserialize)]
struct EmailConfig {
    smtp_host: String,
    smtp_port: u16,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    from: String,
}

pub struct EmailPlugin;

impl ChannelPlugin for EmailPlugin {
    fn name(&self) -> &str {
        "email"
    }

    fn recipient_type(&self) -> &str {
        "email"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<EmailConfig>(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("email: {e}")))?;
        Ok(())
    }

    fn create_channel(
        &self,
        instance_id: &str,
        config: &Value,
    ) -> Result<Arc<dyn NotificationChannel>> {
        let cfg: EmailConfig = serde_json::from_value(config.clone())
            .map_err(|e| NotifyError::InvalidConfig(format!("email: {e}")))?;
        let channel = EmailChannel::new(
            instance_id,
            &cfg.smtp_host,
            cfg.smtp_port,
            cfg.smtp_username.as_deref(),
            cfg.smtp_password.as_deref(),
            &cfg.from,
        )?;
        Ok(Arc::new(channel))
    }
}
