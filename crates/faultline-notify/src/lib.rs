//! Notification delivery framework with pluggable channel support.
//!
//! Alert events are fanned out to [`routing::NotificationTarget`]s; each
//! target resolves per-severity delivery parameters through its route table
//! and hands them to a [`NotificationChannel`]. Built-in channels cover
//! webhook, email (SMTP), SMS gateway and DingTalk. The
//! [`dispatcher::Dispatcher`] never short-circuits: every channel failure is
//! collected into a report while the remaining sends proceed.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod plugin;
pub mod routing;
pub mod utils;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use error::Result;
use faultline_common::types::AlertEvent;

/// Channel-specific delivery parameters for one send, resolved from a
/// target's route table (or its defaults) by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Primary endpoint: webhook URL, robot URL. Empty for channels that
    /// deliver purely to `recipients` (email, SMS).
    pub hook: String,
    /// Additional endpoints or addressees: extra URLs, mail addresses,
    /// phone numbers.
    pub recipients: Vec<String>,
    /// Signing secret for channels that authenticate the hook URL.
    pub sign: Option<String>,
}

/// Outcome of one delivery attempt to one recipient.
#[derive(Debug, Clone)]
pub struct RecipientResult {
    pub recipient: String,
    pub status: String,
    pub error: Option<String>,
}

impl RecipientResult {
    pub fn ok(recipient: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            status: "success".to_string(),
            error: None,
        }
    }

    pub fn failed(recipient: &str, error: String) -> Self {
        Self {
            recipient: recipient.to_string(),
            status: "failed".to_string(),
            error: Some(error),
        }
    }
}

/// What one channel invocation actually did, per recipient.
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    /// Total retries performed across recipients (not counting first tries).
    pub retry_count: u32,
    pub results: Vec<RecipientResult>,
}

impl SendReceipt {
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|r| r.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecipientResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }
}

/// A notification delivery channel that renders an alert event and sends it
/// to an external service (SMTP, webhook endpoint, SMS gateway, IM robot).
///
/// Implementations are created by the matching [`plugin::ChannelPlugin`] and
/// shared through the [`plugin::ChannelRegistry`]. Retry policy lives inside
/// the channel (HTTP channels retry 3 times with backoff); callers never
/// retry on top of it.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Renders and delivers the event using the resolved delivery
    /// parameters. Per-recipient outcomes are reported in the receipt; an
    /// `Err` means the channel could not attempt delivery at all.
    async fn send(&self, event: &AlertEvent, delivery: &Delivery) -> Result<SendReceipt>;

    /// Returns the channel type name (e.g. `"email"`, `"webhook"`).
    fn channel_type(&self) -> &str;
}
