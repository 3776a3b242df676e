//! Durable storage layer for the faultline alert platform.
//!
//! [`store::AlertStore`] is the single facade: SeaORM over SQLite by default
//! (any SeaORM-supported database via the connection URL), schema managed by
//! the `migration` crate. It persists the active-event mirror used to rebuild
//! the in-memory cache after a restart, the alert history archive, silences,
//! notification targets, third-party webhooks with their raw intake records,
//! and process traces with their operation logs.

pub mod entities;
pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{
    ActiveEventRow, AlertHistoryFilter, AlertHistoryRow, AlertStore, NotificationTargetFilter,
    NotificationTargetRow, NotificationTargetUpdate, ProcessOperationLogRow, ProcessTraceRow,
    ProcessTraceStats, SilenceFilter, SilenceRow, SilenceUpdate, ThirdPartyAlertRow,
    ThirdPartyWebhookFilter, ThirdPartyWebhookRow, ThirdPartyWebhookUpdate,
};
