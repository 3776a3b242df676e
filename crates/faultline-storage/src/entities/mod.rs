pub mod active_event;
pub mod alert_history;
pub mod notification_target;
pub mod process_operation_log;
pub mod process_trace;
pub mod silence;
pub mod third_party_alert;
pub mod third_party_webhook;
