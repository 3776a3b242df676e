//! Built-in notification channel adapters.

pub mod dingtalk;
pub mod email;
pub mod sms;
pub mod webhook;
