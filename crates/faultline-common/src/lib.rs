//! Shared vocabulary for the faultline alert platform.
//!
//! Contains the canonical [`types::AlertEvent`] shape exchanged between the
//! lifecycle engine, the notification layer and durable storage, plus the
//! Snowflake ID generator and the pure fingerprint functions used for
//! event deduplication.

pub mod fingerprint;
pub mod id;
pub mod types;
