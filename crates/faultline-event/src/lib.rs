//! Alert-event lifecycle engine: the path from "an occurrence was detected"
//! to "a resolved record in history".
//!
//! Inbound occurrences (rule evaluation or third-party intake) are
//! deduplicated by fingerprint against the [`cache::ActiveEventCache`],
//! checked against the [`silence::SilenceSet`], and either admitted or
//! suppressed by the [`engine::LifecycleEngine`]. Claim, listing, process
//! tracing and fingerprint lookup all operate on the same active set.

pub mod cache;
pub mod engine;
pub mod error;
pub mod filter;
pub mod intake;
pub mod lookup;
pub mod process;
pub mod silence;
