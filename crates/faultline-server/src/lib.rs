//! HTTP API surface for the faultline alert lifecycle engine.
//!
//! The binary in `main.rs` wires configuration, storage and the in-memory
//! working set together; everything reusable (routers, handlers, seeders,
//! startup hydration) lives here so integration tests can build the exact
//! app the binary serves.

pub mod api;
pub mod app;
pub mod bootstrap;
pub mod config;
pub mod identity;
pub mod logging;
pub mod lookup;
pub mod openapi;
pub mod state;
pub mod target_seed;
