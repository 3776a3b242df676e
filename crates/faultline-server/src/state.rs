use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use faultline_event::cache::ActiveEventCache;
use faultline_event::engine::LifecycleEngine;
use faultline_event::silence::SilenceSet;
use faultline_notify::dispatcher::Dispatcher;
use faultline_storage::AlertStore;
use std::sync::Arc;

/// Shared handles for all request handlers. Cloned per request, so every
/// member is an `Arc` (or `Copy`).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AlertStore>,
    pub engine: Arc<LifecycleEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn cache(&self) -> &Arc<ActiveEventCache> {
        self.engine.cache()
    }

    pub fn silences(&self) -> &Arc<SilenceSet> {
        self.engine.silences()
    }
}
