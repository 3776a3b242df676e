use crate::cache::ActiveEventCache;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing;

/// Outcome of a fingerprint → event-id resolution. A miss is an ordinary
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Resolved, with the strategy that answered.
    Found { event_id: String, strategy: &'static str },
    NotFound,
}

/// One source that may know the internal event id for a fingerprint.
///
/// Strategies are tried in registration order until one answers. A strategy
/// error is logged and treated as a miss so the cascade stays best-effort.
#[async_trait]
pub trait EventLookup: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find_event_id(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
    ) -> Result<Option<String>>;
}

/// Ordered lookup strategies: active cache first, then whatever slower
/// sources the caller registers (typically archived history).
#[derive(Default)]
pub struct LookupCascade {
    strategies: Vec<Box<dyn EventLookup>>,
}

impl LookupCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, strategy: Box<dyn EventLookup>) {
        self.strategies.push(strategy);
    }

    pub async fn resolve(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
    ) -> LookupOutcome {
        for strategy in &self.strategies {
            match strategy
                .find_event_id(tenant_id, fault_center_id, fingerprint)
                .await
            {
                Ok(Some(event_id)) => {
                    return LookupOutcome::Found {
                        event_id,
                        strategy: strategy.name(),
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        fingerprint,
                        error = %e,
                        "Lookup strategy failed, trying next"
                    );
                }
            }
        }
        LookupOutcome::NotFound
    }
}

/// Strategy backed by the active event cache.
pub struct CacheLookup {
    cache: Arc<ActiveEventCache>,
}

impl CacheLookup {
    pub fn new(cache: Arc<ActiveEventCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl EventLookup for CacheLookup {
    fn name(&self) -> &'static str {
        "active-cache"
    }

    async fn find_event_id(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .cache
            .get(tenant_id, fault_center_id, fingerprint)
            .map(|event| event.id))
    }
}
