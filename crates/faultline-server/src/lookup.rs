use async_trait::async_trait;
use faultline_event::error::{EventError, Result};
use faultline_event::lookup::EventLookup;
use faultline_storage::{AlertHistoryFilter, AlertStore};
use std::sync::Arc;

/// Lookup strategy over the archived history table, for fingerprints whose
/// event already left the active cache. Registered behind the cache strategy
/// in the cascade, so it only runs on a cache miss.
pub struct HistoryLookup {
    store: Arc<AlertStore>,
}

impl HistoryLookup {
    pub fn new(store: Arc<AlertStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventLookup for HistoryLookup {
    fn name(&self) -> &'static str {
        "alert-history"
    }

    async fn find_event_id(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
    ) -> Result<Option<String>> {
        let filter = AlertHistoryFilter {
            fault_center_id_eq: Some(fault_center_id.to_string()),
            fingerprint_eq: Some(fingerprint.to_string()),
            ..Default::default()
        };
        // History lists newest first, so row 0 is the latest archive of
        // this fingerprint.
        let rows = self
            .store
            .list_alert_history(tenant_id, &filter, 1, 0)
            .await
            .map_err(|e| EventError::LookupFailed {
                strategy: "alert-history",
                message: e.to_string(),
            })?;
        Ok(rows.into_iter().next().map(|row| row.id))
    }
}
