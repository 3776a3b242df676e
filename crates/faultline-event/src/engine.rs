use crate::cache::ActiveEventCache;
use crate::silence::SilenceSet;
use chrono::{DateTime, Utc};
use faultline_common::id;
use faultline_common::types::{AlertEvent, ConfirmState};
use std::sync::Arc;
use tracing;

/// What the engine decided to do with one inbound occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// No active record existed; a new one was admitted to the cache.
    Created,
    /// A record with the same fingerprint was already active; only its
    /// mutable fields were refreshed.
    Refreshed,
    /// Nothing was admitted: an active silence matched, or the occurrence
    /// was a recovery for an unknown fingerprint.
    Suppressed,
}

/// Result of running one occurrence through the admission pipeline.
#[derive(Debug, Clone)]
pub struct Admission {
    pub outcome: AdmissionOutcome,
    /// The stored record after the decision; `None` when nothing was admitted.
    pub event: Option<AlertEvent>,
    /// Whether the caller should fan this occurrence out to notification
    /// targets. Only freshly created records notify; refreshes and
    /// suppressions never do.
    pub notify: bool,
    /// The silence that suppressed the occurrence, if any.
    pub silence_id: Option<String>,
}

/// The admission pipeline: dedup by fingerprint against the active cache,
/// then check active silences, then admit or suppress.
///
/// Replaying the same occurrence never creates a duplicate active record;
/// a dedup hit refreshes only `last_eval_time`, `annotations` and
/// `eval_value`, preserving the record's id, claim state and first-trigger
/// time.
pub struct LifecycleEngine {
    cache: Arc<ActiveEventCache>,
    silences: Arc<SilenceSet>,
}

impl LifecycleEngine {
    pub fn new(cache: Arc<ActiveEventCache>, silences: Arc<SilenceSet>) -> Self {
        Self { cache, silences }
    }

    pub fn cache(&self) -> &Arc<ActiveEventCache> {
        &self.cache
    }

    pub fn silences(&self) -> &Arc<SilenceSet> {
        &self.silences
    }

    pub fn admit(&self, incoming: AlertEvent, now: DateTime<Utc>) -> Admission {
        let existing = self.cache.get(
            &incoming.tenant_id,
            &incoming.fault_center_id,
            &incoming.fingerprint,
        );

        if let Some(mut current) = existing {
            // Dedup hit: mutable fields come from the latest occurrence,
            // everything else stays. Refreshes happen even while silenced,
            // they just never notify.
            current.last_eval_time = now;
            current.annotations = incoming.annotations;
            current.eval_value = incoming.eval_value;
            if incoming.resolved && !current.resolved {
                current.resolved = true;
                current.resolved_time = Some(now);
            }
            self.cache.upsert(current.clone());
            return Admission {
                outcome: AdmissionOutcome::Refreshed,
                event: Some(current),
                notify: false,
                silence_id: None,
            };
        }

        if incoming.resolved {
            // Recovery for a fingerprint we are not tracking.
            tracing::debug!(
                tenant_id = %incoming.tenant_id,
                fingerprint = %incoming.fingerprint,
                "Recovery for unknown fingerprint ignored"
            );
            return Admission {
                outcome: AdmissionOutcome::Suppressed,
                event: None,
                notify: false,
                silence_id: None,
            };
        }

        if let Some(silence) = self.silences.first_active_match(&incoming, now) {
            tracing::debug!(
                tenant_id = %incoming.tenant_id,
                fingerprint = %incoming.fingerprint,
                silence_id = %silence.spec.id,
                "Occurrence suppressed by silence"
            );
            return Admission {
                outcome: AdmissionOutcome::Suppressed,
                event: None,
                notify: false,
                silence_id: Some(silence.spec.id.clone()),
            };
        }

        let mut event = incoming;
        if event.id.is_empty() {
            event.id = id::next_id();
        }
        event.first_trigger_time = now;
        event.last_eval_time = now;
        event.resolved = false;
        event.resolved_time = None;
        event.confirm = ConfirmState::default();
        self.cache.upsert(event.clone());
        Admission {
            outcome: AdmissionOutcome::Created,
            event: Some(event),
            notify: true,
            silence_id: None,
        }
    }

    /// Remove an active record and return its archived form (resolved flag
    /// and resolved time set). `None` when the fingerprint is not active.
    pub fn resolve(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        let mut event = self.cache.remove(tenant_id, fault_center_id, fingerprint)?;
        event.resolved = true;
        if event.resolved_time.is_none() {
            event.resolved_time = Some(now);
        }
        Some(event)
    }
}
