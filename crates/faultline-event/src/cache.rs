use chrono::{DateTime, Utc};
use faultline_common::types::AlertEvent;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Key: (tenant_id, fault_center_id)
type PartitionKey = (String, String);

/// Outcome of a claim attempt on an active event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The event was unclaimed and is now claimed; carries the updated record.
    Claimed(AlertEvent),
    /// First claim wins: the event was already claimed, nothing changed.
    AlreadyClaimed(AlertEvent),
    /// No active event with that fingerprint in the partition.
    NotFound,
}

/// In-memory store of currently-active alert events, partitioned by
/// (tenant, fault center) and keyed by fingerprint within a partition.
///
/// At most one record exists per (tenant, fault center, fingerprint); a
/// record leaves the set exactly when it is resolved and archived. Writes
/// are last-writer-wins on the same key.
#[derive(Default)]
pub struct ActiveEventCache {
    partitions: RwLock<HashMap<PartitionKey, HashMap<String, AlertEvent>>>,
}

impl ActiveEventCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PartitionKey, HashMap<String, AlertEvent>>> {
        self.partitions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PartitionKey, HashMap<String, AlertEvent>>> {
        self.partitions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
    ) -> Option<AlertEvent> {
        self.read()
            .get(&(tenant_id.to_string(), fault_center_id.to_string()))
            .and_then(|p| p.get(fingerprint))
            .cloned()
    }

    pub fn get_all(&self, tenant_id: &str, fault_center_id: &str) -> Vec<AlertEvent> {
        self.read()
            .get(&(tenant_id.to_string(), fault_center_id.to_string()))
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Insert or replace the record for the event's partition + fingerprint.
    pub fn upsert(&self, event: AlertEvent) {
        let mut partitions = self.write();
        partitions
            .entry(event.partition())
            .or_default()
            .insert(event.fingerprint.clone(), event);
    }

    /// Remove and return the record, dropping the partition map when it
    /// becomes empty.
    pub fn remove(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
    ) -> Option<AlertEvent> {
        let key = (tenant_id.to_string(), fault_center_id.to_string());
        let mut partitions = self.write();
        let partition = partitions.get_mut(&key)?;
        let removed = partition.remove(fingerprint);
        if partition.is_empty() {
            partitions.remove(&key);
        }
        removed
    }

    /// Claim an active event: set the confirmed flag and record claimant and
    /// time. A no-op on an already-claimed event; claimant and claim time
    /// never change once set.
    pub fn claim(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
        claimant: &str,
        time: DateTime<Utc>,
    ) -> ClaimOutcome {
        let key = (tenant_id.to_string(), fault_center_id.to_string());
        let mut partitions = self.write();
        let Some(event) = partitions.get_mut(&key).and_then(|p| p.get_mut(fingerprint)) else {
            return ClaimOutcome::NotFound;
        };
        if event.confirm.claimed {
            return ClaimOutcome::AlreadyClaimed(event.clone());
        }
        event.confirm.claimed = true;
        event.confirm.claimant = Some(claimant.to_string());
        event.confirm.claim_time = Some(time);
        ClaimOutcome::Claimed(event.clone())
    }

    /// Total number of active events across all partitions.
    pub fn len(&self) -> usize {
        self.read().values().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
