use crate::error::{EventError, Result};
use chrono::{DateTime, Utc};
use faultline_common::types::AlertEvent;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Predicate labels resolved from the event itself rather than its label map.
const VIRTUAL_LABEL_SEVERITY: &str = "severity";
const VIRTUAL_LABEL_FINGERPRINT: &str = "fingerprint";

/// 静默谓词：标签键 + 值正则。
///
/// 同一静默内所有谓词是 AND 语义；正则必须完整匹配标签值。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SilencePredicate {
    /// 标签键（`severity` 与 `fingerprint` 为内置虚拟标签）
    pub label: String,
    /// 值正则（完整匹配）
    pub pattern: String,
}

/// 静默规则（可序列化形态，正则在编译形态中缓存）。
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Silence {
    /// 静默 ID
    pub id: String,
    /// 租户 ID
    pub tenant_id: String,
    /// 故障中心 ID
    pub fault_center_id: String,
    /// 名称
    pub name: String,
    /// 备注
    pub comment: String,
    /// 谓词列表（有序，AND 语义）
    pub predicates: Vec<SilencePredicate>,
    /// 生效时间（含）
    pub starts_at: DateTime<Utc>,
    /// 失效时间（不含）
    pub ends_at: DateTime<Utc>,
    /// 创建人
    pub created_by: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// Silence lifecycle status, computed from the validity window against
/// "now" rather than stored authoritatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SilenceStatus {
    /// `starts_at` is still in the future.
    Pending,
    /// Now is within `[starts_at, ends_at)`.
    Active,
    /// `ends_at` has passed.
    Expired,
}

impl Silence {
    pub fn status(&self, now: DateTime<Utc>) -> SilenceStatus {
        if self.starts_at > now {
            SilenceStatus::Pending
        } else if now < self.ends_at {
            SilenceStatus::Active
        } else {
            SilenceStatus::Expired
        }
    }

    /// The pattern of the first `fingerprint` predicate, if any. Silences
    /// carrying one acknowledge the matching active events on creation.
    pub fn fingerprint_pattern(&self) -> Option<&str> {
        self.predicates
            .iter()
            .find(|p| p.label == VIRTUAL_LABEL_FINGERPRINT)
            .map(|p| p.pattern.as_str())
    }
}

/// A silence with its predicate regexes compiled.
///
/// Compilation happens exactly once, at create/update time: a malformed
/// pattern fails the whole operation immediately and nothing is applied.
/// Matching an event is then a bounded regex scan.
#[derive(Debug)]
pub struct CompiledSilence {
    pub spec: Silence,
    matchers: Vec<(String, Regex)>,
}

impl CompiledSilence {
    /// Compile every predicate eagerly. Fails on the first invalid pattern,
    /// and rejects an empty predicate list: a silence that matches everything
    /// is treated as a data-entry error, not a blanket suppression.
    pub fn compile(spec: Silence) -> Result<Self> {
        if spec.predicates.is_empty() {
            return Err(EventError::InvalidSilence(
                "at least one predicate is required".to_string(),
            ));
        }
        let mut matchers = Vec::with_capacity(spec.predicates.len());
        for predicate in &spec.predicates {
            let regex = compile_full_match(&predicate.pattern).map_err(|source| {
                EventError::InvalidPattern {
                    label: predicate.label.clone(),
                    source,
                }
            })?;
            matchers.push((predicate.label.clone(), regex));
        }
        Ok(Self { spec, matchers })
    }

    /// True iff every predicate's label exists on the event and its regex
    /// fully matches the label's value. `severity` and `fingerprint` resolve
    /// from the event record; everything else from the label map.
    pub fn matches(&self, event: &AlertEvent) -> bool {
        self.matchers.iter().all(|(label, regex)| {
            match event_label_value(event, label) {
                Some(value) => regex.is_match(&value),
                None => false,
            }
        })
    }

    pub fn status(&self, now: DateTime<Utc>) -> SilenceStatus {
        self.spec.status(now)
    }
}

fn event_label_value(event: &AlertEvent, label: &str) -> Option<String> {
    match label {
        VIRTUAL_LABEL_SEVERITY => Some(event.severity.to_string()),
        VIRTUAL_LABEL_FINGERPRINT => Some(event.fingerprint.clone()),
        _ => event.labels.get(label).cloned(),
    }
}

/// Anchor the pattern so `is_match` means "the whole value matches".
fn compile_full_match(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// In-memory registry of compiled silences, shared across request handlers.
///
/// Keyed by silence id; insert replaces, so an update swaps the compiled
/// form atomically. Lock poisoning is recovered rather than propagated.
#[derive(Default)]
pub struct SilenceSet {
    inner: RwLock<HashMap<String, Arc<CompiledSilence>>>,
}

impl SilenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CompiledSilence>>> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CompiledSilence>>> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, silence: Arc<CompiledSilence>) {
        self.write().insert(silence.spec.id.clone(), silence);
    }

    pub fn remove(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledSilence>> {
        self.read().get(id).cloned()
    }

    /// Silences for a tenant, optionally narrowed to one fault center.
    pub fn list(&self, tenant_id: &str, fault_center_id: Option<&str>) -> Vec<Arc<CompiledSilence>> {
        self.read()
            .values()
            .filter(|s| s.spec.tenant_id == tenant_id)
            .filter(|s| fault_center_id.is_none_or(|fc| s.spec.fault_center_id == fc))
            .cloned()
            .collect()
    }

    /// First currently-active silence in the event's partition whose
    /// predicates all match the event.
    pub fn first_active_match(
        &self,
        event: &AlertEvent,
        now: DateTime<Utc>,
    ) -> Option<Arc<CompiledSilence>> {
        self.read()
            .values()
            .filter(|s| {
                s.spec.tenant_id == event.tenant_id
                    && s.spec.fault_center_id == event.fault_center_id
            })
            .filter(|s| s.status(now) == SilenceStatus::Active)
            .find(|s| s.matches(event))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
