use chrono::{DateTime, Utc};
use faultline_common::types::{AlertEvent, ConfirmState};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::active_event::{self, Column as ActiveCol, Entity as ActiveEntity};
use crate::entities::alert_history::{self, Column as HistCol, Entity as HistEntity};
use crate::error::Result;
use crate::store::AlertStore;

/// 活跃事件镜像行。
///
/// 缓存的持久化影子：进程重启后由服务器读取全部镜像行重建内存缓存。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveEventRow {
    pub tenant_id: String,
    pub fault_center_id: String,
    pub fingerprint: String,
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub datasource: String,
    pub severity: String,
    pub labels_json: String,
    pub annotations: String,
    pub eval_value: f64,
    pub first_trigger_time: DateTime<Utc>,
    pub last_eval_time: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_time: Option<DateTime<Utc>>,
    pub claimed: bool,
    pub claimant: Option<String>,
    pub claim_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// 历史归档行（事件解除后的最终快照）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryRow {
    pub id: String,
    pub tenant_id: String,
    pub fault_center_id: String,
    pub fingerprint: String,
    pub rule_id: String,
    pub rule_name: String,
    pub datasource: String,
    pub severity: String,
    pub labels_json: String,
    pub annotations: String,
    pub eval_value: f64,
    pub first_trigger_time: DateTime<Utc>,
    pub last_eval_time: DateTime<Utc>,
    pub resolved_time: Option<DateTime<Utc>>,
    pub claimed: bool,
    pub claimant: Option<String>,
    pub claim_time: Option<DateTime<Utc>>,
    pub archived_at: DateTime<Utc>,
}

/// 历史查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct AlertHistoryFilter {
    pub fault_center_id_eq: Option<String>,
    pub severity_eq: Option<String>,
    pub fingerprint_eq: Option<String>,
    pub first_trigger_gte: Option<DateTime<Utc>>,
    pub first_trigger_lte: Option<DateTime<Utc>>,
}

impl ActiveEventRow {
    /// Rebuild the in-memory event from a mirror row. Fails only on a
    /// malformed labels column; an unknown severity string degrades to the
    /// default rather than poisoning cache hydration.
    pub fn into_event(self) -> Result<AlertEvent> {
        let labels = serde_json::from_str(&self.labels_json)?;
        Ok(AlertEvent {
            id: self.id,
            tenant_id: self.tenant_id,
            fault_center_id: self.fault_center_id,
            fingerprint: self.fingerprint,
            rule_id: self.rule_id,
            rule_name: self.rule_name,
            datasource: self.datasource,
            severity: self.severity.parse().unwrap_or_default(),
            labels,
            annotations: self.annotations,
            eval_value: self.eval_value,
            first_trigger_time: self.first_trigger_time,
            last_eval_time: self.last_eval_time,
            resolved: self.resolved,
            resolved_time: self.resolved_time,
            confirm: ConfirmState {
                claimed: self.claimed,
                claimant: self.claimant,
                claim_time: self.claim_time,
            },
        })
    }
}

impl AlertHistoryRow {
    /// The archived event in its canonical shape.
    pub fn into_event(self) -> Result<AlertEvent> {
        let labels = serde_json::from_str(&self.labels_json)?;
        Ok(AlertEvent {
            id: self.id,
            tenant_id: self.tenant_id,
            fault_center_id: self.fault_center_id,
            fingerprint: self.fingerprint,
            rule_id: self.rule_id,
            rule_name: self.rule_name,
            datasource: self.datasource,
            severity: self.severity.parse().unwrap_or_default(),
            labels,
            annotations: self.annotations,
            eval_value: self.eval_value,
            first_trigger_time: self.first_trigger_time,
            last_eval_time: self.last_eval_time,
            resolved: true,
            resolved_time: self.resolved_time,
            confirm: ConfirmState {
                claimed: self.claimed,
                claimant: self.claimant,
                claim_time: self.claim_time,
            },
        })
    }
}

fn model_to_active(m: active_event::Model) -> ActiveEventRow {
    ActiveEventRow {
        tenant_id: m.tenant_id,
        fault_center_id: m.fault_center_id,
        fingerprint: m.fingerprint,
        id: m.id,
        rule_id: m.rule_id,
        rule_name: m.rule_name,
        datasource: m.datasource,
        severity: m.severity,
        labels_json: m.labels_json,
        annotations: m.annotations,
        eval_value: m.eval_value,
        first_trigger_time: m.first_trigger_time.with_timezone(&Utc),
        last_eval_time: m.last_eval_time.with_timezone(&Utc),
        resolved: m.resolved,
        resolved_time: m.resolved_time.map(|t| t.with_timezone(&Utc)),
        claimed: m.claimed,
        claimant: m.claimant,
        claim_time: m.claim_time.map(|t| t.with_timezone(&Utc)),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn model_to_history(m: alert_history::Model) -> AlertHistoryRow {
    AlertHistoryRow {
        id: m.id,
        tenant_id: m.tenant_id,
        fault_center_id: m.fault_center_id,
        fingerprint: m.fingerprint,
        rule_id: m.rule_id,
        rule_name: m.rule_name,
        datasource: m.datasource,
        severity: m.severity,
        labels_json: m.labels_json,
        annotations: m.annotations,
        eval_value: m.eval_value,
        first_trigger_time: m.first_trigger_time.with_timezone(&Utc),
        last_eval_time: m.last_eval_time.with_timezone(&Utc),
        resolved_time: m.resolved_time.map(|t| t.with_timezone(&Utc)),
        claimed: m.claimed,
        claimant: m.claimant,
        claim_time: m.claim_time.map(|t| t.with_timezone(&Utc)),
        archived_at: m.archived_at.with_timezone(&Utc),
    }
}

fn event_to_active_model(event: &AlertEvent) -> Result<active_event::ActiveModel> {
    let now = Utc::now().fixed_offset();
    Ok(active_event::ActiveModel {
        tenant_id: Set(event.tenant_id.clone()),
        fault_center_id: Set(event.fault_center_id.clone()),
        fingerprint: Set(event.fingerprint.clone()),
        id: Set(event.id.clone()),
        rule_id: Set(event.rule_id.clone()),
        rule_name: Set(event.rule_name.clone()),
        datasource: Set(event.datasource.clone()),
        severity: Set(event.severity.to_string()),
        labels_json: Set(serde_json::to_string(&event.labels)?),
        annotations: Set(event.annotations.clone()),
        eval_value: Set(event.eval_value),
        first_trigger_time: Set(event.first_trigger_time.fixed_offset()),
        last_eval_time: Set(event.last_eval_time.fixed_offset()),
        resolved: Set(event.resolved),
        resolved_time: Set(event.resolved_time.map(|t| t.fixed_offset())),
        claimed: Set(event.confirm.claimed),
        claimant: Set(event.confirm.claimant.clone()),
        claim_time: Set(event.confirm.claim_time.map(|t| t.fixed_offset())),
        updated_at: Set(now),
    })
}

impl AlertStore {
    // ---- active_events（缓存镜像）----

    /// Insert or refresh the mirror row for an active event. The conflict
    /// target is the partition triple, so a re-fired fingerprint replaces
    /// the stale row wholesale (including the event id).
    pub async fn upsert_active_event(&self, event: &AlertEvent) -> Result<()> {
        let am = event_to_active_model(event)?;
        ActiveEntity::insert(am)
            .on_conflict(
                OnConflict::columns([
                    ActiveCol::TenantId,
                    ActiveCol::FaultCenterId,
                    ActiveCol::Fingerprint,
                ])
                .update_columns([
                    ActiveCol::Id,
                    ActiveCol::RuleId,
                    ActiveCol::RuleName,
                    ActiveCol::Datasource,
                    ActiveCol::Severity,
                    ActiveCol::LabelsJson,
                    ActiveCol::Annotations,
                    ActiveCol::EvalValue,
                    ActiveCol::FirstTriggerTime,
                    ActiveCol::LastEvalTime,
                    ActiveCol::Resolved,
                    ActiveCol::ResolvedTime,
                    ActiveCol::Claimed,
                    ActiveCol::Claimant,
                    ActiveCol::ClaimTime,
                    ActiveCol::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(self.db())
            .await?;
        Ok(())
    }

    pub async fn upsert_active_events(&self, events: &[AlertEvent]) -> Result<()> {
        for event in events {
            self.upsert_active_event(event).await?;
        }
        Ok(())
    }

    pub async fn delete_active_event(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        fingerprint: &str,
    ) -> Result<bool> {
        let res = ActiveEntity::delete_by_id((
            tenant_id.to_owned(),
            fault_center_id.to_owned(),
            fingerprint.to_owned(),
        ))
        .exec(self.db())
        .await?;
        Ok(res.rows_affected > 0)
    }

    /// Every mirror row, across all tenants. Used once at startup.
    pub async fn load_active_events(&self) -> Result<Vec<ActiveEventRow>> {
        let rows = ActiveEntity::find().all(self.db()).await?;
        Ok(rows.into_iter().map(model_to_active).collect())
    }

    // ---- alert_history（解除归档）----

    pub async fn insert_alert_history(&self, event: &AlertEvent) -> Result<()> {
        let now = Utc::now().fixed_offset();
        let am = alert_history::ActiveModel {
            id: Set(event.id.clone()),
            tenant_id: Set(event.tenant_id.clone()),
            fault_center_id: Set(event.fault_center_id.clone()),
            fingerprint: Set(event.fingerprint.clone()),
            rule_id: Set(event.rule_id.clone()),
            rule_name: Set(event.rule_name.clone()),
            datasource: Set(event.datasource.clone()),
            severity: Set(event.severity.to_string()),
            labels_json: Set(serde_json::to_string(&event.labels)?),
            annotations: Set(event.annotations.clone()),
            eval_value: Set(event.eval_value),
            first_trigger_time: Set(event.first_trigger_time.fixed_offset()),
            last_eval_time: Set(event.last_eval_time.fixed_offset()),
            resolved_time: Set(event.resolved_time.map(|t| t.fixed_offset())),
            claimed: Set(event.confirm.claimed),
            claimant: Set(event.confirm.claimant.clone()),
            claim_time: Set(event.confirm.claim_time.map(|t| t.fixed_offset())),
            archived_at: Set(now),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    pub async fn list_alert_history(
        &self,
        tenant_id: &str,
        filter: &AlertHistoryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertHistoryRow>> {
        let mut q = HistEntity::find().filter(HistCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(HistCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref sev) = filter.severity_eq {
            q = q.filter(HistCol::Severity.eq(sev.as_str()));
        }
        if let Some(ref fp) = filter.fingerprint_eq {
            q = q.filter(HistCol::Fingerprint.eq(fp.as_str()));
        }
        if let Some(from) = filter.first_trigger_gte {
            q = q.filter(HistCol::FirstTriggerTime.gte(from.fixed_offset()));
        }
        if let Some(to) = filter.first_trigger_lte {
            q = q.filter(HistCol::FirstTriggerTime.lte(to.fixed_offset()));
        }
        let rows = q
            .order_by(HistCol::FirstTriggerTime, Order::Desc)
            .order_by(HistCol::Fingerprint, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_history).collect())
    }

    pub async fn count_alert_history(
        &self,
        tenant_id: &str,
        filter: &AlertHistoryFilter,
    ) -> Result<u64> {
        let mut q = HistEntity::find().filter(HistCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(HistCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref sev) = filter.severity_eq {
            q = q.filter(HistCol::Severity.eq(sev.as_str()));
        }
        if let Some(ref fp) = filter.fingerprint_eq {
            q = q.filter(HistCol::Fingerprint.eq(fp.as_str()));
        }
        if let Some(from) = filter.first_trigger_gte {
            q = q.filter(HistCol::FirstTriggerTime.gte(from.fixed_offset()));
        }
        if let Some(to) = filter.first_trigger_lte {
            q = q.filter(HistCol::FirstTriggerTime.lte(to.fixed_offset()));
        }
        Ok(q.count(self.db()).await?)
    }
}
