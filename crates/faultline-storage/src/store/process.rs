use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::process_operation_log::{self, Column as LogCol, Entity as LogEntity};
use crate::entities::process_trace::{self, Column as TraceCol, Entity as TraceEntity};
use crate::error::Result;
use crate::store::AlertStore;

/// 处置流程数据行（阶段步骤以 JSON 文本存储）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTraceRow {
    pub id: String,
    pub tenant_id: String,
    pub event_id: String,
    pub status: String,
    pub steps_json: String,
    pub assigned_to: Option<String>,
    pub ai_analysis: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// 处置操作日志数据行。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOperationLogRow {
    pub id: String,
    pub tenant_id: String,
    pub trace_id: String,
    pub event_id: String,
    pub operator: String,
    pub action: String,
    pub before_snapshot: Option<String>,
    pub after_snapshot: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// 处置流程聚合统计。
#[derive(Debug, Clone, Serialize)]
pub struct ProcessTraceStats {
    pub total: u64,
    pub completed: u64,
    /// completed / total，total 为 0 时为 0
    pub completion_rate: f64,
    /// 已完成流程的平均时长（秒），无已完成流程时为 0
    pub avg_duration_secs: f64,
    pub by_status: HashMap<String, u64>,
}

fn model_to_trace(m: process_trace::Model) -> ProcessTraceRow {
    ProcessTraceRow {
        id: m.id,
        tenant_id: m.tenant_id,
        event_id: m.event_id,
        status: m.status,
        steps_json: m.steps_json,
        assigned_to: m.assigned_to,
        ai_analysis: m.ai_analysis,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
        ended_at: m.ended_at.map(|t| t.with_timezone(&Utc)),
    }
}

fn model_to_log(m: process_operation_log::Model) -> ProcessOperationLogRow {
    ProcessOperationLogRow {
        id: m.id,
        tenant_id: m.tenant_id,
        trace_id: m.trace_id,
        event_id: m.event_id,
        operator: m.operator,
        action: m.action,
        before_snapshot: m.before_snapshot,
        after_snapshot: m.after_snapshot,
        description: m.description,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    // ---- process_traces ----

    pub async fn insert_process_trace(&self, row: &ProcessTraceRow) -> Result<ProcessTraceRow> {
        let am = process_trace::ActiveModel {
            id: Set(row.id.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            event_id: Set(row.event_id.clone()),
            status: Set(row.status.clone()),
            steps_json: Set(row.steps_json.clone()),
            assigned_to: Set(row.assigned_to.clone()),
            ai_analysis: Set(row.ai_analysis.clone()),
            created_at: Set(row.created_at.fixed_offset()),
            updated_at: Set(row.updated_at.fixed_offset()),
            ended_at: Set(row.ended_at.map(|t| t.fixed_offset())),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_trace(model))
    }

    pub async fn get_process_trace_by_event(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<Option<ProcessTraceRow>> {
        let model = TraceEntity::find()
            .filter(TraceCol::TenantId.eq(tenant_id))
            .filter(TraceCol::EventId.eq(event_id))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_trace))
    }

    /// Persist the mutable half of a trace after a state-machine step.
    /// Returns false when the row vanished underneath us.
    pub async fn update_process_trace(&self, row: &ProcessTraceRow) -> Result<bool> {
        let model = TraceEntity::find_by_id(&row.id)
            .filter(TraceCol::TenantId.eq(row.tenant_id.as_str()))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let mut am: process_trace::ActiveModel = m.into();
            am.status = Set(row.status.clone());
            am.steps_json = Set(row.steps_json.clone());
            am.assigned_to = Set(row.assigned_to.clone());
            am.ai_analysis = Set(row.ai_analysis.clone());
            am.updated_at = Set(row.updated_at.fixed_offset());
            am.ended_at = Set(row.ended_at.map(|t| t.fixed_offset()));
            am.update(self.db()).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Aggregate statistics over traces created inside a time window:
    /// count, completion rate, average duration of completed traces, and a
    /// status histogram.
    pub async fn process_trace_stats(
        &self,
        tenant_id: &str,
        created_gte: Option<DateTime<Utc>>,
        created_lte: Option<DateTime<Utc>>,
    ) -> Result<ProcessTraceStats> {
        let mut q = TraceEntity::find().filter(TraceCol::TenantId.eq(tenant_id));
        if let Some(from) = created_gte {
            q = q.filter(TraceCol::CreatedAt.gte(from.fixed_offset()));
        }
        if let Some(to) = created_lte {
            q = q.filter(TraceCol::CreatedAt.lte(to.fixed_offset()));
        }
        let rows = q.all(self.db()).await?;

        let total = rows.len() as u64;
        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut completed = 0u64;
        let mut duration_sum = 0f64;
        for row in &rows {
            *by_status.entry(row.status.clone()).or_insert(0) += 1;
            if let Some(ended) = row.ended_at {
                completed += 1;
                let duration = ended.with_timezone(&Utc) - row.created_at.with_timezone(&Utc);
                duration_sum += duration.num_milliseconds() as f64 / 1000.0;
            }
        }
        let completion_rate = if total > 0 {
            completed as f64 / total as f64
        } else {
            0.0
        };
        let avg_duration_secs = if completed > 0 {
            duration_sum / completed as f64
        } else {
            0.0
        };

        Ok(ProcessTraceStats {
            total,
            completed,
            completion_rate,
            avg_duration_secs,
            by_status,
        })
    }

    // ---- process_operation_logs ----

    pub async fn insert_process_operation_log(&self, row: &ProcessOperationLogRow) -> Result<()> {
        let am = process_operation_log::ActiveModel {
            id: Set(row.id.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            trace_id: Set(row.trace_id.clone()),
            event_id: Set(row.event_id.clone()),
            operator: Set(row.operator.clone()),
            action: Set(row.action.clone()),
            before_snapshot: Set(row.before_snapshot.clone()),
            after_snapshot: Set(row.after_snapshot.clone()),
            description: Set(row.description.clone()),
            created_at: Set(row.created_at.fixed_offset()),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    pub async fn list_process_operation_logs(
        &self,
        tenant_id: &str,
        trace_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ProcessOperationLogRow>> {
        let rows = LogEntity::find()
            .filter(LogCol::TenantId.eq(tenant_id))
            .filter(LogCol::TraceId.eq(trace_id))
            .order_by(LogCol::CreatedAt, Order::Asc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_log).collect())
    }

    pub async fn count_process_operation_logs(
        &self,
        tenant_id: &str,
        trace_id: &str,
    ) -> Result<u64> {
        Ok(LogEntity::find()
            .filter(LogCol::TenantId.eq(tenant_id))
            .filter(LogCol::TraceId.eq(trace_id))
            .count(self.db())
            .await?)
    }
}
