use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::silence::{self, Column as SilenceCol, Entity as SilenceEntity};
use crate::error::Result;
use crate::store::AlertStore;

/// 静默规则数据行（谓词以 JSON 文本存储，编译形态只在内存中）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilenceRow {
    pub id: String,
    pub tenant_id: String,
    pub fault_center_id: String,
    pub name: String,
    pub comment: String,
    pub predicates_json: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 静默规则更新请求
#[derive(Debug, Clone, Default)]
pub struct SilenceUpdate {
    pub name: Option<String>,
    pub comment: Option<String>,
    pub predicates_json: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// 静默规则过滤条件
#[derive(Debug, Clone, Default)]
pub struct SilenceFilter {
    pub fault_center_id_eq: Option<String>,
    pub name_contains: Option<String>,
    pub created_by_eq: Option<String>,
}

fn model_to_silence(m: silence::Model) -> SilenceRow {
    SilenceRow {
        id: m.id,
        tenant_id: m.tenant_id,
        fault_center_id: m.fault_center_id,
        name: m.name,
        comment: m.comment,
        predicates_json: m.predicates_json,
        starts_at: m.starts_at.with_timezone(&Utc),
        ends_at: m.ends_at.with_timezone(&Utc),
        created_by: m.created_by,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    // ---- silences ----

    pub async fn insert_silence(&self, row: &SilenceRow) -> Result<SilenceRow> {
        let now = Utc::now().fixed_offset();
        let am = silence::ActiveModel {
            id: Set(row.id.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            fault_center_id: Set(row.fault_center_id.clone()),
            name: Set(row.name.clone()),
            comment: Set(row.comment.clone()),
            predicates_json: Set(row.predicates_json.clone()),
            starts_at: Set(row.starts_at.fixed_offset()),
            ends_at: Set(row.ends_at.fixed_offset()),
            created_by: Set(row.created_by.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_silence(model))
    }

    pub async fn get_silence_by_id(&self, tenant_id: &str, id: &str) -> Result<Option<SilenceRow>> {
        let model = SilenceEntity::find_by_id(id)
            .filter(SilenceCol::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_silence))
    }

    pub async fn list_silences(
        &self,
        tenant_id: &str,
        filter: &SilenceFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SilenceRow>> {
        let mut q = SilenceEntity::find().filter(SilenceCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(SilenceCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref s) = filter.name_contains {
            q = q.filter(SilenceCol::Name.contains(s.as_str()));
        }
        if let Some(ref by) = filter.created_by_eq {
            q = q.filter(SilenceCol::CreatedBy.eq(by.as_str()));
        }
        let rows = q
            .order_by(SilenceCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_silence).collect())
    }

    pub async fn count_silences(&self, tenant_id: &str, filter: &SilenceFilter) -> Result<u64> {
        let mut q = SilenceEntity::find().filter(SilenceCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(SilenceCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref s) = filter.name_contains {
            q = q.filter(SilenceCol::Name.contains(s.as_str()));
        }
        if let Some(ref by) = filter.created_by_eq {
            q = q.filter(SilenceCol::CreatedBy.eq(by.as_str()));
        }
        Ok(q.count(self.db()).await?)
    }

    pub async fn update_silence(
        &self,
        tenant_id: &str,
        id: &str,
        upd: &SilenceUpdate,
    ) -> Result<Option<SilenceRow>> {
        let model = SilenceEntity::find_by_id(id)
            .filter(SilenceCol::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: silence::ActiveModel = m.into();
            if let Some(ref name) = upd.name {
                am.name = Set(name.clone());
            }
            if let Some(ref comment) = upd.comment {
                am.comment = Set(comment.clone());
            }
            if let Some(ref preds) = upd.predicates_json {
                am.predicates_json = Set(preds.clone());
            }
            if let Some(starts) = upd.starts_at {
                am.starts_at = Set(starts.fixed_offset());
            }
            if let Some(ends) = upd.ends_at {
                am.ends_at = Set(ends.fixed_offset());
            }
            am.updated_at = Set(now);
            let updated = am.update(self.db()).await?;
            Ok(Some(model_to_silence(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_silence(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let res = SilenceEntity::delete_many()
            .filter(SilenceCol::Id.eq(id))
            .filter(SilenceCol::TenantId.eq(tenant_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Every silence row, across all tenants. Used once at startup to
    /// recompile the in-memory silence set.
    pub async fn load_silences(&self) -> Result<Vec<SilenceRow>> {
        let rows = SilenceEntity::find().all(self.db()).await?;
        Ok(rows.into_iter().map(model_to_silence).collect())
    }
}
