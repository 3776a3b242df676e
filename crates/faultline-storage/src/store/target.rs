use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::notification_target::{self, Column as TargetCol, Entity as TargetEntity};
use crate::error::Result;
use crate::store::AlertStore;

/// 通知目标数据行（路由表与默认接收人以 JSON 文本存储）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTargetRow {
    pub id: String,
    pub tenant_id: String,
    pub fault_center_id: String,
    pub name: String,
    pub channel_type: String,
    pub default_hook: String,
    pub default_sign: Option<String>,
    pub default_recipients_json: String,
    pub routes_json: String,
    pub duty_roster_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 通知目标更新请求
#[derive(Debug, Clone, Default)]
pub struct NotificationTargetUpdate {
    pub name: Option<String>,
    pub default_hook: Option<String>,
    pub default_sign: Option<String>,
    pub default_recipients_json: Option<String>,
    pub routes_json: Option<String>,
    pub duty_roster_id: Option<String>,
}

/// 通知目标过滤条件
#[derive(Debug, Clone, Default)]
pub struct NotificationTargetFilter {
    pub fault_center_id_eq: Option<String>,
    pub channel_type_eq: Option<String>,
    pub name_contains: Option<String>,
}

fn model_to_target(m: notification_target::Model) -> NotificationTargetRow {
    NotificationTargetRow {
        id: m.id,
        tenant_id: m.tenant_id,
        fault_center_id: m.fault_center_id,
        name: m.name,
        channel_type: m.channel_type,
        default_hook: m.default_hook,
        default_sign: m.default_sign,
        default_recipients_json: m.default_recipients_json,
        routes_json: m.routes_json,
        duty_roster_id: m.duty_roster_id,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    // ---- notification_targets ----

    pub async fn insert_notification_target(
        &self,
        row: &NotificationTargetRow,
    ) -> Result<NotificationTargetRow> {
        let now = Utc::now().fixed_offset();
        let am = notification_target::ActiveModel {
            id: Set(row.id.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            fault_center_id: Set(row.fault_center_id.clone()),
            name: Set(row.name.clone()),
            channel_type: Set(row.channel_type.clone()),
            default_hook: Set(row.default_hook.clone()),
            default_sign: Set(row.default_sign.clone()),
            default_recipients_json: Set(row.default_recipients_json.clone()),
            routes_json: Set(row.routes_json.clone()),
            duty_roster_id: Set(row.duty_roster_id.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_target(model))
    }

    pub async fn get_notification_target_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<NotificationTargetRow>> {
        let model = TargetEntity::find_by_id(id)
            .filter(TargetCol::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_target))
    }

    pub async fn list_notification_targets(
        &self,
        tenant_id: &str,
        filter: &NotificationTargetFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<NotificationTargetRow>> {
        let mut q = TargetEntity::find().filter(TargetCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(TargetCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref ct) = filter.channel_type_eq {
            q = q.filter(TargetCol::ChannelType.eq(ct.as_str()));
        }
        if let Some(ref s) = filter.name_contains {
            q = q.filter(TargetCol::Name.contains(s.as_str()));
        }
        let rows = q
            .order_by(TargetCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_target).collect())
    }

    pub async fn count_notification_targets(
        &self,
        tenant_id: &str,
        filter: &NotificationTargetFilter,
    ) -> Result<u64> {
        let mut q = TargetEntity::find().filter(TargetCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(TargetCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref ct) = filter.channel_type_eq {
            q = q.filter(TargetCol::ChannelType.eq(ct.as_str()));
        }
        if let Some(ref s) = filter.name_contains {
            q = q.filter(TargetCol::Name.contains(s.as_str()));
        }
        Ok(q.count(self.db()).await?)
    }

    /// Targets in a fault center, the set the dispatcher fans out to.
    /// Ordered by creation so dispatch order is stable.
    pub async fn list_targets_for_dispatch(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
    ) -> Result<Vec<NotificationTargetRow>> {
        let rows = TargetEntity::find()
            .filter(TargetCol::TenantId.eq(tenant_id))
            .filter(TargetCol::FaultCenterId.eq(fault_center_id))
            .order_by(TargetCol::CreatedAt, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_target).collect())
    }

    pub async fn update_notification_target(
        &self,
        tenant_id: &str,
        id: &str,
        upd: &NotificationTargetUpdate,
    ) -> Result<Option<NotificationTargetRow>> {
        let model = TargetEntity::find_by_id(id)
            .filter(TargetCol::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: notification_target::ActiveModel = m.into();
            if let Some(ref name) = upd.name {
                am.name = Set(name.clone());
            }
            if let Some(ref hook) = upd.default_hook {
                am.default_hook = Set(hook.clone());
            }
            if let Some(ref sign) = upd.default_sign {
                am.default_sign = Set(Some(sign.clone()));
            }
            if let Some(ref recips) = upd.default_recipients_json {
                am.default_recipients_json = Set(recips.clone());
            }
            if let Some(ref routes) = upd.routes_json {
                am.routes_json = Set(routes.clone());
            }
            if let Some(ref duty) = upd.duty_roster_id {
                am.duty_roster_id = Set(Some(duty.clone()));
            }
            am.updated_at = Set(now);
            let updated = am.update(self.db()).await?;
            Ok(Some(model_to_target(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_notification_target(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let res = TargetEntity::delete_many()
            .filter(TargetCol::Id.eq(id))
            .filter(TargetCol::TenantId.eq(tenant_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }
}
