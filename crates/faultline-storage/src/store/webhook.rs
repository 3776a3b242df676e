use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::third_party_alert::{self, Column as AlertCol, Entity as AlertEntity};
use crate::entities::third_party_webhook::{self, Column as HookCol, Entity as HookEntity};
use crate::error::Result;
use crate::store::AlertStore;

/// 第三方 Webhook 接入点数据行。
///
/// `webhook_id` 是对外公开的路径令牌（创建时随机生成，之后不可变），
/// 与内部主键 `id` 区分开。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdPartyWebhookRow {
    pub id: String,
    pub webhook_id: String,
    pub tenant_id: String,
    pub fault_center_id: String,
    pub name: String,
    pub source_type: String,
    pub enabled: bool,
    pub target_ids_json: String,
    pub call_count: i64,
    pub last_called_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 第三方 Webhook 更新请求
#[derive(Debug, Clone, Default)]
pub struct ThirdPartyWebhookUpdate {
    pub name: Option<String>,
    pub source_type: Option<String>,
    pub enabled: Option<bool>,
    pub target_ids_json: Option<String>,
}

/// 第三方 Webhook 过滤条件
#[derive(Debug, Clone, Default)]
pub struct ThirdPartyWebhookFilter {
    pub fault_center_id_eq: Option<String>,
    pub source_type_eq: Option<String>,
    pub enabled_eq: Option<bool>,
    pub name_contains: Option<String>,
}

/// 第三方告警接入记录（保留原始报文与请求头）。
///
/// `status` 是归一化后的告警状态（firing / resolved），`outcome` 是
/// 准入处置（created / refreshed / suppressed），两者互不替代。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdPartyAlertRow {
    pub id: String,
    pub tenant_id: String,
    pub fault_center_id: String,
    pub webhook_id: String,
    pub source_type: String,
    /// 准入后产生的内部事件 ID（被抑制时为 None）
    pub event_id: Option<String>,
    /// 外部系统自带的告警 ID
    pub external_id: Option<String>,
    pub fingerprint: String,
    pub severity: String,
    pub status: String,
    pub title: String,
    pub content: String,
    pub outcome: String,
    pub raw_payload: String,
    pub headers_json: String,
    pub created_at: DateTime<Utc>,
}

fn model_to_webhook(m: third_party_webhook::Model) -> ThirdPartyWebhookRow {
    ThirdPartyWebhookRow {
        id: m.id,
        webhook_id: m.webhook_id,
        tenant_id: m.tenant_id,
        fault_center_id: m.fault_center_id,
        name: m.name,
        source_type: m.source_type,
        enabled: m.enabled,
        target_ids_json: m.target_ids_json,
        call_count: m.call_count,
        last_called_at: m.last_called_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn model_to_alert(m: third_party_alert::Model) -> ThirdPartyAlertRow {
    ThirdPartyAlertRow {
        id: m.id,
        tenant_id: m.tenant_id,
        fault_center_id: m.fault_center_id,
        webhook_id: m.webhook_id,
        source_type: m.source_type,
        event_id: m.event_id,
        external_id: m.external_id,
        fingerprint: m.fingerprint,
        severity: m.severity,
        status: m.status,
        title: m.title,
        content: m.content,
        outcome: m.outcome,
        raw_payload: m.raw_payload,
        headers_json: m.headers_json,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    // ---- third_party_webhooks ----

    pub async fn insert_third_party_webhook(
        &self,
        row: &ThirdPartyWebhookRow,
    ) -> Result<ThirdPartyWebhookRow> {
        let now = Utc::now().fixed_offset();
        let am = third_party_webhook::ActiveModel {
            id: Set(row.id.clone()),
            webhook_id: Set(row.webhook_id.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            fault_center_id: Set(row.fault_center_id.clone()),
            name: Set(row.name.clone()),
            source_type: Set(row.source_type.clone()),
            enabled: Set(row.enabled),
            target_ids_json: Set(row.target_ids_json.clone()),
            call_count: Set(0),
            last_called_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(model_to_webhook(model))
    }

    pub async fn get_third_party_webhook(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<ThirdPartyWebhookRow>> {
        let model = HookEntity::find_by_id(id)
            .filter(HookCol::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_webhook))
    }

    /// Lookup by the public path token. The intake endpoint carries no
    /// identity headers, so tenant scoping comes from the row itself.
    pub async fn get_webhook_by_public_id(
        &self,
        webhook_id: &str,
    ) -> Result<Option<ThirdPartyWebhookRow>> {
        let model = HookEntity::find()
            .filter(HookCol::WebhookId.eq(webhook_id))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_webhook))
    }

    pub async fn list_third_party_webhooks(
        &self,
        tenant_id: &str,
        filter: &ThirdPartyWebhookFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ThirdPartyWebhookRow>> {
        let mut q = HookEntity::find().filter(HookCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(HookCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref st) = filter.source_type_eq {
            q = q.filter(HookCol::SourceType.eq(st.as_str()));
        }
        if let Some(en) = filter.enabled_eq {
            q = q.filter(HookCol::Enabled.eq(en));
        }
        if let Some(ref s) = filter.name_contains {
            q = q.filter(HookCol::Name.contains(s.as_str()));
        }
        let rows = q
            .order_by(HookCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_webhook).collect())
    }

    pub async fn count_third_party_webhooks(
        &self,
        tenant_id: &str,
        filter: &ThirdPartyWebhookFilter,
    ) -> Result<u64> {
        let mut q = HookEntity::find().filter(HookCol::TenantId.eq(tenant_id));
        if let Some(ref fc) = filter.fault_center_id_eq {
            q = q.filter(HookCol::FaultCenterId.eq(fc.as_str()));
        }
        if let Some(ref st) = filter.source_type_eq {
            q = q.filter(HookCol::SourceType.eq(st.as_str()));
        }
        if let Some(en) = filter.enabled_eq {
            q = q.filter(HookCol::Enabled.eq(en));
        }
        if let Some(ref s) = filter.name_contains {
            q = q.filter(HookCol::Name.contains(s.as_str()));
        }
        Ok(q.count(self.db()).await?)
    }

    pub async fn update_third_party_webhook(
        &self,
        tenant_id: &str,
        id: &str,
        upd: &ThirdPartyWebhookUpdate,
    ) -> Result<Option<ThirdPartyWebhookRow>> {
        let model = HookEntity::find_by_id(id)
            .filter(HookCol::TenantId.eq(tenant_id))
            .one(self.db())
            .await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let mut am: third_party_webhook::ActiveModel = m.into();
            if let Some(ref name) = upd.name {
                am.name = Set(name.clone());
            }
            if let Some(ref st) = upd.source_type {
                am.source_type = Set(st.clone());
            }
            if let Some(en) = upd.enabled {
                am.enabled = Set(en);
            }
            if let Some(ref ids) = upd.target_ids_json {
                am.target_ids_json = Set(ids.clone());
            }
            am.updated_at = Set(now);
            let updated = am.update(self.db()).await?;
            Ok(Some(model_to_webhook(updated)))
        } else {
            Ok(None)
        }
    }

    pub async fn delete_third_party_webhook(&self, tenant_id: &str, id: &str) -> Result<bool> {
        let res = HookEntity::delete_many()
            .filter(HookCol::Id.eq(id))
            .filter(HookCol::TenantId.eq(tenant_id))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Bump the call counter and stamp the last-call time for an intake hit.
    pub async fn record_webhook_call(&self, id: &str) -> Result<()> {
        let model = HookEntity::find_by_id(id).one(self.db()).await?;
        if let Some(m) = model {
            let now = Utc::now().fixed_offset();
            let count = m.call_count;
            let mut am: third_party_webhook::ActiveModel = m.into();
            am.call_count = Set(count + 1);
            am.last_called_at = Set(Some(now));
            am.update(self.db()).await?;
        }
        Ok(())
    }

    // ---- third_party_alerts ----

    pub async fn insert_third_party_alert(&self, row: &ThirdPartyAlertRow) -> Result<()> {
        let am = third_party_alert::ActiveModel {
            id: Set(row.id.clone()),
            tenant_id: Set(row.tenant_id.clone()),
            fault_center_id: Set(row.fault_center_id.clone()),
            webhook_id: Set(row.webhook_id.clone()),
            source_type: Set(row.source_type.clone()),
            event_id: Set(row.event_id.clone()),
            external_id: Set(row.external_id.clone()),
            fingerprint: Set(row.fingerprint.clone()),
            severity: Set(row.severity.clone()),
            status: Set(row.status.clone()),
            title: Set(row.title.clone()),
            content: Set(row.content.clone()),
            outcome: Set(row.outcome.clone()),
            raw_payload: Set(row.raw_payload.clone()),
            headers_json: Set(row.headers_json.clone()),
            created_at: Set(row.created_at.fixed_offset()),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    pub async fn list_third_party_alerts(
        &self,
        tenant_id: &str,
        webhook_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ThirdPartyAlertRow>> {
        let rows = AlertEntity::find()
            .filter(AlertCol::TenantId.eq(tenant_id))
            .filter(AlertCol::WebhookId.eq(webhook_id))
            .order_by(AlertCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_alert).collect())
    }

    pub async fn count_third_party_alerts(
        &self,
        tenant_id: &str,
        webhook_id: &str,
    ) -> Result<u64> {
        Ok(AlertEntity::find()
            .filter(AlertCol::TenantId.eq(tenant_id))
            .filter(AlertCol::WebhookId.eq(webhook_id))
            .count(self.db())
            .await?)
    }
}
