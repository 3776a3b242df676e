use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "third_party_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub fault_center_id: String,
    pub webhook_id: String,
    pub source_type: String,
    pub event_id: Option<String>,
    pub external_id: Option<String>,
    pub fingerprint: String,
    pub severity: String,
    pub status: String,
    pub title: String,
    pub content: String,
    pub outcome: String,
    pub raw_payload: String,
    pub headers_json: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
