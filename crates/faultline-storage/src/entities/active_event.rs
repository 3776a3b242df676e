use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "active_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub fault_center_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub fingerprint: String,
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub datasource: String,
    pub severity: String,
    pub labels_json: String,
    pub annotations: String,
    pub eval_value: f64,
    pub first_trigger_time: DateTimeWithTimeZone,
    pub last_eval_time: DateTimeWithTimeZone,
    pub resolved: bool,
    pub resolved_time: Option<DateTimeWithTimeZone>,
    pub claimed: bool,
    pub claimant: Option<String>,
    pub claim_time: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
