use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 按依赖顺序建表
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS active_events (
    tenant_id TEXT NOT NULL,
    fault_center_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    id TEXT NOT NULL,
    rule_id TEXT NOT NULL DEFAULT '',
    rule_name TEXT NOT NULL,
    datasource TEXT NOT NULL DEFAULT '',
    severity TEXT NOT NULL,
    labels_json TEXT NOT NULL DEFAULT '{}',
    annotations TEXT NOT NULL DEFAULT '',
    eval_value REAL NOT NULL DEFAULT 0,
    first_trigger_time TEXT NOT NULL,
    last_eval_time TEXT NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0,
    resolved_time TEXT,
    claimed INTEGER NOT NULL DEFAULT 0,
    claimant TEXT,
    claim_time TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, fault_center_id, fingerprint)
);
CREATE INDEX IF NOT EXISTS idx_active_events_severity ON active_events(severity);
CREATE INDEX IF NOT EXISTS idx_active_events_first_trigger ON active_events(first_trigger_time DESC);

CREATE TABLE IF NOT EXISTS alert_history (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    fault_center_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    rule_id TEXT NOT NULL DEFAULT '',
    rule_name TEXT NOT NULL,
    datasource TEXT NOT NULL DEFAULT '',
    severity TEXT NOT NULL,
    labels_json TEXT NOT NULL DEFAULT '{}',
    annotations TEXT NOT NULL DEFAULT '',
    eval_value REAL NOT NULL DEFAULT 0,
    first_trigger_time TEXT NOT NULL,
    last_eval_time TEXT NOT NULL,
    resolved_time TEXT,
    claimed INTEGER NOT NULL DEFAULT 0,
    claimant TEXT,
    claim_time TEXT,
    archived_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_history_tenant ON alert_history(tenant_id, fault_center_id);
CREATE INDEX IF NOT EXISTS idx_alert_history_fingerprint ON alert_history(fingerprint);
CREATE INDEX IF NOT EXISTS idx_alert_history_first_trigger ON alert_history(first_trigger_time DESC);

CREATE TABLE IF NOT EXISTS silences (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    fault_center_id TEXT NOT NULL,
    name TEXT NOT NULL,
    comment TEXT NOT NULL DEFAULT '',
    predicates_json TEXT NOT NULL,
    starts_at TEXT NOT NULL,
    ends_at TEXT NOT NULL,
    created_by TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_silences_tenant ON silences(tenant_id, fault_center_id);
CREATE INDEX IF NOT EXISTS idx_silences_ends_at ON silences(ends_at);

CREATE TABLE IF NOT EXISTS notification_targets (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    fault_center_id TEXT NOT NULL,
    name TEXT NOT NULL,
    channel_type TEXT NOT NULL,
    default_hook TEXT NOT NULL DEFAULT '',
    default_sign TEXT,
    default_recipients_json TEXT NOT NULL DEFAULT '[]',
    routes_json TEXT NOT NULL DEFAULT '[]',
    duty_roster_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_targets_tenant ON notification_targets(tenant_id, fault_center_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_targets_tenant_name ON notification_targets(tenant_id, name);
CREATE INDEX IF NOT EXISTS idx_targets_channel_type ON notification_targets(channel_type);

CREATE TABLE IF NOT EXISTS third_party_webhooks (
    id TEXT PRIMARY KEY NOT NULL,
    webhook_id TEXT NOT NULL UNIQUE,
    tenant_id TEXT NOT NULL,
    fault_center_id TEXT NOT NULL,
    name TEXT NOT NULL,
    source_type TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    target_ids_json TEXT NOT NULL DEFAULT '[]',
    call_count INTEGER NOT NULL DEFAULT 0,
    last_called_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_webhooks_tenant ON third_party_webhooks(tenant_id, fault_center_id);

CREATE TABLE IF NOT EXISTS third_party_alerts (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    fault_center_id TEXT NOT NULL,
    webhook_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    event_id TEXT,
    external_id TEXT,
    fingerprint TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'firing',
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    outcome TEXT NOT NULL,
    raw_payload TEXT NOT NULL,
    headers_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tp_alerts_webhook ON third_party_alerts(webhook_id);
CREATE INDEX IF NOT EXISTS idx_tp_alerts_created ON third_party_alerts(created_at DESC);

CREATE TABLE IF NOT EXISTS process_traces (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    status TEXT NOT NULL,
    steps_json TEXT NOT NULL DEFAULT '[]',
    assigned_to TEXT,
    ai_analysis TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    ended_at TEXT,
    UNIQUE (tenant_id, event_id)
);
CREATE INDEX IF NOT EXISTS idx_traces_status ON process_traces(status);
CREATE INDEX IF NOT EXISTS idx_traces_created ON process_traces(created_at DESC);

CREATE TABLE IF NOT EXISTS process_operation_logs (
    id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    trace_id TEXT NOT NULL,
    event_id TEXT NOT NULL,
    operator TEXT NOT NULL,
    action TEXT NOT NULL,
    before_snapshot TEXT,
    after_snapshot TEXT,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_op_logs_trace ON process_operation_logs(trace_id);
CREATE INDEX IF NOT EXISTS idx_op_logs_event ON process_operation_logs(event_id);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS process_operation_logs;
DROP TABLE IF EXISTS process_traces;
DROP TABLE IF EXISTS third_party_alerts;
DROP TABLE IF EXISTS third_party_webhooks;
DROP TABLE IF EXISTS notification_targets;
DROP TABLE IF EXISTS silences;
DROP TABLE IF EXISTS alert_history;
DROP TABLE IF EXISTS active_events;
";
