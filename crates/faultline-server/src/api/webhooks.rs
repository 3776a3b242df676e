use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, success_empty_response, success_paginated_response, success_response,
};
use crate::identity::Identity;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use faultline_common::id;
use faultline_common::types::AlertEvent;
use faultline_event::engine::AdmissionOutcome;
use faultline_event::intake;
use faultline_storage::{ThirdPartyAlertRow, ThirdPartyWebhookFilter, ThirdPartyWebhookRow, ThirdPartyWebhookUpdate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Public path token for the intake URL. Longer than a trace id because it
/// is the only thing standing between the internet and the intake endpoint.
fn generate_webhook_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// 第三方 Webhook 接入点
#[derive(Serialize, ToSchema)]
struct WebhookResponse {
    /// 内部 ID（CRUD 路由使用）
    id: String,
    /// 对外公开的接入令牌，嵌入公网 intake URL，创建后不可变
    webhook_id: String,
    tenant_id: String,
    fault_center_id: String,
    name: String,
    /// 来源系统标识（zabbix / prometheus / custom ...）
    source_type: String,
    enabled: bool,
    /// 关联的通知目标 ID 列表
    target_ids: Vec<String>,
    /// 累计接入次数
    call_count: i64,
    /// 最近一次接入时间
    last_called_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn webhook_response(row: ThirdPartyWebhookRow) -> WebhookResponse {
    let target_ids = serde_json::from_str(&row.target_ids_json).unwrap_or_else(|e| {
        tracing::warn!(
            webhook = %row.id,
            error = %e,
            "Malformed target id list on webhook row"
        );
        Vec::new()
    });
    WebhookResponse {
        id: row.id,
        webhook_id: row.webhook_id,
        tenant_id: row.tenant_id,
        fault_center_id: row.fault_center_id,
        name: row.name,
        source_type: row.source_type,
        enabled: row.enabled,
        target_ids,
        call_count: row.call_count,
        last_called_at: row.last_called_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn default_enabled() -> bool {
    true
}

/// 创建第三方 Webhook 请求
#[derive(Deserialize, ToSchema)]
struct CreateWebhookRequest {
    /// 故障中心 ID
    fault_center_id: String,
    /// 名称
    name: String,
    /// 来源系统标识
    source_type: String,
    /// 是否启用（默认启用）
    #[serde(default = "default_enabled")]
    enabled: bool,
    /// 关联的通知目标 ID 列表
    #[serde(default)]
    target_ids: Vec<String>,
}

/// 创建第三方 Webhook 接入点。公开令牌 `webhook_id` 随机生成，之后不可变。
#[utoipa::path(
    post,
    path = "/v1/webhooks",
    tag = "Webhooks",
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook 已创建", body = WebhookResponse),
        (status = 400, description = "请求非法", body = crate::api::ApiError),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn create_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Json(body): Json<CreateWebhookRequest>,
) -> impl IntoResponse {
    if body.fault_center_id.trim().is_empty() || body.name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "fault_center_id and name are required",
        );
    }
    if body.source_type.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "source_type is required",
        );
    }

    let target_ids_json = match serde_json::to_string(&body.target_ids) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize target id list");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Failed to serialize target id list",
            );
        }
    };

    let now = Utc::now();
    let row = ThirdPartyWebhookRow {
        id: id::next_id(),
        webhook_id: generate_webhook_token(),
        tenant_id: identity.tenant_id.clone(),
        fault_center_id: body.fault_center_id,
        name: body.name,
        source_type: body.source_type,
        enabled: body.enabled,
        target_ids_json,
        call_count: 0,
        last_called_at: None,
        created_at: now,
        updated_at: now,
    };

    match state.store.insert_third_party_webhook(&row).await {
        Ok(stored) => {
            tracing::info!(
                webhook = %stored.id,
                tenant_id = %stored.tenant_id,
                source_type = %stored.source_type,
                "Third-party webhook created"
            );
            success_response(StatusCode::CREATED, &trace_id, webhook_response(stored))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to persist third-party webhook");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct WebhookListParams {
    /// 故障中心 ID
    #[param(required = false)]
    #[serde(default)]
    fault_center_id: Option<String>,
    /// 来源系统精确匹配
    #[param(required = false)]
    #[serde(rename = "source_type__eq", default)]
    source_type_eq: Option<String>,
    /// 启用状态过滤
    #[param(required = false)]
    #[serde(rename = "enabled__eq", default)]
    enabled_eq: Option<bool>,
    /// 名称模糊匹配
    #[param(required = false)]
    #[serde(rename = "name__contains", default)]
    name_contains: Option<String>,
}

/// 列出第三方 Webhook。
#[utoipa::path(
    get,
    path = "/v1/webhooks",
    tag = "Webhooks",
    params(WebhookListParams, PaginationParams),
    responses(
        (status = 200, description = "Webhook 分页列表", body = Vec<WebhookResponse>),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn list_webhooks(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Query(params): Query<WebhookListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let webhook_filter = ThirdPartyWebhookFilter {
        fault_center_id_eq: params.fault_center_id,
        source_type_eq: params.source_type_eq,
        enabled_eq: params.enabled_eq,
        name_contains: params.name_contains,
    };

    let total = match state
        .store
        .count_third_party_webhooks(&identity.tenant_id, &webhook_filter)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count third-party webhooks");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    match state
        .store
        .list_third_party_webhooks(
            &identity.tenant_id,
            &webhook_filter,
            pagination.limit(),
            pagination.offset(),
        )
        .await
    {
        Ok(rows) => {
            let items: Vec<WebhookResponse> = rows.into_iter().map(webhook_response).collect();
            success_paginated_response(
                StatusCode::OK,
                &trace_id,
                items,
                total,
                pagination.limit(),
                pagination.offset(),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list third-party webhooks");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 按内部 ID 获取 Webhook 详情（含调用统计）。
#[utoipa::path(
    get,
    path = "/v1/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = String, Path, description = "Webhook 内部 ID")),
    responses(
        (status = 200, description = "Webhook 详情", body = WebhookResponse),
        (status = 404, description = "Webhook 不存在", body = crate::api::ApiError)
    )
)]
async fn get_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state
        .store
        .get_third_party_webhook(&identity.tenant_id, &id)
        .await
    {
        Ok(Some(row)) => success_response(StatusCode::OK, &trace_id, webhook_response(row)),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Webhook not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get third-party webhook");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 更新第三方 Webhook 请求（`webhook_id` 令牌不可变更）
#[derive(Deserialize, ToSchema)]
struct UpdateWebhookRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    target_ids: Option<Vec<String>>,
}

/// 更新第三方 Webhook。
#[utoipa::path(
    put,
    path = "/v1/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = String, Path, description = "Webhook 内部 ID")),
    request_body = UpdateWebhookRequest,
    responses(
        (status = 200, description = "更新后的 Webhook", body = WebhookResponse),
        (status = 400, description = "请求非法", body = crate::api::ApiError),
        (status = 404, description = "Webhook 不存在", body = crate::api::ApiError)
    )
)]
async fn update_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWebhookRequest>,
) -> impl IntoResponse {
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                "name cannot be blank",
            );
        }
    }

    let target_ids_json = match body.target_ids.as_ref().map(serde_json::to_string).transpose() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize target id list");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Failed to serialize target id list",
            );
        }
    };

    let update = ThirdPartyWebhookUpdate {
        name: body.name,
        source_type: body.source_type,
        enabled: body.enabled,
        target_ids_json,
    };

    match state
        .store
        .update_third_party_webhook(&identity.tenant_id, &id, &update)
        .await
    {
        Ok(Some(row)) => {
            tracing::info!(webhook = %id, "Third-party webhook updated");
            success_response(StatusCode::OK, &trace_id, webhook_response(row))
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Webhook not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update third-party webhook");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 删除第三方 Webhook。
#[utoipa::path(
    delete,
    path = "/v1/webhooks/{id}",
    tag = "Webhooks",
    params(("id" = String, Path, description = "Webhook 内部 ID")),
    responses(
        (status = 200, description = "Webhook 已删除"),
        (status = 404, description = "Webhook 不存在", body = crate::api::ApiError)
    )
)]
async fn delete_webhook(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state
        .store
        .delete_third_party_webhook(&identity.tenant_id, &id)
        .await
    {
        Ok(true) => {
            tracing::info!(webhook = %id, "Third-party webhook deleted");
            success_empty_response(StatusCode::OK, &trace_id, "Webhook deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Webhook not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete third-party webhook");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 单条第三方告警接入记录
#[derive(Serialize, ToSchema)]
struct IntakeRecordResponse {
    id: String,
    source_type: String,
    /// 准入后产生的内部事件 ID（被抑制时为 null）
    event_id: Option<String>,
    /// 外部系统自带的告警 ID
    external_id: Option<String>,
    fingerprint: String,
    severity: String,
    /// firing / resolved
    status: String,
    title: String,
    content: String,
    /// created / refreshed / suppressed
    outcome: String,
    /// 原始入站报文
    raw_payload: String,
    /// 入站请求头快照（JSON 字符串）
    headers_json: String,
    created_at: DateTime<Utc>,
}

fn intake_record_response(row: ThirdPartyAlertRow) -> IntakeRecordResponse {
    IntakeRecordResponse {
        id: row.id,
        source_type: row.source_type,
        event_id: row.event_id,
        external_id: row.external_id,
        fingerprint: row.fingerprint,
        severity: row.severity,
        status: row.status,
        title: row.title,
        content: row.content,
        outcome: row.outcome,
        raw_payload: row.raw_payload,
        headers_json: row.headers_json,
        created_at: row.created_at,
    }
}

/// 列出某个 Webhook 的告警接入记录（新→旧）。
#[utoipa::path(
    get,
    path = "/v1/webhooks/{id}/alerts",
    tag = "Webhooks",
    params(
        ("id" = String, Path, description = "Webhook 内部 ID"),
        PaginationParams
    ),
    responses(
        (status = 200, description = "接入记录分页列表", body = Vec<IntakeRecordResponse>),
        (status = 404, description = "Webhook 不存在", body = crate::api::ApiError)
    )
)]
async fn list_webhook_alerts(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    // Alert records are keyed by the public token, so resolve the webhook
    // row first. Doubles as the tenant-scoped existence check.
    let hook = match state
        .store
        .get_third_party_webhook(&identity.tenant_id, &id)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Webhook not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get third-party webhook");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    let total = match state
        .store
        .count_third_party_alerts(&identity.tenant_id, &hook.webhook_id)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count third-party alerts");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    match state
        .store
        .list_third_party_alerts(
            &identity.tenant_id,
            &hook.webhook_id,
            pagination.limit(),
            pagination.offset(),
        )
        .await
    {
        Ok(rows) => {
            let items: Vec<IntakeRecordResponse> =
                rows.into_iter().map(intake_record_response).collect();
            success_paginated_response(
                StatusCode::OK,
                &trace_id,
                items,
                total,
                pagination.limit(),
                pagination.offset(),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list third-party alerts");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 第三方接入响应（面向外部系统的简化结构，字段为 camelCase）
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
struct IntakeResponse {
    success: bool,
    message: String,
    /// 准入后的事件 ID；被抑制时为接入记录 ID；失败时为 null
    alert_id: Option<String>,
    timestamp: DateTime<Utc>,
}

fn intake_failure(status: StatusCode, message: &str) -> (StatusCode, Json<IntakeResponse>) {
    (
        status,
        Json(IntakeResponse {
            success: false,
            message: message.to_string(),
            alert_id: None,
            timestamp: Utc::now(),
        }),
    )
}

/// Headers worth keeping with the audit record. The full map would drag
/// cookies and auth headers into the database.
fn capture_headers(headers: &HeaderMap) -> String {
    let mut map = serde_json::Map::new();
    for name in ["content-type", "user-agent", "x-forwarded-for"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            map.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        }
    }
    serde_json::Value::Object(map).to_string()
}

/// 第三方系统公开接入端点。无须认证，webhook 令牌即是凭证。
///
/// 任意 JSON 报文都会被归一化为规范事件并走准入流水线；未知或停用的
/// 令牌直接拒绝，不落任何数据。
#[utoipa::path(
    post,
    path = "/webhook/{webhook_id}",
    tag = "Intake",
    params(("webhook_id" = String, Path, description = "Webhook 公开令牌")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "报文已接收", body = IntakeResponse),
        (status = 400, description = "报文不是合法 JSON", body = IntakeResponse),
        (status = 403, description = "Webhook 已停用", body = IntakeResponse),
        (status = 404, description = "Webhook 令牌未知", body = IntakeResponse)
    )
)]
async fn intake_webhook(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<IntakeResponse>) {
    let hook = match state.store.get_webhook_by_public_id(&webhook_id).await {
        Ok(Some(hook)) => hook,
        Ok(None) => {
            tracing::warn!(trace_id = %*trace_id, "Intake for unknown webhook token");
            return intake_failure(StatusCode::NOT_FOUND, "unknown webhook id");
        }
        Err(e) => {
            tracing::error!(trace_id = %*trace_id, error = %e, "Failed to resolve intake webhook");
            return intake_failure(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };
    if !hook.enabled {
        tracing::warn!(trace_id = %*trace_id, webhook = %hook.id, "Intake for disabled webhook");
        return intake_failure(StatusCode::FORBIDDEN, "webhook is disabled");
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return intake_failure(StatusCode::BAD_REQUEST, "request body is not valid JSON");
        }
    };

    let now = Utc::now();
    let normalized = intake::normalize(&hook.source_type, &payload);
    let event = normalized.to_event(&hook.tenant_id, &hook.fault_center_id, &hook.source_type);
    let admission = state.engine.admit(event, now);

    let outcome = match admission.outcome {
        AdmissionOutcome::Created => "created",
        AdmissionOutcome::Refreshed => "refreshed",
        AdmissionOutcome::Suppressed => "suppressed",
    };
    let message = match admission.outcome {
        AdmissionOutcome::Created => "alert accepted",
        AdmissionOutcome::Refreshed => "alert merged into existing active event",
        AdmissionOutcome::Suppressed if admission.silence_id.is_some() => {
            "alert suppressed by silence"
        }
        AdmissionOutcome::Suppressed if normalized.resolved => {
            "recovery for unknown alert ignored"
        }
        AdmissionOutcome::Suppressed => "alert suppressed",
    };

    let record = ThirdPartyAlertRow {
        id: id::next_id(),
        tenant_id: hook.tenant_id.clone(),
        fault_center_id: hook.fault_center_id.clone(),
        webhook_id: hook.webhook_id.clone(),
        source_type: hook.source_type.clone(),
        event_id: admission.event.as_ref().map(|e| e.id.clone()),
        external_id: normalized.external_id.clone(),
        fingerprint: normalized.fingerprint.clone(),
        severity: normalized.severity.to_string(),
        status: if normalized.resolved { "resolved" } else { "firing" }.to_string(),
        title: normalized.title.clone(),
        content: normalized.content.clone(),
        outcome: outcome.to_string(),
        raw_payload: String::from_utf8_lossy(&body).into_owned(),
        headers_json: capture_headers(&headers),
        created_at: now,
    };
    // The audit record lands regardless of what happens downstream.
    if let Err(e) = state.store.insert_third_party_alert(&record).await {
        tracing::warn!(trace_id = %*trace_id, error = %e, "Failed to record third-party alert");
    }

    if let Some(event) = admission.event {
        crate::api::events::mirror_upsert(&state, &event).await;
        if admission.notify {
            spawn_webhook_dispatch(&state, event, &hook.target_ids_json);
        }
    }

    if let Err(e) = state.store.record_webhook_call(&hook.id).await {
        tracing::warn!(trace_id = %*trace_id, error = %e, "Failed to bump webhook call counter");
    }

    tracing::info!(
        trace_id = %*trace_id,
        webhook = %hook.id,
        source_type = %hook.source_type,
        fingerprint = %record.fingerprint,
        outcome = %outcome,
        "Third-party alert ingested"
    );

    let alert_id = record
        .event_id
        .clone()
        .unwrap_or_else(|| record.id.clone());
    (
        StatusCode::OK,
        Json(IntakeResponse {
            success: true,
            message: message.to_string(),
            alert_id: Some(alert_id),
            timestamp: now,
        }),
    )
}

/// Deliver to the targets pinned on the webhook, off the request path.
/// A webhook with no pinned targets notifies nobody.
fn spawn_webhook_dispatch(state: &AppState, event: AlertEvent, target_ids_json: &str) {
    let target_ids: Vec<String> = match serde_json::from_str(target_ids_json) {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed target id list on webhook, skipping dispatch");
            return;
        }
    };
    if target_ids.is_empty() {
        tracing::debug!(
            fingerprint = %event.fingerprint,
            "Webhook has no associated targets, skipping dispatch"
        );
        return;
    }
    let state = state.clone();
    tokio::spawn(async move {
        let mut targets = Vec::new();
        for target_id in &target_ids {
            match state
                .store
                .get_notification_target_by_id(&event.tenant_id, target_id)
                .await
            {
                Ok(Some(row)) => match crate::api::targets::row_to_target(row) {
                    Ok(target) => targets.push(target),
                    Err(e) => {
                        tracing::warn!(
                            target_id = %target_id,
                            error = %e,
                            "Skipping target with malformed JSON columns"
                        );
                    }
                },
                Ok(None) => {
                    tracing::warn!(
                        target_id = %target_id,
                        "Webhook references a missing notification target"
                    );
                }
                Err(e) => {
                    tracing::warn!(target_id = %target_id, error = %e, "Failed to load webhook target");
                }
            }
        }
        crate::api::events::dispatch_to_targets(&state, &event, targets).await;
    });
}

pub fn webhook_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(create_webhook, list_webhooks))
        .routes(routes!(get_webhook, update_webhook, delete_webhook))
        .routes(routes!(list_webhook_alerts))
}

pub fn intake_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(intake_webhook))
}
