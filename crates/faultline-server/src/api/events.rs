use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response, success_response};
use crate::identity::Identity;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use faultline_common::fingerprint::rule_fingerprint;
use faultline_common::types::{AlertEvent, ConfirmState, Severity};
use faultline_event::cache::ClaimOutcome;
use faultline_event::engine::AdmissionOutcome;
use faultline_event::filter::{self, EventFilter, StatusFilter};
use faultline_notify::routing::NotificationTarget;
use faultline_storage::{AlertHistoryFilter, NotificationTargetRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

// ---- Shared plumbing (also used by the webhook intake path) ----

/// Mirror one cache record into the durable active-event table. The cache
/// already holds the record, so a mirror failure is logged and swallowed.
pub(crate) async fn mirror_upsert(state: &AppState, event: &AlertEvent) {
    if let Err(e) = state.store.upsert_active_event(event).await {
        tracing::warn!(
            fingerprint = %event.fingerprint,
            error = %e,
            "Failed to mirror active event"
        );
    }
}

pub(crate) async fn mirror_remove(
    state: &AppState,
    tenant_id: &str,
    fault_center_id: &str,
    fingerprint: &str,
) {
    if let Err(e) = state
        .store
        .delete_active_event(tenant_id, fault_center_id, fingerprint)
        .await
    {
        tracing::warn!(
            fingerprint = %fingerprint,
            error = %e,
            "Failed to remove active event mirror"
        );
    }
}

/// Parse stored target rows, dropping any row whose JSON columns fail to
/// parse so one corrupt target never blocks a whole dispatch.
pub(crate) fn rows_to_targets(rows: Vec<NotificationTargetRow>) -> Vec<NotificationTarget> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match crate::api::targets::row_to_target(row) {
                Ok(target) => Some(target),
                Err(e) => {
                    tracing::warn!(
                        target_id = %id,
                        error = %e,
                        "Skipping target with malformed JSON columns"
                    );
                    None
                }
            }
        })
        .collect()
}

pub(crate) async fn dispatch_to_targets(
    state: &AppState,
    event: &AlertEvent,
    targets: Vec<NotificationTarget>,
) {
    if targets.is_empty() {
        tracing::debug!(
            tenant_id = %event.tenant_id,
            fingerprint = %event.fingerprint,
            "No notification targets configured, skipping dispatch"
        );
        return;
    }
    let report = state.dispatcher.dispatch(event, &targets).await;
    if report.is_success() {
        tracing::info!(
            fingerprint = %event.fingerprint,
            delivered = report.delivered,
            "Notification dispatch finished"
        );
    } else {
        tracing::error!(
            fingerprint = %event.fingerprint,
            "Notification dispatch failed: {}",
            report.summary()
        );
    }
}

/// Fan one event out to the fault center's targets without blocking the
/// caller. The triggering request never observes completion or failure;
/// the dispatch report lands in the log.
pub(crate) fn spawn_dispatch(state: &AppState, event: AlertEvent) {
    let state = state.clone();
    tokio::spawn(async move {
        let rows = match state
            .store
            .list_targets_for_dispatch(&event.tenant_id, &event.fault_center_id)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    fingerprint = %event.fingerprint,
                    error = %e,
                    "Failed to load notification targets for dispatch"
                );
                return;
            }
        };
        let targets = rows_to_targets(rows);
        dispatch_to_targets(&state, &event, targets).await;
    });
}

// ---- Push (canonical occurrences from the rule-evaluation engine) ----

/// 规则引擎推送的一次告警发生
#[derive(Deserialize, ToSchema)]
struct PushEventRequest {
    /// 故障中心 ID
    fault_center_id: String,
    /// 指纹（缺省时按规则 ID + 标签计算）
    #[serde(default)]
    fingerprint: Option<String>,
    /// 规则 ID
    #[serde(default)]
    rule_id: String,
    /// 规则名称
    #[serde(default)]
    rule_name: String,
    /// 数据源标识
    #[serde(default)]
    datasource: String,
    /// 告警级别（默认 P2）
    #[serde(default)]
    severity: Severity,
    /// 标签集
    #[serde(default)]
    labels: HashMap<String, String>,
    /// 注解说明
    #[serde(default)]
    annotations: String,
    /// 触发值
    #[serde(default)]
    eval_value: f64,
    /// 是否为恢复事件
    #[serde(default)]
    resolved: bool,
}

impl PushEventRequest {
    fn into_event(self, tenant_id: &str) -> AlertEvent {
        let fingerprint = self
            .fingerprint
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| rule_fingerprint(&self.rule_id, &self.labels));
        let now = Utc::now();
        AlertEvent {
            id: String::new(),
            tenant_id: tenant_id.to_string(),
            fault_center_id: self.fault_center_id,
            fingerprint,
            rule_id: self.rule_id,
            rule_name: self.rule_name,
            datasource: self.datasource,
            severity: self.severity,
            labels: self.labels,
            annotations: self.annotations,
            eval_value: self.eval_value,
            first_trigger_time: now,
            last_eval_time: now,
            resolved: self.resolved,
            resolved_time: None,
            confirm: ConfirmState::default(),
        }
    }
}

/// 推送批次处理结果
#[derive(Default, Serialize, ToSchema)]
struct PushSummary {
    /// 收到的事件数
    received: usize,
    /// 新建的活动事件数
    created: usize,
    /// 去重命中并刷新的事件数
    refreshed: usize,
    /// 被静默或忽略的事件数
    suppressed: usize,
}

/// 推送一批规则事件，逐条走去重 / 静默 / 通知管道。
#[utoipa::path(
    post,
    path = "/v1/events/push",
    tag = "Events",
    request_body = Vec<PushEventRequest>,
    responses(
        (status = 200, description = "批次处理结果", body = PushSummary),
        (status = 400, description = "参数错误", body = crate::api::ApiError),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn push_events(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Json(batch): Json<Vec<PushEventRequest>>,
) -> impl IntoResponse {
    if batch.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "event batch cannot be empty",
        );
    }
    for (i, req) in batch.iter().enumerate() {
        if req.fault_center_id.trim().is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                &format!("event[{i}]: fault_center_id is required"),
            );
        }
        if req.rule_id.trim().is_empty()
            && req.fingerprint.as_deref().unwrap_or("").trim().is_empty()
        {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                &format!("event[{i}]: either fingerprint or rule_id is required"),
            );
        }
    }

    let now = Utc::now();
    let mut summary = PushSummary {
        received: batch.len(),
        ..Default::default()
    };
    for req in batch {
        let incoming = req.into_event(&identity.tenant_id);
        let admission = state.engine.admit(incoming, now);
        match admission.outcome {
            AdmissionOutcome::Created => summary.created += 1,
            AdmissionOutcome::Refreshed => summary.refreshed += 1,
            AdmissionOutcome::Suppressed => summary.suppressed += 1,
        }
        if let Some(event) = admission.event {
            mirror_upsert(&state, &event).await;
            if admission.notify {
                spawn_dispatch(&state, event);
            }
        }
    }
    success_response(StatusCode::OK, &trace_id, summary)
}

// ---- Active event listing ----

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct ActiveEventParams {
    /// 故障中心 ID（必填）
    #[param(required = true)]
    fault_center_id: String,
    /// 级别过滤
    #[param(required = false)]
    #[serde(rename = "severity__eq", default)]
    severity_eq: Option<Severity>,
    /// 首次触发时间下界
    #[param(required = false)]
    #[serde(rename = "first_trigger__gte", default)]
    first_trigger_gte: Option<DateTime<Utc>>,
    /// 首次触发时间上界
    #[param(required = false)]
    #[serde(rename = "first_trigger__lte", default)]
    first_trigger_lte: Option<DateTime<Utc>>,
    /// 关键字（规则名 / 注解 / 指纹 / 数据源 / 标签值）
    #[param(required = false)]
    #[serde(default)]
    query: Option<String>,
    /// 状态：firing / resolved / all（默认 firing）
    #[param(required = false)]
    #[serde(default)]
    status: Option<String>,
}

/// 列出活动事件，默认隐藏已恢复的事件。
#[utoipa::path(
    get,
    path = "/v1/events",
    tag = "Events",
    params(ActiveEventParams, PaginationParams),
    responses(
        (status = 200, description = "活动事件分页列表", body = Vec<AlertEvent>),
        (status = 400, description = "参数错误", body = crate::api::ApiError),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn list_active_events(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Query(params): Query<ActiveEventParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref() {
        None => StatusFilter::default(),
        Some(s) => match s.parse::<StatusFilter>() {
            Ok(f) => f,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e);
            }
        },
    };

    let event_filter = EventFilter {
        severity: params.severity_eq,
        first_trigger_gte: params.first_trigger_gte,
        first_trigger_lte: params.first_trigger_lte,
        query: params.query,
        status,
    };

    let events = state
        .cache()
        .get_all(&identity.tenant_id, &params.fault_center_id);
    let ordered = filter::apply(events, &event_filter);
    let total = ordered.len() as u64;
    let items = filter::page(&ordered, pagination.limit() as u64, pagination.offset() as u64);

    success_paginated_response(
        StatusCode::OK,
        &trace_id,
        items,
        total,
        pagination.limit(),
        pagination.offset(),
    )
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct EventScopeParams {
    /// 故障中心 ID
    #[param(required = true)]
    fault_center_id: String,
}

/// 按指纹获取单个活动事件。
#[utoipa::path(
    get,
    path = "/v1/events/{fingerprint}",
    tag = "Events",
    params(
        ("fingerprint" = String, Path, description = "事件指纹"),
        EventScopeParams
    ),
    responses(
        (status = 200, description = "活动事件", body = AlertEvent),
        (status = 404, description = "事件不存在", body = crate::api::ApiError)
    )
)]
async fn get_active_event(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
    Query(scope): Query<EventScopeParams>,
) -> impl IntoResponse {
    match state
        .cache()
        .get(&identity.tenant_id, &scope.fault_center_id, &fingerprint)
    {
        Some(event) => success_response(StatusCode::OK, &trace_id, event),
        None => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Active event not found",
        ),
    }
}

// ---- Claim ----

/// 批量认领请求
#[derive(Deserialize, ToSchema)]
struct ClaimRequest {
    /// 故障中心 ID
    fault_center_id: String,
    /// 待认领的指纹列表
    fingerprints: Vec<String>,
    /// 认领人（缺省取请求身份中的用户）
    #[serde(default)]
    username: Option<String>,
    /// 认领时间（缺省为服务端当前时间）
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

/// 单个指纹的认领结果
#[derive(Serialize, ToSchema)]
struct ClaimResult {
    /// 指纹
    fingerprint: String,
    /// 结果：claimed / already_claimed / not_found
    outcome: String,
    /// 当前认领人
    #[serde(skip_serializing_if = "Option::is_none")]
    claimant: Option<String>,
}

/// 批量认领活动事件。
///
/// 每个指纹一个并发任务，全部完成后统一返回；未知指纹按 not_found
/// 记录，不视为错误。
#[utoipa::path(
    post,
    path = "/v1/events/claim",
    tag = "Events",
    request_body = ClaimRequest,
    responses(
        (status = 200, description = "逐指纹认领结果", body = Vec<ClaimResult>),
        (status = 400, description = "参数错误", body = crate::api::ApiError),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn claim_events(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Json(body): Json<ClaimRequest>,
) -> impl IntoResponse {
    if body.fingerprints.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "fingerprints cannot be empty",
        );
    }

    let claimant = body
        .username
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| identity.user.clone());
    let time = body.time.unwrap_or_else(Utc::now);

    // One task per fingerprint; awaiting every handle below is the barrier
    // before the response goes out.
    let mut handles = Vec::with_capacity(body.fingerprints.len());
    for fingerprint in body.fingerprints {
        let state = state.clone();
        let tenant_id = identity.tenant_id.clone();
        let fault_center_id = body.fault_center_id.clone();
        let claimant = claimant.clone();
        handles.push(tokio::spawn(async move {
            claim_one(
                &state,
                &tenant_id,
                &fault_center_id,
                &fingerprint,
                &claimant,
                time,
            )
            .await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(error = %e, "Claim task panicked");
            }
        }
    }

    success_response(StatusCode::OK, &trace_id, results)
}

async fn claim_one(
    state: &AppState,
    tenant_id: &str,
    fault_center_id: &str,
    fingerprint: &str,
    claimant: &str,
    time: DateTime<Utc>,
) -> ClaimResult {
    match state
        .cache()
        .claim(tenant_id, fault_center_id, fingerprint, claimant, time)
    {
        ClaimOutcome::Claimed(event) => {
            mirror_upsert(state, &event).await;
            ClaimResult {
                fingerprint: fingerprint.to_string(),
                outcome: "claimed".to_string(),
                claimant: event.confirm.claimant,
            }
        }
        ClaimOutcome::AlreadyClaimed(event) => ClaimResult {
            fingerprint: fingerprint.to_string(),
            outcome: "already_claimed".to_string(),
            claimant: event.confirm.claimant,
        },
        ClaimOutcome::NotFound => ClaimResult {
            fingerprint: fingerprint.to_string(),
            outcome: "not_found".to_string(),
            claimant: None,
        },
    }
}

// ---- Resolve ----

/// 批量恢复请求
#[derive(Deserialize, ToSchema)]
struct ResolveRequest {
    /// 故障中心 ID
    fault_center_id: String,
    /// 待恢复的指纹列表
    fingerprints: Vec<String>,
    /// 恢复时间（缺省为服务端当前时间）
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

/// 单个指纹的恢复结果
#[derive(Serialize, ToSchema)]
struct ResolveResult {
    /// 指纹
    fingerprint: String,
    /// 结果：resolved / not_found / storage_error
    outcome: String,
    /// 归档事件的 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

/// 恢复活动事件：归档到历史表、移出缓存，并推进对应处置流程的当前步骤。
#[utoipa::path(
    post,
    path = "/v1/events/resolve",
    tag = "Events",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "逐指纹恢复结果", body = Vec<ResolveResult>),
        (status = 400, description = "参数错误", body = crate::api::ApiError),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn resolve_events(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Json(body): Json<ResolveRequest>,
) -> impl IntoResponse {
    if body.fingerprints.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "fingerprints cannot be empty",
        );
    }

    let time = body.time.unwrap_or_else(Utc::now);
    let mut results = Vec::with_capacity(body.fingerprints.len());
    for fingerprint in &body.fingerprints {
        let outcome = resolve_one(
            &state,
            &identity.tenant_id,
            &body.fault_center_id,
            fingerprint,
            &identity.user,
            time,
        )
        .await;
        results.push(outcome);
    }

    success_response(StatusCode::OK, &trace_id, results)
}

async fn resolve_one(
    state: &AppState,
    tenant_id: &str,
    fault_center_id: &str,
    fingerprint: &str,
    operator: &str,
    time: DateTime<Utc>,
) -> ResolveResult {
    let Some(archived) = state
        .engine
        .resolve(tenant_id, fault_center_id, fingerprint, time)
    else {
        return ResolveResult {
            fingerprint: fingerprint.to_string(),
            outcome: "not_found".to_string(),
            event_id: None,
        };
    };

    if let Err(e) = state.store.insert_alert_history(&archived).await {
        tracing::error!(
            fingerprint = %fingerprint,
            error = %e,
            "Failed to archive resolved event"
        );
        // The cache entry is gone either way; report the archival failure.
        mirror_remove(state, tenant_id, fault_center_id, fingerprint).await;
        return ResolveResult {
            fingerprint: fingerprint.to_string(),
            outcome: "storage_error".to_string(),
            event_id: Some(archived.id),
        };
    }

    mirror_remove(state, tenant_id, fault_center_id, fingerprint).await;
    crate::api::traces::complete_step_for_event(state, tenant_id, &archived.id, operator, time)
        .await;

    ResolveResult {
        fingerprint: fingerprint.to_string(),
        outcome: "resolved".to_string(),
        event_id: Some(archived.id),
    }
}

// ---- History ----

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct HistoryParams {
    /// 故障中心 ID
    #[param(required = false)]
    #[serde(default)]
    fault_center_id: Option<String>,
    /// 级别过滤
    #[param(required = false)]
    #[serde(rename = "severity__eq", default)]
    severity_eq: Option<String>,
    /// 指纹精确匹配
    #[param(required = false)]
    #[serde(rename = "fingerprint__eq", default)]
    fingerprint_eq: Option<String>,
    /// 首次触发时间下界
    #[param(required = false)]
    #[serde(rename = "first_trigger__gte", default)]
    first_trigger_gte: Option<DateTime<Utc>>,
    /// 首次触发时间上界
    #[param(required = false)]
    #[serde(rename = "first_trigger__lte", default)]
    first_trigger_lte: Option<DateTime<Utc>>,
}

/// 查询已归档的历史事件。
#[utoipa::path(
    get,
    path = "/v1/events/history",
    tag = "Events",
    params(HistoryParams, PaginationParams),
    responses(
        (status = 200, description = "历史事件分页列表", body = Vec<AlertEvent>),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn list_event_history(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let history_filter = AlertHistoryFilter {
        fault_center_id_eq: params.fault_center_id,
        severity_eq: params.severity_eq,
        fingerprint_eq: params.fingerprint_eq,
        first_trigger_gte: params.first_trigger_gte,
        first_trigger_lte: params.first_trigger_lte,
    };

    let total = match state
        .store
        .count_alert_history(&identity.tenant_id, &history_filter)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count alert history");
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
        .list_alert_history(
            &identity.tenant_id,
            &history_filter,
            pagination.limit(),
            pagination.offset(),
        )
        .await
    {
        Ok(rows) => {
            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                let id = row.id.clone();
                match row.into_event() {
                    Ok(event) => items.push(event),
                    Err(e) => {
                        tracing::warn!(
                            event_id = %id,
                            error = %e,
                            "Skipping history row with malformed labels"
                        );
                    }
                }
            }
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
            tracing::error!(error = %e, "Failed to list alert history");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn event_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(push_events))
        .routes(routes!(list_active_events))
        .routes(routes!(claim_events))
        .routes(routes!(resolve_events))
        .routes(routes!(list_event_history))
        .routes(routes!(get_active_event))
}
