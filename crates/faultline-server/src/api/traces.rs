use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response, success_response};
use crate::identity::Identity;
use crate::logging::TraceId;
use crate::lookup::HistoryLookup;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use faultline_event::lookup::{CacheLookup, LookupCascade, LookupOutcome};
use faultline_event::process::{ProcessOperationLog, ProcessStatus, ProcessTrace};
use faultline_storage::{ProcessOperationLogRow, ProcessTraceRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

// ---- Row/domain conversions ----

fn trace_from_row(row: ProcessTraceRow) -> Result<ProcessTrace, String> {
    let status: ProcessStatus = row.status.parse()?;
    let steps = serde_json::from_str(&row.steps_json).map_err(|e| e.to_string())?;
    Ok(ProcessTrace {
        id: row.id,
        tenant_id: row.tenant_id,
        event_id: row.event_id,
        status,
        steps,
        assigned_to: row.assigned_to,
        ai_analysis: row.ai_analysis,
        created_at: row.created_at,
        updated_at: row.updated_at,
        ended_at: row.ended_at,
    })
}

fn trace_to_row(trace: &ProcessTrace) -> Result<ProcessTraceRow, serde_json::Error> {
    Ok(ProcessTraceRow {
        id: trace.id.clone(),
        tenant_id: trace.tenant_id.clone(),
        event_id: trace.event_id.clone(),
        status: trace.status.to_string(),
        steps_json: serde_json::to_string(&trace.steps)?,
        assigned_to: trace.assigned_to.clone(),
        ai_analysis: trace.ai_analysis.clone(),
        created_at: trace.created_at,
        updated_at: trace.updated_at,
        ended_at: trace.ended_at,
    })
}

fn log_to_row(log: &ProcessOperationLog) -> ProcessOperationLogRow {
    ProcessOperationLogRow {
        id: log.id.clone(),
        tenant_id: log.tenant_id.clone(),
        trace_id: log.trace_id.clone(),
        event_id: log.event_id.clone(),
        operator: log.operator.clone(),
        action: log.action.clone(),
        before_snapshot: log.before_snapshot.clone(),
        after_snapshot: log.after_snapshot.clone(),
        description: log.description.clone(),
        created_at: log.created_at,
    }
}

async fn record_operation(state: &AppState, log: &ProcessOperationLog) {
    if let Err(e) = state.store.insert_process_operation_log(&log_to_row(log)).await {
        tracing::warn!(
            trace = %log.trace_id,
            action = %log.action,
            error = %e,
            "Failed to append trace operation log"
        );
    }
}

/// Close the earliest open step of the trace tied to `event_id`, if any.
/// Runs on the resolve path as best-effort bookkeeping: an event without a
/// trace is normal, and no failure here disturbs the resolution itself.
pub(crate) async fn complete_step_for_event(
    state: &AppState,
    tenant_id: &str,
    event_id: &str,
    operator: &str,
    now: DateTime<Utc>,
) {
    let row = match state.store.get_process_trace_by_event(tenant_id, event_id).await {
        Ok(Some(row)) => row,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(event_id = %event_id, error = %e, "Failed to load trace for step completion");
            return;
        }
    };
    let mut trace = match trace_from_row(row) {
        Ok(trace) => trace,
        Err(e) => {
            tracing::warn!(event_id = %event_id, error = %e, "Malformed trace record, skipping step completion");
            return;
        }
    };

    let before = trace.clone();
    if !trace.complete_current_step(now) {
        return;
    }

    let row = match trace_to_row(&trace) {
        Ok(row) => row,
        Err(e) => {
            tracing::warn!(event_id = %event_id, error = %e, "Failed to serialize trace steps");
            return;
        }
    };
    match state.store.update_process_trace(&row).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(event_id = %event_id, "Trace disappeared during step completion");
            return;
        }
        Err(e) => {
            tracing::warn!(event_id = %event_id, error = %e, "Failed to persist step completion");
            return;
        }
    }

    let log = ProcessOperationLog::record(
        Some(&before),
        &trace,
        operator,
        "complete_step",
        "事件恢复，自动完成当前处置步骤".to_string(),
    );
    record_operation(state, &log).await;
}

// ---- Handlers ----

/// 创建处置追踪请求。`event_id` 与 `fingerprint` 二选一；按指纹创建时
/// 必须带 `fault_center_id` 以便解析。
#[derive(Deserialize, ToSchema)]
struct CreateTraceRequest {
    /// 事件 ID（已知时直接使用）
    #[serde(default)]
    event_id: Option<String>,
    /// 事件指纹（服务端解析为事件 ID：先活跃缓存，后历史归档）
    #[serde(default)]
    fingerprint: Option<String>,
    /// 故障中心 ID（按指纹解析时必填）
    #[serde(default)]
    fault_center_id: Option<String>,
    /// 负责人
    #[serde(default)]
    assigned_to: Option<String>,
}

/// 创建处置追踪。同一事件重复创建是幂等的：已存在时返回现有追踪。
#[utoipa::path(
    post,
    path = "/v1/traces",
    tag = "Traces",
    request_body = CreateTraceRequest,
    responses(
        (status = 201, description = "处置追踪已创建", body = ProcessTrace),
        (status = 200, description = "该事件已有追踪，返回现有记录", body = ProcessTrace),
        (status = 400, description = "请求非法", body = crate::api::ApiError),
        (status = 404, description = "指纹无法解析为事件", body = crate::api::ApiError)
    )
)]
async fn create_trace(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Json(body): Json<CreateTraceRequest>,
) -> impl IntoResponse {
    let event_id = if let Some(id) = body.event_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    {
        id.to_string()
    } else if let Some(fingerprint) = body
        .fingerprint
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let Some(fault_center_id) = body
            .fault_center_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                "fault_center_id is required when resolving by fingerprint",
            );
        };

        let mut cascade = LookupCascade::new();
        cascade.push(Box::new(CacheLookup::new(state.cache().clone())));
        cascade.push(Box::new(HistoryLookup::new(state.store.clone())));
        match cascade
            .resolve(&identity.tenant_id, fault_center_id, fingerprint)
            .await
        {
            LookupOutcome::Found { event_id, strategy } => {
                tracing::debug!(
                    fingerprint = %fingerprint,
                    strategy = strategy,
                    "Fingerprint resolved to event"
                );
                event_id
            }
            LookupOutcome::NotFound => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    &trace_id,
                    "not_found",
                    "no event found for fingerprint",
                );
            }
        }
    } else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "either event_id or fingerprint is required",
        );
    };

    // Idempotent create: the event's lineage has at most one trace.
    match state
        .store
        .get_process_trace_by_event(&identity.tenant_id, &event_id)
        .await
    {
        Ok(Some(row)) => {
            return match trace_from_row(row) {
                Ok(existing) => success_response(StatusCode::OK, &trace_id, existing),
                Err(e) => {
                    tracing::error!(event_id = %event_id, error = %e, "Malformed trace record");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &trace_id,
                        "internal_error",
                        "Malformed trace record",
                    )
                }
            };
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to look up process trace");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    }

    let now = Utc::now();
    let trace = ProcessTrace::new(&identity.tenant_id, &event_id, body.assigned_to, now);
    let row = match trace_to_row(&trace) {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize trace steps");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Failed to serialize trace",
            );
        }
    };

    if let Err(e) = state.store.insert_process_trace(&row).await {
        // Two concurrent creates race on the same event id; the loser's
        // insert fails on the unique index. Re-read before giving up.
        if let Ok(Some(row)) = state
            .store
            .get_process_trace_by_event(&identity.tenant_id, &event_id)
            .await
        {
            if let Ok(existing) = trace_from_row(row) {
                return success_response(StatusCode::OK, &trace_id, existing);
            }
        }
        tracing::error!(error = %e, "Failed to persist process trace");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "storage_error",
            "Database error",
        );
    }

    let log = ProcessOperationLog::record(
        None,
        &trace,
        &identity.user,
        "create",
        "创建处置追踪".to_string(),
    );
    record_operation(&state, &log).await;

    tracing::info!(
        trace = %trace.id,
        event_id = %event_id,
        tenant_id = %identity.tenant_id,
        "Process trace created"
    );
    success_response(StatusCode::CREATED, &trace_id, trace)
}

/// 按事件 ID 获取处置追踪。
#[utoipa::path(
    get,
    path = "/v1/traces/{event_id}",
    tag = "Traces",
    params(("event_id" = String, Path, description = "事件 ID")),
    responses(
        (status = 200, description = "处置追踪", body = ProcessTrace),
        (status = 404, description = "该事件没有追踪", body = crate::api::ApiError)
    )
)]
async fn get_trace(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> impl IntoResponse {
    match state
        .store
        .get_process_trace_by_event(&identity.tenant_id, &event_id)
        .await
    {
        Ok(Some(row)) => match trace_from_row(row) {
            Ok(trace) => success_response(StatusCode::OK, &trace_id, trace),
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "Malformed trace record");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "internal_error",
                    "Malformed trace record",
                )
            }
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Trace not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get process trace");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 状态推进请求
#[derive(Deserialize, ToSchema)]
struct UpdateTraceStatusRequest {
    /// 目标状态（detected / analyzing / correlated / processing / validated / completed）
    status: String,
    /// 操作人（缺省取请求身份）
    #[serde(default)]
    operator: Option<String>,
}

/// 推进处置状态。非法迁移被拒绝，不改变任何数据。
#[utoipa::path(
    put,
    path = "/v1/traces/{event_id}/status",
    tag = "Traces",
    params(("event_id" = String, Path, description = "事件 ID")),
    request_body = UpdateTraceStatusRequest,
    responses(
        (status = 200, description = "推进后的处置追踪", body = ProcessTrace),
        (status = 400, description = "未知状态名", body = crate::api::ApiError),
        (status = 404, description = "该事件没有追踪", body = crate::api::ApiError),
        (status = 409, description = "状态迁移不在允许列表内", body = crate::api::ApiError)
    )
)]
async fn update_trace_status(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<UpdateTraceStatusRequest>,
) -> impl IntoResponse {
    let to: ProcessStatus = match body.status.parse() {
        Ok(status) => status,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e);
        }
    };
    let operator = body
        .operator
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(&identity.user)
        .to_string();

    let row = match state
        .store
        .get_process_trace_by_event(&identity.tenant_id, &event_id)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Trace not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get process trace");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };
    let mut trace = match trace_from_row(row) {
        Ok(trace) => trace,
        Err(e) => {
            tracing::error!(event_id = %event_id, error = %e, "Malformed trace record");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Malformed trace record",
            );
        }
    };

    let before = trace.clone();
    let now = Utc::now();
    if let Err(e) = trace.transition(to, &operator, now) {
        return error_response(
            StatusCode::CONFLICT,
            &trace_id,
            "invalid_transition",
            &e.to_string(),
        );
    }

    match persist_trace(&state, &trace_id, &trace).await {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Trace not found",
            );
        }
        Err(response) => return response,
    }

    let log = ProcessOperationLog::record(
        Some(&before),
        &trace,
        &operator,
        "update_status",
        format!("状态推进：{} → {}", before.status, trace.status),
    );
    record_operation(&state, &log).await;

    tracing::info!(
        trace = %trace.id,
        event_id = %event_id,
        from = %before.status,
        to = %trace.status,
        operator = %operator,
        "Process trace status advanced"
    );
    success_response(StatusCode::OK, &trace_id, trace)
}

/// 写入分析结论请求
#[derive(Deserialize, ToSchema)]
struct UpdateAnalysisRequest {
    /// 分析结论文本
    analysis: String,
}

/// 写入 AI 分析结论。重复写入覆盖旧值，每次都会留下操作日志。
#[utoipa::path(
    put,
    path = "/v1/traces/{event_id}/analysis",
    tag = "Traces",
    params(("event_id" = String, Path, description = "事件 ID")),
    request_body = UpdateAnalysisRequest,
    responses(
        (status = 200, description = "更新后的处置追踪", body = ProcessTrace),
        (status = 400, description = "结论为空", body = crate::api::ApiError),
        (status = 404, description = "该事件没有追踪", body = crate::api::ApiError)
    )
)]
async fn update_trace_analysis(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<UpdateAnalysisRequest>,
) -> impl IntoResponse {
    if body.analysis.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "analysis cannot be empty",
        );
    }

    let row = match state
        .store
        .get_process_trace_by_event(&identity.tenant_id, &event_id)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Trace not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get process trace");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };
    let mut trace = match trace_from_row(row) {
        Ok(trace) => trace,
        Err(e) => {
            tracing::error!(event_id = %event_id, error = %e, "Malformed trace record");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Malformed trace record",
            );
        }
    };

    let before = trace.clone();
    trace.attach_analysis(body.analysis, Utc::now());

    match persist_trace(&state, &trace_id, &trace).await {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Trace not found",
            );
        }
        Err(response) => return response,
    }

    let log = ProcessOperationLog::record(
        Some(&before),
        &trace,
        &identity.user,
        "update_analysis",
        "更新分析结论".to_string(),
    );
    record_operation(&state, &log).await;

    success_response(StatusCode::OK, &trace_id, trace)
}

/// Shared persist step for the two mutation handlers. `Err` carries a
/// ready-made error response.
async fn persist_trace(
    state: &AppState,
    http_trace: &str,
    trace: &ProcessTrace,
) -> Result<bool, axum::response::Response> {
    let row = trace_to_row(trace).map_err(|e| {
        tracing::error!(trace = %trace.id, error = %e, "Failed to serialize trace steps");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            http_trace,
            "internal_error",
            "Failed to serialize trace",
        )
    })?;
    state.store.update_process_trace(&row).await.map_err(|e| {
        tracing::error!(trace = %trace.id, error = %e, "Failed to persist process trace");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            http_trace,
            "storage_error",
            "Database error",
        )
    })
}

/// 单条处置操作日志
#[derive(Serialize, ToSchema)]
struct OperationLogResponse {
    id: String,
    trace_id: String,
    event_id: String,
    operator: String,
    /// create / update_status / update_analysis / complete_step
    action: String,
    /// 操作前追踪快照（JSON 字符串）
    before_snapshot: Option<String>,
    /// 操作后追踪快照（JSON 字符串）
    after_snapshot: Option<String>,
    description: String,
    created_at: DateTime<Utc>,
}

/// 列出某条追踪的操作日志（旧→新）。
#[utoipa::path(
    get,
    path = "/v1/traces/{event_id}/logs",
    tag = "Traces",
    params(
        ("event_id" = String, Path, description = "事件 ID"),
        PaginationParams
    ),
    responses(
        (status = 200, description = "操作日志分页列表", body = Vec<OperationLogResponse>),
        (status = 404, description = "该事件没有追踪", body = crate::api::ApiError)
    )
)]
async fn list_trace_logs(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let row = match state
        .store
        .get_process_trace_by_event(&identity.tenant_id, &event_id)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Trace not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get process trace");
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
        .count_process_operation_logs(&identity.tenant_id, &row.id)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count trace operation logs");
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
        .list_process_operation_logs(
            &identity.tenant_id,
            &row.id,
            pagination.limit(),
            pagination.offset(),
        )
        .await
    {
        Ok(rows) => {
            let items: Vec<OperationLogResponse> = rows
                .into_iter()
                .map(|log| OperationLogResponse {
                    id: log.id,
                    trace_id: log.trace_id,
                    event_id: log.event_id,
                    operator: log.operator,
                    action: log.action,
                    before_snapshot: log.before_snapshot,
                    after_snapshot: log.after_snapshot,
                    description: log.description,
                    created_at: log.created_at,
                })
                .collect();
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
            tracing::error!(error = %e, "Failed to list trace operation logs");
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
struct TraceStatsParams {
    /// 创建时间下界
    #[param(required = false)]
    #[serde(rename = "created__gte", default)]
    created_gte: Option<DateTime<Utc>>,
    /// 创建时间上界
    #[param(required = false)]
    #[serde(rename = "created__lte", default)]
    created_lte: Option<DateTime<Utc>>,
}

/// 处置流程聚合统计
#[derive(Serialize, ToSchema)]
struct TraceStatsResponse {
    /// 窗口内追踪总数
    total: u64,
    /// 已完成数
    completed: u64,
    /// 完成率（0.0 ~ 1.0）
    completion_rate: f64,
    /// 已完成流程的平均时长（秒）
    avg_duration_secs: f64,
    /// 状态直方图
    by_status: HashMap<String, u64>,
}

/// 统计窗口内的处置流程：总量、完成率、平均时长、状态分布。
#[utoipa::path(
    get,
    path = "/v1/traces/stats",
    tag = "Traces",
    params(TraceStatsParams),
    responses(
        (status = 200, description = "聚合统计", body = TraceStatsResponse),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn trace_stats(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Query(params): Query<TraceStatsParams>,
) -> impl IntoResponse {
    match state
        .store
        .process_trace_stats(&identity.tenant_id, params.created_gte, params.created_lte)
        .await
    {
        Ok(stats) => success_response(
            StatusCode::OK,
            &trace_id,
            TraceStatsResponse {
                total: stats.total,
                completed: stats.completed,
                completion_rate: stats.completion_rate,
                avg_duration_secs: stats.avg_duration_secs,
                by_status: stats.by_status,
            },
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to aggregate trace stats");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn trace_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(create_trace))
        .routes(routes!(trace_stats))
        .routes(routes!(get_trace))
        .routes(routes!(update_trace_status))
        .routes(routes!(update_trace_analysis))
        .routes(routes!(list_trace_logs))
}
