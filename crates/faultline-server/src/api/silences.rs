use crate::api::pagination::PaginationParams;
use crate::api::{
    error_response, success_empty_response, success_paginated_response, success_response,
};
use crate::identity::Identity;
use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use faultline_common::id;
use faultline_event::cache::ClaimOutcome;
use faultline_event::silence::{CompiledSilence, Silence, SilencePredicate, SilenceStatus};
use faultline_storage::{SilenceFilter, SilenceRow, SilenceUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Rebuild the domain silence from a stored row. Fails only on a malformed
/// predicates column.
pub(crate) fn silence_from_row(row: SilenceRow) -> Result<Silence, serde_json::Error> {
    let predicates: Vec<SilencePredicate> = serde_json::from_str(&row.predicates_json)?;
    Ok(Silence {
        id: row.id,
        tenant_id: row.tenant_id,
        fault_center_id: row.fault_center_id,
        name: row.name,
        comment: row.comment,
        predicates,
        starts_at: row.starts_at,
        ends_at: row.ends_at,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// 静默规则（带计算状态）
#[derive(Serialize, ToSchema)]
struct SilenceResponse {
    #[serde(flatten)]
    silence: Silence,
    /// 计算状态：pending / active / expired
    status: SilenceStatus,
}

impl SilenceResponse {
    fn new(silence: Silence, now: DateTime<Utc>) -> Self {
        let status = silence.status(now);
        Self { silence, status }
    }
}

/// 创建静默请求
#[derive(Deserialize, ToSchema)]
struct CreateSilenceRequest {
    /// 故障中心 ID
    fault_center_id: String,
    /// 名称
    name: String,
    /// 备注
    #[serde(default)]
    comment: String,
    /// 谓词列表（AND 语义，至少一条）
    predicates: Vec<SilencePredicate>,
    /// 生效时间（缺省为当前时间）
    #[serde(default)]
    starts_at: Option<DateTime<Utc>>,
    /// 失效时间
    ends_at: DateTime<Utc>,
}

/// 创建静默规则。
///
/// 所有谓词正则在本次调用内全部编译；任何一条非法即整体失败，不落库。
/// 带 `fingerprint` 谓词的静默会自动认领匹配的活动事件。
#[utoipa::path(
    post,
    path = "/v1/silences",
    tag = "Silences",
    request_body = CreateSilenceRequest,
    responses(
        (status = 201, description = "静默已创建", body = SilenceResponse),
        (status = 400, description = "参数或正则非法", body = crate::api::ApiError),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn create_silence(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Json(body): Json<CreateSilenceRequest>,
) -> impl IntoResponse {
    if body.name.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "silence name cannot be empty",
        );
    }
    if body.fault_center_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "fault_center_id is required",
        );
    }

    let now = Utc::now();
    let silence = Silence {
        id: id::next_id(),
        tenant_id: identity.tenant_id.clone(),
        fault_center_id: body.fault_center_id,
        name: body.name,
        comment: body.comment,
        predicates: body.predicates,
        starts_at: body.starts_at.unwrap_or(now),
        ends_at: body.ends_at,
        created_by: identity.user.clone(),
        created_at: now,
        updated_at: now,
    };

    // Every predicate compiles or nothing persists.
    let mut compiled = match CompiledSilence::compile(silence) {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "invalid_silence",
                &e.to_string(),
            );
        }
    };

    let predicates_json = match serde_json::to_string(&compiled.spec.predicates) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize silence predicates");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Failed to serialize predicates",
            );
        }
    };

    let row = SilenceRow {
        id: compiled.spec.id.clone(),
        tenant_id: compiled.spec.tenant_id.clone(),
        fault_center_id: compiled.spec.fault_center_id.clone(),
        name: compiled.spec.name.clone(),
        comment: compiled.spec.comment.clone(),
        predicates_json,
        starts_at: compiled.spec.starts_at,
        ends_at: compiled.spec.ends_at,
        created_by: compiled.spec.created_by.clone(),
        created_at: compiled.spec.created_at,
        updated_at: compiled.spec.updated_at,
    };

    let stored = match state.store.insert_silence(&row).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!(error = %e, "Failed to persist silence");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    // Storage assigns the authoritative timestamps.
    compiled.spec.created_at = stored.created_at;
    compiled.spec.updated_at = stored.updated_at;
    let compiled = Arc::new(compiled);
    state.silences().insert(compiled.clone());

    // A fingerprint-targeted silence acknowledges what it suppresses.
    if compiled.spec.fingerprint_pattern().is_some() {
        auto_claim_matching(&state, &compiled, &identity.user, now).await;
    }

    tracing::info!(
        silence_id = %compiled.spec.id,
        tenant_id = %compiled.spec.tenant_id,
        "Silence created"
    );
    success_response(
        StatusCode::CREATED,
        &trace_id,
        SilenceResponse::new(compiled.spec.clone(), now),
    )
}

/// Claim every active event the silence matches, on behalf of its creator.
async fn auto_claim_matching(
    state: &AppState,
    compiled: &CompiledSilence,
    claimant: &str,
    now: DateTime<Utc>,
) {
    let events = state
        .cache()
        .get_all(&compiled.spec.tenant_id, &compiled.spec.fault_center_id);
    for event in events {
        if !compiled.matches(&event) {
            continue;
        }
        if let ClaimOutcome::Claimed(claimed) = state.cache().claim(
            &event.tenant_id,
            &event.fault_center_id,
            &event.fingerprint,
            claimant,
            now,
        ) {
            crate::api::events::mirror_upsert(state, &claimed).await;
            tracing::info!(
                silence_id = %compiled.spec.id,
                fingerprint = %claimed.fingerprint,
                "Active event auto-claimed by silence"
            );
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct SilenceListParams {
    /// 故障中心 ID
    #[param(required = false)]
    #[serde(default)]
    fault_center_id: Option<String>,
    /// 名称模糊匹配
    #[param(required = false)]
    #[serde(rename = "name__contains", default)]
    name_contains: Option<String>,
    /// 创建人精确匹配
    #[param(required = false)]
    #[serde(rename = "created_by__eq", default)]
    created_by_eq: Option<String>,
}

/// 列出静默规则。
#[utoipa::path(
    get,
    path = "/v1/silences",
    tag = "Silences",
    params(SilenceListParams, PaginationParams),
    responses(
        (status = 200, description = "静默规则分页列表", body = Vec<SilenceResponse>),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn list_silences(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Query(params): Query<SilenceListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let silence_filter = SilenceFilter {
        fault_center_id_eq: params.fault_center_id,
        name_contains: params.name_contains,
        created_by_eq: params.created_by_eq,
    };

    let total = match state
        .store
        .count_silences(&identity.tenant_id, &silence_filter)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count silences");
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
        .list_silences(
            &identity.tenant_id,
            &silence_filter,
            pagination.limit(),
            pagination.offset(),
        )
        .await
    {
        Ok(rows) => {
            let now = Utc::now();
            let mut items = Vec::with_capacity(rows.len());
            for row in rows {
                let id = row.id.clone();
                match silence_from_row(row) {
                    Ok(silence) => items.push(SilenceResponse::new(silence, now)),
                    Err(e) => {
                        tracing::warn!(
                            silence_id = %id,
                            error = %e,
                            "Skipping silence with malformed predicates column"
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
            tracing::error!(error = %e, "Failed to list silences");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 按 ID 获取静默规则。
#[utoipa::path(
    get,
    path = "/v1/silences/{id}",
    tag = "Silences",
    params(("id" = String, Path, description = "静默 ID")),
    responses(
        (status = 200, description = "静默规则", body = SilenceResponse),
        (status = 404, description = "静默不存在", body = crate::api::ApiError)
    )
)]
async fn get_silence(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_silence_by_id(&identity.tenant_id, &id).await {
        Ok(Some(row)) => match silence_from_row(row) {
            Ok(silence) => {
                success_response(StatusCode::OK, &trace_id, SilenceResponse::new(silence, Utc::now()))
            }
            Err(e) => {
                tracing::error!(silence_id = %id, error = %e, "Malformed predicates column");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "internal_error",
                    "Malformed silence record",
                )
            }
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Silence not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get silence");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 更新静默请求（未提供的字段保持不变）
#[derive(Deserialize, ToSchema)]
struct UpdateSilenceRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    predicates: Option<Vec<SilencePredicate>>,
    #[serde(default)]
    starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ends_at: Option<DateTime<Utc>>,
}

/// 更新静默规则。新的谓词正则同样全量预编译，失败则整体拒绝。
#[utoipa::path(
    put,
    path = "/v1/silences/{id}",
    tag = "Silences",
    params(("id" = String, Path, description = "静默 ID")),
    request_body = UpdateSilenceRequest,
    responses(
        (status = 200, description = "更新后的静默", body = SilenceResponse),
        (status = 400, description = "参数或正则非法", body = crate::api::ApiError),
        (status = 404, description = "静默不存在", body = crate::api::ApiError)
    )
)]
async fn update_silence(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateSilenceRequest>,
) -> impl IntoResponse {
    let existing = match state.store.get_silence_by_id(&identity.tenant_id, &id).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Silence not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get silence");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    let mut merged = match silence_from_row(existing) {
        Ok(silence) => silence,
        Err(e) => {
            tracing::error!(silence_id = %id, error = %e, "Malformed predicates column");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Malformed silence record",
            );
        }
    };
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                "silence name cannot be empty",
            );
        }
        merged.name = name.clone();
    }
    if let Some(comment) = &body.comment {
        merged.comment = comment.clone();
    }
    if let Some(predicates) = &body.predicates {
        merged.predicates = predicates.clone();
    }
    if let Some(starts_at) = body.starts_at {
        merged.starts_at = starts_at;
    }
    if let Some(ends_at) = body.ends_at {
        merged.ends_at = ends_at;
    }

    let mut compiled = match CompiledSilence::compile(merged) {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "invalid_silence",
                &e.to_string(),
            );
        }
    };

    let predicates_json = match body
        .predicates
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
    {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize silence predicates");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Failed to serialize predicates",
            );
        }
    };

    let update = SilenceUpdate {
        name: body.name,
        comment: body.comment,
        predicates_json,
        starts_at: body.starts_at,
        ends_at: body.ends_at,
    };

    match state
        .store
        .update_silence(&identity.tenant_id, &id, &update)
        .await
    {
        Ok(Some(row)) => {
            compiled.spec.created_at = row.created_at;
            compiled.spec.updated_at = row.updated_at;
            let compiled = Arc::new(compiled);
            state.silences().remove(&id);
            state.silences().insert(compiled.clone());
            tracing::info!(silence_id = %id, "Silence updated");
            success_response(
                StatusCode::OK,
                &trace_id,
                SilenceResponse::new(compiled.spec.clone(), Utc::now()),
            )
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Silence not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update silence");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 删除静默规则：持久层与内存集合一并移除。
#[utoipa::path(
    delete,
    path = "/v1/silences/{id}",
    tag = "Silences",
    params(("id" = String, Path, description = "静默 ID")),
    responses(
        (status = 200, description = "静默已删除"),
        (status = 404, description = "静默不存在", body = crate::api::ApiError)
    )
)]
async fn delete_silence(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_silence(&identity.tenant_id, &id).await {
        Ok(true) => {
            state.silences().remove(&id);
            tracing::info!(silence_id = %id, "Silence deleted");
            success_empty_response(StatusCode::OK, &trace_id, "Silence deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Silence not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete silence");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

pub fn silence_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(create_silence, list_silences))
        .routes(routes!(get_silence, update_silence, delete_silence))
}
