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
use chrono::Utc;
use faultline_common::id;
use faultline_notify::error::NotifyError;
use faultline_notify::routing::{validate_target, NotificationTarget, Route};
use faultline_storage::{NotificationTargetFilter, NotificationTargetRow, NotificationTargetUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Rebuild the domain target from a stored row. Fails when either JSON
/// column (recipients, routes) is malformed.
pub(crate) fn row_to_target(row: NotificationTargetRow) -> Result<NotificationTarget, serde_json::Error> {
    let default_recipients: Vec<String> = serde_json::from_str(&row.default_recipients_json)?;
    let routes: Vec<Route> = serde_json::from_str(&row.routes_json)?;
    Ok(NotificationTarget {
        id: row.id,
        tenant_id: row.tenant_id,
        fault_center_id: row.fault_center_id,
        name: row.name,
        channel_type: row.channel_type,
        default_hook: row.default_hook,
        default_sign: row.default_sign,
        default_recipients,
        routes,
        duty_roster_id: row.duty_roster_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub(crate) fn target_to_row(
    target: &NotificationTarget,
) -> Result<NotificationTargetRow, serde_json::Error> {
    Ok(NotificationTargetRow {
        id: target.id.clone(),
        tenant_id: target.tenant_id.clone(),
        fault_center_id: target.fault_center_id.clone(),
        name: target.name.clone(),
        channel_type: target.channel_type.clone(),
        default_hook: target.default_hook.clone(),
        default_sign: target.default_sign.clone(),
        default_recipients_json: serde_json::to_string(&target.default_recipients)?,
        routes_json: serde_json::to_string(&target.routes)?,
        duty_roster_id: target.duty_roster_id.clone(),
        created_at: target.created_at,
        updated_at: target.updated_at,
    })
}

/// 创建通知目标请求
#[derive(Deserialize, ToSchema)]
struct CreateTargetRequest {
    /// 故障中心 ID
    fault_center_id: String,
    /// 名称
    name: String,
    /// 渠道类型：webhook / email / sms / dingtalk
    channel_type: String,
    /// 默认 hook 地址
    #[serde(default)]
    default_hook: String,
    /// 默认签名密钥
    #[serde(default)]
    default_sign: Option<String>,
    /// 默认接收人列表
    #[serde(default)]
    default_recipients: Vec<String>,
    /// 按级别路由表
    #[serde(default)]
    routes: Vec<Route>,
    /// 值班表引用
    #[serde(default)]
    duty_roster_id: Option<String>,
}

/// 创建通知目标。受租户配额约束（`max_targets_per_tenant`）。
#[utoipa::path(
    post,
    path = "/v1/targets",
    tag = "Targets",
    request_body = CreateTargetRequest,
    responses(
        (status = 201, description = "通知目标已创建", body = NotificationTarget),
        (status = 400, description = "目标配置非法", body = crate::api::ApiError),
        (status = 403, description = "超出租户配额", body = crate::api::ApiError),
        (status = 409, description = "目标名称已存在", body = crate::api::ApiError),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn create_target(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Json(body): Json<CreateTargetRequest>,
) -> impl IntoResponse {
    if body.fault_center_id.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "fault_center_id is required",
        );
    }

    // Quota check counts every target the tenant owns, across fault centers.
    let quota = state.config.limits.max_targets_per_tenant;
    let current = match state
        .store
        .count_notification_targets(&identity.tenant_id, &NotificationTargetFilter::default())
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count notification targets");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };
    if current >= quota {
        return error_response(
            StatusCode::FORBIDDEN,
            &trace_id,
            "quota_exceeded",
            &format!("tenant already has {current} of {quota} allowed notification targets"),
        );
    }

    if !state.dispatcher.registry().has_plugin(&body.channel_type) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_target",
            &format!("unknown channel type: {}", body.channel_type),
        );
    }

    let now = Utc::now();
    let target = NotificationTarget {
        id: id::next_id(),
        tenant_id: identity.tenant_id.clone(),
        fault_center_id: body.fault_center_id,
        name: body.name,
        channel_type: body.channel_type,
        default_hook: body.default_hook,
        default_sign: body.default_sign,
        default_recipients: body.default_recipients,
        routes: body.routes,
        duty_roster_id: body.duty_roster_id,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = validate_target(&target) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_target",
            &e.to_string(),
        );
    }

    let row = match target_to_row(&target) {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize target columns");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Failed to serialize target",
            );
        }
    };

    match state.store.insert_notification_target(&row).await {
        Ok(stored) => match row_to_target(stored) {
            Ok(created) => {
                tracing::info!(
                    target_id = %created.id,
                    tenant_id = %created.tenant_id,
                    channel_type = %created.channel_type,
                    "Notification target created"
                );
                success_response(StatusCode::CREATED, &trace_id, created)
            }
            Err(e) => {
                tracing::error!(error = %e, "Stored target failed to parse back");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "internal_error",
                    "Malformed target record",
                )
            }
        },
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("UNIQUE constraint") {
                error_response(
                    StatusCode::CONFLICT,
                    &trace_id,
                    "conflict",
                    "Target name already exists",
                )
            } else {
                tracing::error!(error = %e, "Failed to persist notification target");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "storage_error",
                    "Database error",
                )
            }
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct TargetListParams {
    /// 故障中心 ID
    #[param(required = false)]
    #[serde(default)]
    fault_center_id: Option<String>,
    /// 渠道类型精确匹配
    #[param(required = false)]
    #[serde(rename = "channel_type__eq", default)]
    channel_type_eq: Option<String>,
    /// 名称模糊匹配
    #[param(required = false)]
    #[serde(rename = "name__contains", default)]
    name_contains: Option<String>,
}

/// 列出通知目标。
#[utoipa::path(
    get,
    path = "/v1/targets",
    tag = "Targets",
    params(TargetListParams, PaginationParams),
    responses(
        (status = 200, description = "通知目标分页列表", body = Vec<NotificationTarget>),
        (status = 401, description = "缺少租户身份", body = crate::api::ApiError)
    )
)]
async fn list_targets(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Query(params): Query<TargetListParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let target_filter = NotificationTargetFilter {
        fault_center_id_eq: params.fault_center_id,
        channel_type_eq: params.channel_type_eq,
        name_contains: params.name_contains,
    };

    let total = match state
        .store
        .count_notification_targets(&identity.tenant_id, &target_filter)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count notification targets");
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
        .list_notification_targets(
            &identity.tenant_id,
            &target_filter,
            pagination.limit(),
            pagination.offset(),
        )
        .await
    {
        Ok(rows) => {
            let items = crate::api::events::rows_to_targets(rows);
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
            tracing::error!(error = %e, "Failed to list notification targets");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 按 ID 获取通知目标。
#[utoipa::path(
    get,
    path = "/v1/targets/{id}",
    tag = "Targets",
    params(("id" = String, Path, description = "目标 ID")),
    responses(
        (status = 200, description = "通知目标", body = NotificationTarget),
        (status = 404, description = "目标不存在", body = crate::api::ApiError)
    )
)]
async fn get_target(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state
        .store
        .get_notification_target_by_id(&identity.tenant_id, &id)
        .await
    {
        Ok(Some(row)) => match row_to_target(row) {
            Ok(target) => success_response(StatusCode::OK, &trace_id, target),
            Err(e) => {
                tracing::error!(target_id = %id, error = %e, "Malformed target JSON columns");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "internal_error",
                    "Malformed target record",
                )
            }
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Target not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get notification target");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 更新通知目标请求（未提供的字段保持不变，渠道类型不可变更）
#[derive(Deserialize, ToSchema)]
struct UpdateTargetRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    default_hook: Option<String>,
    #[serde(default)]
    default_sign: Option<String>,
    #[serde(default)]
    default_recipients: Option<Vec<String>>,
    #[serde(default)]
    routes: Option<Vec<Route>>,
    #[serde(default)]
    duty_roster_id: Option<String>,
}

/// 更新通知目标。
#[utoipa::path(
    put,
    path = "/v1/targets/{id}",
    tag = "Targets",
    params(("id" = String, Path, description = "目标 ID")),
    request_body = UpdateTargetRequest,
    responses(
        (status = 200, description = "更新后的通知目标", body = NotificationTarget),
        (status = 400, description = "目标配置非法", body = crate::api::ApiError),
        (status = 404, description = "目标不存在", body = crate::api::ApiError)
    )
)]
async fn update_target(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTargetRequest>,
) -> impl IntoResponse {
    let existing = match state
        .store
        .get_notification_target_by_id(&identity.tenant_id, &id)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Target not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get notification target");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    let mut merged = match row_to_target(existing) {
        Ok(target) => target,
        Err(e) => {
            tracing::error!(target_id = %id, error = %e, "Malformed target JSON columns");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Malformed target record",
            );
        }
    };
    if let Some(name) = &body.name {
        merged.name = name.clone();
    }
    if let Some(hook) = &body.default_hook {
        merged.default_hook = hook.clone();
    }
    if let Some(sign) = &body.default_sign {
        merged.default_sign = Some(sign.clone());
    }
    if let Some(recipients) = &body.default_recipients {
        merged.default_recipients = recipients.clone();
    }
    if let Some(routes) = &body.routes {
        merged.routes = routes.clone();
    }
    if let Some(roster) = &body.duty_roster_id {
        merged.duty_roster_id = Some(roster.clone());
    }

    if let Err(e) = validate_target(&merged) {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_target",
            &e.to_string(),
        );
    }

    let (default_recipients_json, routes_json) = {
        let recipients = body
            .default_recipients
            .as_ref()
            .map(serde_json::to_string)
            .transpose();
        let routes = body.routes.as_ref().map(serde_json::to_string).transpose();
        match (recipients, routes) {
            (Ok(r), Ok(t)) => (r, t),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to serialize target columns");
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "internal_error",
                    "Failed to serialize target",
                );
            }
        }
    };

    let update = NotificationTargetUpdate {
        name: body.name,
        default_hook: body.default_hook,
        default_sign: body.default_sign,
        default_recipients_json,
        routes_json,
        duty_roster_id: body.duty_roster_id,
    };

    match state
        .store
        .update_notification_target(&identity.tenant_id, &id, &update)
        .await
    {
        Ok(Some(row)) => match row_to_target(row) {
            Ok(target) => {
                tracing::info!(target_id = %id, "Notification target updated");
                success_response(StatusCode::OK, &trace_id, target)
            }
            Err(e) => {
                tracing::error!(target_id = %id, error = %e, "Stored target failed to parse back");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "internal_error",
                    "Malformed target record",
                )
            }
        },
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Target not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update notification target");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 删除通知目标。
#[utoipa::path(
    delete,
    path = "/v1/targets/{id}",
    tag = "Targets",
    params(("id" = String, Path, description = "目标 ID")),
    responses(
        (status = 200, description = "目标已删除"),
        (status = 404, description = "目标不存在", body = crate::api::ApiError)
    )
)]
async fn delete_target(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state
        .store
        .delete_notification_target(&identity.tenant_id, &id)
        .await
    {
        Ok(true) => {
            tracing::info!(target_id = %id, "Notification target deleted");
            success_empty_response(StatusCode::OK, &trace_id, "Target deleted")
        }
        Ok(false) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            "Target not found",
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to delete notification target");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            )
        }
    }
}

/// 测试发送中的单条失败
#[derive(Serialize, ToSchema)]
struct DispatchFailureResponse {
    /// 渠道类型
    channel_type: String,
    /// 失败的路由（级别名或 default）
    route: String,
    /// 接收标识（已脱敏）
    recipient: String,
    /// 错误信息
    error: String,
}

/// 测试发送结果
#[derive(Serialize, ToSchema)]
struct TestReportResponse {
    /// 尝试的投递次数
    attempted: usize,
    /// 成功送达的接收人数
    delivered: usize,
    /// 是否全部成功
    success: bool,
    /// 逐路由失败明细
    failures: Vec<DispatchFailureResponse>,
}

/// 向目标的每个可投递配置发送一条合成测试事件，不落库。
///
/// 部分路由失败不会中断其余路由；所有结果汇总在响应里。
#[utoipa::path(
    post,
    path = "/v1/targets/{id}/test",
    tag = "Targets",
    params(("id" = String, Path, description = "目标 ID")),
    responses(
        (status = 200, description = "测试发送汇总", body = TestReportResponse),
        (status = 400, description = "目标无可投递配置", body = crate::api::ApiError),
        (status = 404, description = "目标不存在", body = crate::api::ApiError),
        (status = 500, description = "渠道插件不可用", body = crate::api::ApiError)
    )
)]
async fn test_target_send(
    Extension(trace_id): Extension<TraceId>,
    Extension(identity): Extension<Identity>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let row = match state
        .store
        .get_notification_target_by_id(&identity.tenant_id, &id)
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                &trace_id,
                "not_found",
                "Target not found",
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to get notification target");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "Database error",
            );
        }
    };

    let target = match row_to_target(row) {
        Ok(target) => target,
        Err(e) => {
            tracing::error!(target_id = %id, error = %e, "Malformed target JSON columns");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "Malformed target record",
            );
        }
    };

    match state.dispatcher.test_target(&target).await {
        Ok(report) => {
            let failures = report
                .failures
                .iter()
                .map(|f| DispatchFailureResponse {
                    channel_type: f.channel_type.clone(),
                    route: f.route.clone(),
                    recipient: f.recipient.clone(),
                    error: f.error.clone(),
                })
                .collect();
            success_response(
                StatusCode::OK,
                &trace_id,
                TestReportResponse {
                    attempted: report.attempted,
                    delivered: report.delivered,
                    success: report.is_success(),
                    failures,
                },
            )
        }
        // A dropped channel plugin (config no longer carries the section)
        // is an operational failure, not a bad target definition.
        Err(e @ NotifyError::ChannelUnavailable(_)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &trace_id,
            "dispatch_failed",
            &e.to_string(),
        ),
        Err(e) => error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "invalid_target",
            &e.to_string(),
        ),
    }
}

pub fn target_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(create_target, list_targets))
        .routes(routes!(get_target, update_target, delete_target))
        .routes(routes!(test_target_send))
}
