use crate::state::AppState;
use crate::{api, identity, logging, openapi};
use axum::http::HeaderValue;
use axum::middleware;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "faultline API",
        description = "faultline 告警事件生命周期引擎 REST API",
    ),
    tags(
        (name = "Health", description = "服务健康检查"),
        (name = "Intake", description = "第三方告警公开接入"),
        (name = "Events", description = "告警事件：推送、查询、认领、恢复、历史"),
        (name = "Silences", description = "静默规则管理"),
        (name = "Targets", description = "通知目标管理"),
        (name = "Webhooks", description = "第三方 Webhook 接入点管理"),
        (name = "Traces", description = "故障处置追踪")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "tenant_header",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("x-tenant-id"),
                ),
            ),
        );
        components.add_security_scheme(
            "user_header",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("x-user"),
                ),
            ),
        );
    }
}

pub fn build_http_app(state: AppState) -> Router {
    let (public_router, public_spec) = api::public_routes().split_for_parts();
    let (protected_router, protected_spec) = api::protected_routes().split_for_parts();

    let mut merged_spec = ApiDoc::openapi();
    merged_spec.merge(public_spec);
    merged_spec.merge(protected_spec);
    let spec = Arc::new(merged_spec.clone());

    // An empty origin list means development mode: allow everything.
    let cors = if state.config.cors_allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    public_router
        .merge(protected_router.layer(middleware::from_fn(identity::identity_middleware)))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/v1/openapi.json", merged_spec))
        .merge(openapi::yaml_route(spec))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
