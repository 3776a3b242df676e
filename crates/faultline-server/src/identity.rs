use axum::body::Body;
use axum::http::{HeaderName, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::error_response;
use crate::logging::TraceId;

static TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");
static USER_HEADER: HeaderName = HeaderName::from_static("x-user");

/// Tenant and operator identity for the current request.
///
/// The authorization engine in front of this service authenticates the
/// caller and forwards the result in `x-tenant-id` / `x-user` headers;
/// this server only consumes them.
#[derive(Debug, Clone)]
pub struct Identity {
    pub tenant_id: String,
    pub user: String,
}

/// Middleware that turns the identity headers into an [`Identity`]
/// request extension. Requests without both headers never reach a
/// handler: every gated route scopes its data by tenant.
pub async fn identity_middleware(mut req: Request<Body>, next: Next) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let tenant_id = header_value(&req, &TENANT_HEADER);
    let user = header_value(&req, &USER_HEADER);

    match (tenant_id, user) {
        (Some(tenant_id), Some(user)) => {
            req.extensions_mut().insert(Identity { tenant_id, user });
            next.run(req).await
        }
        (None, _) => {
            tracing::warn!(
                trace_id = %trace_id,
                "Request rejected: missing x-tenant-id header"
            );
            error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "missing x-tenant-id header",
            )
        }
        (_, None) => {
            tracing::warn!(
                trace_id = %trace_id,
                "Request rejected: missing x-user header"
            );
            error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "missing x-user header",
            )
        }
    }
}

/// A present-but-blank header counts as missing.
fn header_value(req: &Request<Body>, name: &HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::extract::Extension;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn whoami(Extension(identity): Extension<Identity>) -> String {
        format!("{}/{}", identity.tenant_id, identity.user)
    }

    fn build_test_app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn(identity_middleware))
    }

    #[tokio::test]
    async fn missing_headers_return_401() {
        let app = build_test_app();

        let req = Request::builder()
            .uri("/whoami")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["err_code"], 1002);
    }

    #[tokio::test]
    async fn blank_tenant_header_returns_401() {
        let app = build_test_app();

        let req = Request::builder()
            .uri("/whoami")
            .header("x-tenant-id", "   ")
            .header("x-user", "ops")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["err_code"], 1002);
    }

    #[tokio::test]
    async fn missing_user_header_returns_401() {
        let app = build_test_app();

        let req = Request::builder()
            .uri("/whoami")
            .header("x-tenant-id", "tenant-1")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["err_code"], 1002);
    }

    #[tokio::test]
    async fn identity_reaches_the_handler() {
        let app = build_test_app();

        let req = Request::builder()
            .uri("/whoami")
            .header("x-tenant-id", "tenant-1")
            .header("x-user", "zhangsan")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"tenant-1/zhangsan");
    }
}
