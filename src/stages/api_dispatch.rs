//! Versioned API dispatch.
//!
//! Requests under the API prefix are forwarded to an axum [`Router`] with the
//! prefix stripped. A router that has no route for the path answers with an
//! [`Unmatched`] marker and the request falls through to the later stages.

use async_trait::async_trait;
use axum::{
    Router,
    body::to_bytes,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;

use crate::error::ApiError;
use crate::pipeline::{Outcome, RequestContext, Stage, StageResult, is_under_mount};

use super::media_type;

/// Largest plain-text error body lifted into an [`ApiError`] message.
const ERROR_BODY_LIMIT: usize = 16 * 1024;

/// Response extension set by the API router's fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unmatched;

/// Fallback handler for API routers: tells the dispatcher to continue.
pub async fn unmatched() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    response.extensions_mut().insert(Unmatched);
    response
}

pub struct ApiDispatch {
    prefix: String,
    router: Router,
}

impl ApiDispatch {
    pub fn new(prefix: impl Into<String>, router: Router) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self { prefix, router }
    }

    /// The URI as seen by the router: prefix removed, query kept.
    fn routed_uri(&self, ctx: &RequestContext) -> anyhow::Result<Uri> {
        let rest = &ctx.path()[self.prefix.len()..];
        let path = if rest.is_empty() { "/" } else { rest };
        let uri = match ctx.uri.query() {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        };
        Ok(uri.parse()?)
    }
}

#[async_trait]
impl Stage for ApiDispatch {
    fn name(&self) -> &'static str {
        "api_dispatch"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        if !is_under_mount(ctx.path(), &self.prefix) {
            return Ok(Outcome::Continue);
        }

        let uri = self.routed_uri(ctx)?;
        let request = ctx.forward_request(uri);
        let mut response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        if response.extensions().get::<Unmatched>().is_some() {
            return Ok(Outcome::Continue);
        }
        if let Some(error) = response.extensions_mut().remove::<ApiError>() {
            return Err(error.into());
        }

        let status = response.status();
        let is_json = media_type(response.headers()).is_some_and(|t| t == "application/json");
        if (status.is_client_error() || status.is_server_error()) && !is_json {
            // Extractor rejections and 405s arrive as plain text.
            let bytes = to_bytes(response.into_body(), ERROR_BODY_LIMIT)
                .await
                .unwrap_or_default();
            let message = String::from_utf8_lossy(&bytes).trim().to_string();
            return Err(ApiError::new(status, message).into());
        }

        Ok(Outcome::Respond(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json,
        body::Body,
        extract::{Path, Request},
        http::Method,
        routing::{get, post},
    };
    use serde_json::{Value, json};

    fn router() -> Router {
        Router::new()
            .route("/status", get(|| async { "OK" }))
            .route(
                "/items/{id}",
                get(|Path(id): Path<u32>| async move { Json(json!({ "id": id })) }),
            )
            .route(
                "/fail",
                post(|| async { Err::<String, _>(ApiError::bad_request("Validation Error")) }),
            )
            .fallback(unmatched)
    }

    fn context(method: Method, uri: &str) -> RequestContext {
        RequestContext::from_request(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
    }

    async fn respond(stage: &ApiDispatch, ctx: &mut RequestContext) -> Response {
        match stage.handle(ctx).await.unwrap() {
            Outcome::Respond(response) => response,
            Outcome::Continue => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn test_dispatches_with_prefix_stripped() {
        let stage = ApiDispatch::new("/v1", router());
        let mut ctx = context(Method::GET, "/v1/status");

        let response = respond(&stage, &mut ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_outside_prefix_continues() {
        let stage = ApiDispatch::new("/v1", router());
        for uri in ["/docs", "/v10/status", "/"] {
            let mut ctx = context(Method::GET, uri);
            assert!(matches!(stage.handle(&mut ctx).await.unwrap(), Outcome::Continue));
        }
    }

    #[tokio::test]
    async fn test_unknown_api_path_continues() {
        let stage = ApiDispatch::new("/v1", router());
        let mut ctx = context(Method::GET, "/v1/nothing-here");
        assert!(matches!(stage.handle(&mut ctx).await.unwrap(), Outcome::Continue));
    }

    #[tokio::test]
    async fn test_route_errors_go_to_funnel() {
        let stage = ApiDispatch::new("/v1", router());
        let mut ctx = context(Method::POST, "/v1/fail");

        let err = stage.handle(&mut ctx).await.unwrap_err();
        let api = err.downcast::<ApiError>().unwrap();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "Validation Error");
    }

    #[tokio::test]
    async fn test_plain_text_rejection_becomes_api_error() {
        let stage = ApiDispatch::new("/v1", router());
        let mut ctx = context(Method::GET, "/v1/items/not-a-number");

        let err = stage.handle(&mut ctx).await.unwrap_err();
        let api = err.downcast::<ApiError>().unwrap();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert!(!api.message.is_empty());
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let stage = ApiDispatch::new("/v1", router());
        let mut ctx = context(Method::DELETE, "/v1/status");

        let err = stage.handle(&mut ctx).await.unwrap_err();
        let api = err.downcast::<ApiError>().unwrap();
        assert_eq!(api.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(api.message, "Method Not Allowed");
    }

    #[tokio::test]
    async fn test_query_survives_prefix_stripping() {
        let stage = ApiDispatch::new("/v1/", router());
        let ctx = context(Method::GET, "/v1/items/3?expand=true");
        assert_eq!(stage.routed_uri(&ctx).unwrap(), "/items/3?expand=true");

        let ctx = context(Method::GET, "/v1");
        assert_eq!(stage.routed_uri(&ctx).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_json_route_response_passes_through() {
        let stage = ApiDispatch::new("/v1", router());
        let mut ctx = context(Method::GET, "/v1/items/3");

        let response = respond(&stage, &mut ctx).await;
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "id": 3 }));
    }
}
