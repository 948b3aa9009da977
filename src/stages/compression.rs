//! Response compression negotiated from `Accept-Encoding`.
//!
//! The encoding itself is tower-http's [`CompressionLayer`], run around the
//! response on the way out, so bodies are compressed as they stream.

use async_trait::async_trait;
use axum::{
    http::{Extensions, HeaderMap, Method, StatusCode, Version, header},
    response::Response,
};
use tower_http::compression::{
    CompressionLayer, CompressionLevel,
    predicate::{And, Predicate, SizeAbove},
};

use crate::pipeline::{Outcome, RequestContext, Stage, StageResult};

use super::{append_vary, through_layer};

type ContentFilter = fn(StatusCode, Version, &HeaderMap, &Extensions) -> bool;

/// Compresses eligible responses with gzip or deflate.
#[derive(Clone)]
pub struct Compression {
    layer: CompressionLayer<And<SizeAbove, ContentFilter>>,
}

impl Compression {
    /// `threshold` is in bytes; values above `u16::MAX` are capped.
    pub fn new(threshold: usize, level: u32) -> Self {
        let threshold = u16::try_from(threshold).unwrap_or(u16::MAX);
        let layer = CompressionLayer::new()
            .no_br()
            .no_zstd()
            .quality(CompressionLevel::Precise(level as i32))
            .compress_when(SizeAbove::new(threshold).and(is_eligible as ContentFilter));
        Self { layer }
    }
}

impl std::fmt::Debug for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compression").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for Compression {
    fn name(&self) -> &'static str {
        "compression"
    }

    async fn handle(&self, _ctx: &mut RequestContext) -> StageResult {
        Ok(Outcome::Continue)
    }

    async fn finalize(&self, ctx: &RequestContext, mut response: Response) -> Response {
        append_vary(response.headers_mut(), "Accept-Encoding");

        if ctx.method == Method::HEAD {
            return response;
        }
        through_layer(&self.layer, ctx.bodiless_request(ctx.uri.clone()), response).await
    }
}

fn is_eligible(status: StatusCode, _: Version, headers: &HeaderMap, _: &Extensions) -> bool {
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return false;
    }
    if header_contains(headers, header::CACHE_CONTROL, "no-transform") {
        return false;
    }
    is_compressible(headers)
}

fn header_contains(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case(token))
}

fn is_compressible(headers: &HeaderMap) -> bool {
    let Some(essence) = super::media_type(headers) else {
        return false;
    };
    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/javascript"
                | "application/xml"
                | "application/x-www-form-urlencoded"
                | "image/svg+xml"
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::extract::Request;
    use axum::http::HeaderValue;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;

    fn context(method: Method, accept: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().method(method).uri("/v1/echo");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT_ENCODING, accept);
        }
        RequestContext::from_request(builder.body(Body::empty()).unwrap())
    }

    fn json_response(len: usize) -> Response {
        let body = format!("{{\"data\":\"{}\"}}", "a".repeat(len));
        let mut response = Response::new(Body::from(body));
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_compresses_large_json_with_gzip() {
        let stage = Compression::new(1024, 6);
        let ctx = context(Method::GET, Some("gzip, deflate, br"));

        let response = stage.finalize(&ctx, json_response(4096)).await;
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers().get_all(header::VARY).iter().count(), 1);
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let compressed = body_bytes(response).await;
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.starts_with("{\"data\":\"aaa"));
    }

    #[tokio::test]
    async fn test_streamed_body_is_compressed() {
        let stage = Compression::new(0, 6);
        let ctx = context(Method::GET, Some("gzip"));

        let chunks = futures::stream::iter(
            (0..64).map(|_| Ok::<_, std::io::Error>(axum::body::Bytes::from_static(b"line\n"))),
        );
        let mut response = Response::new(Body::from_stream(chunks));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let response = stage.finalize(&ctx, response).await;
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");

        let compressed = body_bytes(response).await;
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "line\n".repeat(64));
    }

    #[tokio::test]
    async fn test_rendered_errors_pass_through_intact() {
        use crate::error::ApiError;
        use axum::response::IntoResponse;

        let stage = Compression::new(0, 6);
        let ctx = context(Method::GET, Some("gzip"));
        let error = ApiError::bad_request("Invalid asset name");

        let response = stage.finalize(&ctx, error.clone().into_response()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.extensions().get::<ApiError>(), Some(&error));
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    }

    #[tokio::test]
    async fn test_deflate_uses_zlib_framing() {
        let stage = Compression::new(16, 6);
        let ctx = context(Method::GET, Some("deflate"));

        let response = stage.finalize(&ctx, json_response(64)).await;
        assert_eq!(response.headers()[header::CONTENT_ENCODING], "deflate");

        let compressed = body_bytes(response).await;
        let mut decoded = String::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded.len(), 64 + 11);
    }

    #[tokio::test]
    async fn test_small_bodies_are_untouched_but_vary() {
        let stage = Compression::new(1024, 6);
        let ctx = context(Method::GET, Some("gzip"));

        let response = stage.finalize(&ctx, json_response(10)).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(response.headers()[header::VARY], "Accept-Encoding");
        assert_eq!(body_bytes(response).await.len(), 10 + 11);
    }

    #[tokio::test]
    async fn test_skips_head_and_no_transform() {
        let stage = Compression::new(0, 6);

        let ctx = context(Method::HEAD, Some("gzip"));
        let response = stage.finalize(&ctx, json_response(2048)).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());

        let ctx = context(Method::GET, Some("gzip"));
        let mut response = json_response(2048);
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, no-transform"),
        );
        let response = stage.finalize(&ctx, response).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_skips_binary_content() {
        let stage = Compression::new(0, 6);
        let ctx = context(Method::GET, Some("gzip"));

        let mut response = Response::new(Body::from(vec![0u8; 4096]));
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        let response = stage.finalize(&ctx, response).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[tokio::test]
    async fn test_without_accept_encoding() {
        let stage = Compression::new(0, 6);
        let ctx = context(Method::GET, None);
        let response = stage.finalize(&ctx, json_response(4096)).await;
        assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
    }

    #[test]
    fn test_eligibility() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        let ext = Extensions::new();
        assert!(is_eligible(StatusCode::OK, Version::HTTP_11, &headers, &ext));
        assert!(!is_eligible(StatusCode::NO_CONTENT, Version::HTTP_11, &headers, &ext));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
        assert!(!is_eligible(StatusCode::OK, Version::HTTP_11, &headers, &ext));
    }
}
