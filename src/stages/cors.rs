//! Cross-origin resource sharing.
//!
//! Every `OPTIONS` request is treated as a preflight and answered with 204.
//! Other requests continue and have the simple CORS headers added on the
//! way out, error responses included.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::{ConfigError, CorsConfig};
use crate::pipeline::{Outcome, RequestContext, Stage, StageResult};

use super::through_layer;

#[derive(Debug, Clone)]
pub struct Cors {
    layer: CorsLayer,
}

impl Cors {
    pub fn from_config(config: &CorsConfig) -> Result<Self, ConfigError> {
        // CorsLayer panics on some combinations, e.g. credentials with "*".
        config.validate()?;

        let origin = if config.allows_any_origin() {
            AllowOrigin::any()
        } else {
            let origins = config
                .allowed_origins
                .iter()
                .map(|origin| {
                    HeaderValue::from_str(origin).map_err(|e| {
                        ConfigError::validation("cors.allowed_origins", e.to_string())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(origins)
        };

        let methods = config
            .allowed_methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|e| ConfigError::validation("cors.allowed_methods", e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let allowed_headers = if config.allowed_headers.is_empty() {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::list(header_names("cors.allowed_headers", &config.allowed_headers)?)
        };

        let mut layer = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(allowed_headers)
            .allow_credentials(config.allow_credentials);
        if !config.exposed_headers.is_empty() {
            layer = layer.expose_headers(header_names(
                "cors.exposed_headers",
                &config.exposed_headers,
            )?);
        }
        if let Some(seconds) = config.max_age {
            layer = layer.max_age(Duration::from_secs(seconds));
        }

        Ok(Self { layer })
    }
}

#[async_trait]
impl Stage for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        if ctx.method != Method::OPTIONS {
            return Ok(Outcome::Continue);
        }

        let request = ctx.bodiless_request(ctx.uri.clone());
        let mut response = through_layer(&self.layer, request, Response::new(Body::empty())).await;
        *response.status_mut() = StatusCode::NO_CONTENT;
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        Ok(Outcome::Respond(response))
    }

    async fn finalize(&self, ctx: &RequestContext, response: Response) -> Response {
        // Preflight responses already carry their headers.
        if ctx.method == Method::OPTIONS {
            return response;
        }
        through_layer(&self.layer, ctx.bodiless_request(ctx.uri.clone()), response).await
    }
}

fn header_names(field: &str, names: &[String]) -> Result<Vec<HeaderName>, ConfigError> {
    names
        .iter()
        .map(|name| {
            HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| ConfigError::validation(field, e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Request;

    fn context(method: Method, origin: Option<&str>) -> RequestContext {
        let mut builder = Request::builder()
            .method(method)
            .uri("/v1/status")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,authorization");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        RequestContext::from_request(builder.body(Body::empty()).unwrap())
    }

    fn listed() -> Cors {
        Cors::from_config(&CorsConfig {
            allowed_origins: vec!["https://app.example.com".to_string()],
            exposed_headers: vec!["x-request-id".to_string()],
            allow_credentials: true,
            max_age: Some(600),
            ..Default::default()
        })
        .unwrap()
    }

    fn vary_lists(response: &Response, field: &str) -> bool {
        response
            .headers()
            .get_all(header::VARY)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|entry| entry.trim().eq_ignore_ascii_case(field))
    }

    #[tokio::test]
    async fn test_preflight_defaults() {
        let cors = Cors::from_config(&CorsConfig::default()).unwrap();
        let mut ctx = context(Method::OPTIONS, Some("https://anywhere.test"));

        let Outcome::Respond(response) = cors.handle(&mut ctx).await.unwrap() else {
            panic!("preflight must respond");
        };
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        for method in ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"] {
            assert!(methods.contains(method), "{method} missing from {methods}");
        }
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "content-type,authorization"
        );
        assert_eq!(headers[header::CONTENT_LENGTH], "0");
    }

    #[tokio::test]
    async fn test_options_without_request_method_is_still_answered() {
        let cors = Cors::from_config(&CorsConfig::default()).unwrap();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/anything")
            .body(Body::empty())
            .unwrap();
        let mut ctx = RequestContext::from_request(request);

        let Outcome::Respond(response) = cors.handle(&mut ctx).await.unwrap() else {
            panic!("OPTIONS must respond");
        };
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_listed_origin_is_reflected() {
        let cors = listed();
        let ctx = context(Method::GET, Some("https://app.example.com"));

        let response = cors.finalize(&ctx, Response::new(Body::empty())).await;
        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], "x-request-id");
        assert!(vary_lists(&response, "Origin"));
    }

    #[tokio::test]
    async fn test_unlisted_origin_gets_no_allow_origin() {
        let cors = listed();
        let ctx = context(Method::GET, Some("https://evil.example.com"));

        let response = cors.finalize(&ctx, Response::new(Body::empty())).await;
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
        assert!(vary_lists(&response, "Origin"));
    }

    #[tokio::test]
    async fn test_existing_vary_is_kept() {
        let cors = listed();
        let ctx = context(Method::GET, Some("https://app.example.com"));

        let mut response = Response::new(Body::empty());
        response
            .headers_mut()
            .insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        let response = cors.finalize(&ctx, response).await;
        assert!(vary_lists(&response, "Accept-Encoding"));
        assert!(vary_lists(&response, "Origin"));
    }

    #[tokio::test]
    async fn test_listed_preflight_carries_max_age() {
        let cors = listed();
        let mut ctx = context(Method::OPTIONS, Some("https://app.example.com"));

        let Outcome::Respond(response) = cors.handle(&mut ctx).await.unwrap() else {
            panic!("preflight must respond");
        };
        assert_eq!(response.headers()[header::ACCESS_CONTROL_MAX_AGE], "600");
    }

    #[tokio::test]
    async fn test_non_options_continues() {
        let cors = Cors::from_config(&CorsConfig::default()).unwrap();
        let mut ctx = context(Method::POST, None);
        assert!(matches!(
            cors.handle(&mut ctx).await.unwrap(),
            Outcome::Continue
        ));
    }

    #[test]
    fn test_credentials_with_wildcard_origin_is_rejected() {
        let config = CorsConfig {
            allow_credentials: true,
            ..Default::default()
        };
        assert!(Cors::from_config(&config).is_err());
    }

    #[test]
    fn test_invalid_method_is_rejected() {
        let config = CorsConfig {
            allowed_methods: vec!["GE T".to_string()],
            ..Default::default()
        };
        assert!(Cors::from_config(&config).is_err());
    }
}
