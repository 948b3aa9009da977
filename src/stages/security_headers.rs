//! Defensive response headers in the spirit of helmet.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    response::Response,
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{ConfigError, SecurityConfig};
use crate::pipeline::{Outcome, RequestContext, Stage, StageResult};

use super::through_layer;

const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Adds the configured headers to every response that does not set them
/// itself and strips `X-Powered-By`.
#[derive(Clone)]
pub struct SecurityHeaders {
    layers: Vec<SetResponseHeaderLayer<HeaderValue>>,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, ConfigError> {
        let mut hsts = format!("max-age={}", config.hsts_max_age);
        if config.hsts_include_subdomains {
            hsts.push_str("; includeSubDomains");
        }

        let frame_options = HeaderValue::from_str(&config.frame_options.to_ascii_uppercase())
            .map_err(|e| ConfigError::validation("security.frame_options", e.to_string()))?;
        let hsts = HeaderValue::from_str(&hsts)
            .map_err(|e| ConfigError::validation("security.hsts_max_age", e.to_string()))?;

        let layers = [
            (
                "x-dns-prefetch-control",
                HeaderValue::from_static(if config.dns_prefetch { "on" } else { "off" }),
            ),
            ("x-frame-options", frame_options),
            ("strict-transport-security", hsts),
            ("x-download-options", HeaderValue::from_static("noopen")),
            ("x-content-type-options", HeaderValue::from_static("nosniff")),
            ("x-xss-protection", HeaderValue::from_static("1; mode=block")),
        ]
        .into_iter()
        .map(|(name, value)| {
            SetResponseHeaderLayer::if_not_present(HeaderName::from_static(name), value)
        })
        .collect();

        Ok(Self { layers })
    }
}

impl std::fmt::Debug for SecurityHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityHeaders")
            .field("headers", &self.layers.len())
            .finish()
    }
}

#[async_trait]
impl Stage for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    async fn handle(&self, _ctx: &mut RequestContext) -> StageResult {
        Ok(Outcome::Continue)
    }

    async fn finalize(&self, _ctx: &RequestContext, mut response: Response) -> Response {
        response.headers_mut().remove(X_POWERED_BY);
        for layer in &self.layers {
            response = through_layer(layer, Request::default(), response).await;
        }
        response
    }
}
