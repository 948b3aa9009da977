//! Request logging and request-id correlation.
//!
//! Every request gets an id, taken from `X-Request-ID` when the client sent
//! one or generated as a UUID v4. The id is echoed on the response and one
//! access line is written per request under the `access` target, in either
//! the colour-free morgan `dev` layout or the Apache combined log format.

use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::HttpBody,
    http::{HeaderName, HeaderValue, header},
    response::Response,
};
use jiff::{Timestamp, Zoned, tz::TimeZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::{Outcome, RequestContext, Stage, StageResult};

/// Header carrying the request id in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request id stored in the context extensions and forwarded to API routes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Access log layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLogFormat {
    /// `GET /v1/status 200 1.204 ms - 2`
    #[default]
    Dev,
    /// Apache combined log format
    Combined,
}

#[derive(Debug, Clone)]
pub struct RequestLogger {
    format: AccessLogFormat,
}

impl RequestLogger {
    pub fn new(format: AccessLogFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Stage for RequestLogger {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        let request_id = ctx
            .header_str(REQUEST_ID_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        ctx.extensions.insert(RequestId(request_id.clone()));
        ctx.request_id = Some(request_id);
        Ok(Outcome::Continue)
    }

    async fn finalize(&self, ctx: &RequestContext, mut response: Response) -> Response {
        let line = match self.format {
            AccessLogFormat::Dev => dev_line(ctx, &response, ctx.started_at.elapsed()),
            AccessLogFormat::Combined => combined_line(
                ctx,
                &response,
                &Timestamp::now().to_zoned(TimeZone::system()),
            ),
        };
        tracing::info!(target: "access", request_id = ctx.request_id.as_deref().unwrap_or("-"), "{}", line);

        if let Some(value) = ctx
            .request_id
            .as_deref()
            .and_then(|id| HeaderValue::from_str(id).ok())
        {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        response
    }
}

/// `:method :url :status :response-time ms - :res[content-length]`
fn dev_line(ctx: &RequestContext, response: &Response, elapsed: Duration) -> String {
    format!(
        "{} {} {} {:.3} ms - {}",
        ctx.method,
        ctx.original_url(),
        response.status().as_u16(),
        elapsed.as_secs_f64() * 1000.0,
        content_length(response).unwrap_or_else(|| "-".to_string()),
    )
}

/// `:remote-addr - - [:date] ":method :url HTTP/:version" :status :length ":referrer" ":user-agent"`
fn combined_line(ctx: &RequestContext, response: &Response, now: &Zoned) -> String {
    let remote = ctx
        .remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let referrer = ctx
        .header_str(header::REFERER)
        .unwrap_or_default();
    let user_agent = ctx.header_str(header::USER_AGENT).unwrap_or_default();

    format!(
        "{} - - [{}] \"{} {} {:?}\" {} {} \"{}\" \"{}\"",
        remote,
        now.strftime("%d/%b/%Y:%H:%M:%S %z"),
        ctx.method,
        ctx.original_url(),
        ctx.version,
        response.status().as_u16(),
        content_length(response).unwrap_or_else(|| "-".to_string()),
        referrer,
        user_agent,
    )
}

fn content_length(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
        .or_else(|| {
            response
                .body()
                .size_hint()
                .exact()
                .map(|len| len.to_string())
        })
}
