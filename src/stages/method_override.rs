//! `X-HTTP-Method-Override` support for clients limited to GET and POST.

use async_trait::async_trait;
use axum::{http::Method, response::Response};

use crate::pipeline::{Outcome, RequestContext, Stage, StageResult};

use super::append_vary;

pub const OVERRIDE_HEADER: &str = "x-http-method-override";

/// Verbs a client may switch to.
const KNOWN_METHODS: &[&str] = &[
    "ACL",
    "BIND",
    "CHECKOUT",
    "CONNECT",
    "COPY",
    "DELETE",
    "GET",
    "HEAD",
    "LINK",
    "LOCK",
    "M-SEARCH",
    "MERGE",
    "MKACTIVITY",
    "MKCALENDAR",
    "MKCOL",
    "MOVE",
    "NOTIFY",
    "OPTIONS",
    "PATCH",
    "POST",
    "PROPFIND",
    "PROPPATCH",
    "PURGE",
    "PUT",
    "REBIND",
    "REPORT",
    "SEARCH",
    "SOURCE",
    "SUBSCRIBE",
    "TRACE",
    "UNBIND",
    "UNLINK",
    "UNLOCK",
    "UNSUBSCRIBE",
];

/// Rewrites the method of POST requests carrying the override header.
#[derive(Debug, Clone, Default)]
pub struct MethodOverride;

impl MethodOverride {
    pub fn new() -> Self {
        Self
    }
}

/// The verb named by an override header value, if it is a known one.
pub fn requested_method(header: &str) -> Option<Method> {
    let candidate = header.split(',').next()?.trim().to_ascii_uppercase();
    if !KNOWN_METHODS.contains(&candidate.as_str()) {
        return None;
    }
    Method::from_bytes(candidate.as_bytes()).ok()
}

#[async_trait]
impl Stage for MethodOverride {
    fn name(&self) -> &'static str {
        "method_override"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        if ctx.method != Method::POST || ctx.original_method.is_some() {
            return Ok(Outcome::Continue);
        }

        if let Some(method) = ctx.header_str(OVERRIDE_HEADER).and_then(requested_method) {
            tracing::debug!(from = %ctx.method, to = %method, "Method overridden");
            ctx.original_method = Some(std::mem::replace(&mut ctx.method, method));
        }
        Ok(Outcome::Continue)
    }

    async fn finalize(&self, ctx: &RequestContext, mut response: Response) -> Response {
        let original = ctx.original_method.as_ref().unwrap_or(&ctx.method);
        if *original == Method::POST {
            append_vary(response.headers_mut(), "X-HTTP-Method-Override");
        }
        response
    }
}
