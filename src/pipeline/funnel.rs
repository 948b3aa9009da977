//! Terminal error funnel: conversion, not-found synthesis and the responder.
//!
//! ```text
//! Normal --(stage fails)--> convert --> respond
//! Normal --(nothing responded)--> not_found --> respond
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::config::Environment;
use crate::error::ApiError;
use crate::stages::body_parser::BodyParseError;

use super::RequestContext;

/// Normalizes any error surfaced by a stage into the canonical [`ApiError`].
///
/// - `ApiError` passes through unchanged.
/// - Body parser failures keep their status and message.
/// - Anything else becomes a 500 carrying the display message, with the
///   full error chain kept as stack detail.
pub fn convert(error: anyhow::Error) -> ApiError {
    let error = match error.downcast::<ApiError>() {
        Ok(api_error) => return api_error,
        Err(error) => error,
    };

    let stack = format!("{:?}", error);
    match error.downcast::<BodyParseError>() {
        Ok(parse_error) => {
            ApiError::new(parse_error.status(), parse_error.to_string()).with_stack(stack)
        }
        Err(error) => ApiError::internal(error.to_string())
            .with_stack(stack)
            .internal_origin(),
    }
}

/// The error synthesized when every stage continued without responding.
pub fn not_found(ctx: &RequestContext) -> ApiError {
    ApiError::not_found().with_stack(format!("No route matched {} {}", ctx.method, ctx.path()))
}

/// Writes canonical errors to the response.
#[derive(Debug, Clone, Copy)]
pub struct ErrorResponder {
    environment: Environment,
}

impl ErrorResponder {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// Stack detail is only exposed while developing.
    pub fn exposes_stack(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn respond(&self, ctx: &RequestContext, error: ApiError) -> Response {
        if error.status.is_server_error() || !error.is_public {
            tracing::error!(
                status = %error.status.as_u16(),
                method = %ctx.method,
                path = %ctx.path(),
                error = %error.message,
                detail = ?error.stack,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = %error.status.as_u16(),
                method = %ctx.method,
                path = %ctx.path(),
                error = %error.message,
                "Request rejected"
            );
        }

        let mut body = error.to_body(self.exposes_stack());
        if let Some(id) = &ctx.request_id {
            body = body.with_request_id(id);
        }

        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// The three-stage terminal chain installed after every other stage.
#[derive(Debug, Clone, Copy)]
pub struct ErrorFunnel {
    responder: ErrorResponder,
}

impl ErrorFunnel {
    pub fn new(environment: Environment) -> Self {
        Self {
            responder: ErrorResponder::new(environment),
        }
    }

    /// A stage failed: convert, then respond.
    pub fn fail(&self, ctx: &RequestContext, error: anyhow::Error) -> Response {
        self.responder.respond(ctx, convert(error))
    }

    /// Nothing responded: synthesize not-found, then respond.
    pub fn fall_through(&self, ctx: &RequestContext) -> Response {
        self.responder.respond(ctx, not_found(ctx))
    }
}
