//! Router configuration for the versioned API.

use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handlers;
use crate::stages::api_dispatch::unmatched;

/// Routes served under the API prefix, which the dispatcher strips.
///
/// # Routes
/// - `GET /status` - liveness check
/// - `POST /echo` - returns the parsed request body
/// - `GET /me` - identity behind a `jwt` bearer token
///
/// Paths without a route fall back to [`unmatched`], which hands the request
/// back to the pipeline.
pub fn v1_routes() -> Router {
    Router::new()
        .route("/status", get(handlers::status::status))
        .route("/echo", post(handlers::echo::echo))
        .route("/me", get(handlers::me::get_me))
        .fallback(unmatched)
}
