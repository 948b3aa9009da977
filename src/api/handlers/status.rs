//! Liveness endpoint.

/// GET /v1/status
pub async fn status() -> &'static str {
    "OK"
}
