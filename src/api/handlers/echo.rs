//! Echo endpoint.

use axum::{Extension, Json};
use serde_json::Value;

use crate::pipeline::ParsedBody;

/// POST /v1/echo - returns the body parsed by the pipeline's body parsers.
pub async fn echo(body: Option<Extension<ParsedBody>>) -> Json<Value> {
    let value = body
        .map(|Extension(ParsedBody(value))| value)
        .unwrap_or_else(|| Value::Object(Default::default()));
    Json(value)
}
