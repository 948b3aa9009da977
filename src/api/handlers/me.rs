//! Current identity endpoint.

use std::sync::Arc;

use axum::{Extension, Json, http::HeaderMap};

use crate::auth::{AuthError, Identity, StrategyRegistry};
use crate::error::ApiResult;

/// GET /v1/me - verifies the bearer token with the `jwt` strategy and
/// returns the caller's identity.
pub async fn get_me(
    registry: Option<Extension<Arc<StrategyRegistry>>>,
    headers: HeaderMap,
) -> ApiResult<Json<Identity>> {
    let Extension(registry) =
        registry.ok_or_else(|| AuthError::UnknownStrategy("jwt".to_string()))?;
    let identity = registry.authenticate("jwt", &headers).await?;
    Ok(Json(identity))
}
