//! Attaches the strategy registry to each request.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::StrategyRegistry;
use crate::pipeline::{Outcome, RequestContext, Stage, StageResult};

/// Makes the registry reachable from API routes through
/// `Extension<Arc<StrategyRegistry>>`. Does not authenticate by itself.
#[derive(Debug, Clone)]
pub struct Authentication {
    registry: Arc<StrategyRegistry>,
}

impl Authentication {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Stage for Authentication {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        ctx.extensions.insert(self.registry.clone());
        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtStrategy;
    use axum::body::Body;
    use axum::extract::Request;

    #[tokio::test]
    async fn test_registry_is_attached() {
        let mut registry = StrategyRegistry::new();
        registry.register(JwtStrategy::new("secret")).unwrap();
        let stage = Authentication::new(Arc::new(registry));

        let mut ctx =
            RequestContext::from_request(Request::builder().uri("/").body(Body::empty()).unwrap());
        stage.handle(&mut ctx).await.unwrap();

        let attached = ctx.extensions.get::<Arc<StrategyRegistry>>().unwrap();
        assert_eq!(attached.names(), vec!["jwt"]);
    }
}
