//! Ordered request pipeline.
//!
//! A [`Pipeline`] is a fixed list of [`Stage`]s followed by the
//! [`ErrorFunnel`]. Each request makes exactly one pass:
//!
//! 1. Stages run `handle` in registration order until one responds or fails.
//! 2. A failure is converted and rendered by the funnel; if every stage
//!    continued, the funnel synthesizes a not-found error.
//! 3. Every stage that was entered runs `finalize` in reverse order, so
//!    outbound decorations apply to error responses too.

mod composer;
mod context;
pub mod funnel;

pub use composer::compose;
pub use context::{ParsedBody, Payload, RequestContext, is_under_mount};
pub use funnel::{ErrorFunnel, ErrorResponder};

use std::sync::Arc;

use async_trait::async_trait;
use axum::{Router, extract::Request, response::Response};

/// What a stage decided to do with the request.
#[derive(Debug)]
pub enum Outcome {
    /// Hand the request to the next stage.
    Continue,
    /// End the chain with this response.
    Respond(Response),
}

/// `Err` hands the request to the error funnel.
pub type StageResult = anyhow::Result<Outcome>;

/// One unit of the request-handling chain.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult;

    /// Runs on the way out for every stage whose `handle` was entered.
    async fn finalize(&self, _ctx: &RequestContext, response: Response) -> Response {
        response
    }
}

/// The composed request entry point. Cloning is cheap.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
    funnel: ErrorFunnel,
}

impl Pipeline {
    pub fn builder(funnel: ErrorFunnel) -> PipelineBuilder {
        PipelineBuilder {
            stages: Vec::new(),
            funnel,
        }
    }

    /// Names of the installed stages, in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs one request through the chain.
    pub async fn handle(&self, request: Request) -> Response {
        let mut ctx = RequestContext::from_request(request);
        let mut entered = 0;
        let mut terminal = None;

        for stage in self.stages.iter() {
            entered += 1;
            match stage.handle(&mut ctx).await {
                Ok(Outcome::Continue) => {}
                Ok(Outcome::Respond(response)) => {
                    terminal = Some(response);
                    break;
                }
                Err(error) => {
                    tracing::debug!(stage = stage.name(), error = %error, "Stage failed");
                    terminal = Some(self.funnel.fail(&ctx, error));
                    break;
                }
            }
        }

        let mut response = match terminal {
            Some(response) => response,
            None => self.funnel.fall_through(&ctx),
        };

        for stage in self.stages[..entered].iter().rev() {
            response = stage.finalize(&ctx, response).await;
        }

        response
    }

    /// Exposes the pipeline as an axum router that sends every request
    /// through [`Pipeline::handle`].
    pub fn into_router(self) -> Router {
        Router::new().fallback(move |request: Request| {
            let pipeline = self.clone();
            async move { pipeline.handle(request).await }
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Collects stages in the order they will run.
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Stage>>,
    funnel: ErrorFunnel,
}

impl PipelineBuilder {
    pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
            funnel: self.funnel,
        }
    }
}
