//! Ordered chain of response rewrite steps.

use std::fmt;
use std::sync::Arc;

use axum::http::request::Parts;

use crate::rewrite::response::RewritableResponse;

/// Everything a step may look at besides the response it rewrites.
#[derive(Clone, Copy)]
pub struct RewriteContext<'a> {
    pub request: Option<&'a Parts>,
    pub original: &'a RewritableResponse,
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

/// A single transformation of a buffered response.
pub trait RewriteStep: Send + Sync {
    /// Return the rewritten response. `response` is never modified in place.
    fn rewrite(&self, response: &RewritableResponse, ctx: &RewriteContext<'_>) -> RewritableResponse;
}

struct FnStep<F>(F);

impl<F> RewriteStep for FnStep<F>
where
    F: Fn(&mut RewritableResponse, &RewriteContext<'_>) + Send + Sync,
{
    fn rewrite(&self, response: &RewritableResponse, ctx: &RewriteContext<'_>) -> RewritableResponse {
        let mut copy = response.clone();
        (self.0)(&mut copy, ctx);
        copy
    }
}

/// Adapt a mutating closure into a step. The closure works on a private copy.
pub fn step<F>(f: F) -> Arc<dyn RewriteStep>
where
    F: Fn(&mut RewritableResponse, &RewriteContext<'_>) + Send + Sync + 'static,
{
    Arc::new(FnStep(f))
}

/// Steps applied in registration order.
#[derive(Clone, Default)]
pub struct RewritePipeline {
    steps: Vec<Arc<dyn RewriteStep>>,
}

impl RewritePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: Arc<dyn RewriteStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step on the output of the previous one.
    pub fn apply(&self, original: &RewritableResponse, ctx: &RewriteContext<'_>) -> RewritableResponse {
        self.steps
            .iter()
            .fold(original.clone(), |current, step| step.rewrite(&current, ctx))
    }
}

impl fmt::Debug for RewritePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewritePipeline")
            .field("steps", &self.steps.len())
            .finish()
    }
}
