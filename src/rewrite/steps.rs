//! Declarative rewrite rules loaded from configuration.
//!
//! ```toml
//! [[servers.rewrite]]
//! action = "set_header"
//! name = "X-Served-By"
//! value = "{host}:{port}"
//! ```

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use crate::rewrite::pipeline::{RewriteContext, RewritePipeline, RewriteStep};
use crate::rewrite::response::RewritableResponse;

/// One configured rewrite rule.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RewriteRule {
    SetHeader { name: String, value: String },
    AppendHeader { name: String, value: String },
    RemoveHeader { name: String },
    ReplaceBody { from: String, to: String },
    SetStatus { status: u16, #[serde(default)] reason: Option<String> },
}

impl RewriteRule {
    /// Build a pipeline from a list of rules, keeping their order.
    pub fn pipeline(rules: &[RewriteRule]) -> RewritePipeline {
        rules.iter().fold(RewritePipeline::new(), |pipeline, rule| {
            pipeline.with_step(Arc::new(rule.clone()))
        })
    }
}

/// Expand `{host}`, `{port}` and `{path}`.
fn expand(template: &str, ctx: &RewriteContext<'_>) -> String {
    template
        .replace("{host}", ctx.host)
        .replace("{port}", &ctx.port.to_string())
        .replace("{path}", ctx.path)
}

fn header_pair(name: &str, value: &str, ctx: &RewriteContext<'_>) -> Option<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name).ok()?;
    let value = HeaderValue::try_from(expand(value, ctx)).ok()?;
    Some((name, value))
}

impl RewriteStep for RewriteRule {
    fn rewrite(&self, response: &RewritableResponse, ctx: &RewriteContext<'_>) -> RewritableResponse {
        let mut out = response.clone();
        match self {
            RewriteRule::SetHeader { name, value } => match header_pair(name, value, ctx) {
                Some((name, value)) => {
                    out.headers_mut().insert(name, value);
                }
                None => tracing::warn!(header = %name, "Skipping invalid rewrite header"),
            },
            RewriteRule::AppendHeader { name, value } => match header_pair(name, value, ctx) {
                Some((name, value)) => {
                    out.headers_mut().append(name, value);
                }
                None => tracing::warn!(header = %name, "Skipping invalid rewrite header"),
            },
            RewriteRule::RemoveHeader { name } => {
                if response.headers().contains_key(name.as_str()) {
                    out.headers_mut().remove(name.as_str());
                }
            }
            RewriteRule::ReplaceBody { from, to } => {
                if let Ok(text) = std::str::from_utf8(response.body()) {
                    if !from.is_empty() && text.contains(from.as_str()) {
                        out.set_body(text.replace(from.as_str(), &expand(to, ctx)));
                    }
                }
            }
            RewriteRule::SetStatus { status, reason } => match StatusCode::from_u16(*status) {
                Ok(status) => {
                    out.set_status(status);
                    if let Some(reason) = reason {
                        out.set_reason(reason.clone());
                    }
                }
                Err(_) => tracing::warn!(status = *status, "Skipping invalid rewrite status"),
            },
        }
        out
    }
}
