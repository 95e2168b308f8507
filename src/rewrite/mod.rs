//! Response rewriting for buffered proxy responses.
//!
//! # Data Flow
//! ```text
//! backend response (fully buffered)
//!     → response.rs (RewritableResponse over a shared OriginalResponse)
//!     → pipeline.rs (steps applied in registration order)
//!     → steps.rs (declarative rules from the config file)
//!     → emitted to the client once
//! ```
//!
//! # Design Decisions
//! - Value semantics: a step gets `&RewritableResponse` and returns a new one
//! - Headers and body are copied from the original only when first touched
//! - Progressive (event-stream) responses never pass through here

pub mod pipeline;
pub mod response;
pub mod steps;

pub use pipeline::{step, RewriteContext, RewritePipeline, RewriteStep};
pub use response::{OriginalResponse, RewritableResponse};
pub use steps::RewriteRule;
