//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (enforce connect/request deadline)
//!     → On failure: classify as BackendTimeout (599) or BackendError (500)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No retries: a failed request is reported, never replayed

pub mod timeouts;

pub use timeouts::{BackendTimeouts, Deadlines};
