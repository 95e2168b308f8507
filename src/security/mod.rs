//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (authenticated? else 403 / login redirect)
//!     → Pass to routing
//!
//! Before any backend I/O:
//!     → allowlist.rs (may this host be proxied to?)
//!
//! While traffic flows:
//!     → activity.rs (record backend activity)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Session handling stays with the host server (`Authenticator` trait)

pub mod access_control;
pub mod activity;
pub mod allowlist;
pub mod auth;

pub use access_control::{access_control_middleware, AccessControlState};
pub use activity::{ActivitySink, ActivityTracker};
pub use allowlist::HostAllowlist;
pub use auth::{AllowAll, Authenticator, TokenAuthenticator};
