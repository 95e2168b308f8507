//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, method, headers)
//!     → matcher.rs (strip base URL, match pattern)
//!     → registry.rs (build ProxyTarget, start named process)
//!     → ProxyCore (HTTP or WebSocket)
//!
//! Route Compilation (at startup):
//!     [[servers]] config
//!     → route.rs (NamedServer)
//!     → Freeze as immutable RouteRegistry
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (fixed precedence, then prefix registration order)

pub mod matcher;
pub mod registry;
pub mod route;

pub use registry::RouteRegistry;
pub use route::{NamedServer, PathRewrite, RouteKind, UnixSocketRequest};
