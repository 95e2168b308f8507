//! Proxy core.
//!
//! # Data Flow
//! ```text
//! ProxyTarget (built by the route registry)
//!     → forward.rs (allowlist, request building)
//!         → buffered: collect → rewrite pipeline → emit once
//!         → progressive: emit head, then chunks as they arrive
//!     → websocket.rs (allowlist, client upgrade, backend connect, relay)
//! ```
//!
//! # Design Decisions
//! - One shared TCP client per delivery mode, pooled by hyper
//! - Allowlist checked before any backend I/O
//! - Header filtering and URI building are plain functions (headers.rs, uri.rs)

pub mod forward;
pub mod headers;
pub mod target;
pub mod uri;
pub mod websocket;

pub use forward::ProxyCore;
pub use target::ProxyTarget;
