//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → turned into RouteRegistry / ProxyCore at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → host allowlist swapped atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the host allowlist reloads live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{
    AuthConfig, CommandConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, ProxySettings,
    ServerConfig, SupervisorConfig, TimeoutConfig, UnixSocketConfig,
};
