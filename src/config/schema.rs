//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rewrite::RewriteRule;

/// Root configuration for the server proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// URL prefix every route is mounted under. Starts and ends with `/`.
    pub base_url: String,

    /// Front-end authentication.
    pub auth: AuthConfig,

    /// Settings shared by the `/proxy/...` routes.
    pub proxy: ProxySettings,

    /// Backend timeouts.
    pub timeouts: TimeoutConfig,

    /// Process supervisor settings.
    pub supervisor: SupervisorConfig,

    /// Named, optionally supervised, backend servers.
    pub servers: Vec<ServerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            base_url: "/".to_string(),
            auth: AuthConfig::default(),
            proxy: ProxySettings::default(),
            timeouts: TimeoutConfig::default(),
            supervisor: SupervisorConfig::default(),
            servers: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8888").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8888".to_string(),
        }
    }
}

/// Front-end authentication.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared token. When unset every request is treated as authenticated.
    pub token: Option<String>,

    /// Where unauthenticated browser GETs are redirected to.
    pub login_url: Option<String>,
}

/// Settings for the generic `/proxy/...` routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Hosts reachable through `/proxy/{host}:{port}`.
    pub host_allowlist: Vec<String>,

    /// Maximum inbound request body forwarded to a backend, in bytes.
    pub max_body_size: usize,

    /// Rewrite rules applied to buffered responses of non-named routes.
    pub rewrite: Vec<RewriteRule>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            host_allowlist: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            max_body_size: 64 * 1024 * 1024,
            rewrite: Vec::new(),
        }
    }
}

/// Backend timeouts, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connect timeout for buffered requests.
    pub connect_secs: f64,

    /// Total timeout for buffered requests.
    pub request_secs: f64,

    /// Connect timeout for `text/event-stream` requests.
    pub stream_connect_secs: f64,

    /// Overall deadline for `text/event-stream` requests.
    pub stream_request_secs: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 250.0,
            request_secs: 300.0,
            stream_connect_secs: 600.0,
            stream_request_secs: 7200.0,
        }
    }
}

/// Process supervisor settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay between two readiness probes, in milliseconds.
    pub probe_interval_ms: u64,
}

impl SupervisorConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 100,
        }
    }
}

/// A named backend server mounted at `{base_url}/{prefix}/`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Route identifier; also the default URL prefix.
    pub name: String,

    /// URL prefix, defaults to `name`.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Launch command. Absent or empty means the process is managed elsewhere.
    #[serde(default)]
    pub command: Option<CommandConfig>,

    /// Extra environment variables for the launched process.
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Working directory for the launched process.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Fixed port; 0 picks a free one.
    #[serde(default)]
    pub port: u16,

    /// Unix socket instead of TCP: `true` for a generated path, or a path.
    #[serde(default)]
    pub unix_socket: UnixSocketConfig,

    /// Seconds to wait for the readiness probe.
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: f64,

    /// Forward the full front-end path instead of the suffix.
    #[serde(default)]
    pub absolute_url: bool,

    /// Static path rewrites applied to the proxied path.
    #[serde(default)]
    pub mappath: HashMap<String, String>,

    /// Headers added to (or replacing) the forwarded request headers.
    #[serde(default)]
    pub request_headers: HashMap<String, String>,

    /// Rewrite rules applied to buffered responses.
    #[serde(default)]
    pub rewrite: Vec<RewriteRule>,
}

fn default_server_timeout() -> f64 {
    5.0
}

/// Launch command: a shell line or an argument vector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommandConfig {
    Shell(String),
    Argv(Vec<String>),
}

/// Unix socket request for a named server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum UnixSocketConfig {
    Enabled(bool),
    Path(PathBuf),
}

impl Default for UnixSocketConfig {
    fn default() -> Self {
        UnixSocketConfig::Enabled(false)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
