//! Route definitions.
//!
//! # Responsibilities
//! - Describe the five route kinds and their URL patterns
//! - Turn `[[servers]]` config entries into immutable `NamedServer`s
//!
//! # Design Decisions
//! - Routes are immutable after registration
//! - Callable-or-literal fields are explicit enums, resolved per use

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{CommandConfig, ServerConfig, UnixSocketConfig};
use crate::rewrite::{RewritePipeline, RewriteRule};
use crate::supervisor::launch::{shell_command, Templated};

/// Matched route kind, in match precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// `{base}/proxy/{host}:{port}{path}`
    Remote,
    /// `{base}/proxy/absolute/{host}:{port}{path}`
    RemoteAbsolute,
    /// `{base}/proxy/{port}{path}`
    LocalPort,
    /// `{base}/proxy/absolute/{port}{path}`
    LocalPortAbsolute,
    /// `{base}/{prefix}/{path}`
    Named,
}

impl RouteKind {
    pub fn is_absolute(&self) -> bool {
        matches!(self, RouteKind::RemoteAbsolute | RouteKind::LocalPortAbsolute)
    }
}

/// Rewrites the proxied path of a named route.
#[derive(Clone)]
pub enum PathRewrite {
    Static(HashMap<String, String>),
    Computed(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl PathRewrite {
    pub fn apply(&self, path: &str) -> String {
        match self {
            PathRewrite::Static(map) => map.get(path).cloned().unwrap_or_else(|| path.to_string()),
            PathRewrite::Computed(f) => f(path),
        }
    }
}

impl Default for PathRewrite {
    fn default() -> Self {
        PathRewrite::Static(HashMap::new())
    }
}

impl fmt::Debug for PathRewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathRewrite::Static(map) => f.debug_tuple("Static").field(map).finish(),
            PathRewrite::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Unix socket requested by a named route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UnixSocketRequest {
    #[default]
    None,
    /// Fresh socket in a private temporary directory.
    Auto,
    Path(PathBuf),
}

impl From<&UnixSocketConfig> for UnixSocketRequest {
    fn from(config: &UnixSocketConfig) -> Self {
        match config {
            UnixSocketConfig::Enabled(false) => UnixSocketRequest::None,
            UnixSocketConfig::Enabled(true) => UnixSocketRequest::Auto,
            UnixSocketConfig::Path(path) => UnixSocketRequest::Path(path.clone()),
        }
    }
}

/// A named, optionally supervised, backend.
#[derive(Debug, Clone)]
pub struct NamedServer {
    pub name: String,
    /// URL prefix without surrounding slashes.
    pub prefix: String,
    /// Empty means externally managed.
    pub command: Templated<Vec<String>>,
    pub environment: Templated<HashMap<String, String>>,
    pub cwd: Option<PathBuf>,
    /// `0` picks a free port.
    pub port: u16,
    pub unix_socket: UnixSocketRequest,
    pub timeout: Duration,
    pub absolute_url: bool,
    pub path_rewrite: PathRewrite,
    pub request_headers: HeaderMap,
    pub rewrite: Arc<RewritePipeline>,
}

impl NamedServer {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            prefix: name.clone(),
            name,
            command: Templated::default(),
            environment: Templated::default(),
            cwd: None,
            port: 0,
            unix_socket: UnixSocketRequest::None,
            timeout: Duration::from_secs(5),
            absolute_url: false,
            path_rewrite: PathRewrite::default(),
            request_headers: HeaderMap::new(),
            rewrite: Arc::new(RewritePipeline::new()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let command = match &config.command {
            Some(CommandConfig::Shell(line)) if !line.trim().is_empty() => shell_command(line),
            Some(CommandConfig::Argv(argv)) => argv.clone(),
            _ => Vec::new(),
        };

        let mut request_headers = HeaderMap::new();
        for (name, value) in &config.request_headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(name), Ok(value)) => {
                    request_headers.insert(name, value);
                }
                _ => tracing::warn!(server = %config.name, header = %name, "Ignoring invalid request header"),
            }
        }

        Self {
            name: config.name.clone(),
            prefix: config
                .prefix
                .as_deref()
                .unwrap_or(&config.name)
                .trim_matches('/')
                .to_string(),
            command: Templated::Literal(command),
            environment: Templated::Literal(config.environment.clone()),
            cwd: config.cwd.clone(),
            port: config.port,
            unix_socket: UnixSocketRequest::from(&config.unix_socket),
            timeout: Duration::from_secs_f64(config.timeout_secs),
            absolute_url: config.absolute_url,
            path_rewrite: PathRewrite::Static(config.mappath.clone()),
            request_headers,
            rewrite: Arc::new(RewriteRule::pipeline(&config.rewrite)),
        }
    }

    pub fn with_command(mut self, argv: Vec<String>) -> Self {
        self.command = Templated::Literal(argv);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_unix_socket(mut self, socket: UnixSocketRequest) -> Self {
        self.unix_socket = socket;
        self
    }
}
