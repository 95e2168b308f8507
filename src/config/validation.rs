//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that named servers are unambiguous (unique names and prefixes)
//! - Validate value ranges (0 < timeouts <= 1e9 s, probe interval > 0, addresses parse)
//! - Detect prefixes that collide with the built-in `/proxy/` routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};

use crate::config::schema::ProxyConfig;

/// Prefixes reserved by built-in routes.
const RESERVED_PREFIXES: &[&str] = &["proxy", "server-proxy"];

/// Upper bound for every timeout; larger values overflow `Instant` arithmetic.
pub const MAX_TIMEOUT_SECS: f64 = 1e9;

fn valid_timeout(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0 && secs <= MAX_TIMEOUT_SECS
}

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("base_url '{0}' must start and end with '/'")]
    BaseUrl(String),

    #[error("timeout '{0}' must be a positive number of seconds, at most 1e9")]
    Timeout(&'static str),

    #[error("supervisor.probe_interval_ms must be greater than zero")]
    ProbeInterval,

    #[error("server name must not be empty")]
    EmptyServerName,

    #[error("duplicate server name '{0}'")]
    DuplicateServerName(String),

    #[error("server '{name}' has invalid prefix '{prefix}'")]
    InvalidPrefix { name: String, prefix: String },

    #[error("prefix '{0}' is used by more than one server")]
    DuplicatePrefix(String),

    #[error("server '{name}' has invalid request header '{header}'")]
    InvalidHeader { name: String, header: String },
}

/// Validate a deserialized configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if !config.base_url.starts_with('/') || !config.base_url.ends_with('/') {
        errors.push(ValidationError::BaseUrl(config.base_url.clone()));
    }

    let timeouts = [
        ("connect_secs", config.timeouts.connect_secs),
        ("request_secs", config.timeouts.request_secs),
        ("stream_connect_secs", config.timeouts.stream_connect_secs),
        ("stream_request_secs", config.timeouts.stream_request_secs),
    ];
    for (name, value) in timeouts {
        if !valid_timeout(value) {
            errors.push(ValidationError::Timeout(name));
        }
    }

    if config.supervisor.probe_interval_ms == 0 {
        errors.push(ValidationError::ProbeInterval);
    }

    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();
    for server in &config.servers {
        if server.name.is_empty() {
            errors.push(ValidationError::EmptyServerName);
            continue;
        }
        if !names.insert(server.name.as_str()) {
            errors.push(ValidationError::DuplicateServerName(server.name.clone()));
        }

        let prefix = server
            .prefix
            .as_deref()
            .unwrap_or(&server.name)
            .trim_matches('/');
        if prefix.is_empty() || RESERVED_PREFIXES.contains(&prefix) {
            errors.push(ValidationError::InvalidPrefix {
                name: server.name.clone(),
                prefix: prefix.to_string(),
            });
        } else if !prefixes.insert(prefix.to_string()) {
            errors.push(ValidationError::DuplicatePrefix(prefix.to_string()));
        }

        if !valid_timeout(server.timeout_secs) {
            errors.push(ValidationError::Timeout("servers.timeout_secs"));
        }

        for (header, value) in &server.request_headers {
            if HeaderName::try_from(header.as_str()).is_err()
                || HeaderValue::try_from(value.as_str()).is_err()
            {
                errors.push(ValidationError::InvalidHeader {
                    name: server.name.clone(),
                    header: header.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
