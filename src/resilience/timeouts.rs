//! Timeout enforcement.
//!
//! # Responsibilities
//! - Hold the connect and request deadlines of both delivery modes
//! - Classify backend failures as timeouts or generic transport errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 599, everything else 500

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use crate::config::TimeoutConfig;
use crate::error::ProxyError;

/// Message carried by request timeouts.
pub const REQUEST_TIMEOUT_MESSAGE: &str = "Timeout during request";

/// Connect and total deadlines for one delivery mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deadlines {
    pub connect: Duration,
    pub request: Duration,
}

/// Deadlines for buffered and event-stream requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendTimeouts {
    pub buffered: Deadlines,
    pub streaming: Deadlines,
}

impl From<&TimeoutConfig> for BackendTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            buffered: Deadlines {
                connect: Duration::from_secs_f64(config.connect_secs),
                request: Duration::from_secs_f64(config.request_secs),
            },
            streaming: Deadlines {
                connect: Duration::from_secs_f64(config.stream_connect_secs),
                request: Duration::from_secs_f64(config.stream_request_secs),
            },
        }
    }
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

/// Map a client error to `BackendTimeout` or `BackendError`.
///
/// Walks the source chain looking for an I/O timeout, since the hyper
/// client wraps connector errors.
pub fn classify_client_error(err: &(dyn StdError + 'static)) -> ProxyError {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return ProxyError::BackendTimeout(io_err.to_string());
            }
        }
        current = e.source();
    }
    ProxyError::BackendError(describe(err))
}

/// The error followed by its causes, `: `-separated.
pub fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let cause = e.to_string();
        if !text.contains(&cause) {
            text.push_str(": ");
            text.push_str(&cause);
        }
        current = e.source();
    }
    text
}

/// The error produced when a request deadline elapses.
pub fn request_timeout() -> ProxyError {
    ProxyError::BackendTimeout(REQUEST_TIMEOUT_MESSAGE.to_string())
}
