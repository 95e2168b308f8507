//! Error taxonomy for proxied requests.
//!
//! Every failure is converted into a client-visible status at the single
//! request boundary (see `http::response`). Nothing here is fatal to the
//! server process.

use axum::http::StatusCode;

/// Failures that can occur while proxying one request.
///
/// The type is `Clone` so that a failed cold start can be handed to every
/// caller that was waiting on the same start mutex.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    /// Target host rejected by the allowlist.
    #[error("Host '{0}' is not allowed")]
    HostNotAllowed(String),

    /// WebSocket upgrade attempted without authentication.
    #[error("authentication required")]
    Unauthenticated,

    /// Connect or request deadline exceeded.
    #[error("{0}")]
    BackendTimeout(String),

    /// Any other transport-level failure talking to the backend.
    #[error("{0}")]
    BackendError(String),

    /// Supervised process did not answer the readiness probe in time.
    #[error("could not start {name} in time")]
    StartupTimeout { name: String },

    /// Supervised process could not be created at all.
    #[error("could not spawn {name}: {reason}")]
    SpawnFailure { name: String, reason: String },

    /// The inbound request could not be turned into a backend request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Status used for backend connect/request timeouts.
pub const BACKEND_TIMEOUT_STATUS: u16 = 599;

impl ProxyError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::HostNotAllowed(_) | ProxyError::Unauthenticated => StatusCode::FORBIDDEN,
            ProxyError::BackendTimeout(_) => StatusCode::from_u16(BACKEND_TIMEOUT_STATUS)
                .unwrap_or(StatusCode::GATEWAY_TIMEOUT),
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::BackendError(_)
            | ProxyError::StartupTimeout { .. }
            | ProxyError::SpawnFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
