//! Request-surface error taxonomy.

use thiserror::Error;

/// Errors surfaced synchronously to request-surface callers.
///
/// Transient peer trouble, merge rejections, and subscriber overflow are
/// deliberately not here: those are handled internally (retry, stats,
/// teardown) and never raised to callers.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unknown area: {0}")]
    UnknownArea(String),

    #[error("unauthorized peer: {0}")]
    UnauthorizedPeer(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("module unavailable: {0}")]
    ModuleUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<crate::filter::FilterError> for RequestError {
    fn from(err: crate::filter::FilterError) -> Self {
        RequestError::InvalidRequest(err.to_string())
    }
}
