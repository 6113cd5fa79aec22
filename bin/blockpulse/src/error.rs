//! Probe failure classification.

use crate::endpoint::ApiClass;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while probing a single endpoint.
///
/// Transport and timeout failures never carry an HTTP status; an
/// application-level failure keeps the status of the response it could not
/// interpret.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// DNS, connect, or TLS failure before any response was received.
    #[error("transport error: {0}")]
    Transport(String),
    /// The request did not complete within the per-request timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The endpoint answered, but not with what the protocol promises.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        reason: String,
        http_status: Option<u16>,
    },
    /// No adapter is registered for the endpoint's api class. A
    /// configuration error, not a transient one.
    #[error("no adapter registered for api class {0}")]
    UnsupportedApiClass(ApiClass),
}

impl ProbeError {
    pub fn malformed(reason: impl Into<String>, http_status: Option<u16>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            http_status,
        }
    }

    /// Status code of the failed exchange, when one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::MalformedResponse { http_status, .. } => *http_status,
            _ => None,
        }
    }

    /// Short class label used in logs and failure counters.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Timeout(_) => "timeout",
            Self::MalformedResponse { .. } => "application",
            Self::UnsupportedApiClass(_) => "config",
        }
    }

    /// Classify a reqwest failure. Body-decode errors count as
    /// application-level; everything else is transport (or timeout).
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::malformed(err.to_string(), err.status().map(|s| s.as_u16()))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
