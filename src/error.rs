use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the coordination core.
///
/// Per-item failures inside a batch (one probe, one subscription) never surface
/// as an `Error`; they are folded into a sentinel value for that item.
#[derive(Debug, Error)]
pub enum Error {
    /// No response within the deadline.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream answered with a non-success status.
    #[error("upstream rejected the request with HTTP {status}")]
    Http { status: u16 },

    /// Transport, DNS or connection failure.
    #[error("network error: {0}")]
    Network(String),

    #[error("proxy group {0} not found")]
    GroupNotFound(String),

    /// Another latency test batch holds the run token.
    #[error("a latency test is already running")]
    AlreadyRunning,

    #[error("controller API is not configured")]
    NotConfigured,

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl Error {
    pub(crate) fn from_reqwest(err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(deadline)
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Http { status: 401 | 403 })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// User-presentable classification of a failed connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionIssue {
    NotConfigured,
    Unreachable,
    DaemonNotResponding,
    Unknown(String),
}

impl ConnectionIssue {
    /// Classifies a failure of the liveness step of a connect attempt.
    ///
    /// The API answered but with a non-success status, so the controller port
    /// is open while the daemon is not serving.
    pub fn from_liveness(err: &Error) -> Self {
        match err {
            Error::Http { .. } => Self::DaemonNotResponding,
            other => Self::classify(other),
        }
    }

    pub fn classify(err: &Error) -> Self {
        match err {
            Error::NotConfigured => Self::NotConfigured,
            Error::Network(_) | Error::Timeout(_) => Self::Unreachable,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NotConfigured => {
                "Configure the controller API address and secret in settings first".to_string()
            }
            Self::Unreachable => {
                "Cannot reach the controller API, check the address and port in settings"
                    .to_string()
            }
            Self::DaemonNotResponding => {
                "Controller API is reachable but the proxy daemon is not responding".to_string()
            }
            Self::Unknown(detail) => format!("Connection error: {detail}"),
        }
    }
}

impl std::fmt::Display for ConnectionIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}
