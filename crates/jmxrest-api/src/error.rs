use thiserror::Error;

/// Top-level error type for the `jmxrest-api` crate.
///
/// Covers every failure mode of the REST connector transport:
/// authentication, HTTP transport, trust-store loading, server-side
/// errors, and the notification inbox. `jmxrest-core` maps these into
/// the connection-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server rejected the supplied credentials (HTTP 401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The configured trust store could not be read or decoded.
    #[error("Trust store {path}: {reason}")]
    TrustStore { path: String, reason: String },

    // ── Server ──────────────────────────────────────────────────────
    /// Non-success response from the connector.
    #[error("Connector returned HTTP {status}: {message}")]
    Server { status: u16, message: String },

    /// The notification inbox or client no longer exists on the server
    /// (HTTP 404/410). The notification area must be recreated.
    #[error("Notification area is gone (HTTP {status})")]
    NotificationAreaGone { status: u16 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the server rejected our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Server { status, .. } | Self::NotificationAreaGone { status } => Some(*status),
            _ => None,
        }
    }
}
