// ── Core error types ──
//
// Connection-level errors from jmxrest-core. Consumers never see HTTP
// status codes or JSON parse failures directly. The
// `From<jmxrest_api::Error>` impl translates transport-layer errors into
// the configuration / connection / authentication taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Setup errors ─────────────────────────────────────────────────
    /// Credential, trust-store or option setup is malformed. Never retried.
    #[error("Configuration error in {field}: {reason}")]
    Configuration { field: String, reason: String },

    // ── Connection errors ────────────────────────────────────────────
    /// Network or transport failure while talking to the endpoint.
    /// Not retried automatically; callers may retry.
    #[error("Cannot connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// The server rejected the credentials. Never retried.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Operation attempted while the connection is Disconnected.
    #[error("Not connected")]
    NotConnected,

    /// `connect` called on a connection that is already Connected.
    #[error("Already connected to {endpoint}; disconnect first")]
    AlreadyConnected { endpoint: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Connector error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<jmxrest_api::Error> for CoreError {
    fn from(err: jmxrest_api::Error) -> Self {
        match err {
            jmxrest_api::Error::Authentication { message } => CoreError::Authentication { message },
            jmxrest_api::Error::Transport(ref e) => CoreError::Connection {
                endpoint: e.url().map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: if e.is_timeout() {
                    "request timed out".into()
                } else {
                    e.to_string()
                },
            },
            jmxrest_api::Error::InvalidUrl(e) => CoreError::config("endpoint", e.to_string()),
            jmxrest_api::Error::Tls(msg) => CoreError::config("tls", msg),
            jmxrest_api::Error::TrustStore { path, reason } => {
                CoreError::config("trust_store", format!("{path}: {reason}"))
            }
            jmxrest_api::Error::Server { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            jmxrest_api::Error::NotificationAreaGone { status } => CoreError::Api {
                message: "notification area no longer exists".into(),
                status: Some(status),
            },
            jmxrest_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
