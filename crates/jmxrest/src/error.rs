//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use jmxrest_config::ConfigError;
use jmxrest_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {endpoint}")]
    #[diagnostic(
        code(jmxrest::connection_failed),
        help(
            "Check that the server is running and the REST connector feature is enabled.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(jmxrest::auth_failed),
        help(
            "Verify the username and password. The user needs the administrator role.\n\
             Store a password with: jmxrest config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(jmxrest::no_credentials),
        help(
            "Pass --password, set JMXREST_PASSWORD, or run:\n\
             jmxrest config set-password --profile {profile}"
        )
    )]
    NoCredentials { profile: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(jmxrest::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(jmxrest::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: jmxrest config add <NAME> --host <HOST>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No endpoint configured")]
    #[diagnostic(
        code(jmxrest::no_config),
        help(
            "Pass --host, or create a profile with: jmxrest config add default --host <HOST>\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(jmxrest::config))]
    Config(ConfigError),

    // ── Connector ────────────────────────────────────────────────────
    #[error("Connector error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(code(jmxrest::api_error))]
    ApiError { status: Option<u16>, message: String },

    #[error("{0}")]
    #[diagnostic(code(jmxrest::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(jmxrest::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to auth failures.
    pub fn with_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { .. } => Self::AuthFailed {
                profile: profile.into(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration { field, reason } => CliError::Validation { field, reason },
            CoreError::Connection { endpoint, reason } => CliError::ConnectionFailed { endpoint, reason },
            CoreError::Authentication { message: _ } => CliError::AuthFailed {
                profile: "default".into(),
            },
            CoreError::NotConnected => CliError::Internal("connection was closed".into()),
            CoreError::AlreadyConnected { endpoint } => {
                CliError::Internal(format!("already connected to {endpoint}"))
            }
            CoreError::Api { message, status } => CliError::ApiError { status, message },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: String::new(),
            },
            other => CliError::Config(other),
        }
    }
}
