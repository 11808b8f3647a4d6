// ── Connection options ──
//
// String-keyed option bag handed to `ManagementConnection::connect`.
// Recognized keys are typed; anything else passes through to the
// transport untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use tracing::debug;

use jmxrest_api::transport::{BasicAuth, TransportConfig, TrustAnchors};
use jmxrest_api::{NotificationSettings, TrustStore};

use crate::credentials::{AuthMode, CredentialConfig};
use crate::error::CoreError;

/// Recognized option keys.
pub mod keys {
    /// Per-request timeout in milliseconds.
    pub const READ_TIMEOUT: &str = "read-timeout";
    /// Skip matching the certificate's host name against the endpoint.
    pub const DISABLE_HOSTNAME_VERIFICATION: &str = "disable-hostname-verification";
    /// Where the connector implementation lives. Informational only.
    pub const PROVIDER_PACKAGE_HINT: &str = "provider-package-hint";
    /// `[username, password]` credential pair.
    pub const CREDENTIALS: &str = "credentials";
    /// How long the server may hold an inbox poll open, in ms.
    pub const NOTIFICATION_DELIVERY_INTERVAL: &str = "notification-delivery-interval";
    /// Pause between inbox polls that returned nothing, in ms.
    pub const NOTIFICATION_FETCH_INTERVAL: &str = "notification-fetch-interval";
    /// How long an unpolled inbox survives on the server, in ms.
    pub const NOTIFICATION_INBOX_EXPIRY: &str = "notification-inbox-expiry";
    /// Client-side timeout for one inbox poll, on top of the delivery interval.
    pub const NOTIFICATION_READ_TIMEOUT: &str = "notification-read-timeout";
}

/// Default package hint for the REST connector provider.
pub const DEFAULT_PROVIDER_PACKAGE: &str = "jmxrest";

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_INBOX_EXPIRY: Duration = Duration::from_secs(300);
const DEFAULT_NOTIFICATION_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── OptionValue ──────────────────────────────────────────────────────

/// A value in the option bag.
#[derive(Clone)]
pub enum OptionValue {
    Text(String),
    Bool(bool),
    Millis(u64),
    Credentials {
        username: String,
        password: SecretString,
    },
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Millis(ms) => f.debug_tuple("Millis").field(ms).finish(),
            Self::Credentials { username, .. } => f
                .debug_struct("Credentials")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

impl OptionValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bool(_) => "boolean",
            Self::Millis(_) => "duration",
            Self::Credentials { .. } => "credentials",
        }
    }

    /// Rendering used for pass-through entries. Passwords never render.
    fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Millis(ms) => ms.to_string(),
            Self::Credentials { username, .. } => format!("{username}:[REDACTED]"),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Duration> for OptionValue {
    fn from(d: Duration) -> Self {
        Self::Millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

// ── ConnectionOptions ────────────────────────────────────────────────

/// Option bag for a connection attempt.
///
/// Text values are accepted for typed keys (`"5000"` for a timeout,
/// `"true"` for a flag) so options loaded from config files or the
/// command line need no conversion. A value that cannot be read as the
/// key's type is a configuration error at connect time.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    entries: BTreeMap<String, OptionValue>,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_read_timeout(self, timeout: Duration) -> Self {
        self.with(keys::READ_TIMEOUT, timeout)
    }

    pub fn with_hostname_verification_disabled(self, disabled: bool) -> Self {
        self.with(keys::DISABLE_HOSTNAME_VERIFICATION, disabled)
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.entries.insert(
            keys::CREDENTIALS.into(),
            OptionValue::Credentials {
                username: username.into(),
                password,
            },
        );
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    // ── Merging ──────────────────────────────────────────────────────

    /// Fold `credentials` into a copy of these options.
    ///
    /// Basic mode sets the `credentials` pair and, unless the caller
    /// already chose, disables hostname verification. Advanced mode
    /// leaves the bag exactly as given.
    pub fn merged_with(&self, credentials: &CredentialConfig) -> Result<Self, CoreError> {
        let mut merged = self.clone();
        if credentials.mode()? == AuthMode::Basic {
            if let Some(auth) = credentials.basic_auth() {
                merged.entries.insert(
                    keys::CREDENTIALS.into(),
                    OptionValue::Credentials {
                        username: auth.username,
                        password: auth.password,
                    },
                );
            }
            merged
                .entries
                .entry(keys::DISABLE_HOSTNAME_VERIFICATION.into())
                .or_insert(OptionValue::Bool(true));
        }
        merged.validate()?;
        Ok(merged)
    }

    /// Check every recognized key has a usable value.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.read_timeout()?;
        self.hostname_verification_disabled()?;
        self.provider_package_hint()?;
        self.credentials()?;
        self.notification_settings()?;
        self.notification_fetch_interval()?;
        self.notification_read_timeout()?;
        Ok(())
    }

    // ── Typed accessors ──────────────────────────────────────────────

    pub fn read_timeout(&self) -> Result<Duration, CoreError> {
        self.millis(keys::READ_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn hostname_verification_disabled(&self) -> Result<bool, CoreError> {
        match self.entries.get(keys::DISABLE_HOSTNAME_VERIFICATION) {
            None => Ok(false),
            Some(OptionValue::Bool(b)) => Ok(*b),
            Some(OptionValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(CoreError::config(
                    keys::DISABLE_HOSTNAME_VERIFICATION,
                    format!("expected a boolean, got {s:?}"),
                )),
            },
            Some(other) => Err(type_mismatch(keys::DISABLE_HOSTNAME_VERIFICATION, "boolean", other)),
        }
    }

    pub fn provider_package_hint(&self) -> Result<&str, CoreError> {
        match self.entries.get(keys::PROVIDER_PACKAGE_HINT) {
            None => Ok(DEFAULT_PROVIDER_PACKAGE),
            Some(OptionValue::Text(s)) => Ok(s),
            Some(other) => Err(type_mismatch(keys::PROVIDER_PACKAGE_HINT, "text", other)),
        }
    }

    /// The `credentials` pair, if any.
    pub fn credentials(&self) -> Result<Option<BasicAuth>, CoreError> {
        match self.entries.get(keys::CREDENTIALS) {
            None => Ok(None),
            Some(OptionValue::Credentials { username, password }) => Ok(Some(BasicAuth {
                username: username.clone(),
                password: password.clone(),
            })),
            Some(other) => Err(type_mismatch(keys::CREDENTIALS, "credentials", other)),
        }
    }

    /// Settings posted when the notification area is created.
    pub fn notification_settings(&self) -> Result<NotificationSettings, CoreError> {
        Ok(NotificationSettings {
            delivery_interval: as_millis(self.millis(keys::NOTIFICATION_DELIVERY_INTERVAL, Duration::ZERO)?),
            inbox_expiry: as_millis(self.millis(keys::NOTIFICATION_INBOX_EXPIRY, DEFAULT_INBOX_EXPIRY)?),
        })
    }

    pub fn notification_fetch_interval(&self) -> Result<Duration, CoreError> {
        self.millis(keys::NOTIFICATION_FETCH_INTERVAL, Duration::ZERO)
    }

    pub fn notification_read_timeout(&self) -> Result<Duration, CoreError> {
        self.millis(keys::NOTIFICATION_READ_TIMEOUT, DEFAULT_NOTIFICATION_READ_TIMEOUT)
    }

    /// Entries with no recognized key, rendered as text.
    ///
    /// Credential pairs under an unknown key keep only their username.
    pub fn passthrough(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter(|(k, _)| !is_recognized(k))
            .map(|(k, v)| {
                if let OptionValue::Credentials { username, .. } = v {
                    debug!(key = %k, username = %username, "credential option passed through redacted");
                }
                (k.clone(), v.render())
            })
            .collect()
    }

    /// Transport configuration for these options and trust store.
    ///
    /// With no explicit store the transport falls back to the
    /// process-wide store, then the system roots.
    pub fn transport_config(&self, trust_store: Option<TrustStore>) -> Result<TransportConfig, CoreError> {
        Ok(TransportConfig {
            trust: trust_store.map_or(TrustAnchors::ProcessDefault, TrustAnchors::Store),
            hostname_verification: !self.hostname_verification_disabled()?,
            read_timeout: self.read_timeout()?,
            auth: self.credentials()?,
            passthrough: self.passthrough(),
        })
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, CoreError> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(OptionValue::Millis(ms)) => Ok(Duration::from_millis(*ms)),
            Some(OptionValue::Text(s)) => s
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| CoreError::config(key, format!("expected milliseconds, got {s:?}"))),
            Some(other) => Err(type_mismatch(key, "duration", other)),
        }
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for ConnectionOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn is_recognized(key: &str) -> bool {
    matches!(
        key,
        keys::READ_TIMEOUT
            | keys::DISABLE_HOSTNAME_VERIFICATION
            | keys::PROVIDER_PACKAGE_HINT
            | keys::CREDENTIALS
            | keys::NOTIFICATION_DELIVERY_INTERVAL
            | keys::NOTIFICATION_FETCH_INTERVAL
            | keys::NOTIFICATION_INBOX_EXPIRY
            | keys::NOTIFICATION_READ_TIMEOUT
    )
}

fn type_mismatch(key: &str, expected: &str, got: &OptionValue) -> CoreError {
    CoreError::config(key, format!("expected {expected}, got {}", got.kind()))
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
