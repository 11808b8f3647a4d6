//! Shared configuration for jmxrest tools.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to `jmxrest_core::{CredentialConfig, ConnectionOptions}`.
//! The CLI layers flag overrides on top.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use jmxrest_core::{ConnectionOptions, CredentialConfig, Endpoint, TrustStoreType, keys};

/// Keyring service name for stored secrets.
pub const KEYRING_SERVICE: &str = "jmxrest";

/// Environment variable consulted for the connection password.
pub const PASSWORD_ENV: &str = "JMXREST_PASSWORD";

/// Environment variable consulted for the username.
pub const USERNAME_ENV: &str = "JMXREST_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named endpoint profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_trust_store_type")]
    pub trust_store_type: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            trust_store_type: default_trust_store_type(),
        }
    }
}

fn default_read_timeout_ms() -> u64 {
    120_000
}
fn default_trust_store_type() -> String {
    "PKCS12".into()
}

/// A named connector endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Host name or IP address of the server.
    pub host: String,

    /// HTTPS port of the REST connector.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for basic auth. Leave unset for advanced mode.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Trust store with the server's CA certificates.
    pub trust_store: Option<PathBuf>,

    /// Trust store password (plaintext; prefer keyring or env var).
    pub trust_store_password: Option<String>,

    /// Environment variable name containing the trust store password.
    pub trust_store_password_env: Option<String>,

    /// "PKCS12" or "PEM". Falls back to `defaults.trust_store_type`.
    pub trust_store_type: Option<String>,

    /// Override the per-request timeout (ms).
    pub read_timeout_ms: Option<u64>,

    /// Skip host name verification of the server certificate.
    pub disable_hostname_verification: Option<bool>,

    /// Extra connection options, passed through as text.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    9443
}

impl Config {
    /// Resolve a profile: explicit name, then `default_profile`, then "default".
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name, p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "jmxrest", "jmxrest").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("jmxrest");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + environment.
///
/// Environment overrides use `JMXREST_` and `__` as the nesting
/// separator: `JMXREST_PROFILES__PROD__HOST=liberty.example.com`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("JMXREST_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

fn keyring_entry(profile_name: &str, secret: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{secret}"))?)
}

fn keyring_lookup(profile_name: &str, secret: &str) -> Option<SecretString> {
    keyring_entry(profile_name, secret)
        .ok()
        .and_then(|entry| entry.get_password().ok())
        .map(SecretString::from)
}

/// Store the connection password for `profile_name` in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, "password")?.set_password(password)?;
    Ok(())
}

/// Store the trust store password for `profile_name` in the system keyring.
pub fn store_trust_store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name, "trust-store-password")?.set_password(password)?;
    Ok(())
}

/// Resolve the username: profile, then `JMXREST_USERNAME`.
pub fn resolve_username(profile: &Profile) -> Option<String> {
    profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
}

/// Resolve the connection password without CLI flags.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. JMXREST_PASSWORD
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 3. Keyring
    if let Some(pw) = keyring_lookup(profile_name, "password") {
        return Ok(pw);
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve the trust store password. `None` when nothing is configured.
pub fn resolve_trust_store_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    if let Some(ref env_name) = profile.trust_store_password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    if profile.trust_store.is_none() {
        return None;
    }
    keyring_lookup(profile_name, "trust-store-password")
        .or_else(|| profile.trust_store_password.clone().map(SecretString::from))
}

// ── Translation to core types ───────────────────────────────────────

/// Endpoint for a profile.
pub fn profile_endpoint(profile: &Profile) -> Result<Endpoint, ConfigError> {
    Endpoint::new(profile.host.clone(), profile.port).map_err(|e| ConfigError::Validation {
        field: "host".into(),
        reason: e.to_string(),
    })
}

/// Build `CredentialConfig` from a profile, without CLI flag overrides.
///
/// A username makes the profile basic mode and requires a password
/// from the resolution chain; no username means advanced mode.
pub fn profile_to_credentials(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CredentialConfig, ConfigError> {
    let mut creds = match resolve_username(profile) {
        Some(username) => CredentialConfig::basic(username, resolve_password(profile, profile_name)?),
        None => CredentialConfig::advanced(),
    };

    let type_name = profile
        .trust_store_type
        .as_deref()
        .unwrap_or(&defaults.trust_store_type);
    creds.trust_store_type = type_name.parse::<TrustStoreType>().map_err(|reason| ConfigError::Validation {
        field: "trust_store_type".into(),
        reason,
    })?;
    creds.trust_store_path.clone_from(&profile.trust_store);
    creds.trust_store_password = resolve_trust_store_password(profile, profile_name);

    Ok(creds)
}

/// Build `ConnectionOptions` from a profile and the global defaults.
pub fn profile_to_options(profile: &Profile, defaults: &Defaults) -> ConnectionOptions {
    let mut options: ConnectionOptions = profile
        .options
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let timeout_ms = profile.read_timeout_ms.unwrap_or(defaults.read_timeout_ms);
    options.set(keys::READ_TIMEOUT, Duration::from_millis(timeout_ms));
    if let Some(disabled) = profile.disable_hostname_verification {
        options.set(keys::DISABLE_HOSTNAME_VERIFICATION, disabled);
    }
    options
}
