//! CLI-specific configuration: shared config crate plus flag overrides.

use secrecy::SecretString;

use jmxrest_config::{Config, Defaults, Profile};
use jmxrest_core::{ConnectionOptions, CredentialConfig, Endpoint, Scheme, TrustStoreType};

use crate::cli::{GlobalOpts, StoreType};
use crate::error::CliError;

pub use jmxrest_config::{config_path, load_config_or_default, save_config};

/// Everything needed to open a connection.
pub struct ResolvedConnection {
    pub profile_name: String,
    pub endpoint: Endpoint,
    pub credentials: CredentialConfig,
    pub options: ConnectionOptions,
}

/// Profile name selected by flags, env, or config.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Resolve endpoint, credentials and options from config + CLI flags.
///
/// Flags win over the profile. Without a profile, `--host` alone is
/// enough to build one.
pub fn resolve_connection(global: &GlobalOpts) -> Result<ResolvedConnection, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(p) => p.clone(),
        None if global.profile.is_some() => {
            let mut names: Vec<_> = cfg.profiles.keys().cloned().collect();
            names.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() { "(none)".into() } else { names.join(", ") },
            });
        }
        None => {
            let host = global.host.clone().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            Profile {
                host,
                port: 9443,
                ..Profile::default()
            }
        }
    };
    apply_overrides(&mut profile, global);

    let scheme = if global.insecure_http { Scheme::Http } else { Scheme::Https };
    let endpoint =
        Endpoint::with_scheme(profile.host.clone(), profile.port, scheme).map_err(|e| CliError::Validation {
            field: "host".into(),
            reason: e.to_string(),
        })?;

    let credentials = resolve_credentials(&profile, &profile_name, &cfg.defaults, global)?;

    let mut options = jmxrest_config::profile_to_options(&profile, &cfg.defaults);
    for raw in &global.options {
        let (key, value) = raw.split_once('=').ok_or_else(|| CliError::Validation {
            field: "--option".into(),
            reason: format!("expected KEY=VALUE, got '{raw}'"),
        })?;
        options.set(key.trim(), value.trim());
    }

    Ok(ResolvedConnection {
        profile_name,
        endpoint,
        credentials,
        options,
    })
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = port;
    }
    if global.username.is_some() {
        profile.username.clone_from(&global.username);
    }
    if global.trust_store.is_some() {
        profile.trust_store.clone_from(&global.trust_store);
    }
    if let Some(store_type) = global.trust_store_type {
        profile.trust_store_type = Some(
            match store_type {
                StoreType::Pkcs12 => TrustStoreType::Pkcs12,
                StoreType::Pem => TrustStoreType::Pem,
            }
            .to_string(),
        );
    }
    if let Some(timeout) = global.timeout {
        profile.read_timeout_ms = Some(timeout);
    }
    if global.disable_hostname_verification {
        profile.disable_hostname_verification = Some(true);
    }
}

fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
    global: &GlobalOpts,
) -> Result<CredentialConfig, CliError> {
    let mut credentials = match global.password {
        // An explicit --password skips the resolution chain. Without a
        // username this is a mixed configuration, rejected at connect.
        Some(ref password) => {
            let without_user = Profile {
                username: None,
                ..profile.clone()
            };
            let mut creds = jmxrest_config::profile_to_credentials(&without_user, profile_name, defaults)?;
            creds.username = jmxrest_config::resolve_username(profile);
            creds.password = Some(SecretString::from(password.clone()));
            creds
        }
        None => jmxrest_config::profile_to_credentials(profile, profile_name, defaults)?,
    };

    if let Some(ref pw) = global.trust_store_password {
        credentials.trust_store_password = Some(SecretString::from(pw.clone()));
    }
    Ok(credentials)
}
