// ── Credential configuration ──
//
// Who we are (basic-auth username/password, or nothing in advanced mode)
// and which certificates we trust. Pure data plus validation; nothing
// here touches the network.

use std::path::PathBuf;

use secrecy::SecretString;

use jmxrest_api::transport::BasicAuth;
use jmxrest_api::{TrustStore, TrustStoreType};

use crate::error::CoreError;

/// How a connection authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Username and password sent as `[username, password]`.
    Basic,
    /// No credential pair here; the caller supplies a fully formed
    /// options bag (or the server needs none).
    Advanced,
}

/// Credential material plus TLS trust-store parameters.
///
/// Either both `username` and `password` are set (basic mode) or neither
/// is (advanced mode). Mixing them is a configuration error.
#[derive(Debug, Clone, Default)]
pub struct CredentialConfig {
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub trust_store_path: Option<PathBuf>,
    pub trust_store_password: Option<SecretString>,
    pub trust_store_type: TrustStoreType,
}

impl CredentialConfig {
    /// Basic-mode credentials.
    pub fn basic(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Advanced mode: no credential pair.
    pub fn advanced() -> Self {
        Self::default()
    }

    /// Attach a trust store.
    pub fn with_trust_store(mut self, path: impl Into<PathBuf>, password: Option<SecretString>) -> Self {
        self.trust_store_path = Some(path.into());
        self.trust_store_password = password;
        self
    }

    pub fn with_trust_store_type(mut self, store_type: TrustStoreType) -> Self {
        self.trust_store_type = store_type;
        self
    }

    /// Which mode these credentials describe.
    pub fn mode(&self) -> Result<AuthMode, CoreError> {
        match (&self.username, &self.password) {
            (Some(user), Some(_)) if user.trim().is_empty() => {
                Err(CoreError::config("username", "must not be empty"))
            }
            (Some(_), Some(_)) => Ok(AuthMode::Basic),
            (None, None) => Ok(AuthMode::Advanced),
            (Some(_), None) => Err(CoreError::config(
                "credentials",
                "username given without password; set both or neither",
            )),
            (None, Some(_)) => Err(CoreError::config(
                "credentials",
                "password given without username; set both or neither",
            )),
        }
    }

    /// Check every invariant without touching the network.
    ///
    /// A trust store is optional, but if any part of it is configured it
    /// must be complete: a password needs a path, a PKCS#12 path needs a
    /// password, and the file must exist.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.mode()?;
        self.trust_store().map(drop)
    }

    /// Credential pair for HTTP Basic auth, if in basic mode.
    pub fn basic_auth(&self) -> Option<BasicAuth> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(BasicAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// The configured trust store, validated.
    ///
    /// `Ok(None)` means no explicit store: the connection falls back to
    /// the process-wide store, then to the system roots.
    pub fn trust_store(&self) -> Result<Option<TrustStore>, CoreError> {
        let Some(ref path) = self.trust_store_path else {
            if self.trust_store_password.is_some() {
                return Err(CoreError::config(
                    "trust_store_password",
                    "trust store password given without a trust store path",
                ));
            }
            return Ok(None);
        };

        if self.trust_store_type == TrustStoreType::Pkcs12 && self.trust_store_password.is_none() {
            return Err(CoreError::config(
                "trust_store_password",
                "PKCS12 trust stores require a password",
            ));
        }

        if !path.is_file() {
            return Err(CoreError::config(
                "trust_store_path",
                format!("{} is not a readable file", path.display()),
            ));
        }

        Ok(Some(TrustStore::new(
            path.clone(),
            self.trust_store_password.clone(),
            self.trust_store_type,
        )))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn basic_and_advanced_modes() {
        assert_eq!(CredentialConfig::basic("u", secret("p")).mode().unwrap(), AuthMode::Basic);
        assert_eq!(CredentialConfig::advanced().mode().unwrap(), AuthMode::Advanced);
    }

    #[test]
    fn mixed_credentials_are_rejected() {
        let user_only = CredentialConfig {
            username: Some("admin".into()),
            ..CredentialConfig::default()
        };
        assert!(matches!(user_only.validate(), Err(CoreError::Configuration { .. })));

        let password_only = CredentialConfig {
            password: Some(secret("pw")),
            ..CredentialConfig::default()
        };
        assert!(matches!(password_only.validate(), Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn blank_username_is_rejected() {
        let creds = CredentialConfig::basic("  ", secret("pw"));
        assert!(creds.validate().is_err());
    }

    #[test]
    fn basic_auth_only_in_basic_mode() {
        let creds = CredentialConfig::basic("admin", secret("pw"));
        assert_eq!(creds.basic_auth().unwrap().username, "admin");
        assert!(CredentialConfig::advanced().basic_auth().is_none());
    }

    #[test]
    fn no_trust_store_is_allowed() {
        assert!(CredentialConfig::advanced().trust_store().unwrap().is_none());
    }

    #[test]
    fn trust_store_password_without_path_is_rejected() {
        let creds = CredentialConfig {
            trust_store_password: Some(secret("changeit")),
            ..CredentialConfig::default()
        };
        assert!(matches!(
            creds.validate(),
            Err(CoreError::Configuration { ref field, .. }) if field == "trust_store_password"
        ));
    }

    #[test]
    fn pkcs12_requires_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.p12");
        std::fs::write(&path, b"x").unwrap();

        let creds = CredentialConfig::advanced().with_trust_store(&path, None);
        assert!(creds.validate().is_err());

        let creds = CredentialConfig::advanced().with_trust_store(&path, Some(secret("changeit")));
        let store = creds.trust_store().unwrap().unwrap();
        assert_eq!(store.store_type, TrustStoreType::Pkcs12);
    }

    #[test]
    fn pem_store_needs_no_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, b"x").unwrap();

        let creds = CredentialConfig::advanced()
            .with_trust_store(&path, None)
            .with_trust_store_type(TrustStoreType::Pem);
        assert!(creds.validate().is_ok());
    }

    #[test]
    fn missing_trust_store_file_is_rejected() {
        let creds = CredentialConfig::advanced()
            .with_trust_store("/nonexistent/trust.p12", Some(secret("changeit")));
        assert!(matches!(
            creds.validate(),
            Err(CoreError::Configuration { ref field, .. }) if field == "trust_store_path"
        ));
    }
}
