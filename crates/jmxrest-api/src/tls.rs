// Trust-store handling.
//
// A trust store is the set of CA certificates used to validate the
// connector's certificate chain. Two sources feed the HTTP client:
//
// - an explicit per-connection store carried in `TransportConfig`, and
// - the process-wide store installed by `install_process_trust_store`,
//   which mirrors the JVM's `javax.net.ssl.trustStore*` properties.
//
// The process-wide store is shared mutable state: concurrent connection
// setups with different stores race and the last writer wins. Callers
// that need isolation must serialize connection setup themselves.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use arc_swap::ArcSwapOption;
use p12_keystore::{KeyStore, KeyStoreEntry};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::error::Error;

static PROCESS_TRUST_STORE: LazyLock<ArcSwapOption<TrustStore>> =
    LazyLock::new(ArcSwapOption::empty);

// ── TrustStoreType ───────────────────────────────────────────────────

/// On-disk encoding of a trust store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustStoreType {
    /// PKCS#12 archive (`.p12` / `.pfx`). Requires a password.
    #[default]
    Pkcs12,
    /// Concatenated PEM certificates.
    Pem,
}

impl TrustStoreType {
    /// Identifier as written in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pkcs12 => "PKCS12",
            Self::Pem => "PEM",
        }
    }
}

impl fmt::Display for TrustStoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustStoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pkcs12" | "p12" | "pfx" => Ok(Self::Pkcs12),
            "pem" => Ok(Self::Pem),
            other => Err(format!("unknown trust store type '{other}'")),
        }
    }
}

// ── TrustStore ───────────────────────────────────────────────────────

/// A trust store on disk plus the material needed to open it.
#[derive(Debug, Clone)]
pub struct TrustStore {
    pub path: PathBuf,
    pub password: Option<SecretString>,
    pub store_type: TrustStoreType,
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>, password: Option<SecretString>, store_type: TrustStoreType) -> Self {
        Self {
            path: path.into(),
            password,
            store_type,
        }
    }

    /// Read the store and return every certificate it contains.
    ///
    /// For PKCS#12 archives both trusted-certificate entries and the
    /// chains attached to private-key entries are returned.
    pub fn load_certificates(&self) -> Result<Vec<reqwest::Certificate>, Error> {
        let bytes = std::fs::read(&self.path).map_err(|e| self.error(format!("read failed: {e}")))?;

        let certs = match self.store_type {
            TrustStoreType::Pem => reqwest::Certificate::from_pem_bundle(&bytes)
                .map_err(|e| self.error(format!("invalid PEM bundle: {e}")))?,
            TrustStoreType::Pkcs12 => self.decode_pkcs12(&bytes)?,
        };

        if certs.is_empty() {
            return Err(self.error("no certificates found".into()));
        }

        debug!(
            path = %self.path.display(),
            store_type = %self.store_type,
            count = certs.len(),
            "loaded trust store"
        );
        Ok(certs)
    }

    fn decode_pkcs12(&self, bytes: &[u8]) -> Result<Vec<reqwest::Certificate>, Error> {
        let password = self
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_owned())
            .unwrap_or_default();

        let store = KeyStore::from_pkcs12(bytes, &password)
            .map_err(|e| self.error(format!("invalid PKCS#12 archive: {e}")))?;

        let mut certs = Vec::new();
        for (alias, entry) in store.entries() {
            if let KeyStoreEntry::Certificate(cert) = entry {
                certs.push(self.der_certificate(alias, cert.as_der())?);
            }
            if let KeyStoreEntry::PrivateKeyChain(chain) = entry {
                for cert in chain.chain() {
                    certs.push(self.der_certificate(alias, cert.as_der())?);
                }
            }
        }
        Ok(certs)
    }

    fn der_certificate(&self, alias: &str, der: &[u8]) -> Result<reqwest::Certificate, Error> {
        reqwest::Certificate::from_der(der)
            .map_err(|e| self.error(format!("entry '{alias}' is not a valid certificate: {e}")))
    }

    fn error(&self, reason: String) -> Error {
        Error::TrustStore {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

// ── Process-wide trust store ─────────────────────────────────────────

/// Install `store` as the process-wide default trust store.
///
/// This mutates global state shared by every connection in the process.
/// Returns the previously installed store, if any.
pub fn install_process_trust_store(store: TrustStore) -> Option<Arc<TrustStore>> {
    info!(
        path = %store.path.display(),
        store_type = %store.store_type,
        "installing process-wide trust store"
    );
    PROCESS_TRUST_STORE.swap(Some(Arc::new(store)))
}

/// The currently installed process-wide trust store.
pub fn process_trust_store() -> Option<Arc<TrustStore>> {
    PROCESS_TRUST_STORE.load_full()
}
