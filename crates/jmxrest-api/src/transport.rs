// Shared transport configuration for building reqwest::Client instances.
//
// Carries TLS trust anchors, hostname verification, timeouts, and basic
// credentials. The connector client and the notification inbox both
// build their HTTP clients from here.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::SecretString;
use tracing::debug;

use crate::error::Error;
use crate::tls::{self, TrustStore};

/// Client version advertised on every request.
pub const CLIENT_VERSION: &str = "jmxrest_client_v5";

/// Header carrying [`CLIENT_VERSION`].
pub const CLIENT_VERSION_HEADER: &str = "X-JMX-REST-Client-Version";

/// Username/password sent as HTTP Basic auth on every request.
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: SecretString,
}

/// Which certificates the client trusts.
#[derive(Debug, Clone, Default)]
pub enum TrustAnchors {
    /// Explicit per-connection store.
    Store(TrustStore),
    /// Whatever [`tls::process_trust_store`] holds at build time,
    /// falling back to the system roots.
    #[default]
    ProcessDefault,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub trust: TrustAnchors,
    pub hostname_verification: bool,
    /// Bound on every request, including connection establishment.
    pub read_timeout: Duration,
    pub auth: Option<BasicAuth>,
    /// Opaque entries handed through from the caller's options bag.
    pub passthrough: BTreeMap<String, String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            trust: TrustAnchors::ProcessDefault,
            hostname_verification: true,
            read_timeout: Duration::from_secs(120),
            auth: None,
            passthrough: BTreeMap::new(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.build_with_timeout(self.read_timeout)
    }

    /// Build a client whose timeout differs from the connection-wide read
    /// timeout. Used for the inbox long-poll.
    pub fn build_with_timeout(&self, timeout: Duration) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(self.read_timeout)
            .user_agent(concat!("jmxrest/", env!("CARGO_PKG_VERSION")));

        match &self.trust {
            TrustAnchors::Store(store) => {
                for cert in store.load_certificates()? {
                    builder = builder.add_root_certificate(cert);
                }
            }
            TrustAnchors::ProcessDefault => {
                if let Some(store) = tls::process_trust_store() {
                    for cert in store.load_certificates()? {
                        builder = builder.add_root_certificate(cert);
                    }
                }
            }
        }

        if !self.hostname_verification {
            builder = builder.danger_accept_invalid_hostnames(true);
        }

        if !self.passthrough.is_empty() {
            debug!(keys = ?self.passthrough.keys().collect::<Vec<_>>(), "transport pass-through options");
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
