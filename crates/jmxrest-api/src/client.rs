// REST connector HTTP client
//
// Wraps `reqwest::Client` with connector-specific URL resolution, basic
// auth, the client-version header, and status-code interpretation. The
// notification endpoints live in `notifications.rs` as inherent methods.

use std::fmt;

use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::ServerInfo;
use crate::transport::{BasicAuth, CLIENT_VERSION, CLIENT_VERSION_HEADER, TransportConfig};

/// Fixed service path of the REST connector.
pub const SERVICE_PATH: &str = "/IBMJMXConnectorREST";

/// Protocol tag used in `service:jmx:` URLs.
pub const PROTOCOL: &str = "rest";

// ── Endpoint ─────────────────────────────────────────────────────────

/// URL scheme for the connector endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Https,
    /// Plain HTTP. Only for local test rigs.
    Http,
}

/// Host and port of a connector endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
}

impl Endpoint {
    /// An HTTPS endpoint. Port 0 is rejected.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, Error> {
        Self::with_scheme(host, port, Scheme::Https)
    }

    pub fn with_scheme(host: impl Into<String>, port: u16, scheme: Scheme) -> Result<Self, Error> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Error::InvalidUrl(url::ParseError::EmptyHost));
        }
        if port == 0 {
            return Err(Error::InvalidUrl(url::ParseError::InvalidPort));
        }
        Ok(Self { host, port, scheme })
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// The connector root, e.g. `https://host:9443/IBMJMXConnectorREST`.
    pub fn root_url(&self) -> Result<Url, Error> {
        let scheme = match self.scheme {
            Scheme::Https => "https",
            Scheme::Http => "http",
        };
        Ok(Url::parse(&format!("{scheme}://{}{SERVICE_PATH}", self.authority()))?)
    }

    /// JMX service URL form: `service:jmx:rest://host:port/IBMJMXConnectorREST`.
    pub fn service_url(&self) -> String {
        format!("service:jmx:{PROTOCOL}://{}{SERVICE_PATH}", self.authority())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

// ── RestClient ───────────────────────────────────────────────────────

/// Raw HTTP client for one connector endpoint.
///
/// Resolves the server-relative URLs advertised in [`ServerInfo`] and
/// maps HTTP status codes onto [`Error`] variants. Cheap to clone.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    root: Url,
    auth: Option<BasicAuth>,
}

impl RestClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(endpoint: &Endpoint, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            root: endpoint.root_url()?,
            auth: transport.auth.clone(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, root: Url, auth: Option<BasicAuth>) -> Self {
        Self { http, root, auth }
    }

    /// Same root and credentials, different underlying HTTP client.
    pub fn with_http(&self, http: reqwest::Client) -> Self {
        Self {
            http,
            root: self.root.clone(),
            auth: self.auth.clone(),
        }
    }

    /// The connector root URL.
    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Resolve a connector path. Absolute URLs and server-relative paths
    /// (`/IBMJMXConnectorREST/...`) are kept as given; bare relative paths
    /// (`mbeans`) nest under the connector root.
    pub fn resolve(&self, path: &str) -> Result<Url, Error> {
        if path.starts_with('/') || path.contains("://") {
            return Ok(self.root.join(path)?);
        }
        let mut base = self.root.clone();
        if !base.path().ends_with('/') {
            let nested = format!("{}/", base.path());
            base.set_path(&nested);
        }
        Ok(base.join(path)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, url)
            .header(CLIENT_VERSION_HEADER, CLIENT_VERSION);
        if let Some(ref auth) = self.auth {
            builder = builder.basic_auth(&auth.username, Some(auth.password.expose_secret()));
        }
        builder
    }

    /// Send a GET request and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.request(reqwest::Method::GET, url).send().await?;
        Self::parse_json(resp).await
    }

    /// Send a POST request with a JSON body and decode the JSON response.
    pub async fn post<T: DeserializeOwned>(&self, url: Url, body: &impl Serialize) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await?;
        Self::parse_json(resp).await
    }

    /// Send a POST request with a JSON body, ignoring any response body.
    pub async fn post_empty(&self, url: Url, body: &impl Serialize) -> Result<(), Error> {
        debug!("POST {}", url);
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await?;
        Self::check_status(resp).await.map(drop)
    }

    /// Send a DELETE request, ignoring any response body.
    pub async fn delete(&self, url: Url) -> Result<(), Error> {
        debug!("DELETE {}", url);
        let resp = self.request(reqwest::Method::DELETE, url).send().await?;
        Self::check_status(resp).await.map(drop)
    }

    /// Fetch the connector root document.
    ///
    /// This is the connection handshake: it proves the endpoint is
    /// reachable and that the credentials are accepted.
    pub async fn server_info(&self) -> Result<ServerInfo, Error> {
        self.get(self.root.clone()).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();
        match status {
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(Error::Authentication {
                    message: format!("server rejected credentials (HTTP {code})"),
                })
            }
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::GONE => {
                Err(Error::Server {
                    status: code,
                    message: if body.is_empty() { "resource not found".into() } else { body },
                })
            }
            _ => Err(Error::Server {
                status: code,
                message: body,
            }),
        }
    }

    async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let resp = Self::check_status(resp).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
