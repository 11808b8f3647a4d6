// ── Management connection ──
//
// Lifecycle of one connection to a REST connector endpoint:
// Disconnected → connect → Connected → disconnect → Disconnected.
// Owns the transport, the optional notification channel, and the
// request surface handed to callers.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jmxrest_api::notifications::{InboxConfig, NotificationInbox};
use jmxrest_api::transport::TransportConfig;
use jmxrest_api::{Endpoint, RestClient, ServerInfo, tls};

use crate::credentials::CredentialConfig;
use crate::error::CoreError;
use crate::notification::NotificationChannel;
use crate::options::ConnectionOptions;
use crate::request::RequestSurface;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

// ── Session ──────────────────────────────────────────────────────────

/// Everything that exists only while Connected.
pub(crate) struct Session {
    pub(crate) client: RestClient,
    pub(crate) server_info: ServerInfo,
    transport: TransportConfig,
    options: ConnectionOptions,
    /// Cancelled on disconnect. Outstanding request surfaces observe it.
    pub(crate) cancel: CancellationToken,
    channel: Mutex<Option<NotificationChannel>>,
}

// ── ManagementConnection ─────────────────────────────────────────────

/// A connection to one REST connector endpoint.
///
/// Created Disconnected. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct ManagementConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    endpoint: Endpoint,
    state: watch::Sender<ConnectionState>,
    session: ArcSwapOption<Session>,
    /// Serializes connect and disconnect.
    lifecycle: Mutex<()>,
}

impl ManagementConnection {
    /// A Disconnected connection to `endpoint`. Does not touch the network.
    pub fn new(endpoint: Endpoint) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ConnectionInner {
                endpoint,
                state,
                session: ArcSwapOption::empty(),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// A Disconnected HTTPS connection to `host:port`.
    pub fn to(host: impl Into<String>, port: u16) -> Result<Self, CoreError> {
        let endpoint = Endpoint::new(host, port).map_err(|e| CoreError::config("endpoint", e.to_string()))?;
        Ok(Self::new(endpoint))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect with `credentials` and `options`.
    ///
    /// Credentials are validated before any network I/O. A configured
    /// trust store is installed as the process-wide default (last writer
    /// wins across concurrent connects) and also used explicitly for
    /// this connection. On failure the connection stays Disconnected.
    pub async fn connect(&self, credentials: &CredentialConfig, options: &ConnectionOptions) -> Result<(), CoreError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.session.load().is_some() {
            return Err(CoreError::AlreadyConnected {
                endpoint: self.inner.endpoint.to_string(),
            });
        }

        credentials.validate()?;
        let trust_store = credentials.trust_store()?;
        let merged = options.merged_with(credentials)?;
        if let Some(ref store) = trust_store {
            tls::install_process_trust_store(store.clone());
        }
        let transport = merged.transport_config(trust_store)?;

        let service_url = self.inner.endpoint.service_url();
        info!(
            service_url = %service_url,
            provider = merged.provider_package_hint()?,
            "connecting"
        );

        let client = RestClient::new(&self.inner.endpoint, &transport)?;
        let server_info = client.server_info().await.map_err(|e| self.handshake_error(e))?;
        debug!(version = server_info.version, "connector handshake complete");

        self.inner.session.store(Some(Arc::new(Session {
            client,
            server_info,
            transport,
            options: merged,
            cancel: CancellationToken::new(),
            channel: Mutex::new(None),
        })));
        self.inner.state.send_replace(ConnectionState::Connected);
        info!(service_url = %service_url, "connected");
        Ok(())
    }

    /// Disconnect. Idempotent and infallible.
    ///
    /// Stops notification delivery (waiting for an in-flight batch),
    /// invalidates every registration, releases the notification client
    /// on the server (best effort) and drops the transport.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let Some(session) = self.inner.session.swap(None) else {
            debug!("already disconnected");
            return;
        };

        session.cancel.cancel();
        if let Some(channel) = session.channel.lock().await.take() {
            channel.close().await;
        }

        self.inner.state.send_replace(ConnectionState::Disconnected);
        info!(endpoint = %self.inner.endpoint, "disconnected");
    }

    // ── Surfaces ─────────────────────────────────────────────────────

    /// Request surface for management operations.
    pub fn request_surface(&self) -> Result<RequestSurface, CoreError> {
        self.session().map(RequestSurface::new)
    }

    /// The connection's notification channel, created on first use.
    ///
    /// Creating it opens a notification client on the server and starts
    /// the inbox polling task. A channel whose inbox loop has stopped is
    /// replaced by a fresh one.
    pub async fn notifications(&self) -> Result<NotificationChannel, CoreError> {
        let session = self.session()?;
        let mut slot = session.channel.lock().await;
        if session.cancel.is_cancelled() {
            return Err(CoreError::NotConnected);
        }
        match slot.take() {
            Some(channel) if channel.is_open() => {
                *slot = Some(channel.clone());
                return Ok(channel);
            }
            Some(stale) => {
                debug!("replacing stopped notification channel");
                stale.close().await;
            }
            None => {}
        }

        let settings = session.options.notification_settings()?;
        let poll_timeout = session.options.notification_read_timeout()?
            + std::time::Duration::from_millis(settings.delivery_interval);
        let poll_client = session.client.with_http(session.transport.build_with_timeout(poll_timeout)?);

        let inbox = NotificationInbox::open(
            session.client.clone(),
            poll_client,
            &session.server_info.notifications,
            settings,
        )
        .await?;

        let config = InboxConfig {
            fetch_interval: session.options.notification_fetch_interval()?,
            ..InboxConfig::default()
        };
        let channel = NotificationChannel::start(Arc::new(inbox), config, session.cancel.child_token()).await;
        *slot = Some(channel.clone());
        debug!("notification channel opened");
        Ok(channel)
    }

    fn session(&self) -> Result<Arc<Session>, CoreError> {
        self.inner.session.load_full().ok_or(CoreError::NotConnected)
    }

    /// Errors from the handshake are connection errors unless they are
    /// about credentials or local setup.
    fn handshake_error(&self, err: jmxrest_api::Error) -> CoreError {
        match CoreError::from(err) {
            CoreError::Api { message, status } => {
                warn!(status, "endpoint did not answer as a REST connector");
                CoreError::Connection {
                    endpoint: self.inner.endpoint.service_url(),
                    reason: match status {
                        Some(code) => format!("HTTP {code}: {message}"),
                        None => message,
                    },
                }
            }
            CoreError::Internal(reason) => CoreError::Connection {
                endpoint: self.inner.endpoint.service_url(),
                reason,
            },
            CoreError::Connection { reason, .. } => CoreError::Connection {
                endpoint: self.inner.endpoint.service_url(),
                reason,
            },
            other => other,
        }
    }
}

// ── Convenience constructors ─────────────────────────────────────────

/// Connect to `host:port` with basic-mode credentials.
///
/// Hostname verification is disabled unless the credentials' options
/// say otherwise; see [`ConnectionOptions::merged_with`].
pub async fn connect_basic(
    host: impl Into<String>,
    port: u16,
    credentials: &CredentialConfig,
) -> Result<ManagementConnection, CoreError> {
    let connection = ManagementConnection::to(host, port)?;
    connection.connect(credentials, &ConnectionOptions::new()).await?;
    Ok(connection)
}

/// Connect to `host:port` with a fully formed options bag.
pub async fn connect_advanced(
    host: impl Into<String>,
    port: u16,
    options: &ConnectionOptions,
) -> Result<ManagementConnection, CoreError> {
    let connection = ManagementConnection::to(host, port)?;
    connection.connect(&CredentialConfig::advanced(), options).await?;
    Ok(connection)
}
