//! Connection lifecycle and notification dispatch for the JMX REST
//! connector, on top of `jmxrest-api`.
//!
//! - **[`ManagementConnection`]**: Disconnected → [`connect()`](ManagementConnection::connect)
//!   → Connected → [`disconnect()`](ManagementConnection::disconnect). Hands out a
//!   [`RequestSurface`] for management operations and a [`NotificationChannel`]
//!   for listener registrations.
//!
//! - **[`CredentialConfig`]** / **[`ConnectionOptions`]**: who we are, what we
//!   trust, and the option bag merged into the transport configuration.
//!
//! - **[`NotificationChannel`]**: RCU set of listener registrations fed by the
//!   connection's inbox task. Listener failures and panics are isolated.

pub mod connection;
pub mod credentials;
pub mod error;
pub mod notification;
pub mod options;
pub mod request;

// ── Primary re-exports ──────────────────────────────────────────────
pub use connection::{ConnectionState, ManagementConnection, connect_advanced, connect_basic};
pub use credentials::{AuthMode, CredentialConfig};
pub use error::CoreError;
pub use notification::{
    AlwaysEnabled, AttributeChangeFilter, DispatchOutcome, Handback, ListenerError, Notification,
    NotificationChannel, NotificationFilter, NotificationListener, RegistrationHandle, TypePrefixFilter,
};
pub use options::{ConnectionOptions, OptionValue, keys};
pub use request::RequestSurface;

pub use jmxrest_api::{Endpoint, Scheme, ServerInfo, TrustStoreType};
