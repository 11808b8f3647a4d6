// jmxrest-api: async transport for the JMX REST connector

pub mod client;
pub mod error;
pub mod models;
pub mod notifications;
pub mod tls;
pub mod transport;

pub use client::{Endpoint, RestClient, Scheme, PROTOCOL, SERVICE_PATH};
pub use error::Error;
pub use models::{NotificationArea, NotificationRecord, NotificationSettings, ServerInfo};
pub use notifications::{InboxConfig, InboxSink, NotificationInbox, ReconnectConfig, run_inbox};
pub use tls::{TrustStore, TrustStoreType};
pub use transport::{BasicAuth, TransportConfig, TrustAnchors};
