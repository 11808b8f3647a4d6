// ── Request surface ──
//
// Management operations available while a connection is Connected.
// Holds the session it was created from; once that session is torn
// down every call fails with `NotConnected`.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use jmxrest_api::{RestClient, ServerInfo};

use crate::connection::Session;
use crate::error::CoreError;

/// Management operations on a Connected connection.
///
/// Cheap to clone. Outlives nothing: after `disconnect` every method
/// returns [`CoreError::NotConnected`].
#[derive(Clone)]
pub struct RequestSurface {
    session: Arc<Session>,
}

impl RequestSurface {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    fn client(&self) -> Result<&RestClient, CoreError> {
        if self.session.cancel.is_cancelled() {
            return Err(CoreError::NotConnected);
        }
        Ok(&self.session.client)
    }

    /// Root document captured during the handshake.
    pub fn server_info(&self) -> Result<&ServerInfo, CoreError> {
        self.client()?;
        Ok(&self.session.server_info)
    }

    /// Number of registered MBeans.
    pub async fn mbean_count(&self) -> Result<u64, CoreError> {
        self.fetch(&self.session.server_info.mbean_count).await
    }

    pub async fn default_domain(&self) -> Result<String, CoreError> {
        self.fetch(&self.session.server_info.default_domain).await
    }

    pub async fn domains(&self) -> Result<Vec<String>, CoreError> {
        self.fetch(&self.session.server_info.domains).await
    }

    /// GET any connector resource, relative to the service root or as an
    /// absolute path (`/IBMJMXConnectorREST/mbeans`).
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, CoreError> {
        self.fetch(path).await
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, CoreError> {
        let client = self.client()?;
        let url = client.resolve(path)?;
        Ok(client.get(url).await?)
    }
}
