// Wire types for the REST connector.
//
// The connector speaks JSON. Only the documents used by the connection
// lifecycle and the notification flow are modelled here; everything
// else is fetched as raw `serde_json::Value`.

use serde::{Deserialize, Serialize};

/// Root document served at `/IBMJMXConnectorREST`.
///
/// Every field except `version` is a server-relative URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub version: u32,
    pub mbeans: String,
    #[serde(rename = "createMBean")]
    pub create_mbean: Option<String>,
    pub mbean_count: String,
    pub default_domain: String,
    pub domains: String,
    pub notifications: String,
    pub instance_of: Option<String>,
    #[serde(default)]
    pub file_transfer: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub graph: Option<String>,
}

/// Body posted to the `notifications` URL to open a notification client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// How long the server may hold an inbox request open, in ms.
    pub delivery_interval: u64,
    /// How long an unpolled inbox survives on the server, in ms.
    pub inbox_expiry: u64,
}

/// URLs of a notification client created on the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationArea {
    pub registrations: String,
    pub server_registrations: String,
    pub inbox: String,
    pub client: String,
}

/// Server-side subscription to one MBean's notifications.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRegistration {
    pub object_name: String,
    /// Server-side filters. The client filters locally, so this is
    /// always empty today.
    pub filters: Vec<serde_json::Value>,
}

/// One notification as delivered by the inbox.
///
/// Class-specific fields (`attributeName`, `oldValue`, `connectionId`,
/// ...) are kept in `extra` so nothing the server sends is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(default = "default_class_name")]
    pub class_name: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Object name of the emitting MBean.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub sequence_number: i64,
    #[serde(default)]
    pub time_stamp: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_data: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_class_name() -> String {
    "javax.management.Notification".into()
}
