// ── Notifications ──
//
// Domain notification type plus the listener and filter capabilities
// callers implement. Dispatch lives in `channel.rs`.

mod channel;
mod filter;

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use jmxrest_api::NotificationRecord;

pub use channel::{DispatchOutcome, NotificationChannel, RegistrationHandle};
pub use filter::{AlwaysEnabled, AttributeChangeFilter, TypePrefixFilter};

/// Notification type emitted when an MBean attribute changes.
pub const ATTRIBUTE_CHANGE: &str = "jmx.attribute.change";

/// Opaque caller value returned verbatim with every notification.
pub type Handback = Arc<dyn Any + Send + Sync>;

/// Error a listener may return. Logged, never propagated to other listeners.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

// ── Notification ─────────────────────────────────────────────────────

/// A notification emitted by a managed resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub notification_type: String,
    /// Object name of the emitting MBean.
    pub source: Option<String>,
    pub sequence_number: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub user_data: Value,
    /// Server-side notification class.
    pub class_name: String,
    /// Class-specific fields (`attributeName`, `oldValue`, ...).
    pub attributes: serde_json::Map<String, Value>,
}

impl Notification {
    pub fn new(notification_type: impl Into<String>) -> Self {
        Self {
            notification_type: notification_type.into(),
            source: None,
            sequence_number: 0,
            timestamp: None,
            message: None,
            user_data: Value::Null,
            class_name: "javax.management.Notification".into(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Name of the changed attribute, for attribute-change notifications.
    pub fn attribute_name(&self) -> Option<&str> {
        self.attributes.get("attributeName").and_then(Value::as_str)
    }

    pub fn is_attribute_change(&self) -> bool {
        self.notification_type == ATTRIBUTE_CHANGE
    }
}

impl From<NotificationRecord> for Notification {
    fn from(record: NotificationRecord) -> Self {
        Self {
            notification_type: record.notification_type,
            source: record.source,
            sequence_number: record.sequence_number,
            timestamp: DateTime::from_timestamp_millis(record.time_stamp).filter(|_| record.time_stamp > 0),
            message: record.message,
            user_data: record.user_data,
            class_name: record.class_name,
            attributes: record.extra,
        }
    }
}

// ── Capabilities ─────────────────────────────────────────────────────

/// Receives notifications.
///
/// Called on the connection's delivery task. An `Err` or a panic is
/// logged and isolated: other listeners still receive the notification.
pub trait NotificationListener: Send + Sync {
    fn handle_notification(&self, notification: &Notification, handback: Option<&Handback>) -> Result<(), ListenerError>;
}

impl<F> NotificationListener for F
where
    F: Fn(&Notification, Option<&Handback>) -> Result<(), ListenerError> + Send + Sync,
{
    fn handle_notification(&self, notification: &Notification, handback: Option<&Handback>) -> Result<(), ListenerError> {
        self(notification, handback)
    }
}

/// Decides whether a listener sees a notification.
///
/// Must be side-effect free; it may be called more than once.
pub trait NotificationFilter: Send + Sync {
    fn is_notification_enabled(&self, notification: &Notification) -> bool;
}

impl<F> NotificationFilter for F
where
    F: Fn(&Notification) -> bool + Send + Sync,
{
    fn is_notification_enabled(&self, notification: &Notification) -> bool {
        self(notification)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn converts_wire_record() {
        let record: NotificationRecord = serde_json::from_value(serde_json::json!({
            "className": "javax.management.AttributeChangeNotification",
            "type": "jmx.attribute.change",
            "source": "WebSphere:type=JvmStats",
            "sequenceNumber": 7,
            "timeStamp": 1_760_000_000_000_i64,
            "attributeName": "HeapSize"
        }))
        .unwrap();

        let n = Notification::from(record);
        assert!(n.is_attribute_change());
        assert_eq!(n.attribute_name(), Some("HeapSize"));
        assert_eq!(n.source.as_deref(), Some("WebSphere:type=JvmStats"));
        assert_eq!(n.timestamp.unwrap().timestamp_millis(), 1_760_000_000_000);
    }

    #[test]
    fn zero_timestamp_is_absent() {
        let record: NotificationRecord = serde_json::from_str(r#"{"type": "x"}"#).unwrap();
        assert!(Notification::from(record).timestamp.is_none());
    }

    #[test]
    fn closures_are_filters() {
        let filter = |n: &Notification| n.notification_type.starts_with("app.");
        assert!(filter.is_notification_enabled(&Notification::new("app.start")));
        assert!(!filter.is_notification_enabled(&Notification::new("jmx.other")));
    }
}
