// Stock notification filters.

use std::collections::BTreeSet;

use super::{Notification, NotificationFilter};

/// Accepts every notification.
///
/// A named value rather than an anonymous closure so registrations can
/// be compared and logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysEnabled;

impl NotificationFilter for AlwaysEnabled {
    fn is_notification_enabled(&self, _notification: &Notification) -> bool {
        true
    }
}

/// Accepts notifications whose type starts with any enabled prefix.
///
/// With no prefixes enabled nothing passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypePrefixFilter {
    prefixes: BTreeSet<String>,
}

impl TypePrefixFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.insert(prefix.into());
        self
    }

    pub fn disable(&mut self, prefix: &str) {
        self.prefixes.remove(prefix);
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }
}

impl NotificationFilter for TypePrefixFilter {
    fn is_notification_enabled(&self, notification: &Notification) -> bool {
        self.prefixes
            .iter()
            .any(|p| notification.notification_type.starts_with(p.as_str()))
    }
}

/// Accepts attribute-change notifications for the enabled attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeChangeFilter {
    attributes: BTreeSet<String>,
}

impl AttributeChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.insert(attribute.into());
        self
    }

    pub fn disable(&mut self, attribute: &str) {
        self.attributes.remove(attribute);
    }
}

impl NotificationFilter for AttributeChangeFilter {
    fn is_notification_enabled(&self, notification: &Notification) -> bool {
        notification.is_attribute_change()
            && notification
                .attribute_name()
                .is_some_and(|name| self.attributes.contains(name))
    }
}
