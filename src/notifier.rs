/// file: src/notifier.rs
/// description: Desktop notification side effects emitted by feed reducers
use crate::events::{self, ClientEvent, EventSender};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotificationPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    /// Notifications sharing a tag replace each other.
    pub tag: Option<String>,
}

impl DesktopNotification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;
    fn show(&self, notification: &DesktopNotification);
}

/// Shows `notification` only when permission was granted. Returns whether it was shown.
pub fn deliver(notifier: &dyn DesktopNotifier, notification: &DesktopNotification) -> bool {
    match notifier.permission() {
        NotificationPermission::Granted => {
            notifier.show(notification);
            true
        }
        permission => {
            debug!(?permission, title = %notification.title, "Desktop notification suppressed");
            false
        }
    }
}

/// Forwards notifications to the event bus for the terminal UI.
#[derive(Debug, Clone)]
pub struct EventNotifier {
    sender: EventSender,
    permission: NotificationPermission,
}

impl EventNotifier {
    pub fn new(sender: EventSender, permission: NotificationPermission) -> Self {
        Self { sender, permission }
    }
}

impl DesktopNotifier for EventNotifier {
    fn permission(&self) -> NotificationPermission {
        self.permission
    }

    fn show(&self, notification: &DesktopNotification) {
        info!(title = %notification.title, "Desktop notification");
        events::publish(
            Some(&self.sender),
            ClientEvent::DesktopNotification(Arc::new(notification.clone())),
        );
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl DesktopNotifier for SilentNotifier {
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Denied
    }

    fn show(&self, _notification: &DesktopNotification) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_channel;

    #[test]
    fn test_only_granted_permission_shows() {
        let (tx, mut rx) = create_event_channel();
        let note = DesktopNotification::new("상위 입찰 발생", "다른 입찰자가 더 높은 금액을 제시했습니다");

        let denied = EventNotifier::new(tx.clone(), NotificationPermission::Denied);
        assert!(!deliver(&denied, &note));
        assert!(rx.try_recv().is_err());

        let granted = EventNotifier::new(tx, NotificationPermission::Granted);
        assert!(deliver(&granted, &note));
        match rx.try_recv() {
            Ok(ClientEvent::DesktopNotification(shown)) => assert_eq!(*shown, note),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_silent_notifier_never_shows() {
        assert!(!deliver(&SilentNotifier, &DesktopNotification::new("t", "b")));
    }
}
