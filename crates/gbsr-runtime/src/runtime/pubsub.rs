use super::types::{RuntimeEventSender, RuntimeNotification};

/// Fans notifications out to every live subscriber.
#[derive(Default)]
pub(crate) struct NotificationHub {
    subscribers: Vec<Box<dyn RuntimeEventSender>>,
}

impl NotificationHub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&mut self, sender: Box<dyn RuntimeEventSender>) {
        self.subscribers.push(sender);
    }

    pub(crate) fn broadcast(&mut self, notification: RuntimeNotification) {
        tracing::debug!(message = %notification.message(), "notification");
        // Drop disconnected subscribers.
        self.subscribers
            .retain(|subscriber| subscriber.send(notification.clone()));
    }
}
