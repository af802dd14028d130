//! State-change notification fan-out
//!
//! Each hosted application owns a broadcast channel carrying its
//! state-change signals. Emission is best-effort: a signal sent with no
//! live subscriber is dropped, and delivery ordering relative to the
//! return of the triggering call is not guaranteed.

use tokio::sync::broadcast;
use tracing::debug;
use warden_core::NotificationKind;

/// Best-effort notification sender for one application.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<NotificationKind>,
}

impl Notifier {
    /// Create a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to subsequent notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationKind> {
        self.sender.subscribe()
    }

    /// Emit a signal to all current subscribers. Never blocks and never
    /// fails; a lagging or absent subscriber simply misses it.
    pub fn emit(&self, kind: NotificationKind) {
        debug!(signal = %kind, "emitting state-change notification");
        let _ = self.sender.send(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_emitted_signals() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.emit(NotificationKind::PolicyChanged);
        assert_eq!(rx.recv().await.unwrap(), NotificationKind::PolicyChanged);
    }

    #[test]
    fn emission_without_subscribers_is_silent() {
        let notifier = Notifier::new(8);
        notifier.emit(NotificationKind::FactoryReset);
    }
}
