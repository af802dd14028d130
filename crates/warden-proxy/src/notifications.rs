//! State-change signal listener
//!
//! Wraps an application's broadcast stream with a bounded wait. Signals
//! are best-effort: the triggering call may return before its signal is
//! observable, so waiting with a deadline is the only sound way to assert
//! on them.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use warden_core::NotificationKind;

/// Receiver for one application's state-change signals.
pub struct NotificationListener {
    receiver: broadcast::Receiver<NotificationKind>,
}

impl NotificationListener {
    pub(crate) fn new(receiver: broadcast::Receiver<NotificationKind>) -> Self {
        Self { receiver }
    }

    /// Wait for the next signal of any kind. Returns `None` when the
    /// application is gone.
    pub async fn next(&mut self) -> Option<NotificationKind> {
        loop {
            match self.receiver.recv().await {
                Ok(kind) => return Some(kind),
                // Dropped signals are permitted by the delivery contract.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until a signal of the given kind arrives, discarding others.
    /// Returns false if the deadline passes first.
    pub async fn wait_for(&mut self, kind: NotificationKind, deadline: Duration) -> bool {
        let wait = async {
            while let Some(observed) = self.next().await {
                if observed == kind {
                    return true;
                }
            }
            false
        };
        tokio::time::timeout(deadline, wait).await.unwrap_or(false)
    }
}
