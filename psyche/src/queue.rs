use crate::notification::Notification;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Single FIFO channel feeding the dispatcher.
///
/// Producers never block: the channel is unbounded so a slow query cannot
/// stall a sensor loop. Ordering is per producer; concurrent producers
/// interleave arbitrarily.
pub struct EventQueue;

impl EventQueue {
    /// Create the queue, returning the cloneable producer side and the
    /// dispatcher's receiver.
    pub fn new() -> (EventSender, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSender { tx }, EventReceiver { rx })
    }
}

/// Producer handle given to every service.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Notification>,
}

impl EventSender {
    /// Enqueue `notification`. Posting after the dispatcher exited is a
    /// logged no-op.
    pub fn post(&self, notification: Notification) {
        debug!(transition = %notification.transition(), "posting notification");
        if self.tx.send(notification).is_err() {
            warn!("event queue closed; notification dropped");
        }
    }

    /// Whether the dispatcher side is still alive.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Consumer side, owned by the dispatcher.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl EventReceiver {
    /// Block until the next notification arrives.
    pub async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Pop a notification if one is already queued.
    pub fn try_next(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_post_order() {
        let (tx, mut rx) = EventQueue::new();
        tx.post(Notification::PersonDetected);
        tx.post(Notification::GazeConfirmedClose);
        tx.post(Notification::SpeechStarted);
        assert_eq!(rx.next().await, Some(Notification::PersonDetected));
        assert_eq!(rx.next().await, Some(Notification::GazeConfirmedClose));
        assert_eq!(rx.next().await, Some(Notification::SpeechStarted));
        assert!(rx.try_next().is_none());
    }

    #[tokio::test]
    async fn post_after_close_is_harmless() {
        let (tx, rx) = EventQueue::new();
        drop(rx);
        assert!(!tx.is_open());
        tx.post(Notification::Shutdown);
    }
}
