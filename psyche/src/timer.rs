//! One-shot cancellable delayed actions.

use crate::notification::Notification;
use crate::queue::EventSender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A delayed action that can be re-armed or cancelled.
///
/// A generation counter is the single authority on whether a fired timer is
/// still valid: arming and cancelling bump it, and the sleeping task only runs
/// its action if it wins a compare-and-swap on the generation it was armed
/// with. A cancel that races with the wake-up therefore either suppresses the
/// action or happens strictly after it.
pub struct Timer {
    name: &'static str,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<(u64, JoinHandle<()>)>>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    /// Run `action` after `delay` unless cancelled or re-armed first.
    pub fn arm<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let armed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let name = self.name;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation
                .compare_exchange(armed, armed + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                info!(timer = name, "timer fired");
                action();
            }
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((armed, handle));
        if let Some((_, old)) = previous {
            old.abort();
        }
        debug!(timer = name, ?delay, "timer armed");
    }

    /// Invalidate any pending firing.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((_, handle)) = pending {
            handle.abort();
            debug!(timer = self.name, "timer cancelled");
        }
    }

    /// Whether an armed action is still waiting to fire.
    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(armed, _)| self.generation.load(Ordering::SeqCst) == *armed)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Bounds how long the robot keeps listening for a follow-up utterance.
///
/// When it fires it posts [`Notification::ListenTimedOut`]; the dispatcher
/// guards that like any other transition.
pub struct ListenWatchdog {
    timer: Timer,
    timeout: Duration,
    events: EventSender,
}

impl ListenWatchdog {
    pub fn new(timeout: Duration, events: EventSender) -> Self {
        Self {
            timer: Timer::new("listen_watchdog"),
            timeout,
            events,
        }
    }

    pub fn arm(&self) {
        let events = self.events.clone();
        self.timer
            .arm(self.timeout, move || events.post(Notification::ListenTimedOut));
    }

    pub fn disarm(&self) {
        self.timer.cancel();
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_armed()
    }
}
