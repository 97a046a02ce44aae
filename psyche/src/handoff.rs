use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Bounded queue between a fast producer loop and a slower consumer loop.
///
/// The producer never waits: when the queue is full it throws away everything
/// still pending and keeps only the newest item. The consumer waits with a
/// deadline so it can notice cancellation.
pub struct HandOff<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    ready: Notify,
}

impl<T> HandOff<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
        }
    }

    /// Enqueue `item`, discarding stale entries if the queue is full.
    /// Returns how many entries were discarded.
    pub fn push_fresh(&self, item: T) -> usize {
        let dropped = {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            let dropped = if items.len() >= self.capacity {
                let n = items.len();
                items.clear();
                n
            } else {
                0
            };
            items.push_back(item);
            dropped
        };
        self.ready.notify_one();
        dropped
    }

    /// Drop everything pending and enqueue `item` alone.
    pub fn replace_with(&self, item: T) {
        {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            items.clear();
            items.push_back(item);
        }
        self.ready.notify_one();
    }

    pub fn clear(&self) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<T> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Take the oldest item, waiting at most `wait` for one to arrive.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(item) = self.pop() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, self.ready.notified())
                .await
                .is_err()
            {
                return self.pop();
            }
        }
    }
}
